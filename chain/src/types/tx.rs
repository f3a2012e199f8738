// chain/src/types/tx.rs

//! Transaction types for the consensus layer.
//!
//! This module defines the concrete transaction payloads recorded by both
//! ledgers along with a tagged [`Transaction`] enum. Transactions cover:
//!
//! - token issuance (`CreateToken`),
//! - balance transfers (`Transfer`),
//! - limit orders and their cancellation (`Order`, `CancelOrder`), and
//! - settlement claims issued by the node itself (`ClaimFunds`).
//!
//! Consumers match on [`Transaction`] exhaustively, so adding a variant is
//! a compile error everywhere a kind needs handling.

use serde::{Deserialize, Serialize};

use super::{Address, Hash256, Signature};

/// Content hash of a transaction's canonical encoding.
///
/// Used to deduplicate the pending pool and to reject replays of an
/// identical transaction on the same chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(pub Hash256);

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Moves `amount` of `symbol` from one address to another.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Random identifier chosen by the submitter.
    pub id: u64,
    /// Token being moved.
    pub symbol: String,
    pub amount: u64,
    pub from_address: Address,
    pub to_address: Address,
    /// Signature by `from_address` over [`Transaction::signing_bytes`].
    pub signature: Signature,
}

/// Limit order: sell `sell_amount` of `sell_symbol` for at least
/// `buy_amount` of `buy_symbol`.
///
/// The ratio of the two amounts is the order's limit price; see
/// [`crate::matching`] for how it is oriented on a book.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub sell_symbol: String,
    pub buy_symbol: String,
    pub sell_amount: u64,
    pub buy_amount: u64,
    pub seller_address: Address,
    pub signature: Signature,
}

/// Removes a resting order from the book.
///
/// `symbol` is the sell symbol of the order being canceled. The signature
/// must come from the order's seller.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub symbol: String,
    pub order_id: u64,
    pub signature: Signature,
}

/// System-issued transaction moving an owed (settled but unclaimed)
/// balance into the address's spendable balance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClaimFunds {
    pub id: u64,
    pub symbol: String,
    pub address: Address,
    pub amount: u64,
}

/// Static description of a token.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    /// Total supply, credited to the owner at creation.
    pub supply: u64,
    pub decimals: u8,
}

/// Registers a new token symbol and mints its supply to `owner_address`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CreateToken {
    pub token_info: TokenInfo,
    pub owner_address: Address,
    pub signature: Signature,
}

/// Top-level transaction enum.
///
/// This is the type that appears in block payloads and the pending pool.
/// Binary encoding uses the default externally-tagged representation
/// through `bincode::serde`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Transaction {
    Order(Order),
    Transfer(Transfer),
    CancelOrder(CancelOrder),
    ClaimFunds(ClaimFunds),
    CreateToken(CreateToken),
}

impl Transaction {
    /// Canonical bincode-2 encoding, shared by hashing and signing.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails, which would be a programming error since
    /// every field is plain serializable data.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(self, cfg)
            .expect("Transaction should always be serializable with bincode 2 + serde")
    }

    pub fn tx_hash(&self) -> TxHash {
        TxHash(Hash256::compute(&self.canonical_bytes()))
    }

    /// Bytes covered by the signature: the canonical encoding with the
    /// signature field emptied.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        if let Some(sig) = unsigned.signature_mut() {
            *sig = Signature::default();
        }
        unsigned.canonical_bytes()
    }

    /// The signature slot, if this kind carries one.
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Transaction::Order(o) => Some(&o.signature),
            Transaction::Transfer(t) => Some(&t.signature),
            Transaction::CancelOrder(c) => Some(&c.signature),
            Transaction::CreateToken(c) => Some(&c.signature),
            Transaction::ClaimFunds(_) => None,
        }
    }

    pub fn signature_mut(&mut self) -> Option<&mut Signature> {
        match self {
            Transaction::Order(o) => Some(&mut o.signature),
            Transaction::Transfer(t) => Some(&mut t.signature),
            Transaction::CancelOrder(c) => Some(&mut c.signature),
            Transaction::CreateToken(c) => Some(&mut c.signature),
            Transaction::ClaimFunds(_) => None,
        }
    }

    /// Address whose key must have produced the signature, when it can be
    /// known from the transaction alone.
    ///
    /// `CancelOrder` returns `None`: its signer is the seller of the
    /// resting order, which only the order book knows.
    pub fn static_signer(&self) -> Option<&Address> {
        match self {
            Transaction::Order(o) => Some(&o.seller_address),
            Transaction::Transfer(t) => Some(&t.from_address),
            Transaction::CreateToken(c) => Some(&c.owner_address),
            Transaction::CancelOrder(_) | Transaction::ClaimFunds(_) => None,
        }
    }

    /// Short kind label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::Order(_) => "ORDER",
            Transaction::Transfer(_) => "TRANSFER",
            Transaction::CancelOrder(_) => "CANCEL_ORDER",
            Transaction::ClaimFunds(_) => "CLAIM_FUNDS",
            Transaction::CreateToken(_) => "CREATE_TOKEN",
        }
    }
}
