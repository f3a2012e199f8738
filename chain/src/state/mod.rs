//! Ledger state derived from a chain's blocks.
//!
//! A [`ConsensusState`] is never persisted. It is rebuilt by replaying a
//! chain from genesis, and the same sequence of blocks always produces
//! an equal state. Transactions are applied atomically: a rejected
//! transaction leaves the state untouched.
//!
//! Funds of a symbol live in one of three places: an address's spendable
//! balance, an order's escrow, or an address's owed balance (settled order
//! proceeds awaiting `ClaimFunds`). Apart from `CreateToken` minting, every
//! transaction only moves funds between those places.

mod error;
mod ledger;
mod tokens;

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, error};

pub use self::error::{ReplayError, TxError};
pub use self::ledger::AccountLedger;
pub use self::tokens::{TokenRecord, TokenRegistry};

use crate::consensus::{Blockchain, ChainStore};
use crate::matching::{Fill, MatchingEngine, RestingOrder};
use crate::types::{
    Address, Block, BlockHash, CancelOrder, ChainName, ClaimFunds, CreateToken, Order,
    Transaction, Transfer, TxHash,
};
use crate::wallet::verify_signature;

/// Whether [`ConsensusState::apply`] checks signatures.
///
/// Incoming transactions and peer blocks are verified; blocks already
/// recorded in the local chain were verified when they were appended and
/// are trusted during replay.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignaturePolicy {
    Verify,
    Trust,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConsensusState {
    ledger: AccountLedger,
    tokens: TokenRegistry,
    matching: MatchingEngine,
    applied: BTreeSet<TxHash>,
    tip: Option<BlockHash>,
    height: Option<u64>,
}

impl ConsensusState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the state of `chain` from its genesis block.
    pub fn replay<S: ChainStore>(chain: &Blockchain<S>) -> Result<Self, ReplayError> {
        let blocks = chain.blocks_from_genesis()?;
        Self::replay_blocks(chain.name(), &blocks)
    }

    /// Folds `blocks`, oldest first, into a fresh state.
    pub fn replay_blocks(chain: ChainName, blocks: &[Block]) -> Result<Self, ReplayError> {
        let mut state = Self::new();
        for (height, block) in blocks.iter().enumerate() {
            let height = height as u64;
            if let Err((index, source)) = state.apply_block(block, SignaturePolicy::Trust) {
                error!(
                    %chain,
                    height,
                    index,
                    block = %block.hash,
                    error = %source,
                    "recorded block does not replay"
                );
                return Err(ReplayError::ConsensusFault {
                    chain,
                    height,
                    index,
                    source,
                });
            }
        }
        Ok(state)
    }

    /// Applies every transaction of `block` in order and advances the tip.
    ///
    /// On error the index of the failing transaction is returned and the
    /// transactions before it remain applied, so callers apply blocks to
    /// a copy they can discard.
    pub fn apply_block(
        &mut self,
        block: &Block,
        policy: SignaturePolicy,
    ) -> Result<(), (usize, TxError)> {
        for (index, tx) in block.data.iter().enumerate() {
            self.apply(tx, policy).map_err(|e| (index, e))?;
        }
        self.tip = Some(block.hash);
        self.height = Some(self.height.map_or(0, |h| h + 1));
        Ok(())
    }

    /// Checks that `tx` would apply, without changing anything.
    pub fn validate(&self, tx: &Transaction, policy: SignaturePolicy) -> Result<(), TxError> {
        let hash = tx.tx_hash();
        if self.applied.contains(&hash) {
            return Err(TxError::DuplicateTransaction(hash));
        }

        match tx {
            Transaction::CreateToken(c) => self.tokens.check_new(&c.token_info)?,
            Transaction::Transfer(t) => self.check_transfer(t)?,
            Transaction::ClaimFunds(c) => {
                self.tokens.require(&c.symbol)?;
                self.ledger.check_claim(&c.address, &c.symbol, c.amount)?;
            }
            Transaction::Order(o) => self.check_order(o)?,
            Transaction::CancelOrder(c) => {
                self.cancel_target(c)?;
            }
        }

        if policy == SignaturePolicy::Verify {
            self.check_signature(tx)?;
        }
        Ok(())
    }

    /// Validates and applies `tx`. Returns the fills an order produced.
    pub fn apply(&mut self, tx: &Transaction, policy: SignaturePolicy) -> Result<Vec<Fill>, TxError> {
        self.validate(tx, policy)?;

        let fills = match tx {
            Transaction::CreateToken(c) => {
                self.apply_create_token(c)?;
                Vec::new()
            }
            Transaction::Transfer(t) => {
                self.ledger.debit(&t.from_address, &t.symbol, t.amount)?;
                self.ledger.credit(&t.to_address, &t.symbol, t.amount)?;
                Vec::new()
            }
            Transaction::ClaimFunds(c) => {
                self.ledger.claim(&c.address, &c.symbol, c.amount)?;
                Vec::new()
            }
            Transaction::Order(o) => self.apply_order(o)?,
            Transaction::CancelOrder(c) => {
                self.apply_cancel(c)?;
                Vec::new()
            }
        };

        self.applied.insert(tx.tx_hash());
        debug!(kind = tx.kind(), fills = fills.len(), "applied transaction");
        Ok(fills)
    }

    fn check_transfer(&self, t: &Transfer) -> Result<(), TxError> {
        if t.amount == 0 {
            return Err(TxError::InvalidAmount);
        }
        self.tokens.require(&t.symbol)?;
        self.ledger.check_debit(&t.from_address, &t.symbol, t.amount)
    }

    fn check_order(&self, o: &Order) -> Result<(), TxError> {
        self.matching.check_order(o)?;
        self.tokens.require(&o.sell_symbol)?;
        self.tokens.require(&o.buy_symbol)?;
        self.ledger
            .check_debit(&o.seller_address, &o.sell_symbol, o.sell_amount)
    }

    fn cancel_target(&self, c: &CancelOrder) -> Result<&RestingOrder, TxError> {
        match self.matching.resting(c.order_id) {
            Some(order) if order.sell_symbol == c.symbol => Ok(order),
            _ => Err(TxError::OrderNotFound(c.order_id)),
        }
    }

    fn check_signature(&self, tx: &Transaction) -> Result<(), TxError> {
        let signer = match tx {
            Transaction::CancelOrder(c) => &self.cancel_target(c)?.seller_address,
            Transaction::ClaimFunds(_) => return Ok(()),
            other => other.static_signer().ok_or(TxError::InvalidSignature)?,
        };
        let signature = tx.signature().ok_or(TxError::InvalidSignature)?;
        if verify_signature(signer, &tx.signing_bytes(), signature) {
            Ok(())
        } else {
            Err(TxError::InvalidSignature)
        }
    }

    fn apply_create_token(&mut self, c: &CreateToken) -> Result<(), TxError> {
        self.tokens
            .register(c.token_info.clone(), c.owner_address.clone())?;
        self.ledger
            .credit(&c.owner_address, &c.token_info.symbol, c.token_info.supply)
    }

    fn apply_order(&mut self, o: &Order) -> Result<Vec<Fill>, TxError> {
        let outcome = self.matching.submit_order(o)?;
        self.ledger
            .debit(&o.seller_address, &o.sell_symbol, o.sell_amount)?;
        for s in &outcome.settlements {
            self.ledger.credit_owed(&s.address, &s.symbol, s.amount)?;
        }
        Ok(outcome.fills)
    }

    fn apply_cancel(&mut self, c: &CancelOrder) -> Result<(), TxError> {
        let order = self.matching.cancel_order(&c.symbol, c.order_id)?;
        self.ledger
            .credit(&order.seller_address, &order.sell_symbol, order.escrow)
    }

    pub fn tip(&self) -> Option<BlockHash> {
        self.tip
    }

    pub fn height(&self) -> Option<u64> {
        self.height
    }

    pub fn balance(&self, address: &Address, symbol: &str) -> u64 {
        self.ledger.balance(address, symbol)
    }

    pub fn owed(&self, address: &Address, symbol: &str) -> u64 {
        self.ledger.owed(address, symbol)
    }

    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    pub fn matching(&self) -> &MatchingEngine {
        &self.matching
    }

    pub fn is_applied(&self, hash: &TxHash) -> bool {
        self.applied.contains(hash)
    }

    /// Balances, owed funds and escrow of `symbol` summed over the whole
    /// state. Equals the minted supply at all times.
    pub fn accounted_supply(&self, symbol: &str) -> u128 {
        self.ledger.total(symbol) + self.matching.escrow_total(symbol)
    }

    /// `ClaimFunds` transactions that would settle every owed balance.
    /// `next_id` supplies the claim ids.
    pub fn pending_claims(&self, mut next_id: impl FnMut() -> u64) -> Vec<Transaction> {
        self.ledger
            .owed_entries()
            .map(|(address, symbol, amount)| {
                Transaction::ClaimFunds(ClaimFunds {
                    id: next_id(),
                    symbol: symbol.to_string(),
                    address: address.clone(),
                    amount,
                })
            })
            .collect()
    }

    pub fn snapshot(&self, chain: ChainName) -> StateSnapshot {
        let entry = |(address, symbol, amount): (&Address, &str, u64)| BalanceEntry {
            address: address.clone(),
            symbol: symbol.to_string(),
            amount,
        };
        StateSnapshot {
            chain,
            tip: self.tip.map(|h| h.to_string()),
            height: self.height,
            tokens: self.tokens.iter().cloned().collect(),
            balances: self.ledger.balances().map(entry).collect(),
            owed: self.ledger.owed_entries().map(entry).collect(),
            orders: self
                .matching
                .books()
                .flat_map(|(pair, book)| {
                    book.bids().chain(book.asks()).map(move |order| OrderEntry {
                        pair: pair.to_string(),
                        order: order.clone(),
                    })
                })
                .collect(),
        }
    }
}

/// JSON view of a [`ConsensusState`].
#[derive(Clone, Debug, Serialize)]
pub struct StateSnapshot {
    pub chain: ChainName,
    pub tip: Option<String>,
    pub height: Option<u64>,
    pub tokens: Vec<TokenRecord>,
    pub balances: Vec<BalanceEntry>,
    pub owed: Vec<BalanceEntry>,
    pub orders: Vec<OrderEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BalanceEntry {
    pub address: Address,
    pub symbol: String,
    pub amount: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderEntry {
    pub pair: String,
    pub order: RestingOrder,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Signature, TokenInfo};
    use crate::wallet::KeyPair;

    fn create(symbol: &str, supply: u64, owner: &KeyPair) -> Transaction {
        let mut tx = Transaction::CreateToken(CreateToken {
            token_info: TokenInfo {
                symbol: symbol.to_string(),
                supply,
                decimals: 0,
            },
            owner_address: owner.address(),
            signature: Signature::default(),
        });
        owner.sign_transaction(&mut tx);
        tx
    }

    fn transfer(id: u64, symbol: &str, amount: u64, from: &KeyPair, to: &Address) -> Transaction {
        let mut tx = Transaction::Transfer(Transfer {
            id,
            symbol: symbol.to_string(),
            amount,
            from_address: from.address(),
            to_address: to.clone(),
            signature: Signature::default(),
        });
        from.sign_transaction(&mut tx);
        tx
    }

    fn order(id: u64, sell: (&str, u64), buy: (&str, u64), seller: &KeyPair) -> Transaction {
        let mut tx = Transaction::Order(Order {
            id,
            sell_symbol: sell.0.to_string(),
            buy_symbol: buy.0.to_string(),
            sell_amount: sell.1,
            buy_amount: buy.1,
            seller_address: seller.address(),
            signature: Signature::default(),
        });
        seller.sign_transaction(&mut tx);
        tx
    }

    fn cancel(symbol: &str, order_id: u64, signer: &KeyPair) -> Transaction {
        let mut tx = Transaction::CancelOrder(CancelOrder {
            symbol: symbol.to_string(),
            order_id,
            signature: Signature::default(),
        });
        signer.sign_transaction(&mut tx);
        tx
    }

    const V: SignaturePolicy = SignaturePolicy::Verify;

    #[test]
    fn create_then_transfer() {
        let a = KeyPair::generate();
        let b = Address::from("B");
        let mut state = ConsensusState::new();

        state.apply(&create("FOO", 1000, &a), V).expect("create");
        state.apply(&transfer(1, "FOO", 100, &a, &b), V).expect("transfer");

        assert_eq!(state.balance(&a.address(), "FOO"), 900);
        assert_eq!(state.balance(&b, "FOO"), 100);
        assert_eq!(state.accounted_supply("FOO"), 1000);
    }

    #[test]
    fn rejected_transactions_leave_state_unchanged() {
        let a = KeyPair::generate();
        let mut state = ConsensusState::new();
        state.apply(&create("FOO", 50, &a), V).expect("create");
        let before = state.clone();

        let too_much = transfer(1, "FOO", 51, &a, &Address::from("B"));
        assert!(matches!(
            state.apply(&too_much, V),
            Err(TxError::InsufficientBalance { available: 50, required: 51, .. })
        ));
        assert_eq!(
            state.apply(&create("FOO", 1, &a), V),
            Err(TxError::DuplicateSymbol("FOO".to_string()))
        );
        assert_eq!(
            state.apply(&transfer(2, "BAR", 1, &a, &Address::from("B")), V),
            Err(TxError::UnknownSymbol("BAR".to_string()))
        );
        assert_eq!(state, before);
    }

    #[test]
    fn signatures_are_checked_when_verifying() {
        let a = KeyPair::generate();
        let mallory = KeyPair::generate();
        let mut state = ConsensusState::new();
        state.apply(&create("FOO", 50, &a), V).expect("create");

        let mut forged = transfer(1, "FOO", 10, &a, &mallory.address());
        mallory.sign_transaction(&mut forged);
        assert_eq!(state.apply(&forged, V), Err(TxError::InvalidSignature));

        // Replay of recorded blocks does not re-verify.
        assert!(state.apply(&forged, SignaturePolicy::Trust).is_ok());
    }

    #[test]
    fn identical_transaction_applies_once() {
        let a = KeyPair::generate();
        let mut state = ConsensusState::new();
        state.apply(&create("FOO", 50, &a), V).expect("create");

        let tx = transfer(1, "FOO", 10, &a, &Address::from("B"));
        state.apply(&tx, V).expect("first");
        assert_eq!(state.apply(&tx, V), Err(TxError::DuplicateTransaction(tx.tx_hash())));
        assert_eq!(state.balance(&a.address(), "FOO"), 40);
    }

    #[test]
    fn matched_orders_settle_through_claims() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut state = ConsensusState::new();
        state.apply(&create("BTC", 10, &alice), V).expect("btc");
        state.apply(&create("USD", 1000, &bob), V).expect("usd");

        state
            .apply(&order(1, ("BTC", 2), ("USD", 16), &alice), V)
            .expect("ask");
        assert_eq!(state.balance(&alice.address(), "BTC"), 8);
        assert_eq!(state.accounted_supply("BTC"), 10);

        let fills = state
            .apply(&order(2, ("USD", 20), ("BTC", 2), &bob), V)
            .expect("bid");
        assert_eq!(fills.len(), 1);
        assert_eq!(state.owed(&alice.address(), "USD"), 16);
        assert_eq!(state.owed(&bob.address(), "BTC"), 2);
        assert_eq!(state.owed(&bob.address(), "USD"), 4);

        let mut ids = 100..;
        let claims = state.pending_claims(|| ids.next().unwrap_or(0));
        assert_eq!(claims.len(), 3);
        for claim in &claims {
            state.apply(claim, V).expect("claim");
        }

        assert_eq!(state.balance(&alice.address(), "USD"), 16);
        assert_eq!(state.balance(&bob.address(), "BTC"), 2);
        assert_eq!(state.balance(&bob.address(), "USD"), 984);
        assert_eq!(state.accounted_supply("BTC"), 10);
        assert_eq!(state.accounted_supply("USD"), 1000);
        assert!(state.pending_claims(|| 0).is_empty());
    }

    #[test]
    fn claim_without_owed_funds_is_rejected() {
        let a = KeyPair::generate();
        let mut state = ConsensusState::new();
        state.apply(&create("FOO", 5, &a), V).expect("create");

        let claim = Transaction::ClaimFunds(ClaimFunds {
            id: 1,
            symbol: "FOO".to_string(),
            address: a.address(),
            amount: 1,
        });
        assert!(matches!(state.apply(&claim, V), Err(TxError::NothingToClaim { .. })));
    }

    #[test]
    fn cancel_requires_seller_and_refunds_escrow() {
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        let mut state = ConsensusState::new();
        state.apply(&create("BTC", 10, &alice), V).expect("btc");
        state.apply(&create("USD", 10, &mallory), V).expect("usd");
        state
            .apply(&order(7, ("BTC", 4), ("USD", 40), &alice), V)
            .expect("order");
        assert_eq!(state.balance(&alice.address(), "BTC"), 6);

        assert_eq!(state.apply(&cancel("BTC", 7, &mallory), V), Err(TxError::InvalidSignature));
        assert_eq!(
            state.apply(&cancel("BTC", 8, &alice), V),
            Err(TxError::OrderNotFound(8))
        );

        state.apply(&cancel("BTC", 7, &alice), V).expect("cancel");
        assert_eq!(state.balance(&alice.address(), "BTC"), 10);
        assert!(state.matching().is_empty());
    }

    #[test]
    fn order_needs_funds_and_known_symbols() {
        let alice = KeyPair::generate();
        let mut state = ConsensusState::new();
        state.apply(&create("BTC", 1, &alice), V).expect("btc");

        assert_eq!(
            state.apply(&order(1, ("BTC", 1), ("USD", 5), &alice), V),
            Err(TxError::UnknownSymbol("USD".to_string()))
        );
        state.apply(&create("USD", 1, &alice), V).expect("usd");
        assert!(matches!(
            state.apply(&order(1, ("BTC", 2), ("USD", 5), &alice), V),
            Err(TxError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn snapshot_lists_balances_and_orders() {
        let alice = KeyPair::generate();
        let mut state = ConsensusState::new();
        state.apply(&create("BTC", 10, &alice), V).expect("btc");
        state.apply(&create("USD", 10, &alice), V).expect("usd");
        state
            .apply(&order(1, ("BTC", 1), ("USD", 5), &alice), V)
            .expect("order");

        let snap = state.snapshot(ChainName::Match);
        assert_eq!(snap.tokens.len(), 2);
        assert_eq!(snap.balances.len(), 2);
        assert_eq!(snap.orders.len(), 1);
        assert_eq!(snap.orders[0].pair, "BTC/USD");

        let json = serde_json::to_value(&snap).expect("json");
        assert_eq!(json["chain"], "MATCH_CHAIN");
    }
}
