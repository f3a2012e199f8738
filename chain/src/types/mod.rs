//! Core domain types used by the chain
//!
//! This module defines strongly-typed hashes, addresses, signatures and
//! the two ledger names shared across the implementation. The goal is to
//! avoid "naked" byte buffers and strings in public APIs and instead use
//! domain-specific newtypes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod block;
pub mod tx;

pub use block::{Block, BlockHash, Header};
pub use tx::{
    CancelOrder, ClaimFunds, CreateToken, Order, TokenInfo, Transaction, Transfer, TxHash,
};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Strongly-typed 256-bit hash wrapper (BLAKE3-256).
///
/// This type backs block hashes and transaction hashes. It is always
/// exactly [`HASH_LEN`] bytes long.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the BLAKE3-256 hash of `data`.
    ///
    /// The result is deterministic for a given byte slice and is suitable
    /// for use as an identifier or content hash, but it is **not**
    /// a password hash or KDF.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Number of leading zero bits, the quantity the difficulty target
    /// is expressed in.
    pub fn leading_zero_bits(&self) -> u32 {
        let mut bits = 0;
        for byte in self.0 {
            if byte == 0 {
                bits += 8;
            } else {
                bits += byte.leading_zeros();
                break;
            }
        }
        bits
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Hash256(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Account address.
///
/// For user accounts this is the hex encoding of an ed25519 verifying key,
/// which lets signatures be checked against the address alone. System
/// accounts (e.g. [`COINBASE_ADDRESS`]) are plain labels and can never
/// produce a valid signature.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Address(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issuer of the native token supply in the `NATIVE_CHAIN` genesis block.
pub const COINBASE_ADDRESS: &str = "COINBASE";

/// Detached ed25519 signature bytes.
///
/// An empty signature is valid to carry around (system-issued
/// transactions have none) but never verifies.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Name of one of the two co-located ledgers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChainName {
    /// Token issuance and transfers of the native currency.
    #[serde(rename = "NATIVE_CHAIN")]
    Native,
    /// User tokens and trading activity.
    #[serde(rename = "MATCH_CHAIN")]
    Match,
}

impl ChainName {
    pub const ALL: [ChainName; 2] = [ChainName::Native, ChainName::Match];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainName::Native => "NATIVE_CHAIN",
            ChainName::Match => "MATCH_CHAIN",
        }
    }

    /// Routes a submission's target symbol to the ledger that records it.
    ///
    /// A chain name selects that chain, the native symbol selects
    /// `NATIVE_CHAIN`, every other symbol lives on `MATCH_CHAIN`.
    pub fn for_target(target_symbol: &str, native_symbol: &str) -> ChainName {
        if let Ok(name) = target_symbol.parse::<ChainName>() {
            return name;
        }
        if target_symbol == native_symbol {
            ChainName::Native
        } else {
            ChainName::Match
        }
    }
}

impl fmt::Display for ChainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownChainName(pub String);

impl FromStr for ChainName {
    type Err = UnknownChainName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NATIVE_CHAIN" => Ok(ChainName::Native),
            "MATCH_CHAIN" => Ok(ChainName::Match),
            other => Err(UnknownChainName(other.to_string())),
        }
    }
}
