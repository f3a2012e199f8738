use std::collections::BTreeMap;

use serde::Serialize;

use super::error::TxError;
use crate::types::{Address, TokenInfo};

/// A registered token and the address its supply was minted to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TokenRecord {
    pub info: TokenInfo,
    pub owner: Address,
}

/// Token symbols known to one ledger.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TokenRegistry {
    tokens: BTreeMap<String, TokenRecord>,
}

impl TokenRegistry {
    pub fn contains(&self, symbol: &str) -> bool {
        self.tokens.contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&TokenRecord> {
        self.tokens.get(symbol)
    }

    pub fn require(&self, symbol: &str) -> Result<&TokenRecord, TxError> {
        self.get(symbol)
            .ok_or_else(|| TxError::UnknownSymbol(symbol.to_string()))
    }

    pub fn check_new(&self, info: &TokenInfo) -> Result<(), TxError> {
        if info.symbol.is_empty() {
            return Err(TxError::InvalidToken("empty symbol"));
        }
        if info.supply == 0 {
            return Err(TxError::InvalidAmount);
        }
        if self.contains(&info.symbol) {
            return Err(TxError::DuplicateSymbol(info.symbol.clone()));
        }
        Ok(())
    }

    pub fn register(&mut self, info: TokenInfo, owner: Address) -> Result<(), TxError> {
        self.check_new(&info)?;
        self.tokens
            .insert(info.symbol.clone(), TokenRecord { info, owner });
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenRecord> {
        self.tokens.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(symbol: &str, supply: u64) -> TokenInfo {
        TokenInfo {
            symbol: symbol.to_string(),
            supply,
            decimals: 2,
        }
    }

    #[test]
    fn register_then_duplicate() {
        let mut tokens = TokenRegistry::default();
        tokens
            .register(info("FOO", 100), Address::from("A"))
            .expect("register");
        assert_eq!(tokens.require("FOO").map(|t| t.info.supply), Ok(100));

        assert_eq!(
            tokens.register(info("FOO", 5), Address::from("B")),
            Err(TxError::DuplicateSymbol("FOO".to_string()))
        );
        assert_eq!(tokens.get("FOO").map(|t| t.owner.as_str()), Some("A"));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let tokens = TokenRegistry::default();
        assert!(matches!(tokens.check_new(&info("", 1)), Err(TxError::InvalidToken(_))));
        assert_eq!(tokens.check_new(&info("FOO", 0)), Err(TxError::InvalidAmount));
        assert_eq!(
            tokens.require("BAR").map(|_| ()),
            Err(TxError::UnknownSymbol("BAR".to_string()))
        );
    }
}
