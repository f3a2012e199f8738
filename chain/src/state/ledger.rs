//! Per-address balances.
//!
//! Two books are kept per `(address, symbol)`: the spendable balance and
//! the owed balance, i.e. order proceeds and refunds waiting for a
//! `ClaimFunds`. Zero entries are removed so that equal states compare
//! equal regardless of history.

use std::collections::BTreeMap;

use super::error::TxError;
use crate::types::Address;

type Key = (Address, String);

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AccountLedger {
    balances: BTreeMap<Key, u64>,
    owed: BTreeMap<Key, u64>,
}

fn key(address: &Address, symbol: &str) -> Key {
    (address.clone(), symbol.to_string())
}

fn add(map: &mut BTreeMap<Key, u64>, address: &Address, symbol: &str, amount: u64) -> Result<(), TxError> {
    if amount == 0 {
        return Ok(());
    }
    let entry = map.entry(key(address, symbol)).or_insert(0);
    *entry = entry.checked_add(amount).ok_or(TxError::Overflow)?;
    Ok(())
}

fn subtract(map: &mut BTreeMap<Key, u64>, address: &Address, symbol: &str, amount: u64) -> Option<()> {
    let k = key(address, symbol);
    let current = map.get(&k).copied().unwrap_or(0);
    let left = current.checked_sub(amount)?;
    if left == 0 {
        map.remove(&k);
    } else {
        map.insert(k, left);
    }
    Some(())
}

impl AccountLedger {
    pub fn balance(&self, address: &Address, symbol: &str) -> u64 {
        self.balances.get(&key(address, symbol)).copied().unwrap_or(0)
    }

    pub fn owed(&self, address: &Address, symbol: &str) -> u64 {
        self.owed.get(&key(address, symbol)).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, address: &Address, symbol: &str, amount: u64) -> Result<(), TxError> {
        add(&mut self.balances, address, symbol, amount)
    }

    pub fn debit(&mut self, address: &Address, symbol: &str, amount: u64) -> Result<(), TxError> {
        subtract(&mut self.balances, address, symbol, amount).ok_or_else(|| {
            TxError::InsufficientBalance {
                address: address.clone(),
                symbol: symbol.to_string(),
                available: self.balance(address, symbol),
                required: amount,
            }
        })
    }

    pub fn credit_owed(&mut self, address: &Address, symbol: &str, amount: u64) -> Result<(), TxError> {
        add(&mut self.owed, address, symbol, amount)
    }

    /// Moves `amount` from owed to spendable.
    pub fn claim(&mut self, address: &Address, symbol: &str, amount: u64) -> Result<(), TxError> {
        self.check_claim(address, symbol, amount)?;
        self.credit(address, symbol, amount)?;
        subtract(&mut self.owed, address, symbol, amount).ok_or(TxError::Overflow)
    }

    pub fn check_claim(&self, address: &Address, symbol: &str, amount: u64) -> Result<(), TxError> {
        let owed = self.owed(address, symbol);
        if amount == 0 || owed < amount {
            return Err(TxError::NothingToClaim {
                address: address.clone(),
                symbol: symbol.to_string(),
                owed,
                requested: amount,
            });
        }
        Ok(())
    }

    pub fn check_debit(&self, address: &Address, symbol: &str, amount: u64) -> Result<(), TxError> {
        let available = self.balance(address, symbol);
        if available < amount {
            return Err(TxError::InsufficientBalance {
                address: address.clone(),
                symbol: symbol.to_string(),
                available,
                required: amount,
            });
        }
        Ok(())
    }

    /// Non-zero spendable balances as `(address, symbol, amount)`.
    pub fn balances(&self) -> impl Iterator<Item = (&Address, &str, u64)> {
        self.balances.iter().map(|((a, s), v)| (a, s.as_str(), *v))
    }

    /// Non-zero owed balances as `(address, symbol, amount)`.
    pub fn owed_entries(&self) -> impl Iterator<Item = (&Address, &str, u64)> {
        self.owed.iter().map(|((a, s), v)| (a, s.as_str(), *v))
    }

    /// Spendable plus owed amount of `symbol` over all addresses.
    pub fn total(&self, symbol: &str) -> u128 {
        self.balances
            .iter()
            .chain(self.owed.iter())
            .filter(|((_, s), _)| s == symbol)
            .map(|(_, v)| *v as u128)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_and_debit() {
        let mut ledger = AccountLedger::default();
        let a = Address::from("A");
        ledger.credit(&a, "FOO", 10).expect("credit");
        ledger.debit(&a, "FOO", 4).expect("debit");
        assert_eq!(ledger.balance(&a, "FOO"), 6);
        assert_eq!(ledger.balance(&a, "BAR"), 0);
    }

    #[test]
    fn overdraft_is_rejected_without_change() {
        let mut ledger = AccountLedger::default();
        let a = Address::from("A");
        ledger.credit(&a, "FOO", 3).expect("credit");

        let err = ledger.debit(&a, "FOO", 4).unwrap_err();
        assert_eq!(
            err,
            TxError::InsufficientBalance {
                address: a.clone(),
                symbol: "FOO".to_string(),
                available: 3,
                required: 4,
            }
        );
        assert_eq!(ledger.balance(&a, "FOO"), 3);
    }

    #[test]
    fn zero_entries_are_dropped() {
        let mut a_then_b = AccountLedger::default();
        let a = Address::from("A");
        a_then_b.credit(&a, "FOO", 5).expect("credit");
        a_then_b.debit(&a, "FOO", 5).expect("debit");

        assert_eq!(a_then_b, AccountLedger::default());
        assert_eq!(a_then_b.balances().count(), 0);
    }

    #[test]
    fn claim_moves_owed_to_balance() {
        let mut ledger = AccountLedger::default();
        let a = Address::from("A");
        ledger.credit_owed(&a, "FOO", 7).expect("owed");
        assert_eq!(ledger.total("FOO"), 7);

        assert!(matches!(
            ledger.claim(&a, "FOO", 8),
            Err(TxError::NothingToClaim { owed: 7, .. })
        ));
        ledger.claim(&a, "FOO", 7).expect("claim");
        assert_eq!(ledger.balance(&a, "FOO"), 7);
        assert_eq!(ledger.owed(&a, "FOO"), 0);
        assert_eq!(ledger.total("FOO"), 7);
    }

    #[test]
    fn credit_overflow_is_an_error() {
        let mut ledger = AccountLedger::default();
        let a = Address::from("A");
        ledger.credit(&a, "FOO", u64::MAX).expect("credit");
        assert_eq!(ledger.credit(&a, "FOO", 1), Err(TxError::Overflow));
    }
}
