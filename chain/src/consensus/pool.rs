//! Pending transaction pools.

use std::collections::{HashSet, VecDeque};

use crate::types::{Transaction, TxHash};

/// Abstract transaction pool interface.
///
/// Consensus does not care how transactions are stored or gossiped; it only
/// needs a way to ask for a batch of candidates and to drop the ones that
/// were recorded or turned out invalid.
pub trait TxPool {
    /// Returns candidates for the next block, oldest first, without
    /// removing them.
    ///
    /// `max_txs` and `max_bytes` bound the batch; the byte bound counts
    /// each transaction's canonical encoding.
    fn select_for_block(&self, max_txs: usize, max_bytes: usize) -> Vec<Transaction>;

    /// Drops every pooled transaction whose hash is in `hashes`.
    fn remove(&mut self, hashes: &HashSet<TxHash>);
}

/// FIFO pool deduplicated by transaction hash.
#[derive(Debug, Default)]
pub struct PendingPool {
    queue: VecDeque<(TxHash, Transaction)>,
    hashes: HashSet<TxHash>,
}

impl PendingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `tx`; returns `false` if an identical transaction is already
    /// pending.
    pub fn insert(&mut self, tx: Transaction) -> bool {
        let hash = tx.tx_hash();
        if !self.hashes.insert(hash) {
            return false;
        }
        self.queue.push_back((hash, tx));
        true
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.hashes.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.queue.iter().map(|(_, tx)| tx)
    }
}

impl TxPool for PendingPool {
    fn select_for_block(&self, max_txs: usize, max_bytes: usize) -> Vec<Transaction> {
        let mut bytes = 0usize;
        let mut selected = Vec::new();
        for (_, tx) in &self.queue {
            if selected.len() >= max_txs {
                break;
            }
            let size = tx.canonical_bytes().len();
            if bytes + size > max_bytes {
                break;
            }
            bytes += size;
            selected.push(tx.clone());
        }
        selected
    }

    fn remove(&mut self, hashes: &HashSet<TxHash>) {
        if hashes.is_empty() {
            return;
        }
        self.queue.retain(|(hash, _)| !hashes.contains(hash));
        self.hashes.retain(|hash| !hashes.contains(hash));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, ClaimFunds};

    fn claim(id: u64) -> Transaction {
        Transaction::ClaimFunds(ClaimFunds {
            id,
            symbol: "FOO".to_string(),
            address: Address::from("A"),
            amount: 1,
        })
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut pool = PendingPool::new();
        assert!(pool.insert(claim(1)));
        assert!(!pool.insert(claim(1)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn selection_is_fifo_and_bounded() {
        let mut pool = PendingPool::new();
        for id in 1..=5 {
            pool.insert(claim(id));
        }

        assert_eq!(pool.select_for_block(3, usize::MAX), vec![claim(1), claim(2), claim(3)]);

        let one = claim(1).canonical_bytes().len();
        assert_eq!(pool.select_for_block(10, one * 2).len(), 2);
        assert_eq!(pool.len(), 5, "selection does not drain");
    }

    #[test]
    fn remove_drops_by_hash() {
        let mut pool = PendingPool::new();
        for id in 1..=3 {
            pool.insert(claim(id));
        }
        let gone: HashSet<TxHash> = [claim(2).tx_hash()].into_iter().collect();
        pool.remove(&gone);

        assert_eq!(pool.iter().cloned().collect::<Vec<_>>(), vec![claim(1), claim(3)]);
        assert!(!pool.contains(&claim(2).tx_hash()));
        assert!(pool.insert(claim(2)), "removed transaction can be queued again");
    }
}
