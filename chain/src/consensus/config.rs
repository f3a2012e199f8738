use std::time::Duration;

/// Parameters shared by both ledgers.
///
/// `difficulty_bits` is part of the protocol: nodes that disagree on it
/// reject each other's blocks. The rest only shapes what this node mines.
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Minimum number of leading zero bits a block hash must have.
    pub difficulty_bits: u32,
    /// Pause between mining rounds when a chain has nothing pending.
    pub block_time_secs: u64,
    /// Soft limit on the number of transactions per block.
    pub max_block_txs: usize,
    /// Soft limit on the total serialized size of a block, in bytes.
    pub max_block_size_bytes: usize,
    /// Seal blocks with no transactions instead of waiting for one.
    pub allow_empty_blocks: bool,
}

impl ConsensusConfig {
    /// How long an idle miner waits before looking at the pool again;
    /// never less than a second.
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.block_time_secs.max(1))
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            difficulty_bits: 16,
            block_time_secs: 5,
            max_block_txs: 10_000,
            max_block_size_bytes: 1_000_000,
            allow_empty_blocks: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_interval_is_at_least_a_second() {
        let cfg = ConsensusConfig {
            block_time_secs: 0,
            ..ConsensusConfig::default()
        };
        assert_eq!(cfg.idle_interval(), Duration::from_secs(1));
        assert_eq!(ConsensusConfig::default().idle_interval(), Duration::from_secs(5));
    }
}
