//! Block validity predicates used by consensus.

use crate::types::Block;

use super::error::ValidationError;

/// Pluggable validity predicate for blocks.
///
/// Implementations should be deterministic and side-effect free. They see
/// a block in isolation; checks that need ledger state happen when the
/// block's transactions are applied.
pub trait BlockValidator: Send + Sync {
    fn validate(&self, block: &Block) -> Result<(), ValidationError>;
}

/// A validator that composes two other validators.
///
/// `CombinedValidator { first, second }` runs `first.validate` and then
/// `second.validate`, failing fast on the first error.
pub struct CombinedValidator<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> CombinedValidator<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> BlockValidator for CombinedValidator<A, B>
where
    A: BlockValidator,
    B: BlockValidator,
{
    fn validate(&self, block: &Block) -> Result<(), ValidationError> {
        self.first.validate(block)?;
        self.second.validate(block)?;
        Ok(())
    }
}
