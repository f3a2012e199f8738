//! Exact rational prices.
//!
//! Prices come straight from the ratio of an order's two amounts, so they
//! are kept as `num / den` and compared by 128-bit cross multiplication.
//! No floating point or rounding is involved in ordering the book.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Quote units per base unit.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Price {
    num: u64,
    den: u64,
}

impl Price {
    /// `num` quote units per `den` base units; `None` if either is zero.
    pub fn new(num: u64, den: u64) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        Some(Self { num, den })
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn den(&self) -> u64 {
        self.den
    }

    /// Quote for `base` units at this price, rounded up and saturated at
    /// `u64::MAX`.
    pub fn quote_ceil(&self, base: u64) -> u64 {
        let quote = (base as u128 * self.num as u128).div_ceil(self.den as u128);
        u64::try_from(quote).unwrap_or(u64::MAX)
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as u128 * other.den as u128;
        let rhs = other.num as u128 * self.den as u128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality must agree with `Ord`: 2/4 and 1/2 are the same price.
impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Price {}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
