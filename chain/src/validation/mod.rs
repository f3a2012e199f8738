//! Block validity predicates for the chain.
//!
//! This module implements concrete block validators that plug into the
//! consensus layer via [`crate::consensus::validator::BlockValidator`].
//!
//! It currently provides:
//!
//! - [`base::BaseValidity`]: cheap structural and size checks.
//! - [`pow::PowValidity`]: digest and difficulty checks.

pub mod base;
pub mod pow;

pub use base::BaseValidity;
pub use pow::PowValidity;
