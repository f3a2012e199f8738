//! Limit order matching.
//!
//! Every pair of symbols trades on one book. The pair's `base` is the
//! lexicographically smaller symbol and prices are quoted in units of the
//! larger one (`quote`) per base unit:
//!
//! - an order selling `base` is an ask at `buy_amount / sell_amount`,
//! - an order selling `quote` is a bid at `sell_amount / buy_amount`.
//!
//! Books are ordered by price, then arrival. A new order is inserted and
//! matched while the best bid is at or above the best ask; each execution
//! happens at the price of the order that arrived first.

pub mod book;
pub mod engine;
pub mod price;

pub use book::{OrderBook, Pair, RestingOrder, Side};
pub use engine::{Fill, MatchOutcome, MatchingEngine, Settlement, SettlementKind};
pub use price::Price;
