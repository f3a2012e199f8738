//! One price-time priority book per trading pair.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::price::Price;
use crate::types::Address;

/// Ordered symbol pair; `base` sorts before `quote`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    /// The pair two symbols trade on, independent of argument order.
    pub fn for_symbols(a: &str, b: &str) -> Self {
        let (base, quote) = if a <= b { (a, b) } else { (b, a) };
        Self {
            base: base.to_string(),
            quote: quote.to_string(),
        }
    }

    /// Side of an order selling `sell_symbol` on this pair.
    pub fn side_for(&self, sell_symbol: &str) -> Side {
        if sell_symbol == self.base {
            Side::Ask
        } else {
            Side::Bid
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buys base, pays quote.
    Bid,
    /// Sells base for quote.
    Ask,
}

/// An order resting on a book.
///
/// `remaining` is always in base units. `escrow` is what is still locked
/// from the seller, in units of `sell_symbol`: base for asks, quote for
/// bids.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub id: u64,
    pub seller_address: Address,
    pub sell_symbol: String,
    pub side: Side,
    pub price: Price,
    pub remaining: u64,
    pub escrow: u64,
    /// Base units traded so far.
    pub filled: u64,
    /// Quote received so far; only asks receive quote.
    pub proceeds: u64,
    /// Arrival order within the engine; lower wins ties.
    pub sequence: u64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OrderBook {
    bids: BTreeMap<(Reverse<Price>, u64), RestingOrder>,
    asks: BTreeMap<(Price, u64), RestingOrder>,
}

/// Position of a resting order inside its book.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BookKey {
    pub side: Side,
    pub price: Price,
    pub sequence: u64,
}

impl RestingOrder {
    pub fn key(&self) -> BookKey {
        BookKey {
            side: self.side,
            price: self.price,
            sequence: self.sequence,
        }
    }
}

impl OrderBook {
    pub fn insert(&mut self, order: RestingOrder) {
        match order.side {
            Side::Bid => {
                self.bids
                    .insert((Reverse(order.price), order.sequence), order);
            }
            Side::Ask => {
                self.asks.insert((order.price, order.sequence), order);
            }
        }
    }

    pub fn remove(&mut self, key: BookKey) -> Option<RestingOrder> {
        match key.side {
            Side::Bid => self.bids.remove(&(Reverse(key.price), key.sequence)),
            Side::Ask => self.asks.remove(&(key.price, key.sequence)),
        }
    }

    pub fn get(&self, key: BookKey) -> Option<&RestingOrder> {
        match key.side {
            Side::Bid => self.bids.get(&(Reverse(key.price), key.sequence)),
            Side::Ask => self.asks.get(&(key.price, key.sequence)),
        }
    }

    /// Removes and returns the best bid and best ask if they cross.
    pub fn pop_crossing(&mut self) -> Option<(RestingOrder, RestingOrder)> {
        let crossed = matches!(
            (self.best_bid(), self.best_ask()),
            (Some(bid), Some(ask)) if bid.price >= ask.price
        );
        if !crossed {
            return None;
        }
        let (_, bid) = self.bids.pop_first()?;
        let (_, ask) = self.asks.pop_first()?;
        Some((bid, ask))
    }

    /// Highest bid, earliest first among equal prices.
    pub fn best_bid(&self) -> Option<&RestingOrder> {
        self.bids.values().next()
    }

    /// Lowest ask, earliest first among equal prices.
    pub fn best_ask(&self) -> Option<&RestingOrder> {
        self.asks.values().next()
    }

    /// Bids in priority order.
    pub fn bids(&self) -> impl Iterator<Item = &RestingOrder> {
        self.bids.values()
    }

    /// Asks in priority order.
    pub fn asks(&self) -> impl Iterator<Item = &RestingOrder> {
        self.asks.values()
    }

    pub fn len(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
