//! Matching engine over all pair books.
//!
//! The engine only moves escrow: it never looks at balances. Callers
//! debit the seller's balance into escrow before submitting an order and
//! credit the returned [`Settlement`]s as owed funds afterwards.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::book::{BookKey, OrderBook, Pair, RestingOrder, Side};
use super::price::Price;
use crate::state::TxError;
use crate::types::{Address, Order};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementKind {
    /// Proceeds of a match.
    Fill,
    /// Unspent escrow of an order that left the book filled.
    Refund,
}

/// Funds released from escrow to an address.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Settlement {
    pub order_id: u64,
    pub address: Address,
    pub symbol: String,
    pub amount: u64,
    pub kind: SettlementKind,
}

/// One execution between a resting bid and a resting ask.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Fill {
    pub pair: Pair,
    /// The order that was on the book first. The quote is as close to its
    /// price as whole units allow.
    pub maker_id: u64,
    pub taker_id: u64,
    pub price: Price,
    pub base_amount: u64,
    pub quote_amount: u64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MatchOutcome {
    pub fills: Vec<Fill>,
    pub settlements: Vec<Settlement>,
    /// Whether the submitted order is still on the book.
    pub resting: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct IndexEntry {
    pair: Pair,
    key: BookKey,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MatchingEngine {
    books: BTreeMap<Pair, OrderBook>,
    index: BTreeMap<u64, IndexEntry>,
    next_sequence: u64,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that `order` can be submitted without changing anything.
    pub fn check_order(&self, order: &Order) -> Result<(), TxError> {
        if order.sell_amount == 0 || order.buy_amount == 0 {
            return Err(TxError::InvalidAmount);
        }
        if order.sell_symbol == order.buy_symbol {
            return Err(TxError::InvalidOrder("sell and buy symbols are equal"));
        }
        if self.index.contains_key(&order.id) {
            return Err(TxError::DuplicateOrder(order.id));
        }
        Ok(())
    }

    /// Places `order` on its pair's book and matches while the book is
    /// crossed.
    ///
    /// The full `sell_amount` is taken as escrow. Nothing changes when an
    /// error is returned.
    pub fn submit_order(&mut self, order: &Order) -> Result<MatchOutcome, TxError> {
        self.check_order(order)?;

        let pair = Pair::for_symbols(&order.sell_symbol, &order.buy_symbol);
        let side = pair.side_for(&order.sell_symbol);
        let (price, remaining) = match side {
            Side::Ask => (Price::new(order.buy_amount, order.sell_amount), order.sell_amount),
            Side::Bid => (Price::new(order.sell_amount, order.buy_amount), order.buy_amount),
        };
        let price = price.ok_or(TxError::InvalidAmount)?;

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let resting = RestingOrder {
            id: order.id,
            seller_address: order.seller_address.clone(),
            sell_symbol: order.sell_symbol.clone(),
            side,
            price,
            remaining,
            escrow: order.sell_amount,
            filled: 0,
            proceeds: 0,
            sequence,
        };
        self.index.insert(
            order.id,
            IndexEntry {
                pair: pair.clone(),
                key: resting.key(),
            },
        );

        let book = self.books.entry(pair.clone()).or_default();
        book.insert(resting);

        let mut outcome = MatchOutcome::default();
        match_book(&pair, book, &mut self.index, &mut outcome);
        outcome.resting = self.index.contains_key(&order.id);

        if book.is_empty() {
            self.books.remove(&pair);
        }

        debug!(
            order_id = order.id,
            %pair,
            fills = outcome.fills.len(),
            resting = outcome.resting,
            "order submitted"
        );
        Ok(outcome)
    }

    /// Removes the resting order `order_id` whose sell symbol is `symbol`.
    ///
    /// The returned order's `escrow` is what goes back to its seller.
    pub fn cancel_order(&mut self, symbol: &str, order_id: u64) -> Result<RestingOrder, TxError> {
        let entry = match self.index.get(&order_id) {
            Some(entry) => entry.clone(),
            None => return Err(TxError::OrderNotFound(order_id)),
        };
        match self.resting(order_id) {
            Some(order) if order.sell_symbol == symbol => {}
            _ => return Err(TxError::OrderNotFound(order_id)),
        }

        let book = self
            .books
            .get_mut(&entry.pair)
            .ok_or(TxError::OrderNotFound(order_id))?;
        let removed = book
            .remove(entry.key)
            .ok_or(TxError::OrderNotFound(order_id))?;
        if book.is_empty() {
            self.books.remove(&entry.pair);
        }
        self.index.remove(&order_id);
        Ok(removed)
    }

    pub fn resting(&self, order_id: u64) -> Option<&RestingOrder> {
        let entry = self.index.get(&order_id)?;
        self.books.get(&entry.pair)?.get(entry.key)
    }

    pub fn book(&self, pair: &Pair) -> Option<&OrderBook> {
        self.books.get(pair)
    }

    pub fn books(&self) -> impl Iterator<Item = (&Pair, &OrderBook)> {
        self.books.iter()
    }

    /// Number of resting orders across all books.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total escrow currently locked in `symbol`.
    pub fn escrow_total(&self, symbol: &str) -> u128 {
        self.books
            .values()
            .flat_map(|b| b.bids().chain(b.asks()))
            .filter(|o| o.sell_symbol == symbol)
            .map(|o| o.escrow as u128)
            .sum()
    }
}

fn match_book(
    pair: &Pair,
    book: &mut OrderBook,
    index: &mut BTreeMap<u64, IndexEntry>,
    outcome: &mut MatchOutcome,
) {
    while let Some((mut bid, mut ask)) = book.pop_crossing() {
        let ask_is_maker = ask.sequence < bid.sequence;
        let (maker, taker, price) = if ask_is_maker {
            (ask.id, bid.id, ask.price)
        } else {
            (bid.id, ask.id, bid.price)
        };

        let base = bid.remaining.min(ask.remaining);
        // Limits are enforced on running totals. The ask's proceeds never
        // fall below its price times what it has sold, and the bid always
        // keeps enough escrow to pay its own price for what is left.
        let floor = ask
            .price
            .quote_ceil(ask.filled + base)
            .saturating_sub(ask.proceeds);
        let ceiling = bid
            .escrow
            .saturating_sub(bid.price.quote_ceil(bid.remaining - base));
        let quote = if ask_is_maker { floor.max(1) } else { ceiling };

        if quote == 0 || quote > ceiling {
            // No whole quote amount fits both limits: retire the order
            // that would have been filled and refund it.
            let bid_done = bid.remaining == base;
            debug!(
                %pair,
                bid = bid.id,
                ask = ask.id,
                base,
                "crossing orders too small to settle"
            );
            finish(pair, book, index, outcome, ask, |_| !bid_done);
            finish(pair, book, index, outcome, bid, |_| bid_done);
            continue;
        }

        ask.remaining -= base;
        ask.escrow -= base;
        ask.filled += base;
        ask.proceeds += quote;
        bid.remaining -= base;
        bid.escrow -= quote;
        bid.filled += base;

        outcome.settlements.push(Settlement {
            order_id: ask.id,
            address: ask.seller_address.clone(),
            symbol: pair.quote.clone(),
            amount: quote,
            kind: SettlementKind::Fill,
        });
        outcome.settlements.push(Settlement {
            order_id: bid.id,
            address: bid.seller_address.clone(),
            symbol: pair.base.clone(),
            amount: base,
            kind: SettlementKind::Fill,
        });
        outcome.fills.push(Fill {
            pair: pair.clone(),
            maker_id: maker,
            taker_id: taker,
            price,
            base_amount: base,
            quote_amount: quote,
        });

        finish(pair, book, index, outcome, ask, |o| o.remaining == 0);
        finish(pair, book, index, outcome, bid, |o| {
            o.remaining == 0 || o.escrow == 0
        });
    }
}

// Puts a partially filled order back, or retires it and refunds what is
// left of its escrow.
fn finish(
    pair: &Pair,
    book: &mut OrderBook,
    index: &mut BTreeMap<u64, IndexEntry>,
    outcome: &mut MatchOutcome,
    order: RestingOrder,
    done: impl Fn(&RestingOrder) -> bool,
) {
    if !done(&order) {
        book.insert(order);
        return;
    }
    index.remove(&order.id);
    if order.escrow > 0 {
        let symbol = match order.side {
            Side::Ask => pair.base.clone(),
            Side::Bid => pair.quote.clone(),
        };
        outcome.settlements.push(Settlement {
            order_id: order.id,
            address: order.seller_address,
            symbol,
            amount: order.escrow,
            kind: SettlementKind::Refund,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Signature;

    // Pair is BTC/USD: selling BTC is an ask, selling USD a bid.
    fn sell_btc(id: u64, btc: u64, usd: u64) -> Order {
        Order {
            id,
            sell_symbol: "BTC".to_string(),
            buy_symbol: "USD".to_string(),
            sell_amount: btc,
            buy_amount: usd,
            seller_address: Address::from(format!("seller-{id}")),
            signature: Signature::default(),
        }
    }

    fn buy_btc(id: u64, btc: u64, usd: u64) -> Order {
        Order {
            id,
            sell_symbol: "USD".to_string(),
            buy_symbol: "BTC".to_string(),
            sell_amount: usd,
            buy_amount: btc,
            seller_address: Address::from(format!("buyer-{id}")),
            signature: Signature::default(),
        }
    }

    fn escrow_plus_settled(engine: &MatchingEngine, outcomes: &[MatchOutcome], symbol: &str) -> u128 {
        let settled: u128 = outcomes
            .iter()
            .flat_map(|o| o.settlements.iter())
            .filter(|s| s.symbol == symbol)
            .map(|s| s.amount as u128)
            .sum();
        engine.escrow_total(symbol) + settled
    }

    #[test]
    fn non_crossing_orders_rest() {
        let mut engine = MatchingEngine::new();
        let a = engine.submit_order(&sell_btc(1, 1, 10)).expect("ask");
        let b = engine.submit_order(&buy_btc(2, 1, 9)).expect("bid");

        assert!(a.fills.is_empty() && a.resting);
        assert!(b.fills.is_empty() && b.resting);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn buy_fills_best_priced_sell_first() {
        let mut engine = MatchingEngine::new();
        engine.submit_order(&sell_btc(1, 1, 10)).expect("10");
        engine.submit_order(&sell_btc(2, 1, 9)).expect("9");
        engine.submit_order(&sell_btc(3, 1, 8)).expect("8");

        let out = engine.submit_order(&buy_btc(4, 1, 8)).expect("buy");

        assert_eq!(out.fills.len(), 1);
        assert_eq!(out.fills[0].maker_id, 3);
        assert_eq!(out.fills[0].quote_amount, 8);
        assert!(!out.resting);
        assert!(engine.resting(3).is_none());
        assert!(engine.resting(1).is_some() && engine.resting(2).is_some());
    }

    #[test]
    fn equal_prices_fill_in_arrival_order() {
        let mut engine = MatchingEngine::new();
        engine.submit_order(&sell_btc(1, 1, 8)).expect("first");
        engine.submit_order(&sell_btc(2, 1, 8)).expect("second");

        let out = engine.submit_order(&buy_btc(3, 1, 8)).expect("buy");
        assert_eq!(out.fills[0].maker_id, 1);
        assert!(engine.resting(2).is_some());
    }

    #[test]
    fn taker_trades_at_maker_price_and_gets_refund() {
        let mut engine = MatchingEngine::new();
        engine.submit_order(&sell_btc(1, 2, 16)).expect("ask at 8");

        // Willing to pay 10 per BTC for 2 BTC; executes at 8.
        let bid = buy_btc(2, 2, 20);
        let out = engine.submit_order(&bid).expect("bid");

        assert_eq!(out.fills.len(), 1);
        assert_eq!(out.fills[0].base_amount, 2);
        assert_eq!(out.fills[0].quote_amount, 16);

        let refund: Vec<&Settlement> = out
            .settlements
            .iter()
            .filter(|s| s.kind == SettlementKind::Refund)
            .collect();
        assert_eq!(refund.len(), 1);
        assert_eq!(refund[0].address, bid.seller_address);
        assert_eq!(refund[0].symbol, "USD");
        assert_eq!(refund[0].amount, 4);
        assert!(engine.is_empty());
    }

    #[test]
    fn partial_fill_leaves_remainder_resting() {
        let mut engine = MatchingEngine::new();
        engine.submit_order(&sell_btc(1, 5, 50)).expect("ask");
        let out = engine.submit_order(&buy_btc(2, 2, 20)).expect("bid");

        assert_eq!(out.fills[0].base_amount, 2);
        let ask = engine.resting(1).expect("ask rests");
        assert_eq!(ask.remaining, 3);
        assert_eq!(ask.escrow, 3);
    }

    #[test]
    fn one_taker_sweeps_several_levels() {
        let mut engine = MatchingEngine::new();
        engine.submit_order(&buy_btc(1, 1, 10)).expect("bid 10");
        engine.submit_order(&buy_btc(2, 1, 9)).expect("bid 9");
        engine.submit_order(&buy_btc(3, 1, 7)).expect("bid 7");

        let out = engine.submit_order(&sell_btc(4, 3, 24)).expect("ask at 8");
        let makers: Vec<u64> = out.fills.iter().map(|f| f.maker_id).collect();
        assert_eq!(makers, vec![1, 2]);
        assert_eq!(engine.resting(4).map(|o| o.remaining), Some(1));
        assert!(engine.resting(3).is_some());
    }

    #[test]
    fn escrow_is_conserved_through_matching() {
        let mut engine = MatchingEngine::new();
        let orders = [
            sell_btc(1, 3, 25),
            buy_btc(2, 2, 19),
            sell_btc(3, 4, 30),
            buy_btc(4, 5, 60),
            buy_btc(5, 1, 7),
        ];
        let mut locked_btc = 0u128;
        let mut locked_usd = 0u128;
        let mut outcomes = Vec::new();
        for order in &orders {
            if order.sell_symbol == "BTC" {
                locked_btc += order.sell_amount as u128;
            } else {
                locked_usd += order.sell_amount as u128;
            }
            outcomes.push(engine.submit_order(order).expect("submit"));
        }

        assert_eq!(escrow_plus_settled(&engine, &outcomes, "BTC"), locked_btc);
        assert_eq!(escrow_plus_settled(&engine, &outcomes, "USD"), locked_usd);
    }

    fn quote_paid_to(outcomes: &[MatchOutcome], order_id: u64) -> u64 {
        outcomes
            .iter()
            .flat_map(|o| o.settlements.iter())
            .filter(|s| s.order_id == order_id && s.kind == SettlementKind::Fill && s.symbol == "USD")
            .map(|s| s.amount)
            .sum()
    }

    #[test]
    fn split_fills_never_pay_an_ask_below_its_limit() {
        let mut engine = MatchingEngine::new();
        // 3 BTC for 1 USD, sold one BTC at a time.
        let mut outcomes = vec![engine.submit_order(&sell_btc(1, 3, 1)).expect("ask")];
        for id in 2..=4 {
            outcomes.push(engine.submit_order(&buy_btc(id, 1, 1)).expect("bid"));
        }

        assert!(engine.is_empty());
        let fills: Vec<&Fill> = outcomes.iter().flat_map(|o| o.fills.iter()).collect();
        assert_eq!(fills.len(), 3);
        assert!(fills.iter().all(|f| f.quote_amount > 0));
        assert!(quote_paid_to(&outcomes, 1) >= 1);
    }

    #[test]
    fn split_fills_at_fractional_price_add_up_to_the_ask() {
        let mut engine = MatchingEngine::new();
        // 3 BTC for 10 USD, filled as 1 + 2.
        let mut outcomes = vec![engine.submit_order(&sell_btc(1, 3, 10)).expect("ask")];
        outcomes.push(engine.submit_order(&buy_btc(2, 1, 4)).expect("bid 4"));
        outcomes.push(engine.submit_order(&buy_btc(3, 2, 7)).expect("bid 3.5"));

        assert_eq!(outcomes[1].fills[0].quote_amount, 4);
        assert_eq!(outcomes[2].fills[0].quote_amount, 6);
        assert_eq!(quote_paid_to(&outcomes, 1), 10);

        // The second bid paid 6 of its 7 and gets the rest back.
        let refund = outcomes[2]
            .settlements
            .iter()
            .find(|s| s.kind == SettlementKind::Refund)
            .expect("refund");
        assert_eq!((refund.order_id, refund.amount), (3, 1));
        assert!(engine.is_empty());
    }

    #[test]
    fn bid_maker_is_paid_its_own_price_within_escrow() {
        let mut engine = MatchingEngine::new();
        // Bid 10 USD for 3 BTC rests first; asks fill it 1 + 2.
        engine.submit_order(&buy_btc(1, 3, 10)).expect("bid");
        let first = engine.submit_order(&sell_btc(2, 1, 3)).expect("ask 3");
        let second = engine.submit_order(&sell_btc(3, 2, 6)).expect("ask 3 again");

        assert_eq!(first.fills[0].quote_amount, 3);
        assert_eq!(second.fills[0].quote_amount, 7);
        assert!(engine.is_empty());
    }

    #[test]
    fn dust_that_cannot_be_priced_is_refunded_not_given_away() {
        let mut engine = MatchingEngine::new();
        let mut outcomes = vec![engine.submit_order(&sell_btc(1, 12, 1)).expect("ask")];
        outcomes.push(engine.submit_order(&buy_btc(2, 10, 1)).expect("bid 10"));
        assert_eq!(engine.resting(1).map(|o| o.remaining), Some(2));

        // Two BTC left at 1/12 against a bid of 1/6: any whole quote breaks
        // one of the limits.
        let out = engine.submit_order(&buy_btc(3, 6, 1)).expect("bid 6");
        assert!(out.fills.is_empty());
        assert!(out.resting);
        assert!(engine.resting(1).is_none());
        assert_eq!(
            out.settlements,
            vec![Settlement {
                order_id: 1,
                address: Address::from("seller-1"),
                symbol: "BTC".to_string(),
                amount: 2,
                kind: SettlementKind::Refund,
            }]
        );
        outcomes.push(out);
        assert_eq!(escrow_plus_settled(&engine, &outcomes, "BTC"), 12);
        assert_eq!(escrow_plus_settled(&engine, &outcomes, "USD"), 2);
    }

    #[test]
    fn invalid_orders_are_rejected_without_changes() {
        let mut engine = MatchingEngine::new();
        engine.submit_order(&sell_btc(1, 1, 10)).expect("ask");
        let before = engine.clone();

        assert_eq!(
            engine.submit_order(&sell_btc(1, 1, 11)),
            Err(TxError::DuplicateOrder(1))
        );
        assert_eq!(engine.submit_order(&sell_btc(2, 0, 10)), Err(TxError::InvalidAmount));

        let mut same = sell_btc(3, 1, 1);
        same.buy_symbol = "BTC".to_string();
        assert!(matches!(engine.submit_order(&same), Err(TxError::InvalidOrder(_))));
        assert_eq!(engine, before);
    }

    #[test]
    fn cancel_returns_escrow_and_unknown_cancel_changes_nothing() {
        let mut engine = MatchingEngine::new();
        engine.submit_order(&buy_btc(1, 2, 20)).expect("bid");
        let before = engine.clone();

        assert_eq!(engine.cancel_order("USD", 9), Err(TxError::OrderNotFound(9)));
        assert_eq!(engine.cancel_order("BTC", 1), Err(TxError::OrderNotFound(1)));
        assert_eq!(engine, before);

        let removed = engine.cancel_order("USD", 1).expect("cancel");
        assert_eq!(removed.escrow, 20);
        assert!(engine.is_empty());
        assert!(engine.book(&Pair::for_symbols("BTC", "USD")).is_none());
    }
}
