//! Price-priority execution against historical resting liquidity
//!
//! Buys sweep asks from the lowest price up while `ask <= limit`; sells sweep
//! bids from the highest price down while `bid >= limit`. Every fill is
//! taken out of the snapshot, so later orders in the same tick see only what
//! is left. Unmatched remainder is dropped.

use tracing::debug;

use crate::book::OrderBookSnapshot;
use crate::{Counterparty, Fill, IntendedOrder, Tick};

/// Stateless matcher for intended orders
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingEngine;

impl MatchingEngine {
    pub fn new() -> Self {
        MatchingEngine
    }

    /// Execute one order against `book`, consuming matched liquidity
    pub fn execute(&self, tick: Tick, book: &mut OrderBookSnapshot, order: &IntendedOrder) -> Vec<Fill> {
        let mut fills = Vec::new();
        let mut remaining = order.quantity.abs();

        if order.quantity > 0 {
            while remaining > 0 {
                let Some((price, _)) = book.best_ask().filter(|&(p, _)| p <= order.price) else {
                    break;
                };
                let done = book.take_ask(price, remaining);
                remaining -= done;
                fills.push(self.fill(tick, order, price, done));
            }
        } else if order.quantity < 0 {
            while remaining > 0 {
                let Some((price, _)) = book.best_bid().filter(|&(p, _)| p >= order.price) else {
                    break;
                };
                let done = book.take_bid(price, remaining);
                remaining -= done;
                fills.push(self.fill(tick, order, price, -done));
            }
        }

        if remaining > 0 && remaining < order.quantity.abs() {
            debug!(
                tick = %tick,
                symbol = %order.symbol,
                limit = order.price,
                unfilled = remaining,
                "Partial fill, remainder dropped"
            );
        }

        fills
    }

    /// Execute orders in the given sequence against one shared snapshot
    pub fn execute_all(
        &self,
        tick: Tick,
        book: &mut OrderBookSnapshot,
        orders: &[IntendedOrder],
    ) -> Vec<Fill> {
        orders
            .iter()
            .flat_map(|order| self.execute(tick, book, order))
            .collect()
    }

    fn fill(&self, tick: Tick, order: &IntendedOrder, price: f64, quantity: i64) -> Fill {
        debug!(tick = %tick, symbol = %order.symbol, price, quantity, "Order filled");
        Fill {
            tick,
            symbol: order.symbol.clone(),
            price,
            quantity,
            counterparty: Counterparty::Own,
        }
    }
}
