//! Fair Value Market Taker - take mispriced liquidity, quote the rest
//!
//! Per instrument and tick:
//! 1. Sell into bids at or above `fair + take_edge`, buy asks at or below `fair - take_edge`
//! 2. Quote leftover capacity just inside the nearest resting level, no further than `quote_edge`
//! 3. After `unwind_after` ticks pinned at a limit, take at fair on the reducing side
//!
//! Orders never exceed the capacity left under the position limit, so the
//! adapter alone can never breach it.

use anyhow::Result;
use std::collections::BTreeMap;
use tracing::debug;

use super::config::FairValueConfig;
use crate::book::{infer_side, OrderBookSnapshot};
use crate::strategies::memo::{self, FairValueMemo, StrategyMemo};
use crate::strategies::{StrategyAdapter, StrategyDecision, TradingState};
use crate::{IntendedOrder, Side, Symbol};

pub struct FairValueStrategy {
    config: FairValueConfig,
}

impl FairValueStrategy {
    pub fn new(config: FairValueConfig) -> Self {
        Self { config }
    }

    /// Configured value, else the book's rounded weighted mid
    fn fair_value(&self, symbol: &Symbol, book: &OrderBookSnapshot) -> Option<f64> {
        self.config
            .fair_values
            .get(symbol.as_str())
            .copied()
            .or_else(|| book.weighted_mid().map(f64::round))
    }

    fn orders_for(
        &self,
        symbol: &Symbol,
        book: &OrderBookSnapshot,
        position: i64,
        limit: i64,
        memo: &mut FairValueMemo,
    ) -> Vec<IntendedOrder> {
        let mut buy_capacity = (limit - position).max(0);
        let mut sell_capacity = (limit + position).max(0);

        let pinned_long = bump(&mut memo.pinned_long, symbol, buy_capacity == 0);
        let pinned_short = bump(&mut memo.pinned_short, symbol, sell_capacity == 0);

        let Some(fair) = self.fair_value(symbol, book) else {
            return Vec::new();
        };

        let buy_at_most = if pinned_short >= self.config.unwind_after {
            fair
        } else {
            fair - self.config.take_edge
        };
        let sell_at_least = if pinned_long >= self.config.unwind_after {
            fair
        } else {
            fair + self.config.take_edge
        };

        let mut orders = Vec::new();

        for (price, volume) in book.bids() {
            if sell_capacity == 0 || price < sell_at_least {
                break;
            }
            let quantity = volume.min(sell_capacity);
            sell_capacity -= quantity;
            orders.push(IntendedOrder::sell(symbol.clone(), price, quantity));
        }

        for (price, volume) in book.asks() {
            if buy_capacity == 0 || price > buy_at_most {
                break;
            }
            let quantity = volume.min(buy_capacity);
            buy_capacity -= quantity;
            orders.push(IntendedOrder::buy(symbol.clone(), price, quantity));
        }

        if self.config.quote {
            let edge = self.config.quote_edge;
            let bid_barrier = barrier_price(&book.signed_bids(), 1, None, Some(fair));
            let ask_barrier = barrier_price(&book.signed_asks(), 1, Some(fair), None);
            let bid = bid_barrier.map_or(fair - edge, |b| b.max(fair - edge));
            let ask = ask_barrier.map_or(fair + edge, |a| a.min(fair + edge));

            if sell_capacity > 0 {
                orders.push(IntendedOrder::sell(symbol.clone(), ask, sell_capacity));
            }
            if buy_capacity > 0 {
                orders.push(IntendedOrder::buy(symbol.clone(), bid, buy_capacity));
            }
        }

        orders
    }
}

/// Consecutive-tick counter; cleared as soon as the condition lapses
fn bump(counters: &mut BTreeMap<Symbol, u32>, symbol: &Symbol, pinned: bool) -> u32 {
    if pinned {
        let count = counters.entry(symbol.clone()).or_insert(0);
        *count += 1;
        *count
    } else {
        counters.remove(symbol);
        0
    }
}

/// First level, walking away from the touch, with at least `threshold`
/// volume and a price strictly inside `(ignore_below, ignore_above)`.
///
/// The side is inferred from the signs of the volumes; an empty or
/// all-zero side has no barrier.
pub fn barrier_price(
    levels: &[(f64, i64)],
    threshold: i64,
    ignore_below: Option<f64>,
    ignore_above: Option<f64>,
) -> Option<f64> {
    let mut sorted = levels.to_vec();
    match infer_side(levels)? {
        Side::Sell => sorted.sort_by(|a, b| a.0.total_cmp(&b.0)),
        Side::Buy => sorted.sort_by(|a, b| b.0.total_cmp(&a.0)),
    }
    sorted
        .into_iter()
        .filter(|(p, _)| ignore_below.map_or(true, |lo| *p > lo))
        .filter(|(p, _)| ignore_above.map_or(true, |hi| *p < hi))
        .find(|(_, q)| q.abs() >= threshold)
        .map(|(p, _)| p)
}

impl StrategyAdapter for FairValueStrategy {
    fn name(&self) -> &'static str {
        "fair_value"
    }

    fn step(&self, state: &TradingState<'_>) -> Result<StrategyDecision> {
        let mut memo = match memo::decode_or_reset(state.memo, self.name()) {
            StrategyMemo::FairValue(m) => m,
            StrategyMemo::Empty => FairValueMemo::default(),
        };

        if !state.own_trades.is_empty() {
            debug!(tick = %state.tick, fills = state.own_trades.len(), "Previous tick fills");
        }

        let mut decision = StrategyDecision::default();
        for (symbol, book) in state.books {
            let limit = state.limit(symbol).unwrap_or(self.config.default_limit);
            let position = state.position(symbol);
            for order in self.orders_for(symbol, book, position, limit, &mut memo) {
                decision.push(order);
            }
        }

        decision.memo = memo::encode(&StrategyMemo::FairValue(memo))?;
        Ok(decision)
    }
}
