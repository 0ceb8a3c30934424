//! Per-tick, per-instrument view of resting liquidity
//!
//! Bid volumes are stored positive and ask volumes as negative magnitudes,
//! keyed by price in a `BTreeMap` so both sides iterate in price order.
//! Levels with no volume are removed rather than kept as zero entries.

use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

use crate::Side;

/// Resting bid/ask liquidity reconstructed from one historical row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBookSnapshot {
    /// price -> resting bid volume (> 0)
    bids: BTreeMap<OrderedFloat<f64>, i64>,
    /// price -> resting ask volume (< 0)
    asks: BTreeMap<OrderedFloat<f64>, i64>,
}

impl OrderBookSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(price, volume)` pairs, ask volumes given as magnitudes
    pub fn from_levels(
        bids: impl IntoIterator<Item = (f64, i64)>,
        asks: impl IntoIterator<Item = (f64, i64)>,
    ) -> Self {
        let mut book = Self::new();
        for (price, volume) in bids {
            book.add_bid(price, volume);
        }
        for (price, volume) in asks {
            book.add_ask(price, volume);
        }
        book
    }

    /// Add bid volume at `price`; non-positive volume is ignored
    pub fn add_bid(&mut self, price: f64, volume: i64) {
        if volume > 0 {
            *self.bids.entry(OrderedFloat(price)).or_insert(0) += volume;
        }
    }

    /// Add ask volume (magnitude) at `price`; non-positive volume is ignored
    pub fn add_ask(&mut self, price: f64, volume: i64) {
        if volume > 0 {
            *self.asks.entry(OrderedFloat(price)).or_insert(0) -= volume;
        }
    }

    pub fn best_bid(&self) -> Option<(f64, i64)> {
        self.bids.iter().next_back().map(|(p, v)| (p.0, *v))
    }

    /// Lowest ask as `(price, magnitude)`
    pub fn best_ask(&self) -> Option<(f64, i64)> {
        self.asks.iter().next().map(|(p, v)| (p.0, -*v))
    }

    /// Bid levels, highest price first
    pub fn bids(&self) -> impl Iterator<Item = (f64, i64)> + '_ {
        self.bids.iter().rev().map(|(p, v)| (p.0, *v))
    }

    /// Ask levels as magnitudes, lowest price first
    pub fn asks(&self) -> impl Iterator<Item = (f64, i64)> + '_ {
        self.asks.iter().map(|(p, v)| (p.0, -*v))
    }

    /// Signed levels as stored: positive bids
    pub fn signed_bids(&self) -> Vec<(f64, i64)> {
        self.bids.iter().map(|(p, v)| (p.0, *v)).collect()
    }

    /// Signed levels as stored: negative asks
    pub fn signed_asks(&self) -> Vec<(f64, i64)> {
        self.asks.iter().map(|(p, v)| (p.0, *v)).collect()
    }

    pub fn bid_volume(&self, price: f64) -> i64 {
        self.bids.get(&OrderedFloat(price)).copied().unwrap_or(0)
    }

    /// Ask volume at `price` as a magnitude
    pub fn ask_volume(&self, price: f64) -> i64 {
        self.asks
            .get(&OrderedFloat(price))
            .map(|v| -*v)
            .unwrap_or(0)
    }

    /// Remove up to `quantity` from the bid level at `price`, returning what was taken
    pub fn take_bid(&mut self, price: f64, quantity: i64) -> i64 {
        let key = OrderedFloat(price);
        let Some(resting) = self.bids.get_mut(&key) else {
            return 0;
        };
        let taken = quantity.clamp(0, *resting);
        *resting -= taken;
        if *resting == 0 {
            self.bids.remove(&key);
        }
        taken
    }

    /// Remove up to `quantity` from the ask level at `price`, returning what was taken
    pub fn take_ask(&mut self, price: f64, quantity: i64) -> i64 {
        let key = OrderedFloat(price);
        let Some(resting) = self.asks.get_mut(&key) else {
            return 0;
        };
        let taken = quantity.clamp(0, -*resting);
        *resting += taken;
        if *resting == 0 {
            self.asks.remove(&key);
        }
        taken
    }

    pub fn total_bid_volume(&self) -> i64 {
        self.bids.values().sum()
    }

    pub fn total_ask_volume(&self) -> i64 {
        -self.asks.values().sum::<i64>()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Volume-weighted price across every level on both sides
    pub fn weighted_mid(&self) -> Option<f64> {
        let (notional, volume) = self
            .bids()
            .chain(self.asks())
            .fold((0.0, 0i64), |(n, v), (price, vol)| {
                (n + price * vol as f64, v + vol)
            });
        (volume > 0).then(|| notional / volume as f64)
    }
}

/// Guess which side a bare signed level map belongs to.
///
/// Any negative volume marks it as the ask side, otherwise any positive
/// volume marks it as bids. Empty or all-zero maps carry no liquidity and
/// yield `None` instead of a guess.
pub fn infer_side(levels: &[(f64, i64)]) -> Option<Side> {
    if levels.iter().any(|&(_, v)| v < 0) {
        Some(Side::Sell)
    } else if levels.iter().any(|&(_, v)| v > 0) {
        Some(Side::Buy)
    } else {
        None
    }
}
