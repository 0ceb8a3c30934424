//! Hard position limits
//!
//! Limits are absolute: `|position| <= limit` must hold after every settled
//! tick. A breach is never clamped. The monitor reports it and the
//! simulation loop stops.

use std::collections::BTreeMap;

use tracing::error;

use crate::error::{Breach, LimitBreach};
use crate::{Symbol, Tick};

/// Checks settled positions against per-instrument absolute limits
#[derive(Debug, Clone, Default)]
pub struct RiskMonitor {
    limits: BTreeMap<Symbol, i64>,
}

impl RiskMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits are absolute; a negative entry is read as its magnitude
    pub fn from_limits(limits: BTreeMap<Symbol, i64>) -> Self {
        let limits = limits
            .into_iter()
            .map(|(symbol, limit)| (symbol, limit.abs()))
            .collect();
        RiskMonitor { limits }
    }

    /// Add or replace the limit for one instrument
    pub fn with_limit(mut self, symbol: impl Into<Symbol>, limit: i64) -> Self {
        self.limits.insert(symbol.into(), limit.abs());
        self
    }

    pub fn limit(&self, symbol: &Symbol) -> Option<i64> {
        self.limits.get(symbol).copied()
    }

    pub fn limits(&self) -> &BTreeMap<Symbol, i64> {
        &self.limits
    }

    /// Remaining `(buy, sell)` capacity before `position` hits the limit
    pub fn capacity(&self, symbol: &Symbol, position: i64) -> Option<(i64, i64)> {
        self.limit(symbol)
            .map(|limit| ((limit - position).max(0), (limit + position).max(0)))
    }

    /// Fail with every limited instrument whose position is out of bounds.
    ///
    /// Instruments with no recorded position count as flat.
    pub fn check(&self, tick: Tick, positions: &BTreeMap<Symbol, i64>) -> Result<(), LimitBreach> {
        let breaches: Vec<Breach> = self
            .limits
            .iter()
            .filter_map(|(symbol, &limit)| {
                let position = positions.get(symbol).copied().unwrap_or(0);
                (position.abs() > limit).then(|| Breach {
                    symbol: symbol.clone(),
                    position,
                    limit,
                })
            })
            .collect();

        if breaches.is_empty() {
            return Ok(());
        }

        for breach in &breaches {
            error!(
                tick = %tick,
                symbol = %breach.symbol,
                position = breach.position,
                limit = breach.limit,
                "Position limit breached"
            );
        }
        Err(LimitBreach { tick, breaches })
    }
}
