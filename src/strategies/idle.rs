//! Idle adapter: never trades
//!
//! Baseline for checking that a run with no orders leaves every position
//! and PnL series flat.

use super::{StrategyAdapter, StrategyDecision, TradingState};
use crate::Config;
use anyhow::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct IdleStrategy;

impl StrategyAdapter for IdleStrategy {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn step(&self, state: &TradingState<'_>) -> Result<StrategyDecision> {
        Ok(StrategyDecision::new(state.memo.clone()))
    }
}

/// Create adapter from config (called by registry)
pub fn create(_config: &Config) -> Result<Box<dyn StrategyAdapter>> {
    Ok(Box::new(IdleStrategy))
}
