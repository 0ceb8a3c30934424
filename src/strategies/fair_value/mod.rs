//! Fair Value Market Taker
//!
//! Takes resting liquidity that crosses a configured fair value, then quotes
//! the remaining limit capacity around it.

mod config;
mod strategy;

pub use config::FairValueConfig;
pub use strategy::{barrier_price, FairValueStrategy};

use crate::strategies::StrategyAdapter;
use crate::Config;
use anyhow::Result;

/// Create adapter from config (called by registry)
pub fn create(config: &Config) -> Result<Box<dyn StrategyAdapter>> {
    let strategy_config: FairValueConfig = serde_json::from_value(config.strategy.clone())
        .map_err(|e| anyhow::anyhow!("Failed to parse fair_value config: {}", e))?;
    strategy_config.validate()?;
    Ok(Box::new(FairValueStrategy::new(strategy_config)))
}
