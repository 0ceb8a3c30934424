//! Fair Value Market Taker Configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FairValueConfig {
    /// Fixed fair value per symbol; symbols left out use the book's weighted mid
    pub fair_values: BTreeMap<String, f64>,

    /// Take asks at or below `fair - take_edge`, bids at or above `fair + take_edge`
    pub take_edge: f64,

    /// Distance of the passive quotes from fair (default: 4.0)
    pub quote_edge: f64,

    /// Limit assumed for symbols without a configured position limit
    pub default_limit: i64,

    /// Ticks pinned at a limit before taking at fair to unwind (default: 3)
    pub unwind_after: u32,

    /// Post passive quotes with leftover capacity (default: true)
    pub quote: bool,
}

impl Default for FairValueConfig {
    fn default() -> Self {
        Self {
            fair_values: BTreeMap::new(),
            take_edge: 1.0,
            quote_edge: 4.0,
            default_limit: 50,
            unwind_after: 3,
            quote: true,
        }
    }
}

impl FairValueConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.take_edge.is_finite() || self.take_edge < 0.0 {
            bail!("take_edge must be a non-negative number, got {}", self.take_edge);
        }
        if !self.quote_edge.is_finite() || self.quote_edge < 0.0 {
            bail!("quote_edge must be a non-negative number, got {}", self.quote_edge);
        }
        if self.default_limit < 0 {
            bail!("default_limit must be non-negative, got {}", self.default_limit);
        }
        if let Some((symbol, fair)) = self
            .fair_values
            .iter()
            .find(|(_, v)| !v.is_finite() || **v <= 0.0)
        {
            bail!("fair value for {} must be positive, got {}", symbol, fair);
        }
        Ok(())
    }
}
