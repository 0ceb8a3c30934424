//! Parallel parameter sweep
//!
//! Every combination runs as an independent back-test over one shared,
//! read-only feed. Runs never share mutable state, so they parallelise
//! freely across rayon's pool.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::backtest::Backtester;
use crate::data::MarketDataFeed;
use crate::error::BacktestError;
use crate::report::{max_drawdown, BacktestReport};
use crate::{Config, Tick};

/// Outcome of a single parameter combination
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub params: BTreeMap<String, Value>,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    /// Tick of the limit breach that halted the run
    pub breached_at: Option<Tick>,
    /// Set when the run could not produce a report at all
    pub error: Option<String>,
}

impl OptimizationResult {
    fn from_report(params: BTreeMap<String, Value>, report: &BacktestReport, breached_at: Option<Tick>) -> Self {
        OptimizationResult {
            params,
            total_pnl: report.final_total_pnl(),
            max_drawdown: max_drawdown(&report.total_pnl),
            total_trades: report.trades.len(),
            breached_at,
            error: None,
        }
    }

    fn failed(params: BTreeMap<String, Value>, error: String) -> Self {
        OptimizationResult {
            params,
            total_pnl: 0.0,
            max_drawdown: 0.0,
            total_trades: 0,
            breached_at: None,
            error: Some(error),
        }
    }

    /// Completed without breach or error
    pub fn is_clean(&self) -> bool {
        self.breached_at.is_none() && self.error.is_none()
    }
}

pub struct Optimizer<'a> {
    feed: &'a MarketDataFeed,
}

impl<'a> Optimizer<'a> {
    pub fn new(feed: &'a MarketDataFeed) -> Self {
        Optimizer { feed }
    }

    /// Run one configuration
    pub fn evaluate(&self, config: &Config) -> OptimizationResult {
        let params = crate::grid::extract_params(config);
        let backtester = match Backtester::from_config(config) {
            Ok(b) => b,
            Err(e) => return OptimizationResult::failed(params, format!("{:#}", e)),
        };

        match backtester.run(self.feed) {
            Ok(report) => OptimizationResult::from_report(params, &report, None),
            Err(BacktestError::LimitBreach { breach, report }) => {
                OptimizationResult::from_report(params, &report, Some(breach.tick))
            }
            Err(e) => OptimizationResult::failed(params, e.to_string()),
        }
    }

    /// Run all configurations in parallel
    pub fn optimize(&self, configs: &[Config], progress: Option<&ProgressBar>) -> Vec<OptimizationResult> {
        tracing::info!("Testing {} parameter combinations", configs.len());

        configs
            .par_iter()
            .map(|config| {
                let result = self.evaluate(config);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                result
            })
            .collect()
    }

    /// Run optimization sequentially (no parallelism)
    pub fn optimize_sequential(
        &self,
        configs: &[Config],
        progress: Option<&ProgressBar>,
    ) -> Vec<OptimizationResult> {
        tracing::info!(
            "Testing {} parameter combinations sequentially",
            configs.len()
        );

        configs
            .iter()
            .map(|config| {
                let result = self.evaluate(config);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                result
            })
            .collect()
    }

    /// Best first by `sort_by` (`pnl`, `drawdown` or `trades`); halted or
    /// failed runs always rank below clean ones
    pub fn sort_results(results: &mut [OptimizationResult], sort_by: &str) {
        let metric = |a: &OptimizationResult, b: &OptimizationResult| match sort_by {
            "drawdown" => a
                .max_drawdown
                .partial_cmp(&b.max_drawdown)
                .unwrap_or(Ordering::Equal),
            "trades" => b.total_trades.cmp(&a.total_trades),
            _ => b
                .total_pnl
                .partial_cmp(&a.total_pnl)
                .unwrap_or(Ordering::Equal),
        };
        results.sort_by(|a, b| b.is_clean().cmp(&a.is_clean()).then_with(|| metric(a, b)));
    }
}
