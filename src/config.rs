//! Configuration management
//!
//! Loads the JSON run configuration: where the historical data lives, the
//! position limits, which strategy adapter to run and with what parameters.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::risk::RiskMonitor;
use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,
    #[serde(default = "empty_object")]
    pub strategy: serde_json::Value,
    #[serde(default)]
    pub backtest: BacktestConfig,
    /// Grid search parameters for optimization (optional)
    /// Each key is a strategy param name, value is array of values to test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<HashMap<String, Vec<serde_json::Value>>>,
}

fn default_strategy_name() -> String {
    "idle".to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    /// Risk monitor built from `simulation.position_limits`
    pub fn risk_monitor(&self) -> RiskMonitor {
        RiskMonitor::from_limits(self.simulation.limits())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            simulation: SimulationConfig::default(),
            strategy_name: default_strategy_name(),
            strategy: empty_object(),
            backtest: BacktestConfig::default(),
            grid: None,
        }
    }
}

/// Input file layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// `.csv` files are tables, anything else is a raw log
    #[default]
    Auto,
    /// Delimited order-book table
    Csv,
    /// Raw log with "Activities log:" and "Trade History:" sections
    Log,
}

impl DataFormat {
    pub fn resolve(self, path: &Path) -> DataFormat {
        match self {
            DataFormat::Auto => {
                let is_csv = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
                if is_csv {
                    DataFormat::Csv
                } else {
                    DataFormat::Log
                }
            }
            other => other,
        }
    }
}

/// Market data and risk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub data_file: PathBuf,
    #[serde(default)]
    pub format: DataFormat,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Fixed clock stride; inferred from the data when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_stride: Option<i64>,
    /// Absolute position limit per symbol
    #[serde(default)]
    pub position_limits: BTreeMap<String, i64>,
}

fn default_delimiter() -> char {
    ';'
}

impl SimulationConfig {
    pub fn limits(&self) -> BTreeMap<Symbol, i64> {
        self.position_limits
            .iter()
            .map(|(s, l)| (Symbol::new(s.clone()), l.abs()))
            .collect()
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            data_file: PathBuf::from("data/prices.csv"),
            format: DataFormat::Auto,
            delimiter: default_delimiter(),
            tick_stride: None,
            position_limits: BTreeMap::from([
                ("RAINFOREST_RESIN".to_string(), 50),
                ("KELP".to_string(), 50),
            ]),
        }
    }
}

/// Backtest output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub results_dir: String,
    #[serde(default = "default_true")]
    pub write_results: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            results_dir: "results".to_string(),
            write_results: true,
        }
    }
}
