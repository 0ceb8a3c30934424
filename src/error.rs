//! Error taxonomy for loading data and running a back-test
//!
//! Load failures ([`DataError`]) are fatal before the first tick. A
//! [`LimitBreach`] stops the run but hands back the partial report.
//! [`OrderRejection`]s are absorbed per order by the simulation loop.

use std::path::PathBuf;

use thiserror::Error;

use crate::report::BacktestReport;
use crate::{Symbol, Tick};

/// Malformed or missing market data
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse row {row}: {source}")]
    Csv {
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("row {row}: missing required field '{field}'")]
    MissingField { row: usize, field: &'static str },

    #[error("row {row}: {message}")]
    MalformedRow { row: usize, message: String },

    #[error("duplicate snapshot for {symbol} at tick {tick}")]
    DuplicateSnapshot { symbol: Symbol, tick: Tick },

    #[error("log section '{0}' not found")]
    MissingSection(&'static str),

    #[error("malformed trade history: {0}")]
    TradeHistory(#[from] serde_json::Error),

    #[error("delimiter {0:?} must be a single ASCII character")]
    InvalidDelimiter(char),

    #[error("tick stride must be positive, got {0}")]
    InvalidStride(i64),

    #[error("no order book rows found")]
    Empty,
}

/// Intended order that violates the strategy contract
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderRejection {
    #[error("unknown instrument {0}")]
    UnknownSymbol(Symbol),

    #[error("order for {order} filed under {key}")]
    SymbolMismatch { key: Symbol, order: Symbol },

    #[error("price {0} is not a finite number")]
    InvalidPrice(f64),

    #[error("quantity must be non-zero")]
    ZeroQuantity,
}

/// One instrument over its absolute position limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breach {
    pub symbol: Symbol,
    pub position: i64,
    pub limit: i64,
}

impl std::fmt::Display for Breach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} position {} exceeds limit {}",
            self.symbol, self.position, self.limit
        )
    }
}

/// Every breach detected after settling one tick
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("position limit breached at tick {tick}: {}", format_breaches(.breaches))]
pub struct LimitBreach {
    pub tick: Tick,
    pub breaches: Vec<Breach>,
}

fn format_breaches(breaches: &[Breach]) -> String {
    breaches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl LimitBreach {
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.breaches.iter().map(|b| &b.symbol)
    }
}

/// Reasons a back-test run stops before the last tick
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("strategy adapter failed at tick {tick}: {message}")]
    Strategy { tick: Tick, message: String },

    /// Run halted; `report` holds everything settled up to and including `breach.tick`
    #[error("{breach}")]
    LimitBreach {
        breach: LimitBreach,
        report: Box<BacktestReport>,
    },
}

/// Strategy memo codec failures
#[derive(Debug, Error)]
pub enum MemoError {
    #[error("unsupported memo version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("malformed memo: {0}")]
    Malformed(#[from] serde_json::Error),
}
