//! Order-Book Back-Test Simulator
//!
//! Replays recorded multi-level order-book snapshots on one global clock,
//! executes a pluggable strategy's intended orders with price priority
//! against the historical resting liquidity, keeps position, cost basis and
//! mark-to-market PnL, and stops hard on the first position-limit breach.

pub mod backtest;
pub mod book;
pub mod config;
pub mod data;
pub mod error;
pub mod grid;
pub mod ledger;
pub mod matching;
pub mod optimizer;
pub mod replay;
pub mod report;
pub mod risk;
pub mod strategies;
pub mod types;

pub use config::Config;
pub use types::*;
