//! Backtest command implementation

use anyhow::{bail, Result};
use orderbook_sim::error::BacktestError;
use orderbook_sim::report::BacktestReport;
use orderbook_sim::{backtest::Backtester, data::MarketDataFeed, Config};
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub fn run(
    config_path: String,
    strategy_override: Option<String>,
    data_override: Option<PathBuf>,
    output_override: Option<String>,
) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(strategy) = strategy_override {
        info!("Overriding strategy to: {}", strategy);
        config.strategy_name = strategy;
    }
    if let Some(data) = data_override {
        config.simulation.data_file = data;
    }
    if let Some(output) = output_override {
        config.backtest.results_dir = output;
    }

    info!("Loading data from: {}", config.simulation.data_file.display());
    let feed = MarketDataFeed::load(&config.simulation)?;

    info!("Creating strategy: {}", config.strategy_name);
    let backtester = Backtester::from_config(&config)?;

    match backtester.run(&feed) {
        Ok(report) => {
            print_report(&report);
            write_results(&config, &report)?;
            info!("Backtest completed successfully");
            Ok(())
        }
        Err(BacktestError::LimitBreach { breach, report }) => {
            print_report(&report);
            println!("\n⚠ RUN HALTED: {}", breach);
            write_results(&config, &report)?;
            error!("Backtest halted by position limit breach");
            bail!("{}", breach)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &BacktestReport) {
    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("{}", report.summary());
    println!("{}", "=".repeat(60));
}

fn write_results(config: &Config, report: &BacktestReport) -> Result<()> {
    if !config.backtest.write_results {
        return Ok(());
    }
    let dir = Path::new(&config.backtest.results_dir).join(format!(
        "{}_{}",
        report.strategy,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));
    report.write_to_dir(&dir)?;
    println!("Results written to {}", dir.display());
    info!("Results written to {}", dir.display());
    Ok(())
}
