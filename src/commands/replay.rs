//! Replay command: own trades and positions from a raw exchange log

use anyhow::{Context, Result};
use orderbook_sim::config::DataFormat;
use orderbook_sim::replay::{own_position_series, own_trade_summary};
use orderbook_sim::{data::MarketDataFeed, Config};
use std::path::PathBuf;
use tracing::info;

pub fn run(config_path: String, log_override: Option<PathBuf>) -> Result<()> {
    let mut config = Config::from_file(&config_path)?;
    if let Some(log) = log_override {
        config.simulation.data_file = log;
    }
    // Trade history only exists in raw logs
    config.simulation.format = DataFormat::Log;

    let feed = MarketDataFeed::load(&config.simulation).with_context(|| {
        format!(
            "Failed to load raw log {}",
            config.simulation.data_file.display()
        )
    })?;
    let summary = own_trade_summary(feed.trade_history());
    info!(
        "Replayed {} historical trades, {} own",
        feed.trade_history().len(),
        summary.own_count()
    );

    println!("\n{}", "=".repeat(60));
    println!("TRADE HISTORY REPLAY");
    println!("{}", "=".repeat(60));
    println!("Historical trades:  {}", feed.trade_history().len());
    println!("Own buys:           {}", summary.buys.len());
    println!("Own sells:          {}", summary.sells.len());
    println!("Market trades:      {}", summary.market.len());
    println!("{}", "-".repeat(60));
    println!("{:<20} {:>10} {:>10}", "Symbol", "Position", "Peak |pos|");

    for (symbol, position) in summary.positions() {
        let series = own_position_series(feed.trade_history(), &symbol, feed.timeline());
        let peak = series.iter().map(|p| p.abs()).max().unwrap_or(0);
        println!("{:<20} {:>10} {:>10}", symbol.as_str(), position, peak);
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
