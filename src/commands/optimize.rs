//! Optimize command implementation with progress tracking

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use orderbook_sim::optimizer::{OptimizationResult, Optimizer};
use orderbook_sim::{data::MarketDataFeed, grid, Config};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

pub fn run(
    config_path: String,
    data_override: Option<PathBuf>,
    params: Vec<String>,
    sort_by: String,
    top: usize,
    sequential: bool,
) -> Result<()> {
    info!("Starting optimization");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(data) = data_override {
        config.simulation.data_file = data;
    }
    grid::apply_overrides(&mut config, &params)?;

    let feed = MarketDataFeed::load(&config.simulation)?;
    let configs = grid::generate_grid_configs(&config)?;

    println!("\n{}", "=".repeat(60));
    println!("PARAMETER OPTIMIZATION");
    println!("{}", "=".repeat(60));
    println!("Strategy:      {}", config.strategy_name);
    println!("Data:          {}", config.simulation.data_file.display());
    println!("Ticks:         {}", feed.timeline().len());
    println!("Combinations:  {}", configs.len());
    println!("Mode:          {}", if sequential { "sequential" } else { "parallel" });
    println!("{}\n", "=".repeat(60));

    let pb = ProgressBar::new(configs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec}] ✓ {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░ "),
    );

    let started = Instant::now();
    let optimizer = Optimizer::new(&feed);
    let mut results = if sequential {
        optimizer.optimize_sequential(&configs, Some(&pb))
    } else {
        optimizer.optimize(&configs, Some(&pb))
    };
    pb.finish_with_message("done");

    Optimizer::sort_results(&mut results, &sort_by);
    info!(
        "Optimization finished: {} runs in {:.1}s",
        results.len(),
        started.elapsed().as_secs_f64()
    );

    print_results(&results, top, &sort_by);
    Ok(())
}

fn print_results(results: &[OptimizationResult], top: usize, sort_by: &str) {
    println!("\n{}", "=".repeat(100));
    println!("TOP {} RESULTS (sorted by {})", top.min(results.len()), sort_by);
    println!("{}", "=".repeat(100));
    println!(
        "{:<4} {:>12} {:>12} {:>8} {:<10} PARAMS",
        "#", "PNL", "DRAWDOWN", "TRADES", "STATUS"
    );
    println!("{}", "-".repeat(100));

    for (i, r) in results.iter().take(top).enumerate() {
        let status = match (&r.breached_at, &r.error) {
            (_, Some(_)) => "error".to_string(),
            (Some(tick), None) => format!("halt@{}", tick),
            (None, None) => "ok".to_string(),
        };
        println!(
            "{:<4} {:>12.2} {:>12.2} {:>8} {:<10} {}",
            i + 1,
            r.total_pnl,
            r.max_drawdown,
            r.total_trades,
            status,
            grid::format_params(&r.params)
        );
        if let Some(e) = &r.error {
            println!("     ↳ {}", e);
        }
    }
    println!("{}", "=".repeat(100));
}
