//! Order-book back-test simulator - main entry point
//!
//! This binary provides three subcommands:
//! - backtest: Run a strategy over recorded order books
//! - optimize: Sweep strategy parameters over the same data
//! - replay: Summarise own trades from a raw exchange log

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "orderbook-sim")]
#[command(about = "Order-book back-tester with price-priority matching and hard position limits", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run strategy backtest
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/sample.json")]
        config: String,

        /// Strategy name (overrides config file)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Data file (overrides config file)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Results directory (overrides config file)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Optimize strategy parameters
    Optimize {
        /// Path to base configuration file
        #[arg(short, long, default_value = "configs/sample.json")]
        config: String,

        /// Data file (overrides config file)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Grid override, repeatable. E.g., --param take_edge=0,1,2
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Sort results by metric (pnl, drawdown, trades)
        #[arg(long, default_value = "pnl")]
        sort_by: String,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Summarise own trades recorded in a raw log
    Replay {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/sample.json")]
        config: String,

        /// Raw log file (overrides config file)
        #[arg(short, long)]
        log: Option<PathBuf>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if file_only {
        // Console stays clean for the progress bar
        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_line_number(false)
            .with_ansi(true);

        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true),
        Commands::Replay { .. } => ("replay", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            strategy,
            data,
            output,
        } => commands::backtest::run(config, strategy, data, output),

        Commands::Optimize {
            config,
            data,
            params,
            sort_by,
            top,
            sequential,
        } => commands::optimize::run(config, data, params, sort_by, top, sequential),

        Commands::Replay { config, log } => commands::replay::run(config, log),
    }
}
