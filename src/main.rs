//! Kline loader - main entry point
//!
//! This binary provides two subcommands:
//! - fetch: Download historical klines into a compacted table
//! - ping: Check connectivity with the exchange

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "kline-loader")]
#[command(about = "Historical Binance kline loader with memory compaction", long_about = None)]
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
    /// Fetch historical klines for a trading pair
    Fetch {
        /// Binance trading pair
        #[arg(short, long, default_value = "BTCUSDT")]
        pair: String,

        /// Start date (e.g. "1 Jan, 2023", "2023-01-01", "3 days ago UTC")
        #[arg(short, long, default_value = "1 Jan, 2023")]
        start: String,

        /// End date
        #[arg(short, long, default_value = "14 Jan, 2023")]
        end: String,

        /// Optional JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Keep the table at its original column types
        #[arg(long)]
        no_compact: bool,

        /// Number of rows to print
        #[arg(short, long, default_value = "10")]
        rows: usize,

        /// Check the API key with a signed request before downloading
        #[arg(long)]
        verify_credentials: bool,
    },

    /// Check exchange connectivity and server time
    Ping {
        /// Optional JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// HTTP and Arrow targets held at warn even under --verbose
const QUIET_TARGETS: [&str; 5] = ["hyper", "hyper_util", "h2", "reqwest", "arrow"];

/// `--verbose` raises only this crate to debug
fn filter_directives(verbose: bool) -> String {
    let own_level = if verbose { "debug" } else { "info" };
    std::iter::once(format!("info,kline_loader={}", own_level))
        .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .collect::<Vec<_>>()
        .join(",")
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(verbose))?,
    };

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Fetch { .. } => "fetch",
        Commands::Ping { .. } => "ping",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Fetch {
            pair,
            start,
            end,
            config,
            no_compact,
            rows,
            verify_credentials,
        } => commands::fetch::run(commands::fetch::FetchArgs {
            pair,
            start,
            end,
            config,
            no_compact,
            rows,
            verify_credentials,
        }),
        Commands::Ping { config } => commands::ping::run(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_raises_only_own_crate() {
        let verbose = filter_directives(true);
        assert!(verbose.starts_with("info,kline_loader=debug,"));
        assert!(verbose.contains("arrow=warn"));
        assert!(verbose.contains("hyper=warn"));

        let quiet = filter_directives(false);
        assert!(quiet.starts_with("info,kline_loader=info,"));
        for directive in quiet.split(',') {
            assert!(EnvFilter::try_new(directive).is_ok(), "bad directive {directive}");
        }
    }
}
