//! Fetch command - download klines for one pair and print the compacted table

use anyhow::{Context, Result};
use arrow_cast::pretty::pretty_format_batches;
use kline_loader::{Credentials, HistoricalDataFetcher};
use std::path::PathBuf;
use tracing::info;

pub struct FetchArgs {
    pub pair: String,
    pub start: String,
    pub end: String,
    pub config: Option<PathBuf>,
    pub no_compact: bool,
    pub rows: usize,
    pub verify_credentials: bool,
}

pub fn run(args: FetchArgs) -> Result<()> {
    let mut config = super::load_config(args.config)?;
    if args.no_compact {
        config.compaction.enabled = false;
    }

    let credentials = Credentials::from_env().context("API credentials are required")?;
    let fetcher = HistoricalDataFetcher::binance(credentials, &config)?;

    if args.verify_credentials {
        fetcher
            .source()
            .verify_credentials()
            .context("Binance rejected the API credentials")?;
        info!("API credentials verified");
    }

    let (table, report) = fetcher
        .get_historical_data_with_report(&args.pair, &args.start, &args.end)
        .with_context(|| format!("Failed to fetch historical data for {}", args.pair))?;

    println!("\n{}", "=".repeat(60));
    println!("HISTORICAL DATA: {} ({})", args.pair.to_uppercase(), fetcher.interval());
    println!("{}", "=".repeat(60));
    println!("  Rows:       {}", table.num_rows());
    if let (Some(first), Some(last)) = (table.first_time(), table.last_time()) {
        println!("  From:       {}", first);
        println!("  To:         {}", last);
    }
    if let Some(gap) = table.max_gap() {
        println!("  Max gap:    {} min", gap.num_minutes());
    }
    println!(
        "  Memory:     {:.3} MB -> {:.3} MB ({:.1}% reduction)",
        report.mb_before(),
        report.mb_after(),
        report.reduction_pct()
    );
    for change in &report.changes {
        println!("  {:<10}  {} -> {}", change.name, change.from, change.to);
    }
    println!("{}\n", "=".repeat(60));

    if args.rows > 0 && !table.is_empty() {
        let head = table.batch().slice(0, args.rows.min(table.num_rows()));
        println!("{}", pretty_format_batches(&[head])?);
    }

    Ok(())
}
