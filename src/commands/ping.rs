//! Ping command - check connectivity and clock skew against Binance

use anyhow::{Context, Result};
use chrono::Utc;
use kline_loader::{BinanceClient, Credentials};
use std::path::PathBuf;
use tracing::{info, warn};

pub fn run(config: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config)?;
    let credentials = Credentials::from_env().context("API credentials are required")?;
    let client = BinanceClient::with_config(credentials, &config.exchange)?;

    if !client.ping()? {
        warn!("Binance ping returned a non-success status");
        anyhow::bail!("Binance at {} is not reachable", config.exchange.base_url);
    }

    let server_time = client.get_server_time()?;
    let skew = Utc::now() - server_time;
    info!("Server time {} (local skew {} ms)", server_time, skew.num_milliseconds());
    println!("Binance reachable, server time {}", server_time);

    Ok(())
}
