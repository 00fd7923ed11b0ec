//! Kline Loader
//!
//! Downloads historical Binance candlesticks into an Arrow-backed table keyed
//! by open time, and shrinks that table by narrowing each column to the
//! smallest type that holds its values.
//!
//! ## Example
//! ```no_run
//! use kline_loader::{Config, Credentials, HistoricalDataFetcher};
//!
//! fn main() -> anyhow::Result<()> {
//!     let fetcher = HistoricalDataFetcher::binance(Credentials::from_env()?, &Config::default())?;
//!     let table = fetcher.get_historical_data("BTCUSDT", "1 Jan, 2023", "14 Jan, 2023")?;
//!     println!("{} rows, {} bytes", table.num_rows(), table.memory_usage());
//!     Ok(())
//! }
//! ```

pub mod binance;
pub mod compactor;
pub mod config;
pub mod data;
pub mod error;
pub mod table;
pub mod types;

pub use binance::{BinanceClient, Credentials};
pub use compactor::{
    reduce_mem_usage, Compacted, Compaction, CompactionReport, MemoryCompactor, NoCompaction,
};
pub use config::Config;
pub use data::{parse_date, HistoricalDataFetcher, KlineSource};
pub use error::{KlineError, Result};
pub use table::KlineTable;
pub use types::*;
