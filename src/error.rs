//! Error types for kline fetching and table construction

use arrow_schema::ArrowError;
use thiserror::Error;

/// Errors raised while resolving credentials, talking to the exchange, or
/// turning its response into a table.
#[derive(Debug, Error)]
pub enum KlineError {
    #[error("environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid API credential: {0}")]
    InvalidCredential(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Binance API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("kline row {row} has {len} fields, expected at least 6")]
    ShortKline { row: usize, len: usize },

    #[error("kline row {row}: invalid {field} value {value}")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("failed to parse date: {0}")]
    InvalidDate(String),

    #[error("unsupported interval: {0}")]
    InvalidInterval(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

pub type Result<T> = std::result::Result<T, KlineError>;
