//! Core data types: the six-field kline record and interval helpers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KlineError, Result};

/// Number of leading fields kept from each exchange row
pub const KLINE_FIELDS: usize = 6;

/// OHLCV candlestick keyed by its open time
///
/// Binance returns each kline as an array:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume, trades, ...]`.
/// Only the first six fields are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    /// Open time in epoch milliseconds
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Kline {
    /// Parse from a raw JSON row. `row` is the position in the overall response,
    /// used for error reporting.
    pub fn from_row(raw: &[Value], row: usize) -> Result<Self> {
        if raw.len() < KLINE_FIELDS {
            return Err(KlineError::ShortKline {
                row,
                len: raw.len(),
            });
        }

        let open_time = match &raw[0] {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| KlineError::InvalidField {
            row,
            field: "open_time",
            value: raw[0].to_string(),
        })?;

        Ok(Kline {
            open_time,
            open: price_field(&raw[1], row, "open")?,
            high: price_field(&raw[2], row, "high")?,
            low: price_field(&raw[3], row, "low")?,
            close: price_field(&raw[4], row, "close")?,
            volume: price_field(&raw[5], row, "volume")?,
        })
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.open_time)
    }
}

/// Binance sends decimals as strings; accept plain numbers too.
fn price_field(value: &Value, row: usize, field: &'static str) -> Result<f64> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| KlineError::InvalidField {
        row,
        field,
        value: value.to_string(),
    })
}

/// Valid Binance intervals
pub const BINANCE_INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
];

/// Check if interval is valid for Binance
pub fn is_valid_interval(interval: &str) -> bool {
    BINANCE_INTERVALS.contains(&interval)
}

/// Length of one interval in milliseconds
pub fn interval_millis(interval: &str) -> Result<i64> {
    if !is_valid_interval(interval) {
        return Err(KlineError::InvalidInterval(interval.to_string()));
    }
    let (count, unit) = interval.split_at(interval.len() - 1);
    let count: i64 = count
        .parse()
        .map_err(|_| KlineError::InvalidInterval(interval.to_string()))?;
    let unit_ms = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return Err(KlineError::InvalidInterval(interval.to_string())),
    };
    Ok(count * unit_ms)
}
