//! Historical data fetching
//!
//! Turns a pair and a date range into a [`KlineTable`]: dates are parsed,
//! the range is clamped to the pair's first listed candle, pages of klines are
//! requested until the range is covered, each row is sliced to six fields, and
//! the resulting table is passed through the configured compaction.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::binance::{BinanceClient, Credentials};
use crate::compactor::{Compaction, CompactionReport, MemoryCompactor, NoCompaction};
use crate::config::{Config, FetchConfig};
use crate::error::{KlineError, Result};
use crate::table::KlineTable;
use crate::types::{interval_millis, Kline};

// =============================================================================
// Exchange Source
// =============================================================================

/// Anything that can serve raw kline rows for a pair
///
/// Each row is `[open_time, open, high, low, close, volume, ...]`; extra
/// trailing fields are ignored.
pub trait KlineSource {
    fn klines(
        &self,
        pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Vec<Value>>>;
}

// =============================================================================
// Date Parsing
// =============================================================================

const DATE_FORMATS: &[&str] = &[
    "%d %b, %Y",
    "%d %B, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y-%m-%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d %b, %Y %H:%M:%S",
];

/// Parse a date string to UTC
///
/// Accepts "1 Jan, 2023", "Jan 1, 2023", "2023-01-01", "2023-01-01 12:00:00",
/// RFC 3339, epoch milliseconds, "now" and relative forms like "3 days ago UTC".
pub fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    parse_date_at(date_str, Utc::now())
}

/// Same as [`parse_date`], resolving relative dates against `now`
pub fn parse_date_at(date_str: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let s = date_str.trim();
    let s = s.strip_suffix(" UTC").unwrap_or(s).trim();

    if s.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Ok(millis) = s.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| KlineError::InvalidDate(date_str.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ndt.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(nd) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
                return Ok(ndt.and_utc());
            }
        }
    }

    if let Some(ago) = parse_relative(s) {
        return now
            .checked_sub_signed(ago)
            .ok_or_else(|| KlineError::InvalidDate(date_str.to_string()));
    }

    Err(KlineError::InvalidDate(date_str.to_string()))
}

/// "<N> <unit>[s] ago", `None` when the count overflows the unit
fn parse_relative(s: &str) -> Option<Duration> {
    let mut parts = s.split_whitespace();
    let count: i64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?.to_lowercase();
    if parts.next()? != "ago" || parts.next().is_some() {
        return None;
    }
    match unit.trim_end_matches('s') {
        "second" => Duration::try_seconds(count),
        "minute" => Duration::try_minutes(count),
        "hour" => Duration::try_hours(count),
        "day" => Duration::try_days(count),
        "week" => Duration::try_weeks(count),
        _ => None,
    }
}

// =============================================================================
// Historical Data Fetcher
// =============================================================================

/// Fetches historical klines for a pair and loads them into a table
pub struct HistoricalDataFetcher<S = BinanceClient> {
    source: S,
    interval: String,
    page_limit: u32,
    compaction: Box<dyn Compaction>,
}

impl HistoricalDataFetcher<BinanceClient> {
    /// Build an authenticated Binance client and a fetcher configured from `config`
    pub fn binance(credentials: Credentials, config: &Config) -> anyhow::Result<Self> {
        let client = BinanceClient::with_config(credentials, &config.exchange)?;
        let compaction: Box<dyn Compaction> = if config.compaction.enabled {
            Box::new(MemoryCompactor::new(config.compaction.time_unit()?))
        } else {
            Box::new(NoCompaction)
        };
        Ok(Self::new(client, &config.fetch).with_compaction(compaction))
    }
}

impl<S: KlineSource> HistoricalDataFetcher<S> {
    /// Create a fetcher over any source, compacting with the default [`MemoryCompactor`]
    pub fn new(source: S, config: &FetchConfig) -> Self {
        HistoricalDataFetcher {
            source,
            interval: config.interval.clone(),
            page_limit: config.effective_page_limit(),
            compaction: Box::new(MemoryCompactor::default()),
        }
    }

    pub fn with_compaction(mut self, compaction: Box<dyn Compaction>) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    /// Gets historical data at the configured interval (5 minutes by default)
    /// within a time period, compacted.
    ///
    /// * `pair` - e.g. "BTCUSDT"
    /// * `start` - e.g. "1 Jan, 2023"
    /// * `end` - e.g. "14 Jan, 2023"
    pub fn get_historical_data(&self, pair: &str, start: &str, end: &str) -> Result<KlineTable> {
        self.get_historical_data_with_report(pair, start, end)
            .map(|(table, _)| table)
    }

    /// Like [`get_historical_data`](Self::get_historical_data), also returning
    /// the memory report of the compaction pass
    pub fn get_historical_data_with_report(
        &self,
        pair: &str,
        start: &str,
        end: &str,
    ) -> Result<(KlineTable, CompactionReport)> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        let klines = self.fetch_klines(pair, start, end)?;
        KlineTable::from_klines(&klines)?.compact(self.compaction.as_ref())
    }

    /// Fetch every kline with an open time in `[start, end]`
    pub fn fetch_klines(
        &self,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>> {
        let pair = pair.trim().to_uppercase();
        let step = interval_millis(&self.interval)?;
        let end_ms = end.timestamp_millis();

        let mut cursor = start.timestamp_millis();
        if let Some(earliest) = self.earliest_open_time(&pair)? {
            if cursor < earliest {
                debug!("Clamping start of {} to first listed kline {}", pair, earliest);
                cursor = earliest;
            }
        }

        info!(
            "Fetching {} {} klines from {} to {}",
            pair, self.interval, start, end
        );

        let mut klines: Vec<Kline> = Vec::new();
        let mut pages = 0;

        while cursor <= end_ms {
            let rows = self.source.klines(
                &pair,
                &self.interval,
                Some(cursor),
                Some(end_ms),
                self.page_limit,
            )?;
            pages += 1;
            if rows.is_empty() {
                break;
            }

            let offset = klines.len();
            for (i, row) in rows.iter().enumerate() {
                klines.push(Kline::from_row(row, offset + i)?);
            }

            let Some(last) = klines.last() else {
                break;
            };
            debug!(
                "Page {}: {} klines, last open time {}",
                pages,
                rows.len(),
                last.open_time
            );

            if rows.len() < self.page_limit as usize {
                break;
            }
            cursor = last.open_time + step;
        }

        info!(
            "Fetched {} klines for {} in {} requests",
            klines.len(),
            pair,
            pages
        );

        Ok(klines)
    }

    /// Open time of the first kline the exchange has for the pair
    fn earliest_open_time(&self, pair: &str) -> Result<Option<i64>> {
        let rows = self.source.klines(pair, &self.interval, Some(0), None, 1)?;
        rows.first()
            .map(|row| Kline::from_row(row, 0).map(|k| k.open_time))
            .transpose()
    }
}

// =============================================================================
// Tests
// =============================================================================
