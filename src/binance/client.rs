//! Blocking Binance REST client for historical klines
//!
//! # Example
//! ```no_run
//! use kline_loader::binance::{BinanceClient, Credentials};
//!
//! fn main() -> kline_loader::Result<()> {
//!     let client = BinanceClient::new(Credentials::from_env()?)?;
//!     let rows = client.get_klines("BTCUSDT", "5m", None, None, 100)?;
//!     println!("Fetched {} klines", rows.len());
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration as StdDuration;
use tracing::debug;

use super::auth::Credentials;
use crate::config::ExchangeConfig;
use crate::data::KlineSource;
use crate::error::{KlineError, Result};

/// Maximum klines per request (Binance limit)
pub const MAX_KLINES_PER_REQUEST: u32 = 1000;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Binance API client
#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: Client,
    credentials: Credentials,
    base_url: String,
    recv_window_ms: u64,
}

impl BinanceClient {
    /// Create a client against the public Binance endpoint with default settings
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_config(credentials, &ExchangeConfig::default())
    }

    pub fn with_config(credentials: Credentials, config: &ExchangeConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(credentials.api_key())
            .map_err(|e| KlineError::InvalidCredential(e.to_string()))?;
        headers.insert(API_KEY_HEADER, api_key);

        let client = Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(BinanceClient {
            client,
            credentials,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            recv_window_ms: config.recv_window_ms,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v3/{}", self.base_url, path)
    }

    /// Fetch raw kline rows
    ///
    /// # Arguments
    /// * `symbol` - Binance trading pair (e.g., "BTCUSDT")
    /// * `interval` - Timeframe (e.g., "5m", "1h")
    /// * `start_time` - Optional start time in milliseconds
    /// * `end_time` - Optional end time in milliseconds
    /// * `limit` - Number of klines to fetch (max 1000)
    pub fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Vec<Value>>> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
        ];

        if let Some(start) = start_time {
            params.push(("startTime", start.to_string()));
        }

        if let Some(end) = end_time {
            params.push(("endTime", end.to_string()));
        }

        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        params.push(("limit", limit.to_string()));

        debug!(
            "Fetching klines: symbol={}, interval={}, start={:?}, end={:?}, limit={}",
            symbol, interval, start_time, end_time, limit
        );

        let response = self.client.get(self.url("klines")).query(&params).send()?;
        parse_json(response)
    }

    /// Check server connectivity
    pub fn ping(&self) -> Result<bool> {
        let response = self.client.get(self.url("ping")).send()?;
        Ok(response.status().is_success())
    }

    /// Get server time
    pub fn get_server_time(&self) -> Result<DateTime<Utc>> {
        #[derive(serde::Deserialize)]
        struct TimeResponse {
            #[serde(rename = "serverTime")]
            server_time: i64,
        }

        let response = self.client.get(self.url("time")).send()?;
        let time_resp: TimeResponse = parse_json(response)?;
        DateTime::from_timestamp_millis(time_resp.server_time).ok_or_else(|| KlineError::Api {
            status: 200,
            body: format!("invalid server time {}", time_resp.server_time),
        })
    }

    /// Call a signed account endpoint so bad keys surface before a download starts.
    pub fn verify_credentials(&self) -> Result<()> {
        let query = format!(
            "recvWindow={}&timestamp={}",
            self.recv_window_ms,
            Utc::now().timestamp_millis()
        );
        let signature = self.credentials.sign(&query);
        let url = format!("{}?{}&signature={}", self.url("account"), query, signature);

        let response = self.client.get(url).send()?;
        let _: Value = parse_json(response)?;
        debug!("API credentials accepted");
        Ok(())
    }
}

fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(KlineError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json()?)
}

impl KlineSource for BinanceClient {
    fn klines(
        &self,
        pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Vec<Value>>> {
        self.get_klines(pair, interval, start_time, end_time, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ExchangeConfig {
            base_url: "https://testnet.binance.vision/".to_string(),
            ..ExchangeConfig::default()
        };
        let client =
            BinanceClient::with_config(Credentials::new("key", "secret"), &config).unwrap();
        assert_eq!(client.url("klines"), "https://testnet.binance.vision/api/v3/klines");
    }

    #[test]
    fn test_rejects_unprintable_api_key() {
        let err = BinanceClient::new(Credentials::new("bad\nkey", "secret")).unwrap_err();
        assert!(matches!(err, KlineError::InvalidCredential(_)));
    }
}
