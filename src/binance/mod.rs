//! Binance API client for downloading historical kline data
//! The API key is sent with every request; signed endpoints use [`auth`].

pub mod auth;
mod client;

pub use auth::Credentials;
pub use client::BinanceClient;
