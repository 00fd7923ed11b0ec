//! Authentication utilities for the Binance API
//!
//! Credentials are resolved once from the environment. Signed endpoints use an
//! HMAC-SHA256 signature of the query string, keyed by the API secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{KlineError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Environment variable holding the API key
pub const PUBLIC_KEY_VAR: &str = "PUBLIC_KEY";
/// Environment variable holding the API secret
pub const SECRET_KEY_VAR: &str = "SECRET_KEY";

/// Generate HMAC-SHA256 signature for a query string
///
/// # Example
///
/// ```
/// use kline_loader::binance::auth::sign_query;
///
/// let signature = sign_query("timestamp=1672531200000", "your-api-secret");
/// assert_eq!(signature.len(), 64);
/// ```
pub fn sign_query(query: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// API key pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Read `PUBLIC_KEY` and `SECRET_KEY` from the process environment.
    ///
    /// Fails on the first variable that is unset or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through an arbitrary lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(KlineError::MissingCredential(name))
        };
        let api_key = read(PUBLIC_KEY_VAR)?;
        let api_secret = read(SECRET_KEY_VAR)?;
        Ok(Self::new(api_key, api_secret))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Sign a query string with the secret
    pub fn sign(&self, query: &str) -> String {
        sign_query(query, &self.api_secret)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}
