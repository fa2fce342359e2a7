//! Client configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:5173";
pub const DEFAULT_WATCHDOG_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_COUPON_VALID_DAYS: i64 = 30;
pub const DEFAULT_WELCOME_DISCOUNT_PERCENT: f64 = 15.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set or empty.
    #[error("missing required env var {var}")]
    Missing { var: &'static str },
    /// A URL-valued variable could not be parsed.
    #[error("invalid URL in {var}: {reason}")]
    InvalidUrl { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Terms of the welcome coupon minted at customer signup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CouponPolicy {
    pub valid_days: i64,
    pub discount_percent: f64,
}

impl Default for CouponPolicy {
    fn default() -> Self {
        Self { valid_days: DEFAULT_COUPON_VALID_DAYS, discount_percent: DEFAULT_WELCOME_DISCOUNT_PERCENT }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StampcardConfig {
    /// Base URL of the managed backend, without trailing slash.
    pub backend_url: String,
    /// Public API key sent with every request.
    pub anon_key: String,
    /// Origin used for customer signup links and QR codes.
    pub public_url: String,
    pub watchdog: Duration,
    pub timeouts: HttpTimeouts,
    pub session_file: Option<PathBuf>,
    pub coupon: CouponPolicy,
}

impl StampcardConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `STAMPCARD_BACKEND_URL`
    /// - `STAMPCARD_ANON_KEY`
    ///
    /// Optional:
    /// - `STAMPCARD_PUBLIC_URL`: default `http://localhost:5173`
    /// - `STAMPCARD_WATCHDOG_SECS`: default 5
    /// - `STAMPCARD_REQUEST_TIMEOUT_SECS`: default 30
    /// - `STAMPCARD_CONNECT_TIMEOUT_SECS`: default 10
    /// - `STAMPCARD_SESSION_FILE`: no persistence when absent
    /// - `STAMPCARD_COUPON_VALID_DAYS`: default 30
    /// - `STAMPCARD_WELCOME_DISCOUNT_PERCENT`: default 15
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a URL is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend_url = required("STAMPCARD_BACKEND_URL")?;
        let backend_url = parse_base_url("STAMPCARD_BACKEND_URL", &backend_url)?;
        let anon_key = required("STAMPCARD_ANON_KEY")?;

        let public_url = std::env::var("STAMPCARD_PUBLIC_URL").unwrap_or_else(|_| DEFAULT_PUBLIC_URL.to_string());
        let public_url = parse_base_url("STAMPCARD_PUBLIC_URL", &public_url)?;

        let watchdog = Duration::from_secs(env_parse("STAMPCARD_WATCHDOG_SECS", DEFAULT_WATCHDOG_SECS));
        let timeouts = HttpTimeouts {
            request_secs: env_parse("STAMPCARD_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("STAMPCARD_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let session_file = std::env::var("STAMPCARD_SESSION_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let coupon = CouponPolicy {
            valid_days: env_parse("STAMPCARD_COUPON_VALID_DAYS", DEFAULT_COUPON_VALID_DAYS),
            discount_percent: env_parse("STAMPCARD_WELCOME_DISCOUNT_PERCENT", DEFAULT_WELCOME_DISCOUNT_PERCENT),
        };

        Ok(Self { backend_url, anon_key, public_url, watchdog, timeouts, session_file, coupon })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing { var })
}

fn parse_base_url(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidUrl { var, reason: e.to_string() })?;
    Ok(trimmed.to_string())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl StampcardConfig {
    /// Defaults pointed at `backend_url`, for tests that never read the environment.
    pub(crate) fn for_backend(backend_url: &str) -> Self {
        Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            anon_key: "anon-test-key".into(),
            public_url: DEFAULT_PUBLIC_URL.into(),
            watchdog: Duration::from_secs(DEFAULT_WATCHDOG_SECS),
            timeouts: HttpTimeouts { request_secs: 5, connect_secs: 2 },
            session_file: None,
            coupon: CouponPolicy::default(),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
