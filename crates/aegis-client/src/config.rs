//! Client configuration: API base URL, timeouts and credential lifetimes.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const ENV_API_URL: &str = "AEGIS_API_URL";
/// Variable the web dashboard reads; honoured when `AEGIS_API_URL` is unset.
pub const ENV_API_URL_LEGACY: &str = "NEXT_PUBLIC_API_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "AEGIS_REQUEST_TIMEOUT_MS";
pub const ENV_REFRESH_TIMEOUT_MS: &str = "AEGIS_REFRESH_TIMEOUT_MS";

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 10_000;
pub const MIN_TIMEOUT_MS: u64 = 250;

pub const ACCESS_TOKEN_TTL_DAYS: i64 = 1;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url must use http:// or https:// and include a host")]
    InvalidBaseUrl,
    #[error("invalid {key}: {message}")]
    InvalidTimeout { key: &'static str, message: String },
}

/// How long each credential stays readable after it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: chrono::Duration,
    pub refresh: chrono::Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: chrono::Duration::days(ACCESS_TOKEN_TTL_DAYS),
            refresh: chrono::Duration::days(REFRESH_TOKEN_TTL_DAYS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    /// Upper bound on the token renewal call; expiry counts as a failed renewal.
    pub refresh_timeout: Duration,
    pub token_lifetimes: TokenLifetimes,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            refresh_timeout: Duration::from_millis(DEFAULT_REFRESH_TIMEOUT_MS),
            token_lifetimes: TokenLifetimes::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, which maps a variable name to its raw
    /// value. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let setting = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let (raw_url, source) = [ENV_API_URL, ENV_API_URL_LEGACY]
            .into_iter()
            .find_map(|key| setting(key).map(|value| (value, key)))
            .unwrap_or_else(|| (DEFAULT_API_URL.to_string(), "default"));
        let base_url = normalize_base_url(&raw_url)?;
        tracing::debug!(%base_url, source, "resolved api base url");

        Ok(Self {
            base_url,
            request_timeout: parse_timeout(
                ENV_REQUEST_TIMEOUT_MS,
                setting(ENV_REQUEST_TIMEOUT_MS),
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?,
            refresh_timeout: parse_timeout(
                ENV_REFRESH_TIMEOUT_MS,
                setting(ENV_REFRESH_TIMEOUT_MS),
                DEFAULT_REFRESH_TIMEOUT_MS,
            )?,
            token_lifetimes: TokenLifetimes::default(),
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

/// Trims the input and drops trailing slashes so paths can be appended with a
/// leading `/`.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    let parsed = url::Url::parse(trimmed).map_err(|_| ConfigError::InvalidBaseUrl)?;
    let web_scheme = matches!(parsed.scheme(), "http" | "https");
    if !web_scheme || parsed.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}

fn parse_timeout(
    key: &'static str,
    raw: Option<String>,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    let millis = match raw {
        Some(raw) => raw.parse::<u64>().map_err(|error| ConfigError::InvalidTimeout {
            key,
            message: error.to_string(),
        })?,
        None => default_ms,
    };
    Ok(Duration::from_millis(millis.max(MIN_TIMEOUT_MS)))
}
