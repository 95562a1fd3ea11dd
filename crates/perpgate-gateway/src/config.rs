//! Gateway configuration and credentials.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zeroize::Zeroizing;

/// Production USDT-M futures REST endpoint.
pub const MAINNET_BASE_URL: &str = "https://fapi.binance.com";
/// Testnet USDT-M futures REST endpoint.
pub const TESTNET_BASE_URL: &str = "https://testnet.binancefuture.com";

/// Upper bound the exchange accepts for `recvWindow`.
pub const MAX_RECV_WINDOW_MS: u64 = 60_000;

// ============================================================================
// Credentials
// ============================================================================

/// API key pair.
///
/// The secret is zeroized on drop and never printed.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    secret_key: Zeroizing<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: Zeroizing::new(secret_key.into()),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Whether a secret is present; without one requests go out unsigned.
    pub fn can_sign(&self) -> bool {
        !self.secret_key.is_empty()
    }

    /// API key with everything but the first four characters masked.
    /// Keys shorter than eight characters are masked entirely.
    pub fn masked_api_key(&self) -> String {
        if self.api_key.chars().count() < 8 {
            return "****".to_string();
        }
        let visible: String = self.api_key.chars().take(4).collect();
        format!("{visible}****")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.masked_api_key())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Client configuration
// ============================================================================

/// REST client configuration.
///
/// Read-only after `FuturesClient` construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// REST base URL. Default: mainnet.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout (seconds). Default: 30.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Optional HTTP(S) proxy.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Additional attempts after the first. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry (ms). Default: 1000.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Multiplier applied to the delay for each further retry. Default: 2.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: u32,
    /// Clock-skew tolerance sent with signed requests (ms). Default: 60000.
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    /// Token bucket capacity. Default: 1200.
    #[serde(default = "default_rate_limit_capacity")]
    pub rate_limit_capacity: u32,
    /// Token bucket refill interval (ms). Default: 60000.
    #[serde(default = "default_rate_limit_interval_ms")]
    pub rate_limit_interval_ms: u64,
    /// User-Agent header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    MAINNET_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_retry_backoff() -> u32 {
    2
}

fn default_recv_window_ms() -> u64 {
    60_000
}

fn default_rate_limit_capacity() -> u32 {
    1_200
}

fn default_rate_limit_interval_ms() -> u64 {
    60_000
}

fn default_user_agent() -> String {
    format!("perpgate/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            proxy_url: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_backoff: default_retry_backoff(),
            recv_window_ms: default_recv_window_ms(),
            rate_limit_capacity: default_rate_limit_capacity(),
            rate_limit_interval_ms: default_rate_limit_interval_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    /// Testnet defaults.
    pub fn testnet() -> Self {
        Self {
            base_url: TESTNET_BASE_URL.to_string(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Validate configuration together with the credentials it will be used with.
    pub fn validate(&self, credentials: &Credentials) -> Result<(), ConfigError> {
        if credentials.api_key().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        if !credentials.can_sign() {
            return Err(ConfigError::EmptySecretKey);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.recv_window_ms > MAX_RECV_WINDOW_MS {
            return Err(ConfigError::RecvWindowOutOfRange(self.recv_window_ms));
        }
        if self.rate_limit_capacity == 0 || self.rate_limit_interval_ms == 0 {
            return Err(ConfigError::InvalidRateLimit);
        }
        if self.retry_backoff == 0 {
            return Err(ConfigError::InvalidBackoff);
        }

        let base = reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme {}", base.scheme()),
            });
        }

        if let Some(proxy) = self.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            reqwest::Url::parse(proxy).map_err(|e| ConfigError::InvalidProxy {
                url: proxy.to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("abcdef123456", "s3cr3t")
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, MAINNET_BASE_URL);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.retry_backoff, 2);
        assert_eq!(config.recv_window_ms, 60_000);
        assert_eq!(config.rate_limit_capacity, 1_200);
        assert_eq!(config.rate_limit_interval(), Duration::from_secs(60));
        assert!(config.validate(&creds()).is_ok());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"timeout_secs": 5, "max_retries": 1}"#).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.rate_limit_capacity, 1_200);
    }

    #[test]
    fn test_rejects_empty_credentials() {
        let config = ClientConfig::default();
        assert!(matches!(
            config.validate(&Credentials::new("", "secret")),
            Err(ConfigError::EmptyApiKey)
        ));
        assert!(matches!(
            config.validate(&Credentials::new("key", "")),
            Err(ConfigError::EmptySecretKey)
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        let base = ClientConfig::default();

        let config = ClientConfig { timeout_secs: 0, ..base.clone() };
        assert!(matches!(config.validate(&creds()), Err(ConfigError::InvalidTimeout)));

        let config = ClientConfig { recv_window_ms: 60_001, ..base.clone() };
        assert!(matches!(
            config.validate(&creds()),
            Err(ConfigError::RecvWindowOutOfRange(60_001))
        ));

        let config = ClientConfig { rate_limit_capacity: 0, ..base.clone() };
        assert!(matches!(config.validate(&creds()), Err(ConfigError::InvalidRateLimit)));

        let config = ClientConfig { retry_backoff: 0, ..base.clone() };
        assert!(matches!(config.validate(&creds()), Err(ConfigError::InvalidBackoff)));

        let config = ClientConfig { base_url: "not a url".into(), ..base.clone() };
        assert!(matches!(config.validate(&creds()), Err(ConfigError::InvalidBaseUrl { .. })));

        let config = ClientConfig { proxy_url: Some("::bad::".into()), ..base };
        assert!(matches!(config.validate(&creds()), Err(ConfigError::InvalidProxy { .. })));
    }

    #[test]
    fn test_zero_recv_window_and_empty_proxy_are_valid() {
        let config = ClientConfig {
            recv_window_ms: 0,
            proxy_url: Some(String::new()),
            ..ClientConfig::default()
        };
        assert!(config.validate(&creds()).is_ok());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let printed = format!("{:?}", creds());
        assert!(printed.contains("abcd****"));
        assert!(!printed.contains("s3cr3t"));
        assert!(!printed.contains("abcdef123456"));
    }

    #[test]
    fn test_short_api_key_fully_masked() {
        assert_eq!(Credentials::new("abcd", "s").masked_api_key(), "****");
        assert_eq!(Credentials::new("abcdefg", "s").masked_api_key(), "****");
        assert_eq!(Credentials::new("", "").masked_api_key(), "****");
        assert_eq!(Credentials::new("abcdefgh", "s").masked_api_key(), "abcd****");
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let config = ClientConfig {
            base_url: "https://example.test/".into(),
            ..ClientConfig::default()
        };
        assert_eq!(config.base_url(), "https://example.test");
    }
}
