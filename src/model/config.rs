//! Configuration for the feed synchronizer.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::errors::{FeedResult, SyncError};
use crate::model::message::Sender;

/// Environment variable overriding [`FeedConfig::base_url`].
pub const ENV_BASE_URL: &str = "FEEDSYNC_BASE_URL";
/// Environment variable overriding [`FeedConfig::poll_interval`], in milliseconds.
pub const ENV_POLL_INTERVAL_MS: &str = "FEEDSYNC_POLL_INTERVAL_MS";
/// Environment variable overriding the local sender id.
pub const ENV_SENDER_ID: &str = "FEEDSYNC_SENDER_ID";
/// Environment variable overriding the local sender display name.
pub const ENV_SENDER_NAME: &str = "FEEDSYNC_SENDER_NAME";

/// Configuration for a conversation feed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the messages API.
    pub base_url: String,
    /// Interval between newer-message polls.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Delay between the near-top signal and the older-page fetch.
    #[serde(with = "duration_ms")]
    pub near_top_debounce: Duration,
    /// Request timeout.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Sender stamped on local echoes.
    pub local_sender: Sender,
    /// Retry policy for poll ticks.
    pub poll_retry: RetryConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            poll_interval: Duration::from_millis(10_000),
            near_top_debounce: Duration::from_millis(50),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("feedsync/{}", env!("CARGO_PKG_VERSION")),
            local_sender: Sender::new("me", "Me"),
            poll_retry: RetryConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults overridden by `FEEDSYNC_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed or the result is invalid.
    pub fn from_env() -> FeedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`FeedConfig::from_env`] with an arbitrary variable source.
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> FeedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                SyncError::Config(format!("{ENV_POLL_INTERVAL_MS} is not a number: {raw}"))
            })?;
            config.poll_interval = Duration::from_millis(millis);
        }
        if let Some(id) = lookup(ENV_SENDER_ID) {
            config.local_sender.id = id;
        }
        if let Some(name) = lookup(ENV_SENDER_NAME) {
            config.local_sender.name = name;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> FeedResult<()> {
        if self.poll_interval.is_zero() {
            return Err(SyncError::Config("poll_interval must be > 0".to_string()));
        }

        let url = Url::parse(&self.base_url)?;
        if url.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "base_url cannot be a base: {}",
                self.base_url
            )));
        }

        if self.local_sender.id.trim().is_empty() {
            return Err(SyncError::Config(
                "local_sender.id must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Set the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the near-top debounce delay.
    #[must_use]
    pub const fn with_near_top_debounce(mut self, debounce: Duration) -> Self {
        self.near_top_debounce = debounce;
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the sender stamped on local echoes.
    #[must_use]
    pub fn with_local_sender(mut self, sender: Sender) -> Self {
        self.local_sender = sender;
        self
    }

    /// Set the poll retry policy.
    #[must_use]
    pub const fn with_poll_retry(mut self, retry: RetryConfig) -> Self {
        self.poll_retry = retry;
        self
    }
}

/// Bounded exponential backoff for poll ticks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Disable retries entirely.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff before retry number `attempt` (zero-based), jitter included.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        let jitter = if exp >= 10 {
            rand::thread_rng().gen_range(0..=exp / 10)
        } else {
            0
        };
        Duration::from_millis(exp + jitter)
    }
}

/// Serde module for millisecond durations.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(10_000));
        assert_eq!(config.near_top_debounce, Duration::from_millis(50));
        assert_eq!(config.poll_retry.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_builders() {
        let config = FeedConfig::new()
            .with_base_url("https://chat.example.com")
            .with_poll_interval(Duration::from_secs(2))
            .with_local_sender(Sender::new("u7", "Grace"))
            .with_poll_retry(RetryConfig::disabled());

        assert!(config.validate().is_ok());
        assert_eq!(config.base_url, "https://chat.example.com");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.local_sender.name, "Grace");
        assert_eq!(config.poll_retry.max_retries, 0);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = FeedConfig::new().with_poll_interval(Duration::ZERO).validate();
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_BASE_URL, "http://feeds.internal:8080"),
            (ENV_POLL_INTERVAL_MS, "2500"),
            (ENV_SENDER_NAME, "Linus"),
        ]);
        let config = FeedConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap();

        assert_eq!(config.base_url, "http://feeds.internal:8080");
        assert_eq!(config.poll_interval, Duration::from_millis(2_500));
        assert_eq!(config.local_sender.name, "Linus");
        assert_eq!(config.local_sender.id, "me");
    }

    #[test]
    fn test_from_lookup_bad_interval() {
        let result = FeedConfig::from_lookup(|key| {
            (key == ENV_POLL_INTERVAL_MS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        let first = retry.delay_for(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));
        let late = retry.delay_for(10);
        assert!(late >= Duration::from_millis(1_000) && late <= Duration::from_millis(1_100));
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let value = serde_json::to_value(FeedConfig::default()).unwrap();
        assert_eq!(value["poll_interval"], 10_000);
        assert_eq!(value["near_top_debounce"], 50);
    }
}
