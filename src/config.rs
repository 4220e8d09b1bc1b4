//! Engine configuration.
//!
//! Defaults follow the application's observed behavior: the profile polls
//! every 60 s, favorites and notifications never poll (mount-time load plus
//! push), reconciliation retries twice with a one second pause.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reconcile::RetryPolicy;
use crate::store::Changefeed;
use crate::subscription::SubscriptionManager;

/// Error loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables for resources, listeners and the activity tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub retry: RetryPolicy,
    pub profile_poll_ms: Option<u64>,
    pub favorites_poll_ms: Option<u64>,
    pub notifications_poll_ms: Option<u64>,
    /// Upper bound of one channel poll; bounds unsubscribe latency.
    pub channel_poll_ms: u64,
    pub reconnect_delay_ms: u64,
    pub activity_batch_size: usize,
    pub activity_flush_ms: u64,
    pub activity_max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            retry: RetryPolicy::default(),
            profile_poll_ms: Some(60_000),
            favorites_poll_ms: None,
            notifications_poll_ms: None,
            channel_poll_ms: 50,
            reconnect_delay_ms: 100,
            activity_batch_size: 20,
            activity_flush_ms: 5_000,
            activity_max_attempts: 3,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.activity_batch_size == 0 {
            return Err(ConfigError::Invalid("activity_batch_size must be positive".into()));
        }
        if self.activity_max_attempts == 0 {
            return Err(ConfigError::Invalid("activity_max_attempts must be positive".into()));
        }
        if self.channel_poll_ms == 0 {
            return Err(ConfigError::Invalid("channel_poll_ms must be positive".into()));
        }
        let zero_poll = [
            self.profile_poll_ms,
            self.favorites_poll_ms,
            self.notifications_poll_ms,
        ]
        .contains(&Some(0));
        if zero_poll {
            return Err(ConfigError::Invalid("poll intervals must be positive".into()));
        }
        Ok(())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_profile_poll(mut self, interval: Option<Duration>) -> Self {
        self.profile_poll_ms = interval.map(as_millis);
        self
    }

    pub fn with_favorites_poll(mut self, interval: Option<Duration>) -> Self {
        self.favorites_poll_ms = interval.map(as_millis);
        self
    }

    pub fn with_notifications_poll(mut self, interval: Option<Duration>) -> Self {
        self.notifications_poll_ms = interval.map(as_millis);
        self
    }

    pub fn with_channel_poll(mut self, interval: Duration) -> Self {
        self.channel_poll_ms = as_millis(interval);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = as_millis(delay);
        self
    }

    pub fn with_activity_batch_size(mut self, size: usize) -> Self {
        self.activity_batch_size = size;
        self
    }

    pub fn with_activity_flush(mut self, interval: Duration) -> Self {
        self.activity_flush_ms = as_millis(interval);
        self
    }

    pub fn with_activity_max_attempts(mut self, attempts: u32) -> Self {
        self.activity_max_attempts = attempts;
        self
    }

    pub fn profile_poll(&self) -> Option<Duration> {
        self.profile_poll_ms.map(Duration::from_millis)
    }

    pub fn favorites_poll(&self) -> Option<Duration> {
        self.favorites_poll_ms.map(Duration::from_millis)
    }

    pub fn notifications_poll(&self) -> Option<Duration> {
        self.notifications_poll_ms.map(Duration::from_millis)
    }

    pub fn activity_flush(&self) -> Duration {
        Duration::from_millis(self.activity_flush_ms)
    }

    /// A subscription manager on `feed` using this configuration's timings.
    pub fn subscription_manager<F: Changefeed + 'static>(&self, feed: F) -> SubscriptionManager {
        SubscriptionManager::new(feed)
            .with_poll_timeout(Duration::from_millis(self.channel_poll_ms))
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
    }
}

fn as_millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
