//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via UASERVE_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uaserve_core::monitored_item::ItemLimits;
use uaserve_core::subscription::SubscriptionLimits;
use uaserve_core::{EngineConfig, SessionLimits};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session configuration.
    pub session: SessionConfig,
    /// Subscription configuration.
    pub subscription: SubscriptionConfig,
    /// Publish pipeline configuration.
    pub publish: PublishConfig,
    /// Browse configuration.
    pub browse: BrowseConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Self::default();

        // Load from file if specified
        if let Ok(path) = std::env::var("UASERVE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.session.apply_env_overrides();
        self.subscription.apply_env_overrides();
        self.publish.apply_env_overrides();
        self.browse.apply_env_overrides();
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.min_timeout_ms > self.session.max_timeout_ms {
            return Err(ConfigError::ValidationError(
                "session min_timeout_ms exceeds max_timeout_ms".to_string(),
            ));
        }
        if self.subscription.min_publishing_interval_ms > self.subscription.max_publishing_interval_ms
        {
            return Err(ConfigError::ValidationError(
                "min_publishing_interval_ms exceeds max_publishing_interval_ms".to_string(),
            ));
        }
        if self.subscription.max_keep_alive_count == 0 {
            return Err(ConfigError::ValidationError(
                "max_keep_alive_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts the configuration into engine limits.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_sessions: self.session.max_sessions,
            session_limits: SessionLimits {
                min_timeout_ms: self.session.min_timeout_ms,
                max_timeout_ms: self.session.max_timeout_ms,
                max_subscriptions_per_session: self.session.max_subscriptions,
                max_pending_publish_requests: self.publish.max_pending_requests,
                max_continuation_points: self.browse.max_continuation_points,
                subscription_limits: SubscriptionLimits {
                    min_publishing_interval_ms: self.subscription.min_publishing_interval_ms,
                    max_publishing_interval_ms: self.subscription.max_publishing_interval_ms,
                    max_keep_alive_count: self.subscription.max_keep_alive_count,
                    max_lifetime_count: self.subscription.max_lifetime_count,
                    max_monitored_items: self.subscription.max_monitored_items,
                    max_retransmission_queue: self.subscription.max_retransmission_queue,
                    item_limits: ItemLimits {
                        min_sampling_interval_ms: self.subscription.min_sampling_interval_ms,
                        max_queue_size: self.subscription.max_queue_size,
                    },
                },
            },
            publish_request_timeout: Duration::from_millis(self.publish.request_timeout_ms),
            reaper_interval: Duration::from_millis(self.session.reaper_interval_ms),
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Maximum subscriptions per session.
    pub max_subscriptions: usize,
    /// Idle timeout floor in milliseconds.
    pub min_timeout_ms: f64,
    /// Idle timeout ceiling in milliseconds.
    pub max_timeout_ms: f64,
    /// Expired-session sweep interval in milliseconds.
    pub reaper_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            max_subscriptions: 100,
            min_timeout_ms: 10_000.0,
            max_timeout_ms: 3_600_000.0,
            reaper_interval_ms: 1_000,
        }
    }
}

impl SessionConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("UASERVE_MAX_SESSIONS") {
            if let Ok(n) = max.parse() {
                self.max_sessions = n;
            }
        }

        if let Ok(max) = std::env::var("UASERVE_MAX_SUBSCRIPTIONS") {
            if let Ok(n) = max.parse() {
                self.max_subscriptions = n;
            }
        }

        if let Ok(timeout) = std::env::var("UASERVE_SESSION_MAX_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.max_timeout_ms = ms;
            }
        }
    }
}

/// Subscription and monitored-item configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Publishing interval floor in milliseconds.
    pub min_publishing_interval_ms: f64,
    /// Publishing interval ceiling in milliseconds.
    pub max_publishing_interval_ms: f64,
    /// Keep-alive count ceiling.
    pub max_keep_alive_count: u32,
    /// Lifetime count ceiling.
    pub max_lifetime_count: u32,
    /// Maximum monitored items per subscription.
    pub max_monitored_items: u32,
    /// Retained unacknowledged messages per subscription.
    pub max_retransmission_queue: usize,
    /// Sampling interval floor in milliseconds.
    pub min_sampling_interval_ms: f64,
    /// Notification queue ceiling per monitored item.
    pub max_queue_size: u32,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            min_publishing_interval_ms: 100.0,
            max_publishing_interval_ms: 3_600_000.0,
            max_keep_alive_count: 100,
            max_lifetime_count: 10_000,
            max_monitored_items: 10_000,
            max_retransmission_queue: 20,
            min_sampling_interval_ms: 50.0,
            max_queue_size: 1_000,
        }
    }
}

impl SubscriptionConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(interval) = std::env::var("UASERVE_MIN_PUBLISHING_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.min_publishing_interval_ms = ms;
            }
        }

        if let Ok(interval) = std::env::var("UASERVE_MIN_SAMPLING_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.min_sampling_interval_ms = ms;
            }
        }

        if let Ok(size) = std::env::var("UASERVE_MAX_QUEUE_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_queue_size = n;
            }
        }

        if let Ok(max) = std::env::var("UASERVE_MAX_MONITORED_ITEMS") {
            if let Ok(n) = max.parse() {
                self.max_monitored_items = n;
            }
        }
    }
}

/// Publish pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Parked publish requests per session before the oldest is rejected.
    pub max_pending_requests: usize,
    /// Parked publish requests older than this fail with a timeout.
    pub request_timeout_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_pending_requests: 100,
            request_timeout_ms: 30_000,
        }
    }
}

impl PublishConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("UASERVE_MAX_PENDING_PUBLISH") {
            if let Ok(n) = max.parse() {
                self.max_pending_requests = n;
            }
        }

        if let Ok(timeout) = std::env::var("UASERVE_PUBLISH_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.request_timeout_ms = ms;
            }
        }
    }
}

/// Browse configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowseConfig {
    /// Continuation points held per session.
    pub max_continuation_points: usize,
    /// Ceiling on references per browse response, applied on top of the
    /// client's requested maximum.
    pub max_references_per_node: usize,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            max_continuation_points: 100,
            max_references_per_node: 1_000,
        }
    }
}

impl BrowseConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("UASERVE_MAX_CONTINUATION_POINTS") {
            if let Ok(n) = max.parse() {
                self.max_continuation_points = n;
            }
        }

        if let Ok(max) = std::env::var("UASERVE_MAX_BROWSE_REFERENCES") {
            if let Ok(n) = max.parse() {
                self.max_references_per_node = n;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
