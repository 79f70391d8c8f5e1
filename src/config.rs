use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::db::{Database, DbError};

pub const SERVICE_CONFIG_SETTING_KEY: &str = "service_config";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("config storage error: {0}")]
    Storage(#[from] DbError),
    #[error("config serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// What a producer experiences when the notification queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SaturationPolicy {
    /// Wait for a free slot. Queue saturation shows up as request latency.
    #[default]
    Block,
    /// Discard the new event, count it and log it.
    DropNewest,
}

impl SaturationPolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::DropNewest => "drop-newest",
        }
    }
}

impl std::fmt::Display for SaturationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SaturationPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "block" | "blocking" => Ok(Self::Block),
            "drop-newest" | "drop_newest" | "drop" => Ok(Self::DropNewest),
            _ => Err(format!("unsupported saturation policy: {value}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationConfig {
    #[serde(default = "default_min_limit")]
    pub min_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_page_limit")]
    pub default_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            min_limit: default_min_limit(),
            max_limit: default_max_limit(),
            default_limit: default_page_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub saturation_policy: SaturationPolicy,
    /// 1 means at-most-once delivery: a failed insert is logged and dropped.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            saturation_policy: SaturationPolicy::default(),
            max_delivery_attempts: default_max_delivery_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub notifications: DispatchConfig,
}

impl ServiceConfig {
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `BLOGWIRE_*` overrides from `lookup`. Values that do not parse
    /// are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let notifications = &mut self.notifications;
        override_parsed(&lookup, "BLOGWIRE_QUEUE_CAPACITY", &mut notifications.queue_capacity);
        override_parsed(&lookup, "BLOGWIRE_NOTIFICATION_WORKERS", &mut notifications.worker_count);
        override_parsed(&lookup, "BLOGWIRE_SATURATION_POLICY", &mut notifications.saturation_policy);
        override_parsed(
            &lookup,
            "BLOGWIRE_MAX_DELIVERY_ATTEMPTS",
            &mut notifications.max_delivery_attempts,
        );
        override_parsed(
            &lookup,
            "BLOGWIRE_SHUTDOWN_TIMEOUT_MS",
            &mut notifications.shutdown_timeout_ms,
        );

        let pagination = &mut self.pagination;
        override_parsed(&lookup, "BLOGWIRE_PAGE_LIMIT_MIN", &mut pagination.min_limit);
        override_parsed(&lookup, "BLOGWIRE_PAGE_LIMIT_MAX", &mut pagination.max_limit);
        override_parsed(&lookup, "BLOGWIRE_PAGE_LIMIT_DEFAULT", &mut pagination.default_limit);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = &self.notifications;
        if n.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification queue capacity must be greater than 0".to_string(),
            ));
        }
        if n.worker_count == 0 {
            return Err(ConfigError::Invalid(
                "notification worker count must be greater than 0".to_string(),
            ));
        }
        if n.max_delivery_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max delivery attempts must be greater than 0".to_string(),
            ));
        }

        let p = &self.pagination;
        if p.min_limit == 0 {
            return Err(ConfigError::Invalid(
                "minimum page limit must be greater than 0".to_string(),
            ));
        }
        if !(p.min_limit <= p.default_limit && p.default_limit <= p.max_limit) {
            return Err(ConfigError::Invalid(format!(
                "page limits must satisfy min <= default <= max (got {} / {} / {})",
                p.min_limit, p.default_limit, p.max_limit
            )));
        }
        Ok(())
    }
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    if raw.trim().is_empty() {
        return;
    }
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!("ignoring unparsable {key}={raw}"),
    }
}

pub fn load_service_config(db: &Database) -> Result<ServiceConfig, ConfigError> {
    let mut config = match queries::get_setting(db, SERVICE_CONFIG_SETTING_KEY)? {
        Some(raw) => serde_json::from_str::<ServiceConfig>(&raw)?,
        None => ServiceConfig::default(),
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

pub fn save_service_config(db: &Database, config: &ServiceConfig) -> Result<(), ConfigError> {
    config.validate()?;
    let value = serde_json::to_string(config)?;
    queries::upsert_setting(
        db,
        SERVICE_CONFIG_SETTING_KEY,
        &value,
        &Utc::now().to_rfc3339(),
    )?;
    Ok(())
}

fn default_min_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    100
}

fn default_page_limit() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_worker_count() -> usize {
    10
}

fn default_max_delivery_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}
