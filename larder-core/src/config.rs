//! Store configuration
//!
//! Configuration is declared per store instance at its call site. Values can
//! also be loaded from environment variables with defaults suited for
//! development.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::{ConfigError, NotificationEvent, StoreResult};

/// Default freshness window: one hour.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(3600);

/// Default LMDB map size in megabytes.
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 64;

// ============================================================================
// RESET CONFIGURATION
// ============================================================================

/// Which notification events mark a store's whole cache stale.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResetConfig {
    #[serde(default)]
    events: BTreeSet<NotificationEvent>,
}

impl ResetConfig {
    /// Never reset on notifications.
    pub fn never() -> Self {
        Self::default()
    }

    /// Reset whenever one of `events` is posted.
    pub fn on<I, E>(events: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<NotificationEvent>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_never(&self) -> bool {
        self.events.is_empty()
    }

    pub fn triggers_on(&self, event: &NotificationEvent) -> bool {
        self.events.contains(event)
    }

    pub fn events(&self) -> impl Iterator<Item = &NotificationEvent> {
        self.events.iter()
    }

    /// Parse a comma-separated event list, ignoring blanks.
    pub fn parse(list: &str) -> Self {
        Self::on(
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty()),
        )
    }
}

// ============================================================================
// STORE CONFIGURATION
// ============================================================================

/// Per-store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Namespace for this store's entries in shared persistence.
    pub store_id: String,

    /// How long a cached entry is considered fresh, in seconds when serialized.
    #[serde(with = "duration_secs", rename = "freshness_window_secs")]
    pub freshness_window: Duration,

    /// Notification events that mark the whole cache stale.
    #[serde(default)]
    pub reset: ResetConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_id: "default".to_string(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            reset: ResetConfig::never(),
        }
    }
}

impl StoreConfig {
    /// Create a config for `store_id` with default values.
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            ..Self::default()
        }
    }

    /// Set the freshness window.
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Set the reset triggers.
    pub fn with_reset(mut self, reset: ResetConfig) -> Self {
        self.reset = reset;
        self
    }

    /// Create a StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `LARDER_FRESHNESS_WINDOW_SECS`: Freshness window in seconds (default: 3600)
    /// - `LARDER_RESET_EVENTS`: Comma-separated reset event names (default: none)
    pub fn from_env(store_id: impl Into<String>) -> Self {
        let freshness_window = std::env::var("LARDER_FRESHNESS_WINDOW_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FRESHNESS_WINDOW);

        let reset = std::env::var("LARDER_RESET_EVENTS")
            .ok()
            .map(|s| ResetConfig::parse(&s))
            .unwrap_or_default();

        Self {
            store_id: store_id.into(),
            freshness_window,
            reset,
        }
    }

    /// Check the config is usable.
    pub fn validate(&self) -> StoreResult<()> {
        if self.store_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "store_id".to_string(),
            }
            .into());
        }
        if self.freshness_window.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "freshness_window".to_string(),
                value: format!("{:?}", self.freshness_window),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// PERSISTENCE CONFIGURATION
// ============================================================================

/// Location and sizing of the durable cache environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub path: PathBuf,
    pub max_size_mb: usize,
}

impl PersistenceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
        }
    }

    pub fn with_max_size_mb(mut self, max_size_mb: usize) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    /// Create a PersistenceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `LARDER_LMDB_PATH`: Environment directory (required)
    /// - `LARDER_LMDB_MAX_SIZE_MB`: Map size in megabytes (default: 64)
    pub fn from_env() -> StoreResult<Self> {
        let path = std::env::var("LARDER_LMDB_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "LARDER_LMDB_PATH".to_string(),
            })?;

        let max_size_mb = match std::env::var("LARDER_LMDB_MAX_SIZE_MB") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                field: "LARDER_LMDB_MAX_SIZE_MB".to_string(),
                value: raw.clone(),
                reason: "must be a positive integer".to_string(),
            })?,
            Err(_) => DEFAULT_LMDB_MAX_SIZE_MB,
        };

        let config = Self::new(path).with_max_size_mb(max_size_mb);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        if self.max_size_mb.checked_mul(1024 * 1024).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "max_size_mb".to_string(),
                value: self.max_size_mb.to_string(),
                reason: "map size in bytes overflows usize".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
