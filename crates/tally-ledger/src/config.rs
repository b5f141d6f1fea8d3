//! # Ledger Configuration
//!
//! Settings for the store, conflict retries, the notifier and sale creation.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DATABASE_PATH=/var/lib/tally/tally.db                        │
//! │     TALLY_RETRY_MAX_ATTEMPTS=8                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/ledger.toml (Linux)                            │
//! │     ~/Library/Application Support/com.tally.pos/ledger.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # ledger.toml
//! [database]
//! path = "tally.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [retry]
//! initial_backoff_ms = 10
//! max_backoff_ms = 500
//! max_attempts = 5
//!
//! [notifier]
//! channel_capacity = 256
//!
//! [sales]
//! code_attempts = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tally_db::DbConfig;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

// =============================================================================
// Database Settings
// =============================================================================

/// Where the ledger store lives and how the pool behaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:` for a private in-memory store.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite waits on a locked database before reporting busy.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// How long to wait for a pooled connection.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tally.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Bounds for redoing an operation that hit a [`crate::LedgerError::Conflict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Total time budget across all attempts.
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_ms: u64,

    /// Attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_backoff() -> u64 {
    10
}
fn default_max_backoff() -> u64 {
    500
}
fn default_max_elapsed() -> u64 {
    5_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            max_elapsed_ms: default_max_elapsed(),
            max_attempts: default_max_attempts(),
            multiplier: default_multiplier(),
        }
    }
}

// =============================================================================
// Notifier / Sales Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Events buffered per subscriber before the oldest are dropped.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for NotifierSettings {
    fn default() -> Self {
        NotifierSettings {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesSettings {
    /// Random sale codes tried before giving up with a conflict.
    #[serde(default = "default_code_attempts")]
    pub code_attempts: u32,
}

fn default_code_attempts() -> u32 {
    10
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            code_attempts: default_code_attempts(),
        }
    }
}

// =============================================================================
// Main Ledger Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub notifier: NotifierSettings,

    #[serde(default)]
    pub sales: SalesSettings,
}

impl LedgerConfig {
    /// Defaults with an in-memory store. Used by tests and demos.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.path = PathBuf::from(":memory:");
        config.database.max_connections = 1;
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be greater than 0".into(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }
        if self.notifier.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notifier.channel_capacity must be greater than 0".into(),
            ));
        }
        if self.sales.code_attempts == 0 {
            return Err(ConfigError::Invalid(
                "sales.code_attempts must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Applies `TALLY_*` overrides read through `lookup`.
    ///
    /// Unparseable numbers are logged and ignored.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TALLY_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        override_number(&lookup, "TALLY_DATABASE_MAX_CONNECTIONS", &mut self.database.max_connections);
        override_number(&lookup, "TALLY_DATABASE_BUSY_TIMEOUT_MS", &mut self.database.busy_timeout_ms);
        override_number(&lookup, "TALLY_RETRY_MAX_ATTEMPTS", &mut self.retry.max_attempts);
        override_number(&lookup, "TALLY_RETRY_MAX_ELAPSED_MS", &mut self.retry.max_elapsed_ms);
        override_number(&lookup, "TALLY_NOTIFIER_CAPACITY", &mut self.notifier.channel_capacity);
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    // =========================================================================
    // Derived settings
    // =========================================================================

    /// Pool configuration for [`tally_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        let base = if self.database.path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
        };

        base.busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .connect_timeout(Duration::from_secs(self.database.acquire_timeout_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(self.retry.initial_backoff_ms),
            max_interval: Duration::from_millis(self.retry.max_backoff_ms),
            max_elapsed: Duration::from_millis(self.retry.max_elapsed_ms),
            max_attempts: self.retry.max_attempts,
            multiplier: self.retry.multiplier,
        }
    }
}

fn override_number<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.parse::<T>() {
            Ok(value) => {
                debug!(key, value = %raw, "Overriding setting from environment");
                *slot = value;
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable environment override"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.database.path, PathBuf::from("tally.db"));
        assert_eq!(config.notifier.channel_capacity, 256);
        assert_eq!(config.sales.code_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [database]
            path = "/tmp/store.db"

            [retry]
            max_attempts = 9
        "#;

        let config: LedgerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/store.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.retry.max_attempts, 9);
        assert_eq!(config.retry.initial_backoff_ms, 10);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TALLY_DATABASE_PATH", "/data/pos.db"),
            ("TALLY_RETRY_MAX_ATTEMPTS", "8"),
            ("TALLY_NOTIFIER_CAPACITY", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = LedgerConfig::default();
        config.apply_env_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/data/pos.db"));
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.notifier.channel_capacity, 256);
    }

    #[test]
    fn test_validation_rejects_zero_bounds() {
        let mut config = LedgerConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = LedgerConfig::default();
        config.notifier.channel_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.retry.initial_backoff_ms = 1_000;
        config.retry.max_backoff_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("tally-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ledger.toml");
        std::fs::write(&path, "[sales]\ncode_attempts = 3\n").unwrap();

        let config = LedgerConfig::load(Some(path)).unwrap();
        assert_eq!(config.sales.code_attempts, 3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("tally-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("ledger.toml");

        let mut config = LedgerConfig::default();
        config.retry.max_backoff_ms = 750;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: LedgerConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_in_memory_db_config() {
        let config = LedgerConfig::in_memory();
        let db = config.db_config();
        assert!(db.is_in_memory());
        assert_eq!(db.max_connections, 1);
    }
}
