//! # Sync Configuration
//!
//! Configuration for the local cache, the remote mirror and the view states.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SMARTSHOP_DB_PATH=/var/lib/smartshop/smartshop.db                  │
//! │     SMARTSHOP_PRUNE_REMOTE_DELETIONS=true                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/smartshop/smartshop.toml (Linux)                         │
//! │     ~/Library/Application Support/com.smartshop.smartshop/... (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     platform data dir database, mirror-only, 5 s grace period          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # smartshop.toml
//! [database]
//! path = "/var/lib/smartshop/smartshop.db"   # ":memory:" for a throwaway cache
//! max_connections = 5
//!
//! [mirror]
//! initial_backoff_ms = 500
//! max_backoff_secs = 60
//! prune_remote_deletions = false
//!
//! [views]
//! grace_period_ms = 5000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use smartshop_db::DbConfig;

use crate::error::{SyncError, SyncResult};

/// Database path value that selects an in-memory cache.
pub const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Database Settings
// =============================================================================

/// Local cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite file. `None` uses the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Mirror Settings
// =============================================================================

/// Remote mirror behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorSettings {
    /// First wait before resubscribing after a remote stream failure.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the resubscribe wait.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Remove local products that are missing from a remote snapshot.
    ///
    /// Off by default: the mirror only upserts, so products deleted
    /// remotely by other clients stay in the local cache.
    #[serde(default)]
    pub prune_remote_deletions: bool,
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for MirrorSettings {
    fn default() -> Self {
        MirrorSettings {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            prune_remote_deletions: false,
        }
    }
}

impl MirrorSettings {
    /// Initial resubscribe backoff.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Maximum resubscribe backoff.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// View Settings
// =============================================================================

/// View state behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSettings {
    /// How long dashboard values keep collecting after their last
    /// subscriber leaves.
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,
}

fn default_grace_period() -> u64 {
    5000
}

impl Default for ViewSettings {
    fn default() -> Self {
        ViewSettings {
            grace_period_ms: default_grace_period(),
        }
    }
}

impl ViewSettings {
    /// Dashboard grace period.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete SmartShop configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Local cache settings.
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Remote mirror settings.
    #[serde(default)]
    pub mirror: MirrorSettings,

    /// View state settings.
    #[serde(default)]
    pub views: ViewSettings,
}

impl SyncConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for tests and throwaway runs: in-memory cache, short backoff.
    pub fn in_memory() -> Self {
        SyncConfig {
            database: DatabaseSettings {
                path: Some(PathBuf::from(IN_MEMORY_PATH)),
                max_connections: 1,
            },
            mirror: MirrorSettings {
                initial_backoff_ms: 10,
                max_backoff_secs: 1,
                prune_remote_deletions: false,
            },
            views: ViewSettings::default(),
        }
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (smartshop.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(ref path) = self.database.path {
            if path.as_os_str().is_empty() {
                return Err(SyncError::InvalidConfig(
                    "database.path must not be empty".into(),
                ));
            }
        }

        if self.database.max_connections == 0 {
            return Err(SyncError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.mirror.initial_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "mirror.initial_backoff_ms must be greater than 0".into(),
            ));
        }

        if self.mirror.max_backoff() < self.mirror.initial_backoff() {
            return Err(SyncError::InvalidConfig(
                "mirror.max_backoff_secs must not be below mirror.initial_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup (the environment in production).
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("SMARTSHOP_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(max) = lookup("SMARTSHOP_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(m) => self.database.max_connections = m,
                Err(_) => warn!(value = %max, "Ignoring invalid SMARTSHOP_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(prune) = lookup("SMARTSHOP_PRUNE_REMOTE_DELETIONS") {
            match prune.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.mirror.prune_remote_deletions = true,
                "0" | "false" | "no" | "off" => self.mirror.prune_remote_deletions = false,
                _ => warn!(value = %prune, "Ignoring invalid SMARTSHOP_PRUNE_REMOTE_DELETIONS"),
            }
        }

        if let Some(grace) = lookup("SMARTSHOP_GRACE_PERIOD_MS") {
            match grace.parse::<u64>() {
                Ok(ms) => {
                    debug!(grace_period_ms = ms, "Overriding grace period from environment");
                    self.views.grace_period_ms = ms;
                }
                Err(_) => warn!(value = %grace, "Ignoring invalid SMARTSHOP_GRACE_PERIOD_MS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "smartshop", "smartshop")
            .map(|dirs| dirs.config_dir().join("smartshop.toml"))
    }

    /// Returns the default database path.
    pub fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "smartshop", "smartshop")
            .map(|dirs| dirs.data_dir().join("smartshop.db"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Resolves the database path (explicit or platform default).
    pub fn database_path(&self) -> SyncResult<PathBuf> {
        self.database
            .path
            .clone()
            .or_else(Self::default_database_path)
            .ok_or_else(|| SyncError::InvalidConfig("No database path available".into()))
    }

    /// Returns true if the cache lives in memory only.
    pub fn is_in_memory(&self) -> bool {
        self.database.path.as_deref() == Some(Path::new(IN_MEMORY_PATH))
    }

    /// Builds the database configuration.
    ///
    /// Creates the parent directory of a file-backed database.
    pub fn db_config(&self) -> SyncResult<DbConfig> {
        if self.is_in_memory() {
            return Ok(DbConfig::in_memory());
        }

        let path = self.database_path()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(DbConfig::new(path).max_connections(self.database.max_connections))
    }
}
