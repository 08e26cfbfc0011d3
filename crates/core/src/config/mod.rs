//! Worker configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (VOWKEEP_*)
//! 2. TOML config file (if VOWKEEP_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Worker configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (VOWKEEP_*)
/// 2. TOML config file (if VOWKEEP_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding cache tiers and the
    /// mutation queue.
    ///
    /// Set via VOWKEEP_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Base URL of the application origin. Requests to any other origin
    /// are not intercepted.
    ///
    /// Set via VOWKEEP_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path prefix identifying API requests.
    ///
    /// Set via VOWKEEP_API_PREFIX environment variable.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// User-Agent string for origin requests.
    ///
    /// Set via VOWKEEP_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// How long an API fetch may run before the cache fallback is taken,
    /// in milliseconds.
    ///
    /// Set via VOWKEEP_NETWORK_TIMEOUT_MS environment variable.
    #[serde(default = "default_network_timeout_ms")]
    pub network_timeout_ms: u64,

    /// Number of failed delivery attempts after which a queued mutation
    /// is abandoned to the dead-letter log.
    ///
    /// Set via VOWKEEP_RETRY_CEILING environment variable.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Cadence of the periodic queue drain, in minutes.
    ///
    /// Set via VOWKEEP_PERIODIC_SYNC_MINUTES environment variable.
    #[serde(default = "default_periodic_sync_minutes")]
    pub periodic_sync_minutes: u64,

    /// Routes fetched into the static tier at install time.
    ///
    /// Set via VOWKEEP_PRECACHE_ROUTES environment variable
    /// (comma-separated).
    #[serde(default = "default_precache_routes")]
    pub precache_routes: Vec<String>,

    /// Route of the page served when a navigation cannot be satisfied
    /// from network or cache. Must be part of the precache set.
    ///
    /// Set via VOWKEEP_OFFLINE_PAGE environment variable.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Version suffix embedded in every tier name. Bumped by the
    /// deployer; tiers carrying any other suffix are purged on activate.
    ///
    /// Set via VOWKEEP_VERSION_SUFFIX environment variable.
    #[serde(default = "default_version_suffix")]
    pub version_suffix: String,

    /// Maximum number of abandoned mutations retained in the
    /// dead-letter log; oldest entries are trimmed first.
    ///
    /// Set via VOWKEEP_DEAD_LETTER_CAP environment variable.
    #[serde(default = "default_dead_letter_cap")]
    pub dead_letter_cap: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./vowkeep.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_user_agent() -> String {
    "vowkeep/0.1".into()
}

fn default_network_timeout_ms() -> u64 {
    5_000
}

fn default_retry_ceiling() -> u32 {
    3
}

fn default_periodic_sync_minutes() -> u64 {
    15
}

fn default_precache_routes() -> Vec<String> {
    [
        "/",
        "/offline.html",
        "/dashboard",
        "/guests",
        "/vendors",
        "/budget",
        "/manifest.json",
        "/icons/icon-192.png",
        "/icons/icon-512.png",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_version_suffix() -> String {
    "v1".into()
}

fn default_dead_letter_cap() -> usize {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            api_prefix: default_api_prefix(),
            user_agent: default_user_agent(),
            network_timeout_ms: default_network_timeout_ms(),
            retry_ceiling: default_retry_ceiling(),
            periodic_sync_minutes: default_periodic_sync_minutes(),
            precache_routes: default_precache_routes(),
            offline_page: default_offline_page(),
            version_suffix: default_version_suffix(),
            dead_letter_cap: default_dead_letter_cap(),
        }
    }
}

impl AppConfig {
    /// Network timeout as a Duration for use with tokio::time::timeout.
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    /// Periodic sync cadence as a Duration.
    pub fn periodic_sync_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_sync_minutes * 60)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `VOWKEEP_`
    /// 2. TOML file from `VOWKEEP_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("VOWKEEP_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("VOWKEEP_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./vowkeep.sqlite"));
        assert_eq!(config.api_prefix, "/api/");
        assert_eq!(config.network_timeout_ms, 5_000);
        assert_eq!(config.retry_ceiling, 3);
        assert_eq!(config.version_suffix, "v1");
        assert!(config.precache_routes.contains(&config.offline_page));
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.network_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_periodic_interval() {
        let config = AppConfig { periodic_sync_minutes: 2, ..Default::default() };
        assert_eq!(config.periodic_sync_interval(), Duration::from_secs(120));
    }
}
