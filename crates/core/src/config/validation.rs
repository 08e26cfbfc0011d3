//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `api_prefix` or `offline_page` does not start with `/`
    /// - `network_timeout_ms` is under 100ms or over 60s
    /// - `retry_ceiling` is 0 or over 10
    /// - `version_suffix` is empty
    /// - `dead_letter_cap` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.origin) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(parsed) => {
                return Err(ConfigError::Invalid {
                    field: "origin".into(),
                    reason: format!("unsupported scheme: {}", parsed.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::Invalid { field: "origin".into(), reason: e.to_string() });
            }
        }

        if !self.api_prefix.starts_with('/') {
            return Err(ConfigError::Invalid { field: "api_prefix".into(), reason: "must start with /".into() });
        }
        if !self.offline_page.starts_with('/') {
            return Err(ConfigError::Invalid { field: "offline_page".into(), reason: "must start with /".into() });
        }

        if self.network_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "network_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.network_timeout_ms > 60_000 {
            return Err(ConfigError::Invalid {
                field: "network_timeout_ms".into(),
                reason: "must not exceed 60 seconds (60000ms)".into(),
            });
        }

        if self.retry_ceiling == 0 || self.retry_ceiling > 10 {
            return Err(ConfigError::Invalid {
                field: "retry_ceiling".into(),
                reason: "must be between 1 and 10".into(),
            });
        }

        if self.version_suffix.is_empty() {
            return Err(ConfigError::Invalid { field: "version_suffix".into(), reason: "must not be empty".into() });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.dead_letter_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "dead_letter_cap".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if !self.precache_routes.iter().any(|r| r == &self.offline_page) {
            tracing::warn!(
                offline_page = %self.offline_page,
                "offline_page is not in precache_routes; navigations will have no offline fallback \
                 until it is cached some other way"
            );
        }

        Ok(())
    }
}
