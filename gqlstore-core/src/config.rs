//! Configuration types

use crate::{CacheError, CacheResult, ConfigError};
use serde::{Deserialize, Serialize};

/// Default name of the identifying field on payload objects.
pub const DEFAULT_ID_FIELD: &str = "id";

/// Configuration for a [`Cache`](../gqlstore_cache/struct.Cache.html) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Payload field whose value identifies a record.
    pub id_field: String,
    /// Keep the id field in the record's scalar fields after it has been
    /// consumed for identity.
    pub store_id_field: bool,
    /// Skip `set` when the refreshed value equals the last value delivered
    /// to that subscription.
    pub dedupe_notifications: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            id_field: DEFAULT_ID_FIELD.to_string(),
            store_id_field: false,
            dedupe_notifications: false,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identifying field name.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Keep or drop the id field from stored scalars.
    pub fn with_store_id_field(mut self, enabled: bool) -> Self {
        self.store_id_field = enabled;
        self
    }

    /// Enable or disable suppression of unchanged notifications.
    pub fn with_dedupe_notifications(mut self, enabled: bool) -> Self {
        self.dedupe_notifications = enabled;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `GQLSTORE_ID_FIELD`: identifying field name (default: `id`)
    /// - `GQLSTORE_STORE_ID_FIELD`: keep the id among scalar fields (default: false)
    /// - `GQLSTORE_DEDUPE_NOTIFICATIONS`: suppress unchanged notifications (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            id_field: std::env::var("GQLSTORE_ID_FIELD")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.id_field),
            store_id_field: std::env::var("GQLSTORE_STORE_ID_FIELD")
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.store_id_field),
            dedupe_notifications: std::env::var("GQLSTORE_DEDUPE_NOTIFICATIONS")
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.dedupe_notifications),
        }
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(CacheError::Config) if invalid.
    pub fn validate(&self) -> CacheResult<()> {
        if self.id_field.trim().is_empty() {
            return Err(CacheError::Config(ConfigError::InvalidValue {
                field: "id_field".to_string(),
                value: self.id_field.clone(),
                reason: "id_field must not be blank".to_string(),
            }));
        }

        if self.id_field.chars().any(|c| c.is_whitespace() || c == '(') {
            return Err(CacheError::Config(ConfigError::InvalidValue {
                field: "id_field".to_string(),
                value: self.id_field.clone(),
                reason: "id_field must be a plain field name".to_string(),
            }));
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================
