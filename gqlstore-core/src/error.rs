//! Error types for gqlstore operations

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value:?} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors raised while loading generated artifacts (type-info, selections).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("Malformed {artifact} artifact: {reason}")]
    Malformed { artifact: String, reason: String },
}

/// Errors raised for payloads the cache cannot decompose at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Payload for root type {root_type} must be an object, got {found}")]
    RootNotObject { root_type: String, found: String },
}

/// Master error type for all gqlstore errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),
}

/// Result type alias for gqlstore operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
