//! gqlstore Core - Shared Types
//!
//! Pure data structures used by the cache engine and by whoever produces its
//! inputs: record identity, argument-aware field keys, generated artifact
//! shapes, configuration and the error taxonomy. No cache behavior lives
//! here.

pub mod artifact;
pub mod config;
pub mod error;
pub mod field_key;
pub mod identity;

pub use artifact::{Selection, SelectionField, TypeField, TypeInfo, Variables};
pub use config::{CacheConfig, DEFAULT_ID_FIELD};
pub use error::{ArtifactError, CacheError, CacheResult, ConfigError, PayloadError};
pub use field_key::{write_literal, FieldKey};
pub use identity::{
    concrete_type, id_text, resolve_record_id, RecordId, RecordKey, TYPENAME_FIELD,
};
