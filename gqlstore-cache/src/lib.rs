//! gqlstore Cache - Normalized, Subscribable Record Cache
//!
//! Ingests nested response payloads, decomposes them into flat records keyed
//! by type and id, tracks which subscriptions read which record-fields, and
//! republishes each affected subscription's merged view after every write.
//!
//! Layers, leaves first:
//!
//! - [`record`]: the record table and per-key field kinds.
//! - [`walker`]: payload decomposition and selection resolution.
//! - [`subscription`]: subscription specs and the `(record, key)` index.
//! - [`engine`]: the [`Cache`] tying them together.

pub mod engine;
pub mod record;
pub mod subscription;
pub mod walker;
pub mod watermark;

pub use engine::{Cache, CacheStats, RecordHandle, WriteSummary};
pub use record::{FieldKind, FieldValue, Record, RecordStore};
pub use subscription::{SetCallback, SubscriptionId, SubscriptionIndex, SubscriptionSpec};
pub use walker::{apply_payload, Dependency, FieldChange, PayloadWriter, SelectionReader};
pub use watermark::Watermark;

// Re-export the core types callers need alongside the cache.
pub use gqlstore_core::{
    CacheConfig, CacheError, CacheResult, FieldKey, RecordId, RecordKey, Selection, TypeInfo,
    Variables,
};
