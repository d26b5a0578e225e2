//! The cache engine.
//!
//! A write runs to completion in four steps before any consumer sees it:
//!
//! 1. decompose the payload into record writes ([`FieldChange`]s);
//! 2. collect the subscriptions registered on any written `(record, key)`;
//! 3. re-walk each of them, rebinding the index to what it now reaches;
//! 4. call each subscription's `set` exactly once with its refreshed value.
//!
//! All state lives in one [`Cache`] value. Mutating operations take
//! `&mut self`, so a write has exclusive access from decomposition to the
//! last notification.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use gqlstore_core::{
    resolve_record_id, CacheConfig, CacheError, CacheResult, PayloadError, RecordId, Selection,
    TypeInfo, Variables,
};
use serde_json::{Map, Value};

use crate::record::{FieldValue, RecordStore};
use crate::subscription::{SubscriptionId, SubscriptionIndex, SubscriptionSpec};
use crate::walker::{apply_payload, value_kind, FieldChange, SelectionReader};
use crate::watermark::Watermark;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of records in the store.
    pub records: usize,
    /// Number of live subscriptions.
    pub subscriptions: usize,
    /// Number of `(record, key, subscription)` index registrations.
    pub index_entries: usize,
    /// Number of completed writes.
    pub writes: u64,
    /// Number of `set` calls made.
    pub notifications: u64,
    /// Number of `set` calls skipped because the value was unchanged.
    pub suppressed: u64,
    /// When the most recent write started; `None` before the first write.
    pub last_write_at: Option<DateTime<Utc>>,
}

/// Outcome of one [`Cache::write`].
#[derive(Debug, Clone)]
pub struct WriteSummary {
    pub watermark: Watermark,
    /// Every field written, bottom-up.
    pub changes: Vec<FieldChange>,
    /// Subscriptions whose `set` was called, in notification order.
    pub notified: Vec<SubscriptionId>,
    /// Subscriptions that were affected but whose value had not changed.
    pub suppressed: Vec<SubscriptionId>,
}

impl WriteSummary {
    /// Number of distinct records written.
    pub fn records_touched(&self) -> usize {
        self.changes
            .iter()
            .map(|change| &change.record)
            .collect::<HashSet<_>>()
            .len()
    }
}

struct Subscription {
    spec: SubscriptionSpec,
    last_value: Option<Value>,
}

/// Normalized, subscribable object cache.
pub struct Cache {
    config: CacheConfig,
    store: RecordStore,
    index: SubscriptionIndex,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    next_subscription: u64,
    watermark: Watermark,
    notifications: u64,
    suppressed: u64,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Create an empty cache with default configuration.
    pub fn new() -> Self {
        Self::build(CacheConfig::default())
    }

    /// Create an empty cache with `config`, rejecting invalid configuration.
    pub fn with_config(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        Self {
            config,
            store: RecordStore::new(),
            index: SubscriptionIndex::new(),
            subscriptions: HashMap::new(),
            next_subscription: 1,
            watermark: Watermark::zero(),
            notifications: 0,
            suppressed: 0,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Record identifier for `object` under `type_name`.
    pub fn id(&self, type_name: &str, object: &Value) -> RecordId {
        resolve_record_id(type_name, object, &self.config.id_field)
    }

    /// Handle on the record `id`. Never fails: a record that was never
    /// written reads as empty.
    pub fn get(&self, id: &RecordId) -> RecordHandle<'_> {
        RecordHandle {
            store: &self.store,
            index: &self.index,
            id: id.clone(),
        }
    }

    /// Shorthand for `get(&id(type_name, object))`.
    pub fn record(&self, type_name: &str, object: &Value) -> RecordHandle<'_> {
        self.get(&self.id(type_name, object))
    }

    /// Resolve `selection` from `root` without subscribing.
    pub fn read(&self, root: &RecordId, selection: &Selection, variables: &Variables) -> Value {
        SelectionReader::new(&self.store, variables)
            .with_id_field(&self.config.id_field)
            .resolve(selection, root)
    }

    /// Write a response payload and notify every affected subscription.
    ///
    /// Partial objects merge into existing records. Fails only when the
    /// payload is not an object, in which case nothing is written.
    pub fn write(
        &mut self,
        type_info: &TypeInfo,
        payload: &Value,
        variables: &Variables,
    ) -> CacheResult<WriteSummary> {
        let Value::Object(object) = payload else {
            return Err(CacheError::Payload(PayloadError::RootNotObject {
                root_type: type_info.root_type.clone(),
                found: value_kind(payload).to_string(),
            }));
        };

        let root = RecordId::root(type_info.root_type.as_str());
        self.write_record(type_info, &root, object, variables)
    }

    /// Write `object` into an arbitrary record (fragment writes). `type_info`
    /// describes the record's type.
    pub fn write_record(
        &mut self,
        type_info: &TypeInfo,
        record: &RecordId,
        object: &Map<String, Value>,
        variables: &Variables,
    ) -> CacheResult<WriteSummary> {
        let watermark = self.watermark.advance();
        tracing::debug!(
            record = %record,
            sequence = watermark.sequence,
            "applying payload"
        );

        let changes = apply_payload(
            &mut self.store,
            type_info,
            variables,
            &self.config,
            record,
            object,
        );

        let affected = self.affected_by(&changes);
        let mut refreshed = Vec::with_capacity(affected.len());
        for id in affected {
            if let Some(value) = self.refresh(id) {
                refreshed.push((id, value));
            }
        }

        let mut notified = Vec::with_capacity(refreshed.len());
        let mut suppressed = Vec::new();
        for (id, value) in refreshed {
            if self.deliver(id, value) {
                notified.push(id);
            } else {
                suppressed.push(id);
            }
        }

        self.watermark = watermark;
        tracing::debug!(
            record = %record,
            sequence = watermark.sequence,
            changes = changes.len(),
            notified = notified.len(),
            suppressed = suppressed.len(),
            "payload applied"
        );

        Ok(WriteSummary {
            watermark,
            changes,
            notified,
            suppressed,
        })
    }

    /// Register `spec` against everything its selection currently reaches.
    ///
    /// `set` is not called here; it fires on the next write that touches a
    /// dependency. Use [`Cache::read`] for the current value.
    pub fn subscribe(&mut self, spec: SubscriptionSpec) -> SubscriptionId {
        let id = SubscriptionId::from_raw(self.next_subscription);
        self.next_subscription += 1;

        let mut reached = HashSet::new();
        let value = SelectionReader::tracking(&self.store, &spec.variables, &mut reached)
            .with_id_field(&self.config.id_field)
            .resolve(&spec.selection, &spec.root());
        let (added, _) = self.index.rebind(id, reached);
        tracing::debug!(subscription = %id, root = %spec.root(), entries = added, "subscribed");

        let last_value = self.config.dedupe_notifications.then_some(value);
        self.subscriptions.insert(id, Subscription { spec, last_value });
        id
    }

    /// Drop `id` and every index entry it holds. Returns `false` for an
    /// unknown (or already removed) subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        if self.subscriptions.remove(&id).is_none() {
            return false;
        }
        let removed = self.index.unregister_all(id);
        tracing::debug!(subscription = %id, entries = removed, "unsubscribed");
        true
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscriptions.contains_key(&id)
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Whether anything was written after `mark` was taken.
    pub fn changed_since(&self, mark: &Watermark) -> bool {
        self.watermark.is_newer_than(mark)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            records: self.store.len(),
            subscriptions: self.subscriptions.len(),
            index_entries: self.index.entry_count(),
            writes: self.watermark.sequence,
            notifications: self.notifications,
            suppressed: self.suppressed,
            last_write_at: (self.watermark.sequence > 0).then_some(self.watermark.observed_at),
        }
    }

    /// Subscriptions registered on any changed `(record, key)`, each once,
    /// in the order they first became affected. Writes that stored what was
    /// already there affect nobody.
    fn affected_by(&self, changes: &[FieldChange]) -> Vec<SubscriptionId> {
        let mut seen = HashSet::new();
        let mut affected = Vec::new();
        for change in changes.iter().filter(|change| !change.is_noop()) {
            if change.relinked() {
                tracing::trace!(
                    record = %change.record,
                    key = %change.key,
                    removed = ?change.removed_links(),
                    "link moved"
                );
            }
            for id in self.index.collect(&change.record, change.key.as_str()) {
                if seen.insert(id) {
                    affected.push(id);
                }
            }
        }
        affected
    }

    /// Re-walk `id`'s selection, rebind its index entries and return the
    /// refreshed value.
    fn refresh(&mut self, id: SubscriptionId) -> Option<Value> {
        let subscription = self.subscriptions.get(&id)?;
        let spec = &subscription.spec;

        let mut reached = HashSet::new();
        let value = SelectionReader::tracking(&self.store, &spec.variables, &mut reached)
            .with_id_field(&self.config.id_field)
            .resolve(&spec.selection, &spec.root());
        let (added, removed) = self.index.rebind(id, reached);
        if added > 0 || removed > 0 {
            tracing::trace!(subscription = %id, added, removed, "rebound subscription");
        }
        Some(value)
    }

    /// Call `set` unless deduplication says the consumer already has `value`.
    fn deliver(&mut self, id: SubscriptionId, value: Value) -> bool {
        let Some(subscription) = self.subscriptions.get_mut(&id) else {
            return false;
        };

        if self.config.dedupe_notifications {
            if subscription.last_value.as_ref() == Some(&value) {
                self.suppressed += 1;
                tracing::trace!(subscription = %id, "value unchanged, notification suppressed");
                return false;
            }
            subscription.spec.deliver(&value);
            subscription.last_value = Some(value);
        } else {
            subscription.spec.deliver(&value);
        }

        self.notifications += 1;
        tracing::trace!(subscription = %id, "notified");
        true
    }
}

/// Read view of one record.
///
/// Borrows the cache; re-`get` after a write to observe new data.
#[derive(Debug, Clone)]
pub struct RecordHandle<'a> {
    store: &'a RecordStore,
    index: &'a SubscriptionIndex,
    id: RecordId,
}

impl<'a> RecordHandle<'a> {
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Whether anything has been written to this record.
    pub fn exists(&self) -> bool {
        self.store.contains(&self.id)
    }

    /// Scalar fields keyed by field key. Links are not included.
    pub fn fields(&self) -> Map<String, Value> {
        self.store
            .get(&self.id)
            .map(|record| record.scalars())
            .unwrap_or_default()
    }

    /// The scalar stored under `key`.
    pub fn field(&self, key: &str) -> Option<&'a Value> {
        match self.store.field(&self.id, key)? {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Whatever is stored under `key`, of any kind.
    pub fn value(&self, key: &str) -> Option<&'a FieldValue> {
        self.store.field(&self.id, key)
    }

    /// The record linked under `key`; `None` for a null link or a key that
    /// is not a singular link.
    pub fn linked_record(&self, key: &str) -> Option<RecordHandle<'a>> {
        match self.store.field(&self.id, key)? {
            FieldValue::Link(Some(target)) => Some(self.sibling(target)),
            _ => None,
        }
    }

    /// The records linked under `key`, in order, with null entries kept.
    /// Empty when the key is not a link list or the list is null.
    pub fn linked_list(&self, key: &str) -> Vec<Option<RecordHandle<'a>>> {
        match self.store.field(&self.id, key) {
            Some(FieldValue::LinkList(Some(targets))) => targets
                .iter()
                .map(|target| target.as_ref().map(|id| self.sibling(id)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Subscriptions currently registered on this record's `key`.
    pub fn subscribers(&self, key: &str) -> Vec<SubscriptionId> {
        self.index.collect(&self.id, key)
    }

    fn sibling(&self, id: &RecordId) -> RecordHandle<'a> {
        RecordHandle {
            store: self.store,
            index: self.index,
            id: id.clone(),
        }
    }
}
