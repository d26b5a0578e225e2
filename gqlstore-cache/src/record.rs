//! Flat record table.
//!
//! Every normalized object lives here as one [`Record`] keyed by
//! [`RecordId`]. Links between records are stored as ids, never as owned
//! references, so cyclic graphs (a user whose friend links back) need no
//! special handling. Records are created on first write and never removed.

use gqlstore_core::{FieldKey, RecordId};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// What a field key currently holds on a record.
///
/// One enum per key keeps the three kinds mutually exclusive: writing a key
/// as a different kind replaces whatever was there.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Scalar or list of scalars.
    Scalar(Value),
    /// Singular link, `None` when the payload held `null`.
    Link(Option<RecordId>),
    /// Ordered link list with nullable entries; `None` when the list itself
    /// was `null`.
    LinkList(Option<Vec<Option<RecordId>>>),
}

/// Discriminant of [`FieldValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar,
    Link,
    LinkList,
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Scalar(_) => FieldKind::Scalar,
            FieldValue::Link(_) => FieldKind::Link,
            FieldValue::LinkList(_) => FieldKind::LinkList,
        }
    }

    /// Every record this value points at, in order.
    pub fn linked_ids(&self) -> Vec<&RecordId> {
        match self {
            FieldValue::Scalar(_) => Vec::new(),
            FieldValue::Link(target) => target.iter().collect(),
            FieldValue::LinkList(list) => list.iter().flatten().flatten().collect(),
        }
    }
}

/// One normalized entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    fields: HashMap<FieldKey, FieldValue>,
}

impl Record {
    fn new(id: RecordId) -> Self {
        Self {
            id,
            fields: HashMap::new(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Scalar fields only, keyed by field key.
    pub fn scalars(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|(key, value)| match value {
                FieldValue::Scalar(v) => Some((key.to_string(), v.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn put(&mut self, key: FieldKey, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(key, value)
    }
}

/// The record table. Owns all mutation of cached data.
///
/// Writes never cascade: replacing a link does not touch the old or new
/// target. Each write returns the value it displaced so callers can diff.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<RecordId, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    /// The record for `id`, created empty if it does not exist yet.
    pub fn get_or_create(&mut self, id: &RecordId) -> &mut Record {
        self.records
            .entry(id.clone())
            .or_insert_with(|| Record::new(id.clone()))
    }

    pub fn field(&self, id: &RecordId, key: &str) -> Option<&FieldValue> {
        self.records.get(id)?.get(key)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    /// Assign a scalar (or scalar list). Returns the displaced value of any kind.
    pub fn write_field(&mut self, id: &RecordId, key: FieldKey, value: Value) -> Option<FieldValue> {
        self.get_or_create(id).put(key, FieldValue::Scalar(value))
    }

    /// Point `key` at `target` (or at nothing). Returns the displaced value.
    pub fn write_link(
        &mut self,
        id: &RecordId,
        key: FieldKey,
        target: Option<RecordId>,
    ) -> Option<FieldValue> {
        self.get_or_create(id).put(key, FieldValue::Link(target))
    }

    /// Replace the ordered list under `key`. Returns the displaced value.
    pub fn write_link_list(
        &mut self,
        id: &RecordId,
        key: FieldKey,
        targets: Option<Vec<Option<RecordId>>>,
    ) -> Option<FieldValue> {
        self.get_or_create(id).put(key, FieldValue::LinkList(targets))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
