//! Subscriptions and the `(record, field key) -> subscriptions` index.
//!
//! The index is kept precise: a subscription is registered under exactly the
//! record-fields its last walk reached. When a link moves away from a record
//! the next walk no longer reaches it and [`SubscriptionIndex::rebind`]
//! drops those entries, while entries still reached through another path
//! (the same record selected twice) survive.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use gqlstore_core::{FieldKey, RecordId, Selection, Variables};
use serde_json::Value;

use crate::walker::Dependency;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Callback receiving a subscription's refreshed value.
pub type SetCallback = Box<dyn FnMut(&Value) + Send>;

/// A consumer's interest: a root record, a selection below it, and where to
/// deliver refreshed values.
pub struct SubscriptionSpec {
    pub root_type: String,
    /// Entity to start from; `None` starts at the root record of `root_type`.
    pub root_id: Option<RecordId>,
    pub selection: Selection,
    /// Values for `$variables` in the selection's field keys.
    pub variables: Variables,
    set: SetCallback,
}

impl SubscriptionSpec {
    pub fn new(
        root_type: impl Into<String>,
        selection: Selection,
        set: impl FnMut(&Value) + Send + 'static,
    ) -> Self {
        Self {
            root_type: root_type.into(),
            root_id: None,
            selection,
            variables: Variables::new(),
            set: Box::new(set),
        }
    }

    /// Start from an entity instead of the operation root (fragments).
    pub fn with_root_id(mut self, root_id: RecordId) -> Self {
        self.root_id = Some(root_id);
        self
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// The record the selection is resolved against.
    pub fn root(&self) -> RecordId {
        self.root_id
            .clone()
            .unwrap_or_else(|| RecordId::root(self.root_type.as_str()))
    }

    pub(crate) fn deliver(&mut self, value: &Value) {
        (self.set)(value)
    }
}

impl fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSpec")
            .field("root_type", &self.root_type)
            .field("root_id", &self.root_id)
            .field("selection", &self.selection)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// Per-record, per-field-key sets of dependent subscriptions, with a reverse
/// index so a subscription's entries can be dropped without a full scan.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    entries: HashMap<RecordId, HashMap<FieldKey, BTreeSet<SubscriptionId>>>,
    reverse: HashMap<SubscriptionId, HashSet<Dependency>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` under `(record, key)`. Returns `false` if it was already there.
    pub fn register(&mut self, id: SubscriptionId, record: &RecordId, key: &FieldKey) -> bool {
        let added = self
            .entries
            .entry(record.clone())
            .or_default()
            .entry(key.clone())
            .or_default()
            .insert(id);
        if added {
            self.reverse
                .entry(id)
                .or_default()
                .insert((record.clone(), key.clone()));
        }
        added
    }

    /// Remove `id` from `(record, key)` only. Returns whether it was present.
    pub fn unregister_from(&mut self, id: SubscriptionId, record: &RecordId, key: &FieldKey) -> bool {
        let removed = self.remove_entry(id, record, key);
        if let Some(deps) = self.reverse.get_mut(&id) {
            deps.remove(&(record.clone(), key.clone()));
            if deps.is_empty() {
                self.reverse.remove(&id);
            }
        }
        removed
    }

    /// Remove `id` from every entry. Returns how many entries it left.
    pub fn unregister_all(&mut self, id: SubscriptionId) -> usize {
        let Some(deps) = self.reverse.remove(&id) else {
            return 0;
        };
        let count = deps.len();
        for (record, key) in deps {
            self.remove_entry(id, &record, &key);
        }
        count
    }

    /// Subscriptions registered under `(record, key)`, in id order.
    pub fn collect(&self, record: &RecordId, key: &str) -> Vec<SubscriptionId> {
        self.entries
            .get(record)
            .and_then(|fields| fields.get(key))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn dependencies(&self, id: SubscriptionId) -> Option<&HashSet<Dependency>> {
        self.reverse.get(&id)
    }

    /// Make `id`'s entries exactly `reached`: register new record-fields and
    /// unregister the ones no longer reached. Returns `(added, removed)`.
    pub fn rebind(&mut self, id: SubscriptionId, reached: HashSet<Dependency>) -> (usize, usize) {
        let previous = self.reverse.remove(&id).unwrap_or_default();

        let mut removed = 0;
        for (record, key) in previous.difference(&reached) {
            if self.remove_entry(id, record, key) {
                removed += 1;
            }
        }

        let mut added = 0;
        for (record, key) in reached.difference(&previous) {
            if self
                .entries
                .entry(record.clone())
                .or_default()
                .entry(key.clone())
                .or_default()
                .insert(id)
            {
                added += 1;
            }
        }

        if !reached.is_empty() {
            self.reverse.insert(id, reached);
        }
        (added, removed)
    }

    /// Number of `(record, key, subscription)` registrations.
    pub fn entry_count(&self) -> usize {
        self.reverse.values().map(HashSet::len).sum()
    }

    fn remove_entry(&mut self, id: SubscriptionId, record: &RecordId, key: &FieldKey) -> bool {
        let Some(fields) = self.entries.get_mut(record) else {
            return false;
        };
        let Some(ids) = fields.get_mut(key) else {
            return false;
        };
        let removed = ids.remove(&id);
        if ids.is_empty() {
            fields.remove(key);
        }
        if fields.is_empty() {
            self.entries.remove(record);
        }
        removed
    }
}
