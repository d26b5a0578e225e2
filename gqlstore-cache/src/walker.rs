//! Selection walker: decomposes payloads into records and resolves
//! selections back into nested values.
//!
//! Writes are driven by [`TypeInfo`]: whether a field is a link is decided
//! by its declared type, never by the shape of the value that happens to be
//! in the payload. Reads are driven by a [`Selection`] and produce exactly
//! the shape it asks for.

use std::collections::HashSet;

use gqlstore_core::{
    resolve_record_id, CacheConfig, FieldKey, RecordId, Selection, TypeInfo, Variables,
};
use serde_json::{Map, Value};

use crate::record::{FieldKind, FieldValue, RecordStore};

/// A `(record, field key)` pair a subscription depends on.
pub type Dependency = (RecordId, FieldKey);

/// One field written during a payload walk.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub record: RecordId,
    pub key: FieldKey,
    /// Value now stored.
    pub current: FieldValue,
    /// Value displaced by the write, if the key was set before.
    pub previous: Option<FieldValue>,
}

impl FieldChange {
    pub fn kind(&self) -> FieldKind {
        self.current.kind()
    }

    /// Records the field pointed at before the write but no longer does,
    /// each once, in the order they appeared before.
    pub fn removed_links(&self) -> Vec<&RecordId> {
        let current: HashSet<&RecordId> = self.current.linked_ids().into_iter().collect();
        let mut seen = HashSet::new();
        self.previous
            .iter()
            .flat_map(FieldValue::linked_ids)
            .filter(|id| !current.contains(id) && seen.insert(*id))
            .collect()
    }

    /// Whether the write stored exactly what was already there.
    pub fn is_noop(&self) -> bool {
        self.previous.as_ref() == Some(&self.current)
    }

    /// Whether a link field now points somewhere else (or a list changed
    /// membership or order).
    pub fn relinked(&self) -> bool {
        match (&self.current, &self.previous) {
            (FieldValue::Scalar(_), _) => false,
            (current, Some(previous)) => current != previous,
            (_, None) => true,
        }
    }
}

/// Applies one payload to the store, collecting a [`FieldChange`] per
/// written field. Child records are written before the link that points at
/// them, so changes come out bottom-up.
pub struct PayloadWriter<'a> {
    store: &'a mut RecordStore,
    type_info: &'a TypeInfo,
    variables: &'a Variables,
    config: &'a CacheConfig,
    changes: Vec<FieldChange>,
}

impl<'a> PayloadWriter<'a> {
    pub fn new(
        store: &'a mut RecordStore,
        type_info: &'a TypeInfo,
        variables: &'a Variables,
        config: &'a CacheConfig,
    ) -> Self {
        Self {
            store,
            type_info,
            variables,
            config,
            changes: Vec::new(),
        }
    }

    /// Write `object` into `record`, whose declared type is `declared_type`.
    pub fn apply(&mut self, declared_type: &str, record: &RecordId, object: &Map<String, Value>) {
        let type_info = self.type_info;
        self.store.get_or_create(record);

        for (name, value) in object {
            if name == &self.config.id_field && !self.config.store_id_field {
                continue;
            }

            let declared = type_info
                .field(record.type_name(), name)
                .or_else(|| type_info.field(declared_type, name));

            let (key, target_type) = match declared {
                Some(field) => {
                    let key = field.key.evaluate(self.variables).into_owned();
                    let target = type_info
                        .is_object_type(&field.type_name)
                        .then_some(field.type_name.as_str());
                    (key, target)
                }
                None => (FieldKey::new(name.as_str()), None),
            };

            match target_type {
                None => self.write_scalar(record, key, value),
                Some(target_type) => self.write_linked(record, key, target_type, value),
            }
        }
    }

    fn write_scalar(&mut self, record: &RecordId, key: FieldKey, value: &Value) {
        let previous = self.store.write_field(record, key.clone(), value.clone());
        self.push(record, key, FieldValue::Scalar(value.clone()), previous);
    }

    fn write_linked(&mut self, record: &RecordId, key: FieldKey, target_type: &str, value: &Value) {
        match value {
            Value::Object(child) => {
                let target = self.write_child(target_type, value, child);
                let current = FieldValue::Link(Some(target.clone()));
                let previous = self.store.write_link(record, key.clone(), Some(target));
                self.push(record, key, current, previous);
            }
            Value::Array(items) => {
                let targets: Vec<Option<RecordId>> = items
                    .iter()
                    .map(|item| match item {
                        Value::Object(child) => Some(self.write_child(target_type, item, child)),
                        Value::Null => None,
                        other => {
                            tracing::warn!(
                                record = %record,
                                key = %key,
                                found = %value_kind(other),
                                "non-object entry in link list, storing null"
                            );
                            None
                        }
                    })
                    .collect();
                let current = FieldValue::LinkList(Some(targets.clone()));
                let previous = self.store.write_link_list(record, key.clone(), Some(targets));
                self.push(record, key, current, previous);
            }
            Value::Null => {
                let holds_list = matches!(
                    self.store.field(record, key.as_str()),
                    Some(FieldValue::LinkList(_))
                );
                let (current, previous) = if holds_list {
                    (
                        FieldValue::LinkList(None),
                        self.store.write_link_list(record, key.clone(), None),
                    )
                } else {
                    (
                        FieldValue::Link(None),
                        self.store.write_link(record, key.clone(), None),
                    )
                };
                self.push(record, key, current, previous);
            }
            other => {
                tracing::warn!(
                    record = %record,
                    key = %key,
                    declared = target_type,
                    found = %value_kind(other),
                    "scalar value for a declared link, storing as scalar"
                );
                self.write_scalar(record, key, other);
            }
        }
    }

    fn write_child(&mut self, target_type: &str, value: &Value, child: &Map<String, Value>) -> RecordId {
        let id = resolve_record_id(target_type, value, &self.config.id_field);
        self.apply(target_type, &id, child);
        id
    }

    fn push(
        &mut self,
        record: &RecordId,
        key: FieldKey,
        current: FieldValue,
        previous: Option<FieldValue>,
    ) {
        self.changes.push(FieldChange {
            record: record.clone(),
            key,
            current,
            previous,
        });
    }

    pub fn into_changes(self) -> Vec<FieldChange> {
        self.changes
    }
}

/// Decompose `payload` into `root` and everything reachable from it.
pub fn apply_payload(
    store: &mut RecordStore,
    type_info: &TypeInfo,
    variables: &Variables,
    config: &CacheConfig,
    root: &RecordId,
    payload: &Map<String, Value>,
) -> Vec<FieldChange> {
    let mut writer = PayloadWriter::new(store, type_info, variables, config);
    writer.apply(root.type_name(), root, payload);
    writer.into_changes()
}

/// Resolves a selection against the store, optionally recording every
/// `(record, key)` it reads.
pub struct SelectionReader<'a> {
    store: &'a RecordStore,
    variables: &'a Variables,
    id_field: Option<&'a str>,
    dependencies: Option<&'a mut HashSet<Dependency>>,
}

impl<'a> SelectionReader<'a> {
    pub fn new(store: &'a RecordStore, variables: &'a Variables) -> Self {
        Self {
            store,
            variables,
            id_field: None,
            dependencies: None,
        }
    }

    /// A reader that records each `(record, key)` it touches into `dependencies`.
    pub fn tracking(
        store: &'a RecordStore,
        variables: &'a Variables,
        dependencies: &'a mut HashSet<Dependency>,
    ) -> Self {
        Self {
            store,
            variables,
            id_field: None,
            dependencies: Some(dependencies),
        }
    }

    /// Answer scalar selections of `id_field` from the record's identity
    /// when the id was not stored as a field.
    pub fn with_id_field(mut self, id_field: &'a str) -> Self {
        self.id_field = Some(id_field);
        self
    }

    /// Resolve `selection` starting at `record` into a plain object.
    ///
    /// Keys absent from the record are omitted, except the id field, which
    /// falls back to the record's entity id. Null links resolve to `null`
    /// without recursing; link lists keep order and null entries.
    pub fn resolve(&mut self, selection: &Selection, record: &RecordId) -> Value {
        let mut out = Map::new();

        for (name, field) in selection.iter() {
            let key = field.key.evaluate(self.variables);
            if let Some(deps) = self.dependencies.as_deref_mut() {
                deps.insert((record.clone(), key.clone().into_owned()));
            }

            let store = self.store;
            let Some(stored) = store.field(record, key.as_str()) else {
                if let Some(id) = self.identity_of(record, field.is_link(), key.as_str()) {
                    out.insert(name.to_string(), Value::String(id.to_string()));
                }
                continue;
            };

            let resolved = match (&field.fields, stored) {
                (None, FieldValue::Scalar(value)) => Some(value.clone()),
                (Some(_), FieldValue::Link(None)) | (Some(_), FieldValue::LinkList(None)) => {
                    Some(Value::Null)
                }
                (Some(nested), FieldValue::Link(Some(target))) => {
                    Some(self.resolve(nested, target))
                }
                (Some(nested), FieldValue::LinkList(Some(targets))) => Some(Value::Array(
                    targets
                        .iter()
                        .map(|target| match target {
                            Some(target) => self.resolve(nested, target),
                            None => Value::Null,
                        })
                        .collect(),
                )),
                (Some(_), FieldValue::Scalar(Value::Null)) => Some(Value::Null),
                (_, other) => {
                    tracing::trace!(
                        record = %record,
                        key = %key,
                        stored = ?other.kind(),
                        "selection does not match stored kind, omitting"
                    );
                    None
                }
            };

            if let Some(value) = resolved {
                out.insert(name.to_string(), value);
            }
        }

        Value::Object(out)
    }

    fn identity_of<'r>(&self, record: &'r RecordId, is_link: bool, key: &str) -> Option<&'r str> {
        match self.id_field {
            Some(id_field) if !is_link && key == id_field => record.entity_id(),
            _ => None,
        }
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
