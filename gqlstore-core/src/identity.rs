//! Identity types for normalized records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Payload field carrying the concrete GraphQL type of an object.
pub const TYPENAME_FIELD: &str = "__typename";

/// Type-scoped part of a [`RecordId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKey {
    /// The singleton record of an operation root type (`Query`, `Mutation`).
    Root,
    /// An entity identified by its id field.
    Id(String),
    /// An object written without an id. Never shared between two objects.
    Synthetic(Uuid),
}

/// Identifier of one normalized record: a type name plus a type-scoped key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    type_name: String,
    key: RecordKey,
}

impl RecordId {
    /// Identifier of an entity with an explicit id.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            key: RecordKey::Id(id.into()),
        }
    }

    /// Identifier of the singleton record for an operation root type.
    pub fn root(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            key: RecordKey::Root,
        }
    }

    /// A fresh identifier for an object without an id (UUIDv7, time-sortable).
    pub fn synthetic(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            key: RecordKey::Synthetic(Uuid::now_v7()),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// The entity id, when this record was identified by one.
    pub fn entity_id(&self) -> Option<&str> {
        match &self.key {
            RecordKey::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.key, RecordKey::Root)
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.key, RecordKey::Synthetic(_))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            RecordKey::Root => write!(f, "{}", self.type_name),
            RecordKey::Id(id) => write!(f, "{}:{}", self.type_name, id),
            RecordKey::Synthetic(uuid) => write!(f, "{}:~{}", self.type_name, uuid),
        }
    }
}

/// Canonical text of an id value.
///
/// Strings are used verbatim and numbers by their decimal text, so `2` and
/// `"2"` identify the same record. Anything else is not an id.
pub fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The concrete type of `object`: its `__typename` when present, else `declared`.
pub fn concrete_type<'a>(declared: &'a str, object: &'a Value) -> &'a str {
    object
        .get(TYPENAME_FIELD)
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(declared)
}

/// Compute the record identifier for `object` under `type_name`.
///
/// Only the id field is consulted, so partial and full objects with the same
/// id resolve to the same record. A bare string or number is taken as the id
/// itself. Objects without an id get a fresh synthetic identifier on every
/// call and are therefore never merged with anything.
pub fn resolve_record_id(type_name: &str, object: &Value, id_field: &str) -> RecordId {
    let type_name = concrete_type(type_name, object);
    let id = match object {
        Value::Object(map) => map.get(id_field).and_then(id_text),
        other => id_text(other),
    };

    match id {
        Some(id) => RecordId::new(type_name, id),
        None => RecordId::synthetic(type_name),
    }
}
