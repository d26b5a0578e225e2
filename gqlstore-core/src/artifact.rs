//! Inputs produced by the artifact generator.
//!
//! Two shapes cross the boundary into the cache:
//!
//! - [`TypeInfo`]: for a response, which fields of which types are links to
//!   other objects and what their canonical field keys are. Used by writes.
//! - [`Selection`]: the fields (recursively) a consumer wants resolved. Used
//!   by reads and subscriptions.
//!
//! Both deserialize from the JSON the generator emits (`rootType`, `type`,
//! `key`, `fields`) and are treated as read-only by the cache.

use crate::{ArtifactError, CacheError, CacheResult, FieldKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Operation variables, keyed by name without the leading `$`.
pub type Variables = serde_json::Map<String, Value>;

/// Type and key of one field, as declared for a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
    #[serde(rename = "type")]
    pub type_name: String,
    pub key: FieldKey,
}

/// Per-response type information.
///
/// A field is a link when its declared type is itself one of the types in
/// `fields`; every other field, including fields missing from the map, is
/// stored as a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeInfo {
    pub root_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, BTreeMap<String, TypeField>>,
}

impl TypeInfo {
    pub fn new(root_type: impl Into<String>) -> Self {
        Self {
            root_type: root_type.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Declare `parent.field` with its type and canonical key.
    pub fn with_field(
        mut self,
        parent: &str,
        field: &str,
        type_name: &str,
        key: impl Into<FieldKey>,
    ) -> Self {
        self.fields.entry(parent.to_string()).or_default().insert(
            field.to_string(),
            TypeField {
                type_name: type_name.to_string(),
                key: key.into(),
            },
        );
        self
    }

    /// Parse the generator's JSON representation.
    pub fn from_json(raw: &str) -> CacheResult<Self> {
        serde_json::from_str(raw).map_err(|e| {
            CacheError::Artifact(ArtifactError::Malformed {
                artifact: "type-info".to_string(),
                reason: e.to_string(),
            })
        })
    }

    pub fn field(&self, type_name: &str, field: &str) -> Option<&TypeField> {
        self.fields.get(type_name)?.get(field)
    }

    /// Whether `type_name` is an object type (has declared fields).
    pub fn is_object_type(&self, type_name: &str) -> bool {
        self.fields.contains_key(type_name)
    }
}

/// One entry of a [`Selection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionField {
    /// Declared type. Informational for scalars.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub key: FieldKey,
    /// Sub-selection; present exactly when the field is a link or link-list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Selection>,
}

impl SelectionField {
    pub fn is_link(&self) -> bool {
        self.fields.is_some()
    }
}

/// Response name -> field to resolve, recursively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(BTreeMap<String, SelectionField>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar field under `name`.
    pub fn scalar(mut self, name: &str, key: impl Into<FieldKey>) -> Self {
        self.0.insert(
            name.to_string(),
            SelectionField {
                type_name: None,
                key: key.into(),
                fields: None,
            },
        );
        self
    }

    /// Add a link (or link-list) field under `name` with its sub-selection.
    pub fn link(
        mut self,
        name: &str,
        type_name: &str,
        key: impl Into<FieldKey>,
        fields: Selection,
    ) -> Self {
        self.0.insert(
            name.to_string(),
            SelectionField {
                type_name: Some(type_name.to_string()),
                key: key.into(),
                fields: Some(fields),
            },
        );
        self
    }

    /// Parse the generator's JSON representation.
    pub fn from_json(raw: &str) -> CacheResult<Self> {
        serde_json::from_str(raw).map_err(|e| {
            CacheError::Artifact(ArtifactError::Malformed {
                artifact: "selection".to_string(),
                reason: e.to_string(),
            })
        })
    }

    pub fn get(&self, name: &str) -> Option<&SelectionField> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SelectionField)> {
        self.0.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
