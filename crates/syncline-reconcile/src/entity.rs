//! Entity instances.
//!
//! An [`Entity`] is one record flowing through the engine: a bag of named
//! fields plus the registered entity type it belongs to. Field storage is
//! ordered so canonical serialization is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::ids::EntityTypeId;
use crate::value::FieldValue;

/// One entity instance (a source version or the destination trunk record).
///
/// `instance_id` is minted at construction and identifies this in-memory
/// instance for the identity-stability guard; clones keep it, so a mutated
/// clone observed inside the same operation is treated as the same instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// In-memory instance identity.
    pub instance_id: Uuid,
    /// The registered entity type this instance belongs to.
    pub entity_type: EntityTypeId,
    /// Named field values, ordered by field name.
    fields: BTreeMap<String, FieldValue>,
}

impl Entity {
    /// Create a new empty entity of the given type.
    pub fn new(entity_type: EntityTypeId) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            entity_type,
            fields: BTreeMap::new(),
        }
    }

    /// Set a field using the builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field value. Absent fields read as [`FieldValue::Null`].
    pub fn get(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Null)
    }

    /// Check whether a field is present and non-null.
    pub fn has_value(&self, name: &str) -> bool {
        !self.get(name).is_null()
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Iterate over all fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get all field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the entity has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
