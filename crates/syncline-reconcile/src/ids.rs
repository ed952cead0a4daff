//! Reconciliation engine ID types
//!
//! Newtype wrappers for type-safe identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a source system participating in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceSystemId(Uuid);

impl SourceSystemId {
    /// Create a new random SourceSystemId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a SourceSystemId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from a string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SourceSystemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceSystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceSystemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for SourceSystemId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SourceSystemId> for Uuid {
    fn from(id: SourceSystemId) -> Self {
        id.0
    }
}

/// Unique identifier for a registered entity type.
///
/// Keys the mapping-table lookups and the per-type metadata and
/// property-group caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityTypeId(Uuid);

impl EntityTypeId {
    /// Create a new random EntityTypeId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an EntityTypeId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from a string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EntityTypeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityTypeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for EntityTypeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntityTypeId> for Uuid {
    fn from(id: EntityTypeId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_system_id_new() {
        let id1 = SourceSystemId::new();
        let id2 = SourceSystemId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_source_system_id_parse() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = SourceSystemId::parse(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn test_source_system_id_serialization() {
        let id = SourceSystemId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");

        let parsed: SourceSystemId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_entity_type_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = EntityTypeId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn test_entity_type_id_from_str() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id: EntityTypeId = uuid_str.parse().unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }
}
