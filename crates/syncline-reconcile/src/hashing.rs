//! Content hashing for change detection.
//!
//! An entity is serialized to canonical bytes by an external codec and hashed
//! with SHA-256; the base64 digest is persisted by the orchestrator and
//! compared across runs to detect logical change. Both the bytes and the
//! digest are deterministic for a given logical input.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::entity::Entity;
use crate::error::{ReconcileError, ReconcileResult};
use crate::ids::EntityTypeId;
use crate::metadata::EntityTypeMetadata;
use crate::stability::SafeMetadataProvider;
use crate::traits::{EntityCodec, MetadataProvider};
use crate::value::FieldValue;

/// One serialized entity with its content hash.
#[derive(Debug, Clone)]
pub struct SerializedEntity {
    /// Base64-encoded SHA-256 digest of the canonical bytes.
    pub hash: String,
    /// The canonical bytes.
    pub bytes: Vec<u8>,
    /// Diagnostic label of the serialized entity.
    pub label: String,
}

/// Serializes entities for persisted change-detection state.
pub struct HashingSerializer {
    metadata: Arc<dyn MetadataProvider>,
    codec: Arc<dyn EntityCodec>,
    descriptor: Arc<SafeMetadataProvider>,
}

impl HashingSerializer {
    /// Create a serializer over the given codec and metadata collaborators.
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        codec: Arc<dyn EntityCodec>,
        descriptor: Arc<SafeMetadataProvider>,
    ) -> Self {
        Self {
            metadata,
            codec,
            descriptor,
        }
    }

    /// Serialize an entity and compute its content hash.
    ///
    /// An empty result from the underlying codec is a non-recoverable
    /// serialization fault: a silently empty payload would make every future
    /// run see the entity as unchanged.
    pub fn serialize(&self, entity: &Entity) -> ReconcileResult<SerializedEntity> {
        let metadata = self.metadata_for(entity.entity_type)?;
        let label = self.descriptor.label(entity)?;

        let bytes = self
            .codec
            .to_bytes(&metadata, entity)?
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                ReconcileError::serialization(format!(
                    "byte serializer returned no data for {label}"
                ))
            })?;

        let digest = Sha256::digest(&bytes);
        Ok(SerializedEntity {
            hash: STANDARD.encode(digest),
            bytes,
            label,
        })
    }

    /// Reconstruct an entity from canonical bytes.
    pub fn deserialize(&self, entity_type: EntityTypeId, bytes: &[u8]) -> ReconcileResult<Entity> {
        let metadata = self.metadata_for(entity_type)?;
        self.codec.from_bytes(&metadata, bytes)?.ok_or_else(|| {
            ReconcileError::serialization(format!(
                "deserializer returned no entity for type '{}'",
                metadata.name
            ))
        })
    }

    fn metadata_for(&self, entity_type: EntityTypeId) -> ReconcileResult<Arc<EntityTypeMetadata>> {
        self.metadata
            .metadata(entity_type)
            .ok_or(ReconcileError::MissingMetadata { entity_type })
    }
}

/// Canonical JSON implementation of the codec contract.
///
/// Mapped properties only, renamed to their wire names, null and absent
/// values omitted, keys emitted in sorted order so equal logical content
/// always produces equal bytes.
#[derive(Debug, Default)]
pub struct JsonEntityCodec;

impl JsonEntityCodec {
    /// Create a codec.
    pub fn new() -> Self {
        Self
    }
}

impl EntityCodec for JsonEntityCodec {
    fn to_bytes(
        &self,
        metadata: &EntityTypeMetadata,
        entity: &Entity,
    ) -> ReconcileResult<Option<Vec<u8>>> {
        let mut wire = BTreeMap::new();
        for property in &metadata.properties {
            let value = entity.get(&property.name);
            if value.is_null() {
                continue;
            }
            let json = serde_json::to_value(value)
                .map_err(|e| ReconcileError::serialization(e.to_string()))?;
            wire.insert(property.wire_name().to_string(), json);
        }
        let bytes = serde_json::to_vec(&wire)
            .map_err(|e| ReconcileError::serialization(e.to_string()))?;
        Ok(Some(bytes))
    }

    fn from_bytes(
        &self,
        metadata: &EntityTypeMetadata,
        bytes: &[u8],
    ) -> ReconcileResult<Option<Entity>> {
        let wire: BTreeMap<String, Value> = serde_json::from_slice(bytes)
            .map_err(|e| ReconcileError::serialization(e.to_string()))?;

        let mut entity = Entity::new(metadata.entity_type);
        for property in &metadata.properties {
            if let Some(json) = wire.get(property.wire_name()) {
                let value: FieldValue = serde_json::from_value(json.clone())
                    .map_err(|e| ReconcileError::serialization(e.to_string()))?;
                entity.set(property.name.clone(), value);
            }
        }
        Ok(Some(entity))
    }
}
