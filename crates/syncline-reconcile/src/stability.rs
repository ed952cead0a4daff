//! Identity stability guard.
//!
//! Identifier and label derivation must be stable while an entity is being
//! processed: code that observes one identifier for an instance and later
//! re-derives a different one would corrupt mappings silently. The guard
//! wraps a raw per-entity-type metadata source and enforces two contracts:
//! derived values are never null, and re-deriving a value for the same
//! entity instance within one operation reproduces the first-observed value
//! exactly.

use std::sync::Arc;

use crate::entity::Entity;
use crate::error::{ReconcileError, ReconcileResult};
use crate::identifier::CanonicalId;
use crate::traits::ScopeProvider;

/// Raw per-entity-type identity lookups.
///
/// Implementations derive the three values from an entity's backing fields;
/// they make no stability or nullness guarantees of their own.
pub trait EntityDescriptor: Send + Sync {
    /// The source-system identifier of the entity.
    fn source_id(&self, entity: &Entity) -> Option<CanonicalId>;

    /// The destination-system identifier of the entity.
    fn destination_id(&self, entity: &Entity) -> Option<CanonicalId>;

    /// A human-readable label for diagnostics.
    fn label(&self, entity: &Entity) -> Option<String>;
}

/// Wraps an [`EntityDescriptor`] with nullness and stability checks.
///
/// First-observed values are cached in the operation scope keyed by entity
/// instance and accessor; a new operation starts with an empty store, so
/// recycled instances may legitimately derive different values across
/// operations.
pub struct SafeMetadataProvider {
    inner: Arc<dyn EntityDescriptor>,
    scopes: Arc<dyn ScopeProvider>,
}

impl SafeMetadataProvider {
    /// Wrap a raw descriptor.
    pub fn new(inner: Arc<dyn EntityDescriptor>, scopes: Arc<dyn ScopeProvider>) -> Self {
        Self { inner, scopes }
    }

    /// The source-system identifier of the entity.
    ///
    /// Faults if the raw lookup produces nothing, or if the value differs
    /// from the one first observed for this instance in the current
    /// operation.
    pub fn source_id(&self, entity: &Entity) -> ReconcileResult<CanonicalId> {
        let value = self
            .inner
            .source_id(entity)
            .ok_or_else(|| missing("source_id"))?;
        self.check(entity, "source_id", value.as_str())?;
        Ok(value)
    }

    /// The destination-system identifier of the entity.
    pub fn destination_id(&self, entity: &Entity) -> ReconcileResult<CanonicalId> {
        let value = self
            .inner
            .destination_id(entity)
            .ok_or_else(|| missing("destination_id"))?;
        self.check(entity, "destination_id", value.as_str())?;
        Ok(value)
    }

    /// The diagnostic label of the entity.
    pub fn label(&self, entity: &Entity) -> ReconcileResult<String> {
        let value = self.inner.label(entity).ok_or_else(|| missing("label"))?;
        self.check(entity, "label", &value)?;
        Ok(value)
    }

    fn check(&self, entity: &Entity, accessor: &str, value: &str) -> ReconcileResult<()> {
        let key = format!("identity:{}:{accessor}", entity.instance_id);
        let first = self.scopes.current().get_or_insert(&key, value);
        if first != value {
            return Err(ReconcileError::UnstableIdentity {
                accessor: accessor.to_string(),
                first,
                second: value.to_string(),
            });
        }
        Ok(())
    }
}

fn missing(accessor: &str) -> ReconcileError {
    ReconcileError::MissingDerivedValue {
        accessor: accessor.to_string(),
    }
}
