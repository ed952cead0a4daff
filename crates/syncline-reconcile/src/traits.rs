//! Collaborator contracts.
//!
//! Everything this engine needs from the outside world (metadata, the
//! mapping table, message logging, raw byte serialization and the
//! per-operation keyed store) comes in through the traits in this module.
//! All calls are synchronous; the collaborators own their concurrency and
//! durability models.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::entity::Entity;
use crate::error::ReconcileResult;
use crate::identifier::CanonicalId;
use crate::ids::{EntityTypeId, SourceSystemId};
use crate::metadata::EntityTypeMetadata;

/// Severity of a reconciliation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// A recoverable condition worth surfacing.
    Warning,
    /// A condition that rejected an entity.
    Error,
}

impl Severity {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sink for reconciliation messages.
///
/// The transport (run log, database, UI) is owned by the orchestrator.
pub trait MessageLog: Send + Sync {
    /// Record one message at the given severity.
    fn log(&self, severity: Severity, message: &str);
}

/// A [`MessageLog`] that forwards to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingMessageLog;

impl MessageLog for TracingMessageLog {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }
}

/// Provider of static entity-type metadata.
pub trait MetadataProvider: Send + Sync {
    /// Metadata for the given entity type, if registered.
    fn metadata(&self, entity_type: EntityTypeId) -> Option<Arc<EntityTypeMetadata>>;
}

/// Cross-system id mapping lookups.
///
/// Backed by the orchestrator's durable mapping table; this engine only reads.
pub trait MappingLookup: Send + Sync {
    /// Destination id mapped for `(entity_type, source_id)`.
    fn destination_id(
        &self,
        entity_type: EntityTypeId,
        source_id: &CanonicalId,
    ) -> Option<CanonicalId>;

    /// Destination id mapped for `(entity_type, source_id)` where the id was
    /// minted by `via_system` and reused verbatim by the entity type.
    fn destination_id_via(
        &self,
        entity_type: EntityTypeId,
        via_system: SourceSystemId,
        source_id: &CanonicalId,
    ) -> Option<CanonicalId>;
}

/// External byte serializer for persisted change-detection state.
///
/// Implementations emit canonical bytes: absent and null mapped properties
/// omitted, properties renamed to their declared wire names. Returning `None`
/// from either direction is treated as a non-recoverable serialization fault
/// by the caller.
pub trait EntityCodec: Send + Sync {
    /// Serialize an entity to canonical bytes.
    fn to_bytes(
        &self,
        metadata: &EntityTypeMetadata,
        entity: &Entity,
    ) -> ReconcileResult<Option<Vec<u8>>>;

    /// Deserialize an entity from canonical bytes.
    fn from_bytes(
        &self,
        metadata: &EntityTypeMetadata,
        bytes: &[u8],
    ) -> ReconcileResult<Option<Entity>>;
}

/// Keyed mutable store for one logical operation.
///
/// First write wins: `get_or_insert` stores the supplied value only when the
/// key is absent and always returns the stored value, so every reader inside
/// the operation observes the first-written value.
pub trait OperationScope: Send + Sync {
    /// Look up a previously stored value.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key` if absent; return the stored value.
    fn get_or_insert(&self, key: &str, value: &str) -> String;
}

/// Provider of the current operation scope.
///
/// The orchestrator owns operation boundaries; this engine never retains
/// state across them.
pub trait ScopeProvider: Send + Sync {
    /// The scope of the operation in progress.
    fn current(&self) -> Arc<dyn OperationScope>;
}

/// In-memory [`OperationScope`].
#[derive(Debug, Default)]
pub struct InMemoryScope {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationScope for InMemoryScope {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("scope poisoned").get(key).cloned()
    }

    fn get_or_insert(&self, key: &str, value: &str) -> String {
        self.entries
            .lock()
            .expect("scope poisoned")
            .entry(key.to_string())
            .or_insert_with(|| value.to_string())
            .clone()
    }
}

/// A [`ScopeProvider`] managing in-process operation boundaries.
///
/// Suitable for embedders and tests; a distributed orchestrator supplies its
/// own provider.
#[derive(Debug, Default)]
pub struct LocalScopeProvider {
    current: Mutex<Arc<InMemoryScope>>,
}

impl LocalScopeProvider {
    /// Create a provider with an initial open operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the current operation and open a fresh, empty scope.
    pub fn begin_operation(&self) {
        *self.current.lock().expect("scope provider poisoned") = Arc::new(InMemoryScope::new());
    }
}

impl ScopeProvider for LocalScopeProvider {
    fn current(&self) -> Arc<dyn OperationScope> {
        Arc::clone(&*self.current.lock().expect("scope provider poisoned")) as Arc<dyn OperationScope>
    }
}
