//! # Reconciliation Engine
//!
//! Core engine for reconciling records between a source system and a
//! destination system during a migration or synchronization run.
//!
//! The engine normalizes heterogeneous identifiers, merges changed property
//! groups into the destination ("trunk") record, resolves cross-system
//! foreign-key references and detects logical change via content hashing.
//! It is entity-type-agnostic: everything it knows about an entity shape
//! comes from injected [`metadata`].
//!
//! ## Control flow per entity
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────────┐
//! │  Preprocess  │────►│    Merge    │────►│ Serialize + Hash │
//! │  (pipeline)  │     │  (engine)   │     │    (optional)    │
//! └──────┬───────┘     └─────────────┘     └──────────────────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │  Reference   │  source-origin carriers only
//! │  Resolver    │
//! └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use syncline_reconcile::prelude::*;
//!
//! let pipeline = Pipeline::new(metadata.clone())
//!     .with_step(LengthEnforcer)
//!     .with_step(WhitespaceNullifier)
//!     .with_step(ReferenceResolver::new(registry, mappings, log, scopes));
//!
//! let outcome = pipeline.run(PreprocessCarrier::new(incoming, Origin::Source))?;
//! if !outcome.rejected {
//!     let merger = Merger::new(metadata, MergeStrategy::AllChanges);
//!     let merged = merger.merge(MergeCarrier::new(trunk, previous, outcome.entity, system))?;
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`ids`] - Type-safe identifiers (`SourceSystemId`, `EntityTypeId`)
//! - [`value`] - Loosely typed entity field values
//! - [`entity`] - Entity instances
//! - [`identifier`] - Canonical identifier normalization
//! - [`metadata`] - Entity-type metadata, property groups, type registry
//! - [`error`] - Fault taxonomy
//! - [`traits`] - Collaborator contracts (metadata, mapping, logging, scopes)
//! - [`merge`] - Diff-and-propagate merge engine
//! - [`pipeline`] - Ordered preprocessing pipeline
//! - [`resolver`] - Cross-system reference resolution
//! - [`hashing`] - Canonical serialization and content hashing
//! - [`stability`] - Identity stability guard

pub mod entity;
pub mod error;
pub mod hashing;
pub mod identifier;
pub mod ids;
pub mod merge;
pub mod metadata;
pub mod pipeline;
pub mod resolver;
pub mod stability;
pub mod traits;
pub mod value;

/// Prelude module for convenient imports.
///
/// ```
/// use syncline_reconcile::prelude::*;
/// ```
pub mod prelude {
    // IDs
    pub use crate::ids::{EntityTypeId, SourceSystemId};

    // Values and entities
    pub use crate::entity::Entity;
    pub use crate::value::FieldValue;

    // Identifiers
    pub use crate::identifier::{CanonicalId, IdValue, IdentifierKind, ToCanonicalId};

    // Metadata
    pub use crate::metadata::{
        EntityProperty, EntityTypeMetadata, EntityTypeRegistration, EntityTypeRegistry,
        LogicalType, PropertyGroup, ReferenceProperty,
    };

    // Error handling
    pub use crate::error::{ReconcileError, ReconcileResult};

    // Collaborator contracts
    pub use crate::traits::{
        EntityCodec, InMemoryScope, LocalScopeProvider, MappingLookup, MessageLog,
        MetadataProvider, OperationScope, ScopeProvider, Severity, TracingMessageLog,
    };

    // Merge engine
    pub use crate::merge::{MergeCarrier, MergeOutcome, MergeStrategy, Merger, ValueChange};

    // Preprocessing
    pub use crate::pipeline::{
        LengthEnforcer, Origin, Pipeline, PreprocessCarrier, PreprocessOutcome, PreprocessStep,
        WhitespaceNullifier,
    };

    // Reference resolution
    pub use crate::resolver::ReferenceResolver;

    // Hashing
    pub use crate::hashing::{HashingSerializer, JsonEntityCodec, SerializedEntity};

    // Identity stability
    pub use crate::stability::{EntityDescriptor, SafeMetadataProvider};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        // Verify all prelude types are accessible
        let ty = EntityTypeId::new();
        let _system = SourceSystemId::new();
        let _entity = Entity::new(ty).with("name", "test");
        let _strategy = MergeStrategy::AllChanges;
        let _origin = Origin::Source;
        let _severity = Severity::Warning;
        let _prop = EntityProperty::new("name");
        let _logical = LogicalType::new("Person");
    }
}
