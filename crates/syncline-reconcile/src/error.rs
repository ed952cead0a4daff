//! Reconciliation error types
//!
//! Error definitions with a hard/locally-recovered classification: resolution
//! errors degrade to logged messages (and possibly entity rejection) inside
//! the reference resolver, everything else aborts processing of the current
//! entity and propagates to the caller.

use thiserror::Error;

use crate::ids::EntityTypeId;

/// Error that can occur while reconciling one entity.
#[derive(Debug, Error)]
pub enum ReconcileError {
    // Identifier conversion (hard)
    /// A value could not be converted to or from a canonical identifier.
    #[error("cannot convert '{type_name}' to a canonical identifier: {message}")]
    IdentifierConversion {
        /// Name of the offending type or kind.
        type_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Metadata (hard)
    /// No registered entity type satisfies a referenced logical type.
    #[error("no entity types compatible with logical type '{logical_type}'")]
    NoCompatibleTypes { logical_type: String },

    /// The metadata provider has no entry for an entity type.
    #[error("no metadata registered for entity type {entity_type}")]
    MissingMetadata { entity_type: EntityTypeId },

    // Reference resolution (locally recovered)
    /// Distinct destination ids were found through different shared-identifier
    /// source systems of one entity type.
    #[error(
        "ambiguous reference: entity type '{entity_type}' resolves source id \
         '{source_id}' for property '{property}' through multiple shared-identifier \
         systems to distinct destination ids"
    )]
    AmbiguousSharedIdentifier {
        entity_type: String,
        property: String,
        source_id: String,
    },

    /// Distinct destination ids were found across compatible entity types.
    #[error(
        "ambiguous reference: property '{property}' with source id '{source_id}' \
         resolves to distinct destination ids across compatible entity types"
    )]
    AmbiguousReference { property: String, source_id: String },

    /// A required reference could not be resolved to any destination id.
    #[error("required reference '{property}' with source id '{source_id}' could not be resolved")]
    RequiredReferenceUnresolved { property: String, source_id: String },

    // Serialization (hard)
    /// The underlying byte serializer or deserializer produced nothing.
    #[error("serialization failed: {message}")]
    Serialization { message: String },

    // Identity consistency (hard)
    /// A derived identity value (source id, destination id or label) was null.
    #[error("metadata accessor '{accessor}' produced no value")]
    MissingDerivedValue { accessor: String },

    /// A derived identity value changed between two reads of the same entity
    /// instance within one operation.
    #[error(
        "metadata accessor '{accessor}' is unstable within the current operation: \
         first observed '{first}', now '{second}'"
    )]
    UnstableIdentity {
        accessor: String,
        first: String,
        second: String,
    },
}

impl ReconcileError {
    /// Check if this error belongs to the reference-resolution category.
    ///
    /// Resolution errors are recovered locally by the resolver: they are
    /// logged and at most reject the one entity, never the batch.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            ReconcileError::AmbiguousSharedIdentifier { .. }
                | ReconcileError::AmbiguousReference { .. }
                | ReconcileError::RequiredReferenceUnresolved { .. }
        )
    }

    // Convenience constructors

    /// Create an identifier conversion error.
    pub fn conversion(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::IdentifierConversion {
            type_name: type_name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an identifier conversion error wrapping the underlying failure.
    pub fn conversion_with_source(
        type_name: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ReconcileError::IdentifierConversion {
            type_name: type_name.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a no-compatible-types error.
    pub fn no_compatible_types(logical_type: impl Into<String>) -> Self {
        ReconcileError::NoCompatibleTypes {
            logical_type: logical_type.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        ReconcileError::Serialization {
            message: message.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
