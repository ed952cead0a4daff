//! Cross-system reference resolution.
//!
//! Source systems reference other records by ids they minted themselves; the
//! destination knows those records under its own ids. For every reference
//! property of a source-origin entity this step translates the source-held id
//! into the destination id through the mapping table, walking every entity
//! type compatible with the referenced logical type and the shared-identifier
//! source systems each of those types is configured with.
//!
//! Resolution faults are recovered locally: they become logged messages and,
//! where the reference is ambiguous or required, rejection of the one entity.
//! Conversion and metadata faults stay hard and abort the entity.

use std::sync::Arc;

use crate::error::{ReconcileError, ReconcileResult};
use crate::identifier::CanonicalId;
use crate::ids::EntityTypeId;
use crate::metadata::{EntityTypeMetadata, EntityTypeRegistry, ReferenceProperty};
use crate::pipeline::{Origin, PreprocessCarrier, PreprocessStep};
use crate::traits::{MappingLookup, MessageLog, OperationScope, ScopeProvider, Severity};

/// Resolves destination ids for reference properties of source-origin
/// entities.
///
/// Compatible-type sets are memoized in the registry for the lifetime of the
/// resolver; resolved ids are memoized per operation in the scope store.
pub struct ReferenceResolver {
    registry: Arc<EntityTypeRegistry>,
    lookup: Arc<dyn MappingLookup>,
    log: Arc<dyn MessageLog>,
    scopes: Arc<dyn ScopeProvider>,
}

impl ReferenceResolver {
    /// Create a resolver over the given registry and collaborators.
    pub fn new(
        registry: Arc<EntityTypeRegistry>,
        lookup: Arc<dyn MappingLookup>,
        log: Arc<dyn MessageLog>,
        scopes: Arc<dyn ScopeProvider>,
    ) -> Self {
        Self {
            registry,
            lookup,
            log,
            scopes,
        }
    }

    fn resolve_reference(
        &self,
        reference: &ReferenceProperty,
        carrier: &mut PreprocessCarrier,
    ) -> ReconcileResult<()> {
        let raw = carrier.entity.get(&reference.source_property).clone();
        let Some(source_id) = CanonicalId::from_field(&raw)? else {
            // No reference held; nothing to resolve.
            return Ok(());
        };

        let compatible = self.registry.compatible_types(&reference.referenced_type)?;
        let scope = self.scopes.current();

        let mut results: Vec<CanonicalId> = Vec::new();
        for entity_type in compatible.iter() {
            match self.resolve_for_type(*entity_type, reference, &source_id, scope.as_ref()) {
                Ok(Some(id)) => {
                    if !results.contains(&id) {
                        results.push(id);
                    }
                }
                Ok(None) => {}
                Err(err) if err.is_resolution() => {
                    self.log.log(Severity::Error, &err.to_string());
                    carrier.reject();
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }

        if results.len() > 1 {
            let err = ReconcileError::AmbiguousReference {
                property: reference.source_property.clone(),
                source_id: source_id.as_str().to_string(),
            };
            self.log.log(Severity::Error, &err.to_string());
            carrier.reject();
            return Ok(());
        }

        let Some(resolved) = results.pop() else {
            let mapping_exists = carrier.mapping_exists().unwrap_or(false);
            let required = (!mapping_exists && reference.required_on_create)
                || (mapping_exists && reference.required_on_update);
            if required {
                let err = ReconcileError::RequiredReferenceUnresolved {
                    property: reference.source_property.clone(),
                    source_id: source_id.as_str().to_string(),
                };
                self.log.log(Severity::Error, &err.to_string());
                carrier.reject();
            } else {
                self.log.log(
                    Severity::Warning,
                    &format!(
                        "reference '{}' with source id '{}' could not be resolved; leaving '{}' unset",
                        reference.source_property,
                        source_id.as_str(),
                        reference.target_property
                    ),
                );
            }
            return Ok(());
        };

        let value = resolved.to_field(reference.target_kind)?;
        carrier.entity.set(reference.target_property.clone(), value);
        Ok(())
    }

    /// Resolve one compatible entity type: direct mapping first, then each of
    /// the type's shared-identifier source systems. Distinct results from the
    /// shared systems are an ambiguity fault.
    fn resolve_for_type(
        &self,
        entity_type: EntityTypeId,
        reference: &ReferenceProperty,
        source_id: &CanonicalId,
        scope: &dyn OperationScope,
    ) -> ReconcileResult<Option<CanonicalId>> {
        let key = format!("ref:{entity_type}:{}", source_id.as_str());
        if let Some(cached) = scope.get(&key) {
            return decode_cached(&cached);
        }

        let resolved = match self.lookup.destination_id(entity_type, source_id) {
            Some(id) => Some(id),
            None => {
                let mut found: Vec<CanonicalId> = Vec::new();
                if let Some(registration) = self.registry.registration(entity_type) {
                    for via_system in &registration.shared_identifier_systems {
                        if let Some(id) =
                            self.lookup
                                .destination_id_via(entity_type, *via_system, source_id)
                        {
                            if !found.contains(&id) {
                                found.push(id);
                            }
                        }
                    }
                }
                if found.len() > 1 {
                    return Err(ReconcileError::AmbiguousSharedIdentifier {
                        entity_type: self.registry.type_name(entity_type),
                        property: reference.source_property.clone(),
                        source_id: source_id.as_str().to_string(),
                    });
                }
                found.pop()
            }
        };

        let encoded = resolved.as_ref().map(|id| id.as_str()).unwrap_or("");
        let stored = scope.get_or_insert(&key, encoded);
        decode_cached(&stored)
    }
}

/// Canonical strings are cached per operation; the empty string marks a
/// reference that resolved to nothing.
fn decode_cached(cached: &str) -> ReconcileResult<Option<CanonicalId>> {
    if cached.is_empty() {
        Ok(None)
    } else {
        CanonicalId::new(crate::identifier::IdValue::Text(cached.to_string())).map(Some)
    }
}

impl PreprocessStep for ReferenceResolver {
    fn name(&self) -> &'static str {
        "reference_resolver"
    }

    fn apply(
        &self,
        metadata: &EntityTypeMetadata,
        carrier: &mut PreprocessCarrier,
    ) -> ReconcileResult<()> {
        if carrier.origin() != Origin::Source {
            return Ok(());
        }
        for reference in &metadata.references {
            // Rejection is sticky but never stops the remaining references.
            self.resolve_reference(reference, carrier)?;
        }
        Ok(())
    }
}
