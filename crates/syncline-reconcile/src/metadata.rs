//! Entity type metadata.
//!
//! Static descriptions of mapped properties, reference properties and the
//! registered entity types themselves. Metadata is configuration input: this
//! engine consumes it, it never discovers it.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{ReconcileError, ReconcileResult};
use crate::identifier::IdentifierKind;
use crate::ids::{EntityTypeId, SourceSystemId};

/// A logical entity type referenced by a foreign-key-like property.
///
/// Logical types name a role ("Person", "OrgUnit"); one or more registered
/// entity types may satisfy each of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalType(String);

impl LogicalType {
    /// Create a logical type from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LogicalType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Metadata for one mapped field of an entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityProperty {
    /// Field name on the entity.
    pub name: String,

    /// Group this property is diffed and propagated with.
    ///
    /// Ungrouped properties form singleton groups of their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Wire name used by the hashing serializer; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_name: Option<String>,

    /// Maximum string length enforced by preprocessing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Compare string values ignoring trailing whitespace.
    #[serde(default)]
    pub ignore_trailing_whitespace: bool,

    /// Preprocessing converts whitespace-only values to null.
    #[serde(default)]
    pub whitespace_to_null: bool,

    /// Whether a null incoming value may be written to the trunk.
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// A property mirrored on every write of this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion: Option<String>,

    /// Source systems whose null current-values are force-propagated when no
    /// previous version exists and the trunk still holds a value.
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub force_null_systems: HashSet<SourceSystemId>,
}

fn default_true() -> bool {
    true
}

impl EntityProperty {
    /// Create a property with the given name and default behavior.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
            mapped_name: None,
            max_length: None,
            ignore_trailing_whitespace: false,
            whitespace_to_null: false,
            nullable: true,
            companion: None,
            force_null_systems: HashSet::new(),
        }
    }

    /// Assign the property to a group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set the wire name used when serializing.
    #[must_use]
    pub fn with_mapped_name(mut self, mapped_name: impl Into<String>) -> Self {
        self.mapped_name = Some(mapped_name.into());
        self
    }

    /// Set the maximum string length.
    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Ignore trailing whitespace when comparing values.
    #[must_use]
    pub fn ignoring_trailing_whitespace(mut self) -> Self {
        self.ignore_trailing_whitespace = true;
        self
    }

    /// Convert whitespace-only values to null during preprocessing.
    #[must_use]
    pub fn nullifying_whitespace(mut self) -> Self {
        self.whitespace_to_null = true;
        self
    }

    /// Mark the property non-nullable: null incoming values are never written.
    #[must_use]
    pub fn non_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mirror every write of this property onto a companion property.
    #[must_use]
    pub fn with_companion(mut self, companion: impl Into<String>) -> Self {
        self.companion = Some(companion.into());
        self
    }

    /// Force-propagate null current-values for the given source system.
    #[must_use]
    pub fn force_null_from(mut self, system: SourceSystemId) -> Self {
        self.force_null_systems.insert(system);
        self
    }

    /// The wire name used by the hashing serializer.
    pub fn wire_name(&self) -> &str {
        self.mapped_name.as_deref().unwrap_or(&self.name)
    }
}

/// Metadata for one foreign-key-like reference property pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceProperty {
    /// Property holding the source-system-minted reference id.
    pub source_property: String,

    /// Property receiving the resolved destination-system id.
    pub target_property: String,

    /// Kind the resolved destination id is converted to before assignment.
    #[serde(default = "default_target_kind")]
    pub target_kind: IdentifierKind,

    /// The logical entity type this reference points at.
    pub referenced_type: LogicalType,

    /// The reference must resolve when no mapping exists yet.
    #[serde(default)]
    pub required_on_create: bool,

    /// The reference must resolve when a mapping already exists.
    #[serde(default)]
    pub required_on_update: bool,
}

fn default_target_kind() -> IdentifierKind {
    IdentifierKind::Text
}

impl ReferenceProperty {
    /// Create a reference property pair.
    pub fn new(
        source_property: impl Into<String>,
        target_property: impl Into<String>,
        referenced_type: impl Into<LogicalType>,
    ) -> Self {
        Self {
            source_property: source_property.into(),
            target_property: target_property.into(),
            target_kind: IdentifierKind::Text,
            referenced_type: referenced_type.into(),
            required_on_create: false,
            required_on_update: false,
        }
    }

    /// Set the kind of the destination property.
    #[must_use]
    pub fn with_target_kind(mut self, kind: IdentifierKind) -> Self {
        self.target_kind = kind;
        self
    }

    /// Require resolution when no mapping exists yet.
    #[must_use]
    pub fn required_on_create(mut self) -> Self {
        self.required_on_create = true;
        self
    }

    /// Require resolution when a mapping already exists.
    #[must_use]
    pub fn required_on_update(mut self) -> Self {
        self.required_on_update = true;
        self
    }
}

/// Complete static metadata for one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeMetadata {
    /// The registered entity type this metadata describes.
    pub entity_type: EntityTypeId,

    /// Display name used in diagnostics.
    pub name: String,

    /// Mapped properties, in metadata order.
    pub properties: Vec<EntityProperty>,

    /// Reference properties, in metadata order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceProperty>,
}

impl EntityTypeMetadata {
    /// Create metadata for an entity type.
    pub fn new(entity_type: EntityTypeId, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            name: name.into(),
            properties: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Add a mapped property.
    #[must_use]
    pub fn with_property(mut self, property: EntityProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Add a reference property.
    #[must_use]
    pub fn with_reference(mut self, reference: ReferenceProperty) -> Self {
        self.references.push(reference);
        self
    }

    /// Find a property by name.
    pub fn property(&self, name: &str) -> Option<&EntityProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Partition the properties into their diff-and-propagate groups.
    ///
    /// Groups appear in metadata order of their first member; ungrouped
    /// properties form singleton groups. The result is computed once per
    /// entity type by the merge engine and reused read-only.
    pub fn partition_groups(&self) -> Vec<PropertyGroup> {
        let mut groups: Vec<PropertyGroup> = Vec::new();
        for property in &self.properties {
            match &property.group {
                Some(name) => {
                    if let Some(group) = groups
                        .iter_mut()
                        .find(|g| g.name.as_deref() == Some(name.as_str()))
                    {
                        group.properties.push(property.clone());
                    } else {
                        groups.push(PropertyGroup {
                            name: Some(name.clone()),
                            properties: vec![property.clone()],
                        });
                    }
                }
                None => groups.push(PropertyGroup {
                    name: None,
                    properties: vec![property.clone()],
                }),
            }
        }
        groups
    }
}

/// A cluster of properties diffed and propagated atomically.
#[derive(Debug, Clone)]
pub struct PropertyGroup {
    /// Group name; `None` for a singleton group of one ungrouped property.
    pub name: Option<String>,
    /// Member properties in metadata order.
    pub properties: Vec<EntityProperty>,
}

/// Registration record for one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeRegistration {
    /// The registered type id.
    pub entity_type: EntityTypeId,

    /// Display name used in diagnostics.
    pub name: String,

    /// Logical types instances of this type satisfy.
    pub satisfies: Vec<LogicalType>,

    /// Source systems whose minted ids this type reuses verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_identifier_systems: Vec<SourceSystemId>,
}

impl EntityTypeRegistration {
    /// Register an entity type satisfying the given logical types.
    pub fn new(
        entity_type: EntityTypeId,
        name: impl Into<String>,
        satisfies: Vec<LogicalType>,
    ) -> Self {
        Self {
            entity_type,
            name: name.into(),
            satisfies,
            shared_identifier_systems: Vec::new(),
        }
    }

    /// Declare a shared-identifier source system for this type.
    #[must_use]
    pub fn sharing_identifiers_with(mut self, system: SourceSystemId) -> Self {
        self.shared_identifier_systems.push(system);
        self
    }
}

/// The statically registered entity-type compatibility map.
///
/// Resolved once at configuration time; compatible-type sets are memoized on
/// first lookup and immutable afterwards, so concurrent readers share the
/// built entries without further synchronization cost.
#[derive(Debug)]
pub struct EntityTypeRegistry {
    registrations: Vec<EntityTypeRegistration>,
    compatible: Mutex<HashMap<LogicalType, Arc<[EntityTypeId]>>>,
}

impl EntityTypeRegistry {
    /// Build a registry from the configured registrations.
    pub fn new(registrations: Vec<EntityTypeRegistration>) -> Self {
        Self {
            registrations,
            compatible: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a registration by type id.
    pub fn registration(&self, entity_type: EntityTypeId) -> Option<&EntityTypeRegistration> {
        self.registrations
            .iter()
            .find(|r| r.entity_type == entity_type)
    }

    /// Display name of a registered type, or its id when unregistered.
    pub fn type_name(&self, entity_type: EntityTypeId) -> String {
        self.registration(entity_type)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| entity_type.to_string())
    }

    /// The entity types compatible with a referenced logical type.
    ///
    /// Memoized per logical type for the lifetime of the registry. An empty
    /// set is a metadata fault: a reference to a logical type nothing
    /// satisfies cannot ever resolve.
    pub fn compatible_types(&self, logical: &LogicalType) -> ReconcileResult<Arc<[EntityTypeId]>> {
        let mut cache = self.compatible.lock().expect("compatibility cache poisoned");
        if let Some(found) = cache.get(logical) {
            return Ok(Arc::clone(found));
        }
        let computed: Arc<[EntityTypeId]> = self
            .registrations
            .iter()
            .filter(|r| r.satisfies.contains(logical))
            .map(|r| r.entity_type)
            .collect();
        if computed.is_empty() {
            return Err(ReconcileError::no_compatible_types(logical.as_str()));
        }
        cache.insert(logical.clone(), Arc::clone(&computed));
        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_builder_defaults() {
        let prop = EntityProperty::new("email");
        assert!(prop.nullable);
        assert!(!prop.ignore_trailing_whitespace);
        assert!(prop.group.is_none());
        assert_eq!(prop.wire_name(), "email");
    }

    #[test]
    fn test_wire_name_override() {
        let prop = EntityProperty::new("email").with_mapped_name("Email Address");
        assert_eq!(prop.wire_name(), "Email Address");
    }

    #[test]
    fn test_property_serde_round_trip() {
        let system = SourceSystemId::new();
        let prop = EntityProperty::new("dept")
            .with_group("org")
            .with_max_length(64)
            .ignoring_trailing_whitespace()
            .force_null_from(system);

        let json = serde_json::to_string(&prop).unwrap();
        let parsed: EntityProperty = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, "dept");
        assert_eq!(parsed.group.as_deref(), Some("org"));
        assert_eq!(parsed.max_length, Some(64));
        assert!(parsed.ignore_trailing_whitespace);
        assert!(parsed.force_null_systems.contains(&system));
        assert!(parsed.nullable, "nullable defaults to true");
    }

    #[test]
    fn test_partition_singleton_groups() {
        let meta = EntityTypeMetadata::new(EntityTypeId::new(), "Person")
            .with_property(EntityProperty::new("a"))
            .with_property(EntityProperty::new("b"));

        let groups = meta.partition_groups();
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.name.is_none()));
        assert!(groups.iter().all(|g| g.properties.len() == 1));
    }

    #[test]
    fn test_partition_preserves_metadata_order() {
        let meta = EntityTypeMetadata::new(EntityTypeId::new(), "Person")
            .with_property(EntityProperty::new("first").with_group("name"))
            .with_property(EntityProperty::new("dept"))
            .with_property(EntityProperty::new("last").with_group("name"));

        let groups = meta.partition_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name.as_deref(), Some("name"));
        assert_eq!(groups[0].properties.len(), 2);
        assert_eq!(groups[0].properties[1].name, "last");
        assert!(groups[1].name.is_none());
        assert_eq!(groups[1].properties[0].name, "dept");
    }

    #[test]
    fn test_compatible_types() {
        let person = EntityTypeId::new();
        let contractor = EntityTypeId::new();
        let registry = EntityTypeRegistry::new(vec![
            EntityTypeRegistration::new(person, "Person", vec![LogicalType::new("Person")]),
            EntityTypeRegistration::new(
                contractor,
                "Contractor",
                vec![LogicalType::new("Person"), LogicalType::new("Vendor")],
            ),
        ]);

        let compatible = registry.compatible_types(&LogicalType::new("Person")).unwrap();
        assert_eq!(compatible.as_ref(), &[person, contractor]);

        let vendors = registry.compatible_types(&LogicalType::new("Vendor")).unwrap();
        assert_eq!(vendors.as_ref(), &[contractor]);
    }

    #[test]
    fn test_no_compatible_types_faults() {
        let registry = EntityTypeRegistry::new(vec![]);
        let err = registry
            .compatible_types(&LogicalType::new("Ghost"))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NoCompatibleTypes { .. }));
    }

    #[test]
    fn test_compatible_types_memoized() {
        let person = EntityTypeId::new();
        let registry = EntityTypeRegistry::new(vec![EntityTypeRegistration::new(
            person,
            "Person",
            vec![LogicalType::new("Person")],
        )]);

        let first = registry.compatible_types(&LogicalType::new("Person")).unwrap();
        let second = registry.compatible_types(&LogicalType::new("Person")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_reference_property_serde() {
        let reference = ReferenceProperty::new("ManagerId", "ManagerDestinationId", "Person")
            .with_target_kind(IdentifierKind::Guid)
            .required_on_create();

        let json = serde_json::to_string(&reference).unwrap();
        assert!(json.contains("\"target_kind\":\"guid\""));

        let parsed: ReferenceProperty = serde_json::from_str(&json).unwrap();
        assert!(parsed.required_on_create);
        assert!(!parsed.required_on_update);
        assert_eq!(parsed.referenced_type.as_str(), "Person");
    }
}
