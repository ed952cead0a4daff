//! Merge engine.
//!
//! Diffs the previous and current versions of a source entity and propagates
//! changed property groups into the destination trunk record. Groups are the
//! unit of atomic propagation: a group is judged dirty from previous-vs-
//! current, but writes always target the trunk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::entity::Entity;
use crate::error::{ReconcileError, ReconcileResult};
use crate::ids::{EntityTypeId, SourceSystemId};
use crate::metadata::{EntityProperty, PropertyGroup};
use crate::traits::MetadataProvider;
use crate::value::FieldValue;

/// How dirty groups are propagated into the trunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Copy every dirty group.
    AllChanges,
    /// Copy a dirty group only when no property in it already holds a
    /// non-null trunk value. Purely additive: fills gaps, never overwrites
    /// existing destination data.
    NewValuesOnly,
}

impl MergeStrategy {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::AllChanges => "all_changes",
            MergeStrategy::NewValuesOnly => "new_values_only",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = ParseMergeStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all_changes" => Ok(MergeStrategy::AllChanges),
            "new_values_only" => Ok(MergeStrategy::NewValuesOnly),
            _ => Err(ParseMergeStrategyError(s.to_string())),
        }
    }
}

/// Error parsing a merge strategy from string.
#[derive(Debug, Clone)]
pub struct ParseMergeStrategyError(String);

impl fmt::Display for ParseMergeStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid merge strategy '{}', expected one of: all_changes, new_values_only",
            self.0
        )
    }
}

impl std::error::Error for ParseMergeStrategyError {}

/// Single-use state for one merge call.
///
/// Owned by exactly one merge invocation; never shared across concurrent
/// operations.
#[derive(Debug)]
pub struct MergeCarrier {
    /// The destination trunk record being updated.
    pub trunk: Entity,
    /// The prior known version of the source entity, if any.
    pub previous: Option<Entity>,
    /// The latest version of the source entity.
    pub current: Entity,
    /// The system the source versions originate from.
    pub source_system: SourceSystemId,
}

impl MergeCarrier {
    /// Create a carrier for one merge call.
    pub fn new(
        trunk: Entity,
        previous: Option<Entity>,
        current: Entity,
        source_system: SourceSystemId,
    ) -> Self {
        Self {
            trunk,
            previous,
            current,
            source_system,
        }
    }
}

/// Record of one applied field change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueChange {
    /// Name of the changed property.
    pub property: String,
    /// String representation of the trunk value before the change.
    pub old_value: Option<String>,
    /// String representation of the value written.
    pub new_value: Option<String>,
    /// When the change was applied.
    pub changed_at: DateTime<Utc>,
}

/// Result of one merge call.
#[derive(Debug)]
pub struct MergeOutcome {
    /// The updated trunk record.
    pub trunk: Entity,
    /// Applied changes, in metadata order.
    pub changes: Vec<ValueChange>,
}

impl MergeOutcome {
    /// Check if the merge changed anything.
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Diffs source versions and propagates dirty property groups into the trunk.
///
/// The property-group partition is computed once per entity type on first
/// use and reused read-only for the lifetime of the merger.
pub struct Merger {
    metadata: Arc<dyn MetadataProvider>,
    strategy: MergeStrategy,
    groups: Mutex<HashMap<EntityTypeId, Arc<[PropertyGroup]>>>,
}

impl Merger {
    /// Create a merger with an explicit propagation strategy.
    pub fn new(metadata: Arc<dyn MetadataProvider>, strategy: MergeStrategy) -> Self {
        Self {
            metadata,
            strategy,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// The strategy this merger propagates with.
    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Merge the carried source versions into the trunk.
    ///
    /// Returns the updated trunk and one [`ValueChange`] per property whose
    /// value actually changed.
    pub fn merge(&self, carrier: MergeCarrier) -> ReconcileResult<MergeOutcome> {
        let MergeCarrier {
            mut trunk,
            previous,
            current,
            source_system,
        } = carrier;

        let groups = self.groups_for(current.entity_type)?;
        let mut changes = Vec::new();

        for group in groups.iter() {
            let dirty = group
                .properties
                .iter()
                .any(|p| Self::is_dirty(p, previous.as_ref(), &current, &trunk, source_system));
            if !dirty {
                continue;
            }

            if self.strategy == MergeStrategy::NewValuesOnly
                && group.properties.iter().any(|p| trunk.has_value(&p.name))
            {
                tracing::debug!(
                    group = group.name.as_deref().unwrap_or(&group.properties[0].name),
                    "dirty group skipped: trunk already holds a value"
                );
                continue;
            }

            for property in &group.properties {
                let new_value = current.get(&property.name).clone();
                let old_value = trunk.get(&property.name).clone();
                if old_value.equals(&new_value, property.ignore_trailing_whitespace) {
                    continue;
                }
                if new_value.is_null() && !property.nullable {
                    // Refused assignment: not a change.
                    continue;
                }

                changes.push(ValueChange {
                    property: property.name.clone(),
                    old_value: old_value.display_string(),
                    new_value: new_value.display_string(),
                    changed_at: Utc::now(),
                });
                if let Some(companion) = &property.companion {
                    trunk.set(companion.clone(), new_value.clone());
                }
                trunk.set(property.name.clone(), new_value);
            }
        }

        Ok(MergeOutcome { trunk, changes })
    }

    /// A group is dirty when any member changed between the source versions,
    /// or when the force-null-propagation case holds for any member.
    fn is_dirty(
        property: &EntityProperty,
        previous: Option<&Entity>,
        current: &Entity,
        trunk: &Entity,
        source_system: SourceSystemId,
    ) -> bool {
        let previous_value = previous
            .map(|e| e.get(&property.name))
            .unwrap_or(&FieldValue::Null);
        let current_value = current.get(&property.name);

        if !previous_value.equals(current_value, property.ignore_trailing_whitespace) {
            return true;
        }

        previous.is_none()
            && current_value.is_null()
            && property.force_null_systems.contains(&source_system)
            && trunk.has_value(&property.name)
    }

    fn groups_for(&self, entity_type: EntityTypeId) -> ReconcileResult<Arc<[PropertyGroup]>> {
        let mut cache = self.groups.lock().expect("group cache poisoned");
        if let Some(found) = cache.get(&entity_type) {
            return Ok(Arc::clone(found));
        }
        let metadata = self
            .metadata
            .metadata(entity_type)
            .ok_or(ReconcileError::MissingMetadata { entity_type })?;
        let computed: Arc<[PropertyGroup]> = metadata.partition_groups().into();
        cache.insert(entity_type, Arc::clone(&computed));
        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EntityTypeMetadata;

    struct MapProvider(HashMap<EntityTypeId, Arc<EntityTypeMetadata>>);

    impl MetadataProvider for MapProvider {
        fn metadata(&self, entity_type: EntityTypeId) -> Option<Arc<EntityTypeMetadata>> {
            self.0.get(&entity_type).cloned()
        }
    }

    fn merger_for(metadata: EntityTypeMetadata, strategy: MergeStrategy) -> Merger {
        let mut map = HashMap::new();
        map.insert(metadata.entity_type, Arc::new(metadata));
        Merger::new(Arc::new(MapProvider(map)), strategy)
    }

    fn person_type() -> EntityTypeId {
        EntityTypeId::new()
    }

    #[test]
    fn test_all_changes_propagates_dirty_group() {
        let ty = person_type();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person")
                .with_property(EntityProperty::new("name"))
                .with_property(EntityProperty::new("dept")),
            MergeStrategy::AllChanges,
        );

        let trunk = Entity::new(ty).with("name", "Ada").with("dept", "R&D");
        let previous = Entity::new(ty).with("name", "Ada").with("dept", "R&D");
        let current = Entity::new(ty).with("name", "Ada L").with("dept", "R&D");

        let outcome = merger
            .merge(MergeCarrier::new(
                trunk,
                Some(previous),
                current,
                SourceSystemId::new(),
            ))
            .unwrap();

        assert_eq!(outcome.trunk.get("name").as_str(), Some("Ada L"));
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].property, "name");
        assert_eq!(outcome.changes[0].old_value.as_deref(), Some("Ada"));
        assert_eq!(outcome.changes[0].new_value.as_deref(), Some("Ada L"));
    }

    #[test]
    fn test_clean_group_is_not_touched() {
        let ty = person_type();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person").with_property(EntityProperty::new("name")),
            MergeStrategy::AllChanges,
        );

        // Trunk disagrees with current, but previous == current: not dirty.
        let trunk = Entity::new(ty).with("name", "Stale");
        let previous = Entity::new(ty).with("name", "Ada");
        let current = Entity::new(ty).with("name", "Ada");

        let outcome = merger
            .merge(MergeCarrier::new(
                trunk,
                Some(previous),
                current,
                SourceSystemId::new(),
            ))
            .unwrap();

        assert!(outcome.is_unchanged());
        assert_eq!(outcome.trunk.get("name").as_str(), Some("Stale"));
    }

    #[test]
    fn test_group_propagates_atomically() {
        let ty = person_type();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person")
                .with_property(EntityProperty::new("first").with_group("name"))
                .with_property(EntityProperty::new("last").with_group("name")),
            MergeStrategy::AllChanges,
        );

        // Only "first" changed between versions, but "last" also differs from
        // the stale trunk; the dirty group carries both over.
        let trunk = Entity::new(ty).with("first", "A").with("last", "Old");
        let previous = Entity::new(ty).with("first", "A").with("last", "Lovelace");
        let current = Entity::new(ty).with("first", "Ada").with("last", "Lovelace");

        let outcome = merger
            .merge(MergeCarrier::new(
                trunk,
                Some(previous),
                current,
                SourceSystemId::new(),
            ))
            .unwrap();

        assert_eq!(outcome.changes.len(), 2);
        assert_eq!(outcome.trunk.get("first").as_str(), Some("Ada"));
        assert_eq!(outcome.trunk.get("last").as_str(), Some("Lovelace"));
    }

    #[test]
    fn test_new_values_only_is_additive() {
        let ty = person_type();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person")
                .with_property(EntityProperty::new("first").with_group("name"))
                .with_property(EntityProperty::new("last").with_group("name")),
            MergeStrategy::NewValuesOnly,
        );

        // One member of the group already holds destination data.
        let trunk = Entity::new(ty).with("first", "Existing");
        let current = Entity::new(ty).with("first", "Ada").with("last", "Lovelace");

        let outcome = merger
            .merge(MergeCarrier::new(trunk, None, current, SourceSystemId::new()))
            .unwrap();

        assert!(outcome.is_unchanged());
        assert_eq!(outcome.trunk.get("first").as_str(), Some("Existing"));
        assert!(outcome.trunk.get("last").is_null());
    }

    #[test]
    fn test_new_values_only_fills_gaps() {
        let ty = person_type();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person").with_property(EntityProperty::new("dept")),
            MergeStrategy::NewValuesOnly,
        );

        let trunk = Entity::new(ty);
        let current = Entity::new(ty).with("dept", "R&D");

        let outcome = merger
            .merge(MergeCarrier::new(trunk, None, current, SourceSystemId::new()))
            .unwrap();

        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.trunk.get("dept").as_str(), Some("R&D"));
    }

    #[test]
    fn test_force_null_propagation() {
        let ty = person_type();
        let system = SourceSystemId::new();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person")
                .with_property(EntityProperty::new("phone").force_null_from(system)),
            MergeStrategy::AllChanges,
        );

        let trunk = Entity::new(ty).with("phone", "555-1234");
        let current = Entity::new(ty); // phone absent -> null

        let outcome = merger
            .merge(MergeCarrier::new(trunk, None, current, system))
            .unwrap();

        assert!(outcome.trunk.get("phone").is_null());
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].old_value.as_deref(), Some("555-1234"));
        assert_eq!(outcome.changes[0].new_value, None);
    }

    #[test]
    fn test_force_null_needs_matching_system() {
        let ty = person_type();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person")
                .with_property(EntityProperty::new("phone").force_null_from(SourceSystemId::new())),
            MergeStrategy::AllChanges,
        );

        let trunk = Entity::new(ty).with("phone", "555-1234");
        let current = Entity::new(ty);

        let outcome = merger
            .merge(MergeCarrier::new(trunk, None, current, SourceSystemId::new()))
            .unwrap();

        assert!(outcome.is_unchanged());
        assert_eq!(outcome.trunk.get("phone").as_str(), Some("555-1234"));
    }

    #[test]
    fn test_trailing_whitespace_judged_unchanged() {
        let ty = person_type();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person")
                .with_property(EntityProperty::new("name").ignoring_trailing_whitespace()),
            MergeStrategy::AllChanges,
        );

        let trunk = Entity::new(ty).with("name", "abc ");
        let previous = Entity::new(ty).with("name", "abc ");
        let current = Entity::new(ty).with("name", "abc");

        let outcome = merger
            .merge(MergeCarrier::new(
                trunk,
                Some(previous),
                current,
                SourceSystemId::new(),
            ))
            .unwrap();

        assert!(outcome.is_unchanged());
        assert_eq!(outcome.trunk.get("name").as_str(), Some("abc "));
    }

    #[test]
    fn test_null_refused_for_non_nullable() {
        let ty = person_type();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person")
                .with_property(EntityProperty::new("badge").non_nullable()),
            MergeStrategy::AllChanges,
        );

        let trunk = Entity::new(ty).with("badge", 42i32);
        let previous = Entity::new(ty).with("badge", 42i32);
        let current = Entity::new(ty).with("badge", FieldValue::Null);

        let outcome = merger
            .merge(MergeCarrier::new(
                trunk,
                Some(previous),
                current,
                SourceSystemId::new(),
            ))
            .unwrap();

        // Group was dirty, the assignment was refused, nothing recorded.
        assert!(outcome.is_unchanged());
        assert_eq!(outcome.trunk.get("badge").as_i64(), Some(42));
    }

    #[test]
    fn test_companion_mirrored_on_write() {
        let ty = person_type();
        let merger = merger_for(
            EntityTypeMetadata::new(ty, "Person")
                .with_property(EntityProperty::new("started").with_companion("started_nullable")),
            MergeStrategy::AllChanges,
        );

        let trunk = Entity::new(ty);
        let current = Entity::new(ty).with("started", 20200103i64);

        let outcome = merger
            .merge(MergeCarrier::new(trunk, None, current, SourceSystemId::new()))
            .unwrap();

        assert_eq!(outcome.trunk.get("started").as_i64(), Some(20200103));
        assert_eq!(outcome.trunk.get("started_nullable").as_i64(), Some(20200103));
        // The mirror write is not a separate recorded change.
        assert_eq!(outcome.changes.len(), 1);
    }

    #[test]
    fn test_missing_metadata_faults() {
        let merger = Merger::new(
            Arc::new(MapProvider(HashMap::new())),
            MergeStrategy::AllChanges,
        );
        let ty = person_type();
        let err = merger
            .merge(MergeCarrier::new(
                Entity::new(ty),
                None,
                Entity::new(ty),
                SourceSystemId::new(),
            ))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::MissingMetadata { .. }));
    }

    #[test]
    fn test_strategy_parse_round_trip() {
        for strategy in [MergeStrategy::AllChanges, MergeStrategy::NewValuesOnly] {
            let parsed: MergeStrategy = strategy.as_str().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        assert!("newest_wins".parse::<MergeStrategy>().is_err());
    }
}
