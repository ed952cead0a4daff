//! Preprocessing pipeline.
//!
//! A fixed, ordered sequence of entity transformation and validation steps.
//! One carrier flows through one invocation; every step runs even after an
//! earlier step rejected the entity, so the caller sees the full set of
//! messages before acting on the final rejection flag. Hard faults abort the
//! entity immediately.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::entity::Entity;
use crate::error::{ReconcileError, ReconcileResult};
use crate::metadata::EntityTypeMetadata;
use crate::traits::MetadataProvider;
use crate::value::FieldValue;

/// Which side of the synchronization an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The entity is an incoming source-system record.
    Source,
    /// The entity is a destination-system record.
    Destination,
}

impl Origin {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Source => "source",
            Origin::Destination => "destination",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Origin {
    type Err = ParseOriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "source" => Ok(Origin::Source),
            "destination" => Ok(Origin::Destination),
            _ => Err(ParseOriginError(s.to_string())),
        }
    }
}

/// Error parsing an origin from string.
#[derive(Debug, Clone)]
pub struct ParseOriginError(String);

impl fmt::Display for ParseOriginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid origin '{}', expected one of: source, destination",
            self.0
        )
    }
}

impl std::error::Error for ParseOriginError {}

/// Single-use state for one preprocessing call.
#[derive(Debug)]
pub struct PreprocessCarrier {
    /// The entity being preprocessed. Steps may replace it outright.
    pub entity: Entity,
    origin: Origin,
    mapping_exists: Option<bool>,
    rejected: bool,
}

impl PreprocessCarrier {
    /// Create a carrier for an entity of the given origin.
    pub fn new(entity: Entity, origin: Origin) -> Self {
        Self {
            entity,
            origin,
            mapping_exists: None,
            rejected: false,
        }
    }

    /// Record whether a cross-system mapping already exists for this entity.
    #[must_use]
    pub fn with_mapping_exists(mut self, mapping_exists: bool) -> Self {
        self.mapping_exists = Some(mapping_exists);
        self
    }

    /// The origin this carrier was created with.
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Whether a cross-system mapping already exists, if known.
    pub fn mapping_exists(&self) -> Option<bool> {
        self.mapping_exists
    }

    /// Whether the entity has been rejected.
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// Reject the carried entity. The flag is one-way: once set it stays set
    /// for the remainder of the pipeline.
    ///
    /// # Panics
    ///
    /// Panics when called on a destination-origin carrier; only incoming
    /// source records can be rejected, and a step attempting otherwise is a
    /// programming error.
    pub fn reject(&mut self) {
        assert!(
            self.origin == Origin::Source,
            "reject() called on a {}-origin carrier",
            self.origin
        );
        self.rejected = true;
    }
}

/// One preprocessing operation.
pub trait PreprocessStep: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Transform or validate the carried entity.
    fn apply(
        &self,
        metadata: &EntityTypeMetadata,
        carrier: &mut PreprocessCarrier,
    ) -> ReconcileResult<()>;
}

/// Final result of one pipeline invocation.
#[derive(Debug)]
pub struct PreprocessOutcome {
    /// The (possibly replaced) entity.
    pub entity: Entity,
    /// Whether any step rejected the entity.
    pub rejected: bool,
}

/// An ordered preprocessing pipeline.
pub struct Pipeline {
    metadata: Arc<dyn MetadataProvider>,
    steps: Vec<Box<dyn PreprocessStep>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            metadata,
            steps: Vec::new(),
        }
    }

    /// Append a step. Order of registration is order of execution.
    #[must_use]
    pub fn with_step(mut self, step: impl PreprocessStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Run every step over the carrier, in order, without short-circuiting on
    /// rejection. A hard fault from any step aborts the entity and
    /// propagates.
    pub fn run(&self, mut carrier: PreprocessCarrier) -> ReconcileResult<PreprocessOutcome> {
        let entity_type = carrier.entity.entity_type;
        let metadata = self
            .metadata
            .metadata(entity_type)
            .ok_or(ReconcileError::MissingMetadata { entity_type })?;

        for step in &self.steps {
            tracing::debug!(step = step.name(), "running preprocessing step");
            step.apply(&metadata, &mut carrier)?;
        }

        Ok(PreprocessOutcome {
            entity: carrier.entity,
            rejected: carrier.rejected,
        })
    }
}

/// Truncates string values exceeding their property's configured maximum
/// length. Runs for any origin.
#[derive(Debug, Default)]
pub struct LengthEnforcer;

impl PreprocessStep for LengthEnforcer {
    fn name(&self) -> &'static str {
        "length_enforcer"
    }

    fn apply(
        &self,
        metadata: &EntityTypeMetadata,
        carrier: &mut PreprocessCarrier,
    ) -> ReconcileResult<()> {
        for property in &metadata.properties {
            let Some(max_length) = property.max_length else {
                continue;
            };
            let Some(value) = carrier.entity.get(&property.name).as_str() else {
                continue;
            };
            if value.chars().count() > max_length {
                let truncated: String = value.chars().take(max_length).collect();
                tracing::debug!(
                    property = %property.name,
                    max_length,
                    "truncating over-long string value"
                );
                carrier.entity.set(property.name.clone(), truncated);
            }
        }
        Ok(())
    }
}

/// Converts whitespace-only string values to null for properties opting into
/// that policy. Runs for any origin.
#[derive(Debug, Default)]
pub struct WhitespaceNullifier;

impl PreprocessStep for WhitespaceNullifier {
    fn name(&self) -> &'static str {
        "whitespace_nullifier"
    }

    fn apply(
        &self,
        metadata: &EntityTypeMetadata,
        carrier: &mut PreprocessCarrier,
    ) -> ReconcileResult<()> {
        for property in &metadata.properties {
            if !property.whitespace_to_null {
                continue;
            }
            let is_blank = carrier
                .entity
                .get(&property.name)
                .as_str()
                .is_some_and(|s| s.trim().is_empty());
            if is_blank {
                carrier.entity.set(property.name.clone(), FieldValue::Null);
            }
        }
        Ok(())
    }
}
