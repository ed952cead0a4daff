//! Canonical identifiers.
//!
//! Source and destination systems mint identifiers of different shapes:
//! bounded strings, GUIDs, signed and unsigned 32/64-bit integers. A
//! [`CanonicalId`] normalizes any of them to a comparable form; equality,
//! ordering and hashing are defined over the canonical string form so
//! identifiers of different backing kinds can be compared meaningfully.
//!
//! The canonical string form is one of the two durable outputs of this engine
//! (the other is the content hash), so it must stay deterministic across runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ReconcileError, ReconcileResult};
use crate::value::FieldValue;

/// Maximum length, in characters, of the canonical string form.
///
/// Matches the bounded identifier columns of the destination store.
pub const MAX_CANONICAL_LEN: usize = 450;

/// The kind of primitive backing a canonical identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Bounded UTF-8 string (at most [`MAX_CANONICAL_LEN`] characters).
    Text,
    /// GUID.
    Guid,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
}

impl IdentifierKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Text => "text",
            IdentifierKind::Guid => "guid",
            IdentifierKind::Int32 => "int32",
            IdentifierKind::UInt32 => "uint32",
            IdentifierKind::Int64 => "int64",
            IdentifierKind::UInt64 => "uint64",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = ParseIdentifierKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(IdentifierKind::Text),
            "guid" => Ok(IdentifierKind::Guid),
            "int32" => Ok(IdentifierKind::Int32),
            "uint32" => Ok(IdentifierKind::UInt32),
            "int64" => Ok(IdentifierKind::Int64),
            "uint64" => Ok(IdentifierKind::UInt64),
            _ => Err(ParseIdentifierKindError(s.to_string())),
        }
    }
}

/// Error parsing an identifier kind from string.
#[derive(Debug, Clone)]
pub struct ParseIdentifierKindError(String);

impl fmt::Display for ParseIdentifierKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid identifier kind '{}', expected one of: text, guid, int32, uint32, int64, uint64",
            self.0
        )
    }
}

impl std::error::Error for ParseIdentifierKindError {}

/// The typed primitive value backing a canonical identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdValue {
    /// Bounded string.
    Text(String),
    /// GUID.
    Guid(Uuid),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
}

impl IdValue {
    /// The kind of this value.
    pub fn kind(&self) -> IdentifierKind {
        match self {
            IdValue::Text(_) => IdentifierKind::Text,
            IdValue::Guid(_) => IdentifierKind::Guid,
            IdValue::Int32(_) => IdentifierKind::Int32,
            IdValue::UInt32(_) => IdentifierKind::UInt32,
            IdValue::Int64(_) => IdentifierKind::Int64,
            IdValue::UInt64(_) => IdentifierKind::UInt64,
        }
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Text(s) => write!(f, "{s}"),
            IdValue::Guid(g) => write!(f, "{g}"),
            IdValue::Int32(i) => write!(f, "{i}"),
            IdValue::UInt32(i) => write!(f, "{i}"),
            IdValue::Int64(i) => write!(f, "{i}"),
            IdValue::UInt64(i) => write!(f, "{i}"),
        }
    }
}

/// A capability for user-defined types that can canonicalize themselves.
///
/// Types outside the recognized primitive kinds opt into identifier
/// normalization by implementing this trait; conversion failures are wrapped
/// into a uniform conversion fault naming the offending type.
pub trait ToCanonicalId {
    /// Produce the canonical identifier for this value.
    fn to_canonical_id(&self) -> Result<CanonicalId, Box<dyn std::error::Error + Send + Sync>>;
}

/// An immutable, normalized identifier value.
///
/// Created by normalizing a raw value; never mutated. Equality, ordering and
/// hashing use the canonical string form only, so a `Text("42")` and an
/// `Int32(42)` identifier compare equal.
#[derive(Debug, Clone)]
pub struct CanonicalId {
    value: IdValue,
    canonical: String,
}

impl CanonicalId {
    /// Normalize a typed primitive into a canonical identifier.
    ///
    /// Fails with a conversion fault if a text value exceeds
    /// [`MAX_CANONICAL_LEN`] characters.
    pub fn new(value: IdValue) -> ReconcileResult<Self> {
        if let IdValue::Text(s) = &value {
            let len = s.chars().count();
            if len > MAX_CANONICAL_LEN {
                return Err(ReconcileError::conversion(
                    IdentifierKind::Text.as_str(),
                    format!("identifier of {len} characters exceeds the {MAX_CANONICAL_LEN}-character bound"),
                ));
            }
        }
        let canonical = value.to_string();
        Ok(Self { value, canonical })
    }

    /// Normalize an entity field value.
    ///
    /// Null becomes `None`; recognized primitive kinds stringify directly;
    /// any other kind is a conversion fault naming the offending kind.
    pub fn from_field(raw: &FieldValue) -> ReconcileResult<Option<Self>> {
        let value = match raw {
            FieldValue::Null => return Ok(None),
            FieldValue::String(s) => IdValue::Text(s.clone()),
            FieldValue::Guid(g) => IdValue::Guid(*g),
            FieldValue::Int32(i) => IdValue::Int32(*i),
            FieldValue::UInt32(i) => IdValue::UInt32(*i),
            FieldValue::Int64(i) => IdValue::Int64(*i),
            FieldValue::UInt64(i) => IdValue::UInt64(*i),
            other => {
                return Err(ReconcileError::conversion(
                    other.kind_name(),
                    "kind has no canonical identifier form",
                ))
            }
        };
        Self::new(value).map(Some)
    }

    /// Normalize a user-defined value through its registered capability.
    ///
    /// A failure of the capability itself is wrapped into a conversion fault
    /// naming the concrete type.
    pub fn from_custom<T: ToCanonicalId>(raw: &T) -> ReconcileResult<Self> {
        raw.to_canonical_id().map_err(|e| {
            ReconcileError::conversion_with_source(
                std::any::type_name::<T>(),
                "conversion capability failed",
                ErrorBox(e),
            )
        })
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The typed backing value.
    pub fn value(&self) -> &IdValue {
        &self.value
    }

    /// The kind of the backing value.
    pub fn kind(&self) -> IdentifierKind {
        self.value.kind()
    }

    /// Convert back to a typed primitive of the requested kind.
    ///
    /// Malformed canonical text for the requested kind (a bad GUID or integer
    /// literal) is a conversion fault wrapping the underlying parse error.
    pub fn to_id_value(&self, kind: IdentifierKind) -> ReconcileResult<IdValue> {
        let canonical = &self.canonical;
        match kind {
            IdentifierKind::Text => Ok(IdValue::Text(canonical.clone())),
            IdentifierKind::Guid => Uuid::parse_str(canonical)
                .map(IdValue::Guid)
                .map_err(|e| conversion_err(kind, canonical, e)),
            IdentifierKind::Int32 => canonical
                .parse::<i32>()
                .map(IdValue::Int32)
                .map_err(|e| conversion_err(kind, canonical, e)),
            IdentifierKind::UInt32 => canonical
                .parse::<u32>()
                .map(IdValue::UInt32)
                .map_err(|e| conversion_err(kind, canonical, e)),
            IdentifierKind::Int64 => canonical
                .parse::<i64>()
                .map(IdValue::Int64)
                .map_err(|e| conversion_err(kind, canonical, e)),
            IdentifierKind::UInt64 => canonical
                .parse::<u64>()
                .map(IdValue::UInt64)
                .map_err(|e| conversion_err(kind, canonical, e)),
        }
    }

    /// Convert back to an entity field value of the requested kind.
    pub fn to_field(&self, kind: IdentifierKind) -> ReconcileResult<FieldValue> {
        Ok(match self.to_id_value(kind)? {
            IdValue::Text(s) => FieldValue::String(s),
            IdValue::Guid(g) => FieldValue::Guid(g),
            IdValue::Int32(i) => FieldValue::Int32(i),
            IdValue::UInt32(i) => FieldValue::UInt32(i),
            IdValue::Int64(i) => FieldValue::Int64(i),
            IdValue::UInt64(i) => FieldValue::UInt64(i),
        })
    }
}

fn conversion_err(
    kind: IdentifierKind,
    canonical: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> ReconcileError {
    ReconcileError::conversion_with_source(
        kind.as_str(),
        format!("'{canonical}' is not a valid {kind} literal"),
        source,
    )
}

/// Adapter so a boxed error can be carried as a `#[source]`.
struct ErrorBox(Box<dyn std::error::Error + Send + Sync>);

impl fmt::Debug for ErrorBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ErrorBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorBox {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl PartialEq for CanonicalId {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for CanonicalId {}

impl PartialOrd for CanonicalId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl Hash for CanonicalId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}
