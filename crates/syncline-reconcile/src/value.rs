//! Entity field values.
//!
//! A [`FieldValue`] is the runtime representation of one mapped field on an
//! entity. Values are kept loosely typed so the engine can diff and propagate
//! fields of arbitrary entity shapes; identifier-capable kinds (string, GUID,
//! 32/64-bit integers) convert to canonical identifiers, the rest do not.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A value held by one entity field.
///
/// Serialized untagged, so JSON round-trips to the natural scalar forms
/// (GUIDs and unsigned 64-bit values wider than `i64` travel as strings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// No value.
    Null,
    /// A UTF-8 string value.
    String(String),
    /// A GUID value.
    Guid(Uuid),
    /// A signed 32-bit integer.
    Int32(i32),
    /// An unsigned 32-bit integer.
    UInt32(u32),
    /// A signed 64-bit integer.
    Int64(i64),
    /// An unsigned 64-bit integer.
    UInt64(u64),
    /// A boolean value.
    Boolean(bool),
    /// A floating-point value.
    Float(f64),
}

impl FieldValue {
    /// Check if this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Get as a string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as a GUID if this is a GUID value.
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            FieldValue::Guid(g) => Some(*g),
            _ => None,
        }
    }

    /// Get as a signed 64-bit integer if this is any integer kind that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int32(i) => Some(i64::from(*i)),
            FieldValue::UInt32(i) => Some(i64::from(*i)),
            FieldValue::Int64(i) => Some(*i),
            FieldValue::UInt64(i) => i64::try_from(*i).ok(),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// A short name for the kind of this value, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::String(_) => "string",
            FieldValue::Guid(_) => "guid",
            FieldValue::Int32(_) => "int32",
            FieldValue::UInt32(_) => "uint32",
            FieldValue::Int64(_) => "int64",
            FieldValue::UInt64(_) => "uint64",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Float(_) => "float",
        }
    }

    /// Culture-invariant string representation, `None` for null.
    ///
    /// This is the representation recorded in change logs and compared when
    /// stringifying old/new values; it never varies with locale.
    pub fn display_string(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Compare two values for equality, optionally ignoring trailing
    /// whitespace when both sides are strings.
    ///
    /// Null compares equal only to null; non-string kinds always use exact
    /// equality.
    pub fn equals(&self, other: &FieldValue, ignore_trailing_whitespace: bool) -> bool {
        if ignore_trailing_whitespace {
            if let (FieldValue::String(a), FieldValue::String(b)) = (self, other) {
                return a.trim_end() == b.trim_end();
            }
        }
        self == other
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, ""),
            FieldValue::String(s) => write!(f, "{s}"),
            FieldValue::Guid(g) => write!(f, "{g}"),
            FieldValue::Int32(i) => write!(f, "{i}"),
            FieldValue::UInt32(i) => write!(f, "{i}"),
            FieldValue::Int64(i) => write!(f, "{i}"),
            FieldValue::UInt64(i) => write!(f, "{i}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<Uuid> for FieldValue {
    fn from(g: Uuid) -> Self {
        FieldValue::Guid(g)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int32(i)
    }
}

impl From<u32> for FieldValue {
    fn from(i: u32) -> Self {
        FieldValue::UInt32(i)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int64(i)
    }
}

impl From<u64> for FieldValue {
    fn from(i: u64) -> Self {
        FieldValue::UInt64(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::Float(x)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => FieldValue::Null,
        }
    }
}
