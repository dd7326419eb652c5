//! # Core Type Definitions
//!
//! This module contains the value-level types shared by every Tabula layer:
//! - Entity identity (`EntityKey`, `Entity`)
//! - Dynamic property values (`Value`, `Property`)
//! - Error types (`TabulaError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Have a canonical string form used for change detection and fallbacks

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ENTITY IDENTITY
// =============================================================================

/// Stable surrogate identifier of an entity (the table's row key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey(pub u64);

impl EntityKey {
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything that can be shown as a table row.
///
/// The key must be unique and stable; it backs row lookup, selection
/// change detection and keyset pagination.
pub trait Entity: Clone {
    fn key(&self) -> EntityKey;
}

// =============================================================================
// VALUES
// =============================================================================

/// A single resolved property value.
///
/// Enumerations and dates are carried as `Text` in their canonical form
/// (e.g. `"FEMALE"`, `"1950-01-01"`), which keeps ISO dates ordered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Value {
    /// Create a text value.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Canonical string form used for de-duplication and string fallbacks.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<EntityKey> for Value {
    fn from(value: EntityKey) -> Self {
        Self::from(value.0)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// The result of resolving a field path against an entity.
///
/// `Many` appears as soon as the path crosses a collection-valued
/// relationship; matching over it is existential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    One(Value),
    Many(Vec<Value>),
}

impl Property {
    /// A property is null when it is a null scalar or an empty collection.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::One(value) => value.is_null(),
            Self::Many(values) => values.iter().all(Value::is_null),
        }
    }

    /// Iterate the non-null values of this property.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        let slice: &[Value] = match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        slice.iter().filter(|v| !v.is_null())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Tabula engine.
///
/// - No silent failures
/// - Use `Result<T, TabulaError>` for fallible operations
/// - The engine never panics; a failed load leaves committed state intact
#[derive(Debug, Error)]
pub enum TabulaError {
    /// A page was requested with a non-positive limit.
    #[error("Invalid page limit: {0} (must be > 0)")]
    InvalidLimit(i64),

    /// The table configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A field path has no registered accessor.
    #[error("Unknown field path: {0}")]
    UnknownField(String),

    /// A predicate cannot be evaluated by this backend.
    #[error("Unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    /// The backend failed to produce a page.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
