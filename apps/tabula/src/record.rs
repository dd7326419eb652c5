//! # Schemaless Records
//!
//! Rows served by the binary are arbitrary JSON objects with a numeric id.
//! They are stored as [`Record`]s: a key plus a tree of [`Field`]s that
//! postcard can encode (no self-describing formats in the store).
//!
//! Dotted paths walk nested objects. Walking through an array fans out
//! over its elements, so `phones.type` on a list of phone objects yields a
//! multi-valued property.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tabula_core::{
    AccessorTable, Entity, EntityKey, Property, TableConfig, TabulaError, Value,
    criteria::path_segments,
};

/// One stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Field>),
    Object(BTreeMap<String, Field>),
}

impl Field {
    /// Convert a JSON value. Numbers outside `i64` are kept as text.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Text(n.to_string()),
            },
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Scalar value; lists and objects have none.
    fn scalar(&self) -> Option<Value> {
        match self {
            Self::Null => Some(Value::Null),
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Int(i) => Some(Value::Int(*i)),
            Self::Text(s) => Some(Value::Text(s.clone())),
            Self::List(_) | Self::Object(_) => None,
        }
    }
}

/// A stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub fields: BTreeMap<String, Field>,
}

impl Entity for Record {
    fn key(&self) -> EntityKey {
        EntityKey(self.id)
    }
}

impl Record {
    /// Build a record from a JSON object whose `id_field` holds a non-negative integer.
    ///
    /// # Errors
    ///
    /// Returns `TabulaError::DeserializationError` for non-objects and
    /// missing or non-numeric ids.
    pub fn from_json(value: serde_json::Value, id_field: &str) -> Result<Self, TabulaError> {
        let serde_json::Value::Object(mut map) = value else {
            return Err(TabulaError::DeserializationError(
                "row must be a JSON object".to_string(),
            ));
        };
        let id = map
            .remove(id_field)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                TabulaError::DeserializationError(format!(
                    "row is missing a non-negative integer '{}'",
                    id_field
                ))
            })?;
        let fields = map
            .into_iter()
            .map(|(k, v)| (k, Field::from_json(v)))
            .collect();
        Ok(Self { id, fields })
    }

    /// Render as a JSON object, id first.
    #[must_use]
    pub fn to_json(&self, id_field: &str) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(id_field.to_string(), serde_json::Value::from(self.id));
        for (name, field) in &self.fields {
            map.insert(name.clone(), field.to_json());
        }
        serde_json::Value::Object(map)
    }

    /// Resolve a dotted path.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Property {
        let segments: Vec<&str> = path_segments(path).collect();
        self.lookup_segments(&segments)
    }

    /// Resolve a path already split into segments.
    #[must_use]
    pub fn lookup_segments<S: AsRef<str>>(&self, segments: &[S]) -> Property {
        let Some((first, rest)) = segments.split_first() else {
            return Property::One(Value::Null);
        };

        let first: &str = first.as_ref();
        let mut current: Vec<&Field> = self.fields.get(first).into_iter().collect();
        let mut fanned = false;
        for segment in rest {
            let segment: &str = segment.as_ref();
            let mut next = Vec::new();
            for field in current {
                match field {
                    Field::Object(map) => next.extend(map.get(segment)),
                    Field::List(items) => {
                        fanned = true;
                        for item in items {
                            if let Field::Object(map) = item {
                                next.extend(map.get(segment));
                            }
                        }
                    }
                    _ => {}
                }
            }
            current = next;
        }

        let mut values = Vec::new();
        for field in current {
            match field {
                Field::List(items) => {
                    fanned = true;
                    values.extend(items.iter().filter_map(Field::scalar));
                }
                other => values.extend(other.scalar()),
            }
        }

        if fanned {
            Property::Many(values)
        } else {
            Property::One(values.into_iter().next().unwrap_or(Value::Null))
        }
    }
}

/// Accessor table covering every configured field path.
///
/// The id field always resolves to the record key. Other paths are split
/// into segments once, here.
#[must_use]
pub fn accessors(config: &TableConfig) -> AccessorTable<Record> {
    let mut table =
        AccessorTable::new().field(&config.id_field, |r: &Record| Value::from(r.id));
    for field in &config.fields {
        if field.path == config.id_field {
            continue;
        }
        let segments: Vec<String> = path_segments(&field.path).map(str::to_string).collect();
        table = table.property(&field.path, move |r: &Record| r.lookup_segments(&segments));
    }
    table
}

/// Project a value for JSON output.
#[must_use]
pub fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Text(s) => serde_json::Value::String(s.clone()),
    }
}

#[must_use]
pub fn property_json(property: &Property) -> serde_json::Value {
    match property {
        Property::One(v) => value_json(v),
        Property::Many(vs) => serde_json::Value::Array(vs.iter().map(value_json).collect()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
