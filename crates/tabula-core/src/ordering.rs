//! # Ordering Model
//!
//! An ordered list of `(field, ascending)` pairs. Insertion order is the
//! priority: the first key is the primary sort key.
//!
//! A normalized ordering is never empty: the configured defaults are always
//! appended when absent, which keeps pagination reproducible even when the
//! user never picked a sort column.
//!
//! Equality is order-sensitive on purpose. It is how the engine answers
//! "did the sort change" for recount and keyset decisions.

use crate::primitives::{DESCENDING_PREFIX, ORDER_TOKEN_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    #[must_use]
    pub fn new(field: impl Into<String>, ascending: bool) -> Self {
        Self {
            field: field.into(),
            ascending,
        }
    }

    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, true)
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, false)
    }
}

/// Ordered sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderBy {
    keys: Vec<SortKey>,
}

impl OrderBy {
    /// Create an empty ordering.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an ordering from keys. Later duplicates of a field are dropped.
    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = SortKey>) -> Self {
        let mut order = Self::new();
        for key in keys {
            order.push(key);
        }
        order
    }

    /// Append an ascending key.
    #[must_use]
    pub fn then_asc(mut self, field: impl Into<String>) -> Self {
        self.push(SortKey::asc(field));
        self
    }

    /// Append a descending key.
    #[must_use]
    pub fn then_desc(mut self, field: impl Into<String>) -> Self {
        self.push(SortKey::desc(field));
        self
    }

    /// Append a key unless its field is already present.
    ///
    /// Returns whether the key was added.
    pub fn push(&mut self, key: SortKey) -> bool {
        if self.contains(&key.field) {
            return false;
        }
        self.keys.push(key);
        true
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.keys.iter().any(|k| k.field == field)
    }

    #[must_use]
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// The primary (first) sort key.
    #[must_use]
    pub fn primary(&self) -> Option<&SortKey> {
        self.keys.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keep only the keys accepted by `allowed`, preserving order.
    #[must_use]
    pub fn retain_fields(&self, allowed: impl Fn(&str) -> bool) -> Self {
        Self::from_keys(self.keys.iter().filter(|k| allowed(&k.field)).cloned())
    }

    /// Parse an order token such as `-dateOfBirth,email`.
    ///
    /// Returns `None` for malformed tokens: blank input, an empty segment,
    /// a bare `-`, or whitespace inside a field name.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        let mut order = Self::new();
        for segment in token.split(ORDER_TOKEN_SEPARATOR) {
            let segment = segment.trim();
            let (field, ascending) = match segment.strip_prefix(DESCENDING_PREFIX) {
                Some(rest) => (rest, false),
                None => (segment, true),
            };
            if field.is_empty() || field.chars().any(char::is_whitespace) {
                return None;
            }
            order.push(SortKey::new(field, ascending));
        }
        Some(order)
    }

    /// Render this ordering as an order token (inverse of [`OrderBy::parse`]).
    #[must_use]
    pub fn to_token(&self) -> String {
        self.keys
            .iter()
            .map(|k| {
                if k.ascending {
                    k.field.clone()
                } else {
                    format!("{DESCENDING_PREFIX}{}", k.field)
                }
            })
            .collect::<Vec<_>>()
            .join(&ORDER_TOKEN_SEPARATOR.to_string())
    }

    /// Merge a requested ordering with the configured defaults.
    ///
    /// Resolution order for the prefix:
    /// 1. `requested`, when present and non-empty
    /// 2. the parsed `seed` token, when present and well-formed
    /// 3. nothing (defaults only)
    ///
    /// Every default key whose field is absent from the prefix is then
    /// appended, in default order. A malformed seed is ignored.
    #[must_use]
    pub fn normalize(requested: Option<&Self>, seed: Option<&str>, defaults: &Self) -> Self {
        let prefix = match requested.filter(|r| !r.is_empty()) {
            Some(requested) => requested.clone(),
            None => match seed {
                Some(token) => Self::parse(token).unwrap_or_else(|| {
                    tracing::warn!(token, "ignoring malformed order token");
                    Self::new()
                }),
                None => Self::new(),
            },
        };

        let mut merged = prefix;
        for key in &defaults.keys {
            merged.push(key.clone());
        }
        merged
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

// =============================================================================
// TESTS
// =============================================================================
