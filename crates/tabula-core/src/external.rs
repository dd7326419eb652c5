//! # External State Tokens
//!
//! Bookmarkable view state carried outside the engine (typically a query
//! string), read to seed an initial load and rendered back after each load:
//!
//! | token      | meaning                                  |
//! |------------|------------------------------------------|
//! | `p`        | 1-based page number                      |
//! | `o`        | order token, `-` prefix = descending     |
//! | `q`        | global search text                       |
//! | `selected` | selected row key (repeatable)            |
//! | any other  | per-field filter value                   |
//!
//! Values are trimmed and blank values are dropped. Malformed page numbers
//! and selected keys are ignored with a warning; they never fail a load.

use crate::primitives::{ORDER_TOKEN, PAGE_TOKEN, SEARCH_TOKEN, SELECTED_TOKEN};
use crate::types::EntityKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw external state tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub selected: Vec<String>,
}

impl ExternalState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect state from `name=value` pairs.
    ///
    /// Later values of a single-valued token replace earlier ones.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut state = Self::new();
        for (name, value) in pairs {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                PAGE_TOKEN => state.page = Some(value.to_string()),
                ORDER_TOKEN => state.order = Some(value.to_string()),
                SEARCH_TOKEN => state.search = Some(value.to_string()),
                SELECTED_TOKEN => state.selected.push(value.to_string()),
                field => {
                    state.filters.insert(field.to_string(), value.to_string());
                }
            }
        }
        state
    }

    /// Render the state as `name=value` pairs (`p`, `o`, `q`, filters, `selected`).
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let singles = [
            (PAGE_TOKEN, &self.page),
            (ORDER_TOKEN, &self.order),
            (SEARCH_TOKEN, &self.search),
        ];
        for (name, value) in singles {
            if let Some(value) = value {
                pairs.push((name.to_string(), value.clone()));
            }
        }
        for (field, value) in &self.filters {
            pairs.push((field.clone(), value.clone()));
        }
        for key in &self.selected {
            pairs.push((SELECTED_TOKEN.to_string(), key.clone()));
        }
        pairs
    }

    /// The 1-based page number, if present and well-formed.
    #[must_use]
    pub fn page_number(&self) -> Option<usize> {
        let raw = self.page.as_deref()?.trim();
        match raw.parse::<usize>() {
            Ok(page) if page >= 1 => Some(page),
            _ => {
                tracing::warn!(token = raw, "ignoring malformed page token");
                None
            }
        }
    }

    /// Trimmed, non-blank global search text.
    #[must_use]
    pub fn search_text(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Trimmed, non-blank filter value for a field.
    #[must_use]
    pub fn filter(&self, field: &str) -> Option<&str> {
        self.filters
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Selected keys that parse as row keys; malformed ones are skipped.
    #[must_use]
    pub fn selected_keys(&self) -> Vec<EntityKey> {
        self.selected
            .iter()
            .filter_map(|raw| match raw.trim().parse::<u64>() {
                Ok(key) => Some(EntityKey(key)),
                Err(_) => {
                    tracing::warn!(token = raw.as_str(), "ignoring malformed selected key");
                    None
                }
            })
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.page.is_none()
            && self.order.is_none()
            && self.search.is_none()
            && self.filters.is_empty()
            && self.selected.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
