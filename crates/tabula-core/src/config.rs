//! # Table Configuration
//!
//! Explicit description of a table view, passed into the engine instead of
//! being discovered from a UI component tree:
//!
//! ```text
//! { fields: [{ path, filterable, sortable, searchable, match_mode }],
//!   default_ordering, page_size, id_field, nulls_last, case_sensitive }
//! ```
//!
//! The app layer deserializes this from TOML.

use crate::criteria::MatchMode;
use crate::ordering::OrderBy;
use crate::primitives::{DEFAULT_ID_FIELD, DEFAULT_PAGE_SIZE, MAX_FIELD_PATH_LENGTH};
use crate::types::TabulaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-column configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Dotted property path (`address.city`, `phones.number`).
    pub path: String,
    #[serde(default = "default_true")]
    pub filterable: bool,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub match_mode: MatchMode,
}

fn default_true() -> bool {
    true
}

impl FieldConfig {
    /// A filterable, sortable, non-searchable column with exact matching.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filterable: true,
            sortable: true,
            searchable: false,
            match_mode: MatchMode::Exact,
        }
    }

    #[must_use]
    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    #[must_use]
    pub fn match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    #[must_use]
    pub fn not_filterable(mut self) -> Self {
        self.filterable = false;
        self
    }

    #[must_use]
    pub fn not_sortable(mut self) -> Self {
        self.sortable = false;
        self
    }
}

/// Configuration of one table view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub fields: Vec<FieldConfig>,
    #[serde(default = "default_ordering")]
    pub default_ordering: OrderBy,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Place null property values after non-null ones regardless of direction.
    #[serde(default = "default_true")]
    pub nulls_last: bool,
    /// Use case-sensitive collation for text sorting.
    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_ordering() -> OrderBy {
    OrderBy::new().then_desc(DEFAULT_ID_FIELD)
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

impl TableConfig {
    /// Create a configuration with the stock defaults (`id` descending,
    /// ten rows per page, nulls last, case-insensitive collation).
    #[must_use]
    pub fn new(fields: Vec<FieldConfig>) -> Self {
        Self {
            fields,
            default_ordering: default_ordering(),
            page_size: default_page_size(),
            id_field: default_id_field(),
            nulls_last: true,
            case_sensitive: false,
        }
    }

    #[must_use]
    pub fn with_default_ordering(mut self, ordering: OrderBy) -> Self {
        self.default_ordering = ordering;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn field(&self, path: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.path == path)
    }

    #[must_use]
    pub fn is_filterable(&self, path: &str) -> bool {
        self.field(path).is_some_and(|f| f.filterable)
    }

    #[must_use]
    pub fn is_sortable(&self, path: &str) -> bool {
        self.field(path).is_some_and(|f| f.sortable)
    }

    pub fn filterable_fields(&self) -> impl Iterator<Item = &FieldConfig> {
        self.fields.iter().filter(|f| f.filterable)
    }

    pub fn searchable_fields(&self) -> impl Iterator<Item = &FieldConfig> {
        self.fields.iter().filter(|f| f.searchable)
    }

    /// Validate internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `TabulaError::InvalidConfig` if:
    /// - the page size is zero
    /// - the default ordering is empty or names an undeclared field
    /// - a field path is empty, too long, or declared twice
    /// - the id field is not declared
    pub fn validate(&self) -> Result<(), TabulaError> {
        if self.page_size == 0 {
            return Err(TabulaError::InvalidConfig(
                "page_size must be greater than zero".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if field.path.is_empty() || field.path.len() > MAX_FIELD_PATH_LENGTH {
                return Err(TabulaError::InvalidConfig(format!(
                    "invalid field path '{}'",
                    field.path
                )));
            }
            if !seen.insert(field.path.as_str()) {
                return Err(TabulaError::InvalidConfig(format!(
                    "field '{}' declared twice",
                    field.path
                )));
            }
        }

        if !seen.contains(self.id_field.as_str()) {
            return Err(TabulaError::InvalidConfig(format!(
                "id field '{}' is not declared",
                self.id_field
            )));
        }

        if self.default_ordering.is_empty() {
            return Err(TabulaError::InvalidConfig(
                "default_ordering must not be empty".to_string(),
            ));
        }
        for key in self.default_ordering.keys() {
            if !seen.contains(key.field.as_str()) {
                return Err(TabulaError::InvalidConfig(format!(
                    "default ordering field '{}' is not declared",
                    key.field
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
