//! # Page Descriptor
//!
//! Immutable snapshot of one fetch: offset, limit, ordering, criteria and an
//! optional cursor hint. A new descriptor is built per reconciliation cycle.

use crate::criteria::{Criteria, CriteriaSet};
use crate::ordering::OrderBy;
use crate::types::TabulaError;
use serde::{Deserialize, Serialize};

/// Navigation direction relative to the previous window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// Boundary entity of the previous window, offered for keyset pagination.
///
/// - `Forward`: the last item of the previous window; the page starts after it.
/// - `Backward`: the first item of the previous window; the page ends before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorHint<E> {
    pub entity: E,
    pub direction: Direction,
}

/// Descriptor of a single page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor<E> {
    offset: usize,
    limit: usize,
    ordering: OrderBy,
    criteria: CriteriaSet,
    cursor: Option<CursorHint<E>>,
}

impl<E> PageDescriptor<E> {
    /// Create a descriptor.
    ///
    /// A negative offset is clamped to zero.
    ///
    /// # Errors
    ///
    /// Returns `TabulaError::InvalidLimit` if `limit <= 0`.
    pub fn new(
        offset: i64,
        limit: i64,
        ordering: OrderBy,
        criteria: CriteriaSet,
    ) -> Result<Self, TabulaError> {
        if limit <= 0 {
            return Err(TabulaError::InvalidLimit(limit));
        }
        Ok(Self {
            offset: usize::try_from(offset.max(0)).unwrap_or(usize::MAX),
            limit: usize::try_from(limit).unwrap_or(usize::MAX),
            ordering,
            criteria,
            cursor: None,
        })
    }

    /// Descriptor covering every matching row (used for exports).
    #[must_use]
    pub fn unbounded(ordering: OrderBy, criteria: CriteriaSet) -> Self {
        Self {
            offset: 0,
            limit: usize::MAX,
            ordering,
            criteria,
            cursor: None,
        }
    }

    /// Attach a cursor hint.
    #[must_use]
    pub fn with_cursor(mut self, cursor: CursorHint<E>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Same descriptor at another offset, without cursor hint.
    #[must_use]
    pub fn at_offset(&self, offset: usize) -> Self
    where
        E: Clone,
    {
        Self {
            offset,
            limit: self.limit,
            ordering: self.ordering.clone(),
            criteria: self.criteria.clone(),
            cursor: None,
        }
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub const fn ordering(&self) -> &OrderBy {
        &self.ordering
    }

    #[must_use]
    pub const fn criteria(&self) -> &CriteriaSet {
        &self.criteria
    }

    #[must_use]
    pub const fn required(&self) -> &Criteria {
        &self.criteria.required
    }

    #[must_use]
    pub const fn optional(&self) -> &Criteria {
        &self.criteria.optional
    }

    #[must_use]
    pub const fn cursor(&self) -> Option<&CursorHint<E>> {
        self.cursor.as_ref()
    }

    /// Exclusive end of the requested range, saturating.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset.saturating_add(self.limit)
    }

    /// Whether both descriptors carry equal required and optional criteria.
    #[must_use]
    pub fn same_criteria<O>(&self, other: &PageDescriptor<O>) -> bool {
        self.criteria == other.criteria
    }
}

// =============================================================================
// TESTS
// =============================================================================
