//! # Result Fetcher Contract
//!
//! The one interface the engine consumes from its environment:
//!
//! ```text
//! fetch(page, estimate_total) -> (items, estimated_total)
//! ```
//!
//! `estimated_total == -1` means unknown or not computed. Any other value is
//! authoritative for the page's criteria until they change.
//!
//! Implementations:
//! - [`crate::InMemoryFetcher`] over a materialized collection (total always exact)
//! - [`crate::RedbStore`] over a persistent store (total only when asked)
//! - any closure `FnMut(&PageDescriptor<E>, bool) -> Result<FetchResult<E>, TabulaError>`

use crate::page::PageDescriptor;
use crate::primitives::UNKNOWN_TOTAL;
use crate::types::TabulaError;

/// Items of one page plus the backend's estimate of the matching total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult<E> {
    pub items: Vec<E>,
    pub estimated_total: i64,
}

impl<E> FetchResult<E> {
    #[must_use]
    pub const fn new(items: Vec<E>, estimated_total: i64) -> Self {
        Self {
            items,
            estimated_total,
        }
    }

    /// A page whose total was not computed.
    #[must_use]
    pub const fn without_total(items: Vec<E>) -> Self {
        Self::new(items, UNKNOWN_TOTAL)
    }

    #[must_use]
    pub const fn has_total(&self) -> bool {
        self.estimated_total != UNKNOWN_TOTAL
    }
}

/// Backend capable of producing one page of entities.
pub trait ResultFetcher<E> {
    /// Fetch the page described by `page`.
    ///
    /// `estimate_total` asks the backend to (re)compute the matching total;
    /// when false it may return `-1`.
    ///
    /// # Errors
    ///
    /// Backend failures propagate unchanged; the engine keeps its
    /// previously committed state.
    fn fetch(
        &mut self,
        page: &PageDescriptor<E>,
        estimate_total: bool,
    ) -> Result<FetchResult<E>, TabulaError>;
}

impl<E, F> ResultFetcher<E> for F
where
    F: FnMut(&PageDescriptor<E>, bool) -> Result<FetchResult<E>, TabulaError>,
{
    fn fetch(
        &mut self,
        page: &PageDescriptor<E>,
        estimate_total: bool,
    ) -> Result<FetchResult<E>, TabulaError> {
        self(page, estimate_total)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CriteriaSet;
    use crate::ordering::OrderBy;

    #[test]
    fn closures_are_fetchers() {
        let mut calls = 0;
        let mut fetcher = |page: &PageDescriptor<u64>, estimate: bool| {
            calls += 1;
            let items = (0..page.limit() as u64).collect();
            Ok(if estimate {
                FetchResult::new(items, 100)
            } else {
                FetchResult::without_total(items)
            })
        };

        let page = PageDescriptor::new(0, 3, OrderBy::new().then_asc("id"), CriteriaSet::default())
            .expect("valid");
        let first = fetcher.fetch(&page, true).expect("fetch");
        let second = fetcher.fetch(&page, false).expect("fetch");

        assert_eq!(first.items, vec![0, 1, 2]);
        assert!(first.has_total());
        assert!(!second.has_total());
        assert_eq!(calls, 2);
    }
}
