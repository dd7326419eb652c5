//! In-memory result fetcher.

use super::{CriteriaEvaluator, EvaluatorSettings};
use crate::accessor::AccessorTable;
use crate::fetcher::{FetchResult, ResultFetcher};
use crate::page::PageDescriptor;
use crate::types::TabulaError;

/// Fetcher over a fully materialized collection.
///
/// Filters and sorts the whole collection on every fetch, then returns the
/// `[offset, offset + limit)` slice clamped to the filtered size. The total
/// is always the exact filtered size; the cursor hint is ignored.
#[derive(Debug, Clone)]
pub struct InMemoryFetcher<E> {
    rows: Vec<E>,
    table: AccessorTable<E>,
    settings: EvaluatorSettings,
}

impl<E> InMemoryFetcher<E> {
    #[must_use]
    pub fn new(rows: Vec<E>, table: AccessorTable<E>, settings: EvaluatorSettings) -> Self {
        Self {
            rows,
            table,
            settings,
        }
    }
}

impl<E: Clone> ResultFetcher<E> for InMemoryFetcher<E> {
    fn fetch(
        &mut self,
        page: &PageDescriptor<E>,
        _estimate_total: bool,
    ) -> Result<FetchResult<E>, TabulaError> {
        let evaluator = CriteriaEvaluator::new(&self.table, self.settings);
        let matched = evaluator.select(&self.rows, page.criteria(), page.ordering())?;

        let total = matched.len();
        let start = page.offset().min(total);
        let end = page.end().min(total);
        let items = matched[start..end].iter().map(|row| (*row).clone()).collect();

        Ok(FetchResult::new(
            items,
            i64::try_from(total).unwrap_or(i64::MAX),
        ))
    }
}
