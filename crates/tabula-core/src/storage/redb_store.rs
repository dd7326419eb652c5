//! # redb-backed Row Store
//!
//! A disk-backed entity store using the redb embedded database, playing the
//! role of the query-capable backend behind the [`ResultFetcher`] contract.
//!
//! - Rows live in one table keyed by entity key, encoded with postcard
//! - The row count is kept in a metadata table, so an unfiltered total
//!   costs one read
//! - Totals are computed only when the engine asks for them (`-1` otherwise)
//! - Cursor hints are honoured with keyset pagination: no offset skipping
//!   when the engine detects next/previous navigation
//!
//! When the primary sort field is the id field, pages come straight from a
//! key-range scan. Any other ordering scans, filters and sorts through the
//! shared [`CriteriaEvaluator`], which keeps results identical to the
//! in-memory backend.
//!
//! The id field accessor must resolve to the entity key.

use crate::accessor::AccessorTable;
use crate::config::TableConfig;
use crate::criteria::CriteriaSet;
use crate::evaluator::{CriteriaEvaluator, EvaluatorSettings, NativeFilter, NativeFilters};
use crate::fetcher::{FetchResult, ResultFetcher};
use crate::page::{Direction, PageDescriptor};
use crate::primitives::UNKNOWN_TOTAL;
use crate::types::{Entity, TabulaError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

/// Table for rows: EntityKey(u64) -> postcard-encoded entity
const ROWS: TableDefinition<u64, &[u8]> = TableDefinition::new("rows");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const ROW_COUNT: &str = "row_count";

/// A disk-backed row store using redb.
///
/// Cloning shares the underlying database handle, so several views can
/// fetch from one file.
pub struct RedbStore<E> {
    db: Arc<Database>,
    table: AccessorTable<E>,
    settings: EvaluatorSettings,
    id_field: String,
    natives: NativeFilters,
}

impl<E> Clone for RedbStore<E> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            table: self.table.clone(),
            settings: self.settings,
            id_field: self.id_field.clone(),
            natives: self.natives.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RedbStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("id_field", &self.id_field)
            .field("natives", &self.natives.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<E> RedbStore<E> {
    /// Open or create a row store at the given path.
    pub fn open(
        path: impl AsRef<Path>,
        table: AccessorTable<E>,
        config: &TableConfig,
    ) -> Result<Self, TabulaError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| TabulaError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| TabulaError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(ROWS)
                .map_err(|e| TabulaError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| TabulaError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| TabulaError::IoError(e.to_string()))?;
        }

        Ok(Self {
            db: Arc::new(db),
            table,
            settings: EvaluatorSettings::from(config),
            id_field: config.id_field.clone(),
            natives: NativeFilters::new(),
        })
    }

    /// Register a named native filter for `Predicate::Native`.
    pub fn register_native(&mut self, name: impl Into<String>, filter: NativeFilter) {
        self.natives.insert(name.into(), filter);
    }

    /// Number of stored rows.
    pub fn len(&self) -> Result<u64, TabulaError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| TabulaError::IoError(e.to_string()))?;
        let meta = read_txn
            .open_table(METADATA)
            .map_err(|e| TabulaError::IoError(e.to_string()))?;
        Ok(meta
            .get(ROW_COUNT)
            .map_err(|e| TabulaError::IoError(e.to_string()))?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, TabulaError> {
        Ok(self.len()? == 0)
    }

    /// Primary direction when the ordering is led by the id field.
    fn key_ordered(&self, page: &PageDescriptor<E>) -> Option<bool> {
        page.ordering()
            .primary()
            .filter(|key| key.field == self.id_field)
            .map(|key| key.ascending)
    }

    fn evaluator(&self) -> CriteriaEvaluator<'_, E> {
        CriteriaEvaluator::new(&self.table, self.settings).with_natives(&self.natives)
    }
}

impl<E: Entity + Serialize> RedbStore<E> {
    /// Insert or replace rows in a single ACID transaction.
    ///
    /// Returns the number of rows that were not present before.
    pub fn insert_batch(&self, rows: &[E]) -> Result<u64, TabulaError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| TabulaError::IoError(e.to_string()))?;
        let mut added = 0u64;
        {
            let mut rows_table = write_txn
                .open_table(ROWS)
                .map_err(|e| TabulaError::IoError(e.to_string()))?;
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| TabulaError::IoError(e.to_string()))?;

            for row in rows {
                let bytes = postcard::to_allocvec(row)
                    .map_err(|e| TabulaError::SerializationError(e.to_string()))?;
                let previous = rows_table
                    .insert(row.key().value(), bytes.as_slice())
                    .map_err(|e| TabulaError::IoError(e.to_string()))?;
                if previous.is_none() {
                    added += 1;
                }
            }

            let count = meta_table
                .get(ROW_COUNT)
                .map_err(|e| TabulaError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            meta_table
                .insert(ROW_COUNT, count.saturating_add(added))
                .map_err(|e| TabulaError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| TabulaError::IoError(e.to_string()))?;

        tracing::debug!(rows = rows.len(), added, "stored row batch");
        Ok(added)
    }
}

// =============================================================================
// RESULT FETCHER
// =============================================================================

impl<E: Entity + DeserializeOwned> RedbStore<E> {
    /// Page straight from a key-range scan.
    fn fetch_by_key(
        &self,
        page: &PageDescriptor<E>,
        ascending: bool,
    ) -> Result<Vec<E>, TabulaError> {
        let evaluator = self.evaluator();
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| TabulaError::IoError(e.to_string()))?;
        let rows_table = read_txn
            .open_table(ROWS)
            .map_err(|e| TabulaError::IoError(e.to_string()))?;

        // Keyset: forward continues past the boundary in sort direction,
        // backward walks the other way and flips the result.
        let (bounds, scan_ascending, skip, forward) = match page.cursor() {
            Some(hint) => {
                let key = hint.entity.key().value();
                let forward = hint.direction == Direction::Forward;
                let scan_ascending = ascending == forward;
                let bounds: (Bound<u64>, Bound<u64>) = if scan_ascending {
                    (Bound::Excluded(key), Bound::Unbounded)
                } else {
                    (Bound::Unbounded, Bound::Excluded(key))
                };
                (bounds, scan_ascending, 0, forward)
            }
            None => (
                (Bound::Unbounded, Bound::Unbounded),
                ascending,
                page.offset(),
                true,
            ),
        };

        let rows = rows_table
            .range(bounds)
            .map_err(|e| TabulaError::IoError(e.to_string()))?
            .map(|entry| -> Result<E, TabulaError> {
                let (_, value) = entry.map_err(|e| TabulaError::IoError(e.to_string()))?;
                postcard::from_bytes(value.value())
                    .map_err(|e| TabulaError::DeserializationError(e.to_string()))
            });

        let mut items = if scan_ascending {
            take_window(rows, &evaluator, page.criteria(), skip, page.limit())?
        } else {
            take_window(rows.rev(), &evaluator, page.criteria(), skip, page.limit())?
        };
        if !forward {
            items.reverse();
        }
        Ok(items)
    }

    /// Scan, filter and sort everything, then cut the window.
    ///
    /// Returns the window and the exact matching total.
    fn fetch_sorted(&self, page: &PageDescriptor<E>) -> Result<(Vec<E>, usize), TabulaError> {
        let evaluator = self.evaluator();
        let all = self.scan()?;
        let matched = evaluator.select(&all, page.criteria(), page.ordering())?;
        let total = matched.len();

        let window: Vec<&E> = match page.cursor() {
            Some(hint) => {
                let ordering = page.ordering();
                let boundary = evaluator.order_key(&hint.entity, ordering)?;
                let mut keyed = Vec::with_capacity(total);
                for row in matched {
                    keyed.push((evaluator.order_key(row, ordering)?, row));
                }
                match hint.direction {
                    Direction::Forward => keyed
                        .into_iter()
                        .filter(|(key, _)| {
                            evaluator.compare_keys(key, &boundary, ordering) == Ordering::Greater
                        })
                        .take(page.limit())
                        .map(|(_, row)| row)
                        .collect(),
                    Direction::Backward => {
                        let before: Vec<&E> = keyed
                            .into_iter()
                            .filter(|(key, _)| {
                                evaluator.compare_keys(key, &boundary, ordering) == Ordering::Less
                            })
                            .map(|(_, row)| row)
                            .collect();
                        let start = before.len().saturating_sub(page.limit());
                        before.into_iter().skip(start).collect()
                    }
                }
            }
            None => matched
                .into_iter()
                .skip(page.offset())
                .take(page.limit())
                .collect(),
        };

        Ok((window.into_iter().cloned().collect(), total))
    }

    /// Count rows matching `criteria`; an empty criteria set reads the
    /// stored row count.
    fn count(&self, criteria: &CriteriaSet) -> Result<usize, TabulaError> {
        if criteria.is_empty() {
            return Ok(usize::try_from(self.len()?).unwrap_or(usize::MAX));
        }
        let evaluator = self.evaluator();
        let mut count = 0usize;
        for row in self.scan()? {
            if evaluator.matches(&row, criteria)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Decode every row in key order.
    fn scan(&self) -> Result<Vec<E>, TabulaError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| TabulaError::IoError(e.to_string()))?;
        let rows_table = read_txn
            .open_table(ROWS)
            .map_err(|e| TabulaError::IoError(e.to_string()))?;

        let mut rows = Vec::new();
        for entry in rows_table
            .iter()
            .map_err(|e| TabulaError::IoError(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| TabulaError::IoError(e.to_string()))?;
            let row: E = postcard::from_bytes(value.value())
                .map_err(|e| TabulaError::DeserializationError(e.to_string()))?;
            rows.push(row);
        }
        Ok(rows)
    }
}

impl<E: Entity + DeserializeOwned> ResultFetcher<E> for RedbStore<E> {
    fn fetch(
        &mut self,
        page: &PageDescriptor<E>,
        estimate_total: bool,
    ) -> Result<FetchResult<E>, TabulaError> {
        let (items, total) = match self.key_ordered(page) {
            Some(ascending) => {
                let items = self.fetch_by_key(page, ascending)?;
                let total = if estimate_total {
                    Some(self.count(page.criteria())?)
                } else {
                    None
                };
                (items, total)
            }
            None => {
                let (items, total) = self.fetch_sorted(page)?;
                (items, estimate_total.then_some(total))
            }
        };

        let estimated_total = total.map_or(UNKNOWN_TOTAL, |t| i64::try_from(t).unwrap_or(i64::MAX));
        tracing::debug!(
            offset = page.offset(),
            limit = page.limit(),
            keyset = page.cursor().is_some(),
            items = items.len(),
            estimated_total,
            "store fetch"
        );
        Ok(FetchResult::new(items, estimated_total))
    }
}

/// Filter `rows` in scan order, skip `skip` matches and keep up to `limit`.
fn take_window<E, I>(
    rows: I,
    evaluator: &CriteriaEvaluator<'_, E>,
    criteria: &CriteriaSet,
    skip: usize,
    limit: usize,
) -> Result<Vec<E>, TabulaError>
where
    I: Iterator<Item = Result<E, TabulaError>>,
{
    let mut skipped = 0usize;
    let mut items = Vec::new();
    for row in rows {
        if items.len() >= limit {
            break;
        }
        let row = row?;
        if !evaluator.matches(&row, criteria)? {
            continue;
        }
        if skipped < skip {
            skipped += 1;
            continue;
        }
        items.push(row);
    }
    Ok(items)
}

// =============================================================================
// TESTS
// =============================================================================
