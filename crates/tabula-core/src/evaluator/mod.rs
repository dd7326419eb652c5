//! # In-Memory Criteria Evaluator
//!
//! Filter predicate and comparator reproducing the store's filter / sort /
//! pagination semantics over plain entities, using an [`AccessorTable`] for
//! field access.
//!
//! ## Matching
//!
//! - every required criterion must match
//! - if optional criteria exist, at least one must match
//! - a criterion with several operands matches if any operand matches
//! - a multi-valued property matches if any of its values matches
//! - a `Null` operand means IS NULL, `Not(Null)` means IS NOT NULL
//!
//! ## Sorting
//!
//! Sort keys are extracted once per row, then compared key by key in
//! ordering priority. Nulls go last (or first) independently of direction.
//! A multi-valued key is sorted in the requested direction before being
//! compared lexicographically.

mod collation;
mod memory;

pub use collation::Collator;
pub use memory::InMemoryFetcher;

use crate::accessor::AccessorTable;
use crate::config::TableConfig;
use crate::criteria::{CompareOp, Criteria, CriteriaSet, CriteriaValue, LikeMode, Operand, Predicate};
use crate::ordering::OrderBy;
use crate::types::{Property, TabulaError, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named native filter, applied to each non-null value of a property.
pub type NativeFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Registry of native filters by name.
pub type NativeFilters = BTreeMap<String, NativeFilter>;

/// Extracted sort key of one row: one entry per ordering key, `None` = null.
pub type OrderKey = Vec<Option<Vec<Value>>>;

/// Evaluation policy derived from the table configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorSettings {
    pub nulls_last: bool,
    pub case_sensitive: bool,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            nulls_last: true,
            case_sensitive: false,
        }
    }
}

impl From<&TableConfig> for EvaluatorSettings {
    fn from(config: &TableConfig) -> Self {
        Self {
            nulls_last: config.nulls_last,
            case_sensitive: config.case_sensitive,
        }
    }
}

// =============================================================================
// EVALUATOR
// =============================================================================

/// Criteria evaluator bound to an accessor table.
pub struct CriteriaEvaluator<'t, E> {
    table: &'t AccessorTable<E>,
    collator: Collator,
    nulls_last: bool,
    natives: Option<&'t NativeFilters>,
}

impl<'t, E> CriteriaEvaluator<'t, E> {
    #[must_use]
    pub fn new(table: &'t AccessorTable<E>, settings: EvaluatorSettings) -> Self {
        Self {
            table,
            collator: Collator::new(settings.case_sensitive),
            nulls_last: settings.nulls_last,
            natives: None,
        }
    }

    /// Allow `Predicate::Native` operands, resolved against `natives`.
    #[must_use]
    pub fn with_natives(mut self, natives: &'t NativeFilters) -> Self {
        self.natives = Some(natives);
        self
    }

    /// Whether `entity` satisfies the criteria set.
    ///
    /// # Errors
    ///
    /// - `UnknownField` if a criterion names a path with no accessor
    /// - `UnsupportedPredicate` for a predicate this evaluator cannot run
    pub fn matches(&self, entity: &E, criteria: &CriteriaSet) -> Result<bool, TabulaError> {
        if !self.matches_all(entity, &criteria.required)? {
            return Ok(false);
        }
        if criteria.optional.is_empty() {
            return Ok(true);
        }
        self.matches_any(entity, &criteria.optional)
    }

    fn matches_all(&self, entity: &E, criteria: &Criteria) -> Result<bool, TabulaError> {
        for (field, value) in criteria.iter() {
            let property = self.table.get(entity, field)?;
            if !self.matches_criterion(&property, value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches_any(&self, entity: &E, criteria: &Criteria) -> Result<bool, TabulaError> {
        for (field, value) in criteria.iter() {
            let property = self.table.get(entity, field)?;
            if self.matches_criterion(&property, value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn matches_criterion(
        &self,
        property: &Property,
        value: &CriteriaValue,
    ) -> Result<bool, TabulaError> {
        for operand in value.operands() {
            if self.matches_operand(property, operand)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn matches_operand(&self, property: &Property, operand: &Operand) -> Result<bool, TabulaError> {
        match operand {
            Operand::Value(Value::Null) => Ok(property.is_null()),
            Operand::Value(expected) => Ok(property.values().any(|v| self.values_equal(v, expected))),
            Operand::Predicate(predicate) => self.matches_predicate(property, predicate),
        }
    }

    fn matches_predicate(
        &self,
        property: &Property,
        predicate: &Predicate,
    ) -> Result<bool, TabulaError> {
        match predicate {
            Predicate::Like { mode, value } => {
                let pattern = collation::lowercase(value);
                Ok(property.values().any(|v| {
                    let text = collation::lowercase(&v.canonical());
                    match mode {
                        LikeMode::StartsWith => text.starts_with(&pattern),
                        LikeMode::EndsWith => text.ends_with(&pattern),
                        LikeMode::Contains => text.contains(&pattern),
                    }
                }))
            }
            Predicate::Between { low, high } => Ok(property.values().any(|v| {
                self.compare_values(v, low) != Ordering::Less
                    && self.compare_values(v, high) != Ordering::Greater
            })),
            Predicate::Compare { op, value } => Ok(property.values().any(|v| {
                let ord = self.compare_values(v, value);
                match op {
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Lte => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Gte => ord != Ordering::Less,
                }
            })),
            Predicate::Not(inner) => Ok(!self.matches_operand(property, inner)?),
            Predicate::IgnoreCase(expected) => Ok(property
                .values()
                .any(|v| Collator::new(false).equals(&v.canonical(), expected))),
            Predicate::Native(name) => {
                let filter = self
                    .natives
                    .and_then(|natives| natives.get(name))
                    .ok_or_else(|| TabulaError::UnsupportedPredicate(predicate.to_string()))?;
                Ok(property.values().any(|v| filter(v)))
            }
        }
    }

    /// Equality with a canonical-string fallback (case-folded unless the
    /// evaluator is case-sensitive).
    fn values_equal(&self, actual: &Value, expected: &Value) -> bool {
        if actual == expected {
            return true;
        }
        let (a, b) = (actual.canonical(), expected.canonical());
        if self.collator.is_case_sensitive() {
            a == b
        } else {
            self.collator.equals(&a, &b)
        }
    }

    /// Compare two non-null values.
    ///
    /// Same-type values use their natural order (text through the
    /// collator). An integer against numeric text compares numerically.
    /// Anything else falls back to canonical strings.
    #[must_use]
    pub fn compare_values(&self, a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Text(x), Value::Text(y)) => self.collator.compare(x, y),
            (Value::Int(x), Value::Text(y)) => match y.trim().parse::<i64>() {
                Ok(y) => x.cmp(&y),
                Err(_) => self.collator.compare(&a.canonical(), y),
            },
            (Value::Text(x), Value::Int(y)) => match x.trim().parse::<i64>() {
                Ok(x) => x.cmp(y),
                Err(_) => self.collator.compare(x, &b.canonical()),
            },
            _ => self.collator.compare(&a.canonical(), &b.canonical()),
        }
    }

    // =========================================================================
    // ORDERING
    // =========================================================================

    /// Extract the sort key of `entity` under `ordering`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if an ordering field has no accessor.
    pub fn order_key(&self, entity: &E, ordering: &OrderBy) -> Result<OrderKey, TabulaError> {
        ordering
            .keys()
            .iter()
            .map(|key| {
                let property = self.table.get(entity, &key.field)?;
                Ok(self.sortable(&property, key.ascending))
            })
            .collect()
    }

    fn sortable(&self, property: &Property, ascending: bool) -> Option<Vec<Value>> {
        let mut values: Vec<Value> = property.values().cloned().collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| directed(self.compare_values(a, b), ascending));
        Some(values)
    }

    /// Compare two extracted sort keys under `ordering`.
    #[must_use]
    pub fn compare_keys(&self, a: &OrderKey, b: &OrderKey, ordering: &OrderBy) -> Ordering {
        for ((left, right), key) in a.iter().zip(b.iter()).zip(ordering.keys()) {
            let ord = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => self.null_placement(),
                (Some(_), None) => self.null_placement().reverse(),
                (Some(x), Some(y)) => directed(self.compare_lists(x, y), key.ascending),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    const fn null_placement(&self) -> Ordering {
        if self.nulls_last {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }

    fn compare_lists(&self, a: &[Value], b: &[Value]) -> Ordering {
        for (x, y) in a.iter().zip(b.iter()) {
            let ord = self.compare_values(x, y);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.len().cmp(&b.len())
    }

    /// Filter `rows` by `criteria` and sort the survivors by `ordering`.
    ///
    /// The sort is stable; every sort key is extracted once per row.
    ///
    /// # Errors
    ///
    /// Propagates `UnknownField` and `UnsupportedPredicate`.
    pub fn select<'r, I>(
        &self,
        rows: I,
        criteria: &CriteriaSet,
        ordering: &OrderBy,
    ) -> Result<Vec<&'r E>, TabulaError>
    where
        I: IntoIterator<Item = &'r E>,
        E: 'r,
    {
        let mut keyed: Vec<(OrderKey, &'r E)> = Vec::new();
        for row in rows {
            if self.matches(row, criteria)? {
                keyed.push((self.order_key(row, ordering)?, row));
            }
        }
        keyed.sort_by(|(a, _), (b, _)| self.compare_keys(a, b, ordering));
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

fn directed(ord: Ordering, ascending: bool) -> Ordering {
    if ascending { ord } else { ord.reverse() }
}

// =============================================================================
// TESTS
// =============================================================================
