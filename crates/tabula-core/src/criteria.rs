//! # Criteria Model
//!
//! Required (AND) and optional (OR) predicates keyed by field path.
//!
//! A criterion value is either a single operand or a disjunctive set of
//! operands. An operand is a plain value (equality, `Null` meaning IS NULL)
//! or a typed predicate wrapper (like / between / compare / not / ignore-case).
//!
//! ## Canonical form
//!
//! Change detection relies on criteria equality, so every criterion value is
//! kept canonical:
//! - duplicates (by canonical string form) are removed, first occurrence wins
//! - a singleton set collapses to a single operand
//! - set equality ignores member order

use crate::primitives::PATH_SEPARATOR;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

// =============================================================================
// PREDICATE WRAPPERS
// =============================================================================

/// Position of a `like` pattern inside the property text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LikeMode {
    StartsWith,
    EndsWith,
    Contains,
}

/// Ordering comparison against a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

/// Typed predicate wrapper around a raw criterion value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Predicate {
    /// Case-insensitive pattern match on the canonical text form.
    Like { mode: LikeMode, value: String },
    /// Inclusive range.
    Between { low: Value, high: Value },
    /// Ordering comparison.
    Compare { op: CompareOp, value: Value },
    /// Negation. `Not(Null)` means IS NOT NULL.
    Not(Box<Operand>),
    /// Case-insensitive equality.
    IgnoreCase(String),
    /// Named backend-native predicate. Only stores that registered the name
    /// can evaluate it.
    Native(String),
}

impl Predicate {
    #[must_use]
    pub fn starts_with(value: impl Into<String>) -> Self {
        Self::Like {
            mode: LikeMode::StartsWith,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn ends_with(value: impl Into<String>) -> Self {
        Self::Like {
            mode: LikeMode::EndsWith,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn contains(value: impl Into<String>) -> Self {
        Self::Like {
            mode: LikeMode::Contains,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Between {
            low: low.into(),
            high: high.into(),
        }
    }

    #[must_use]
    pub fn compare(op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn less_than(value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Lt, value)
    }

    #[must_use]
    pub fn greater_than(value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Gt, value)
    }

    #[must_use]
    pub fn not(operand: impl Into<Operand>) -> Self {
        Self::Not(Box::new(operand.into()))
    }

    #[must_use]
    pub fn ignore_case(value: impl Into<String>) -> Self {
        Self::IgnoreCase(value.into())
    }

    #[must_use]
    pub fn native(name: impl Into<String>) -> Self {
        Self::Native(name.into())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Like { mode, value } => match mode {
                LikeMode::StartsWith => write!(f, "startsWith({value})"),
                LikeMode::EndsWith => write!(f, "endsWith({value})"),
                LikeMode::Contains => write!(f, "contains({value})"),
            },
            Self::Between { low, high } => write!(f, "between({low},{high})"),
            Self::Compare { op, value } => match op {
                CompareOp::Lt => write!(f, "lt({value})"),
                CompareOp::Lte => write!(f, "lte({value})"),
                CompareOp::Gt => write!(f, "gt({value})"),
                CompareOp::Gte => write!(f, "gte({value})"),
            },
            Self::Not(inner) => write!(f, "not({inner})"),
            Self::IgnoreCase(value) => write!(f, "ignoreCase({value})"),
            Self::Native(name) => write!(f, "native({name})"),
        }
    }
}

/// A single criterion operand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operand {
    Value(Value),
    Predicate(Predicate),
}

impl Operand {
    /// Canonical string form used for de-duplication.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Predicate(p) => write!(f, "{p}"),
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Predicate> for Operand {
    fn from(predicate: Predicate) -> Self {
        Self::Predicate(predicate)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Self::Value(Value::Int(value))
    }
}

// =============================================================================
// CRITERION VALUE
// =============================================================================

/// Canonical criterion value: one operand, or a disjunction of two or more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CriteriaValue {
    One(Operand),
    Any(Vec<Operand>),
}

impl CriteriaValue {
    /// Normalize operands into canonical form.
    ///
    /// Duplicates by canonical string are removed (first occurrence wins),
    /// a singleton collapses to `One`, and an empty input yields `None`.
    #[must_use]
    pub fn normalize(operands: impl IntoIterator<Item = Operand>) -> Option<Self> {
        let mut seen = std::collections::BTreeSet::new();
        let mut unique: Vec<Operand> = Vec::new();
        for operand in operands {
            if seen.insert(operand.canonical()) {
                unique.push(operand);
            }
        }

        match unique.len() {
            0 => None,
            1 => unique.pop().map(Self::One),
            _ => Some(Self::Any(unique)),
        }
    }

    /// Convenience constructor for a single operand.
    #[must_use]
    pub fn one(operand: impl Into<Operand>) -> Self {
        Self::One(operand.into())
    }

    /// Convenience constructor for a disjunction; collapses like [`Self::normalize`].
    #[must_use]
    pub fn any<T: Into<Operand>>(operands: impl IntoIterator<Item = T>) -> Option<Self> {
        Self::normalize(operands.into_iter().map(Into::into))
    }

    /// Operands in stable insertion order.
    #[must_use]
    pub fn operands(&self) -> &[Operand] {
        match self {
            Self::One(op) => std::slice::from_ref(op),
            Self::Any(ops) => ops,
        }
    }

    /// Union with another value, de-duplicated, existing operands first.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let merged = self
            .operands()
            .iter()
            .chain(other.operands().iter())
            .cloned();
        // Both sides are non-empty, so the union is too.
        Self::normalize(merged).unwrap_or_else(|| self.clone())
    }

    fn sorted(&self) -> Vec<&Operand> {
        let mut ops: Vec<&Operand> = self.operands().iter().collect();
        ops.sort();
        ops
    }
}

impl PartialEq for CriteriaValue {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl Eq for CriteriaValue {}

impl fmt::Display for CriteriaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(op) => write!(f, "{op}"),
            Self::Any(ops) => {
                let parts: Vec<String> = ops.iter().map(Operand::canonical).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

// =============================================================================
// CRITERIA MAP
// =============================================================================

/// Criteria keyed by (possibly dotted) field path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Criteria {
    fields: BTreeMap<String, CriteriaValue>,
}

impl Criteria {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the criterion for a field.
    pub fn insert(&mut self, field: impl Into<String>, value: CriteriaValue) {
        self.fields.insert(field.into(), value);
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: CriteriaValue) -> Self {
        self.insert(field, value);
        self
    }

    /// Merge a criterion into this map without clobbering.
    ///
    /// If the field already has a value, the two are unioned (de-duplicated
    /// by canonical string form); otherwise the value is inserted.
    pub fn merge(&mut self, field: impl Into<String>, value: CriteriaValue) {
        match self.fields.entry(field.into()) {
            btree_map::Entry::Occupied(mut entry) => {
                let merged = entry.get().union(&value);
                entry.insert(merged);
            }
            btree_map::Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }

    /// Merge every criterion of `incoming` into a copy of `existing`.
    #[must_use]
    pub fn merge_required(existing: &Self, incoming: &Self) -> Self {
        let mut merged = existing.clone();
        for (field, value) in &incoming.fields {
            merged.merge(field.clone(), value.clone());
        }
        merged
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&CriteriaValue> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CriteriaValue)> {
        self.fields.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, CriteriaValue)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (String, CriteriaValue)>>(iter: I) -> Self {
        let mut criteria = Self::new();
        for (field, value) in iter {
            criteria.merge(field, value);
        }
        criteria
    }
}

/// Required (AND) plus optional (OR) criteria.
///
/// When `optional` is non-empty a row matches iff it satisfies every
/// required criterion and at least one optional criterion. When empty,
/// only required criteria apply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CriteriaSet {
    pub required: Criteria,
    pub optional: Criteria,
}

impl CriteriaSet {
    #[must_use]
    pub fn new(required: Criteria, optional: Criteria) -> Self {
        Self { required, optional }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.optional.is_empty()
    }
}

// =============================================================================
// MATCH MODE
// =============================================================================

/// How a column's raw text filter is turned into an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchMode {
    #[default]
    Exact,
    StartsWith,
    EndsWith,
    Contains,
}

impl MatchMode {
    /// Wrap a raw filter value. Blank input yields `None` (absent filter).
    #[must_use]
    pub fn wrap(self, raw: &str) -> Option<CriteriaValue> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let operand = match self {
            Self::Exact => Operand::Value(Value::text(raw)),
            Self::StartsWith => Predicate::starts_with(raw).into(),
            Self::EndsWith => Predicate::ends_with(raw).into(),
            Self::Contains => Predicate::contains(raw).into(),
        };
        Some(CriteriaValue::One(operand))
    }
}

/// Split a dotted field path into its segments.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR)
}

// =============================================================================
// TESTS
// =============================================================================
