//! # tabula-core
//!
//! The page / sort / filter reconciliation engine for Tabula - THE LOGIC.
//!
//! This crate turns transient table interactions (page clicks, sort
//! columns, column filters, a global search box, externally supplied
//! criteria) into canonical page descriptors, and fetches them through a
//! narrow backend contract.
//!
//! ## Layers
//!
//! - `ordering` / `criteria` / `page`: the value models
//! - `engine`: the reconciliation state machine (recount decision,
//!   keyset hint, out-of-range correction)
//! - `fetcher`: the backend contract
//! - `accessor` + `evaluator`: in-memory filtering and sorting over
//!   precompiled property accessors
//! - `storage`: a redb-backed store implementing the same contract
//!
//! ## Architectural Constraints
//!
//! - NO async, NO network dependencies (pure Rust)
//! - Deterministic: BTreeMap only, integer arithmetic only
//! - One engine per view; no shared mutable state across views

// =============================================================================
// MODULES
// =============================================================================

pub mod accessor;
pub mod config;
pub mod criteria;
pub mod engine;
pub mod evaluator;
pub mod external;
pub mod fetcher;
pub mod ordering;
pub mod page;
pub mod primitives;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Entity, EntityKey, Property, TabulaError, Value};

// =============================================================================
// RE-EXPORTS: Models
// =============================================================================

pub use config::{FieldConfig, TableConfig};
pub use criteria::{
    CompareOp, Criteria, CriteriaSet, CriteriaValue, LikeMode, MatchMode, Operand, Predicate,
};
pub use external::ExternalState;
pub use ordering::{OrderBy, SortKey};
pub use page::{CursorHint, Direction, PageDescriptor};

// =============================================================================
// RE-EXPORTS: Engine and Backends
// =============================================================================

pub use accessor::{AccessorTable, Getter};
pub use engine::{
    CriteriaSupplier, EventListener, LoadReport, LoadRequest, ReconciliationEngine, TableEvent,
};
pub use evaluator::{
    Collator, CriteriaEvaluator, EvaluatorSettings, InMemoryFetcher, NativeFilter, NativeFilters,
    OrderKey,
};
pub use fetcher::{FetchResult, ResultFetcher};
pub use storage::RedbStore;
