//! # Engine Primitives
//!
//! Hardcoded constants shared by the engine, the evaluators and the app layer.
//! These primitives are compiled into the binary and are immutable at runtime.

/// Estimated total reported when a backend did not compute a count.
///
/// Any other non-negative total is authoritative for its criteria set
/// until the criteria change.
pub const UNKNOWN_TOTAL: i64 = -1;

/// Page size used when a configuration does not name one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Upper bound accepted by the app layer for a single page.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Field used as deterministic tie-break when the configuration names none.
pub const DEFAULT_ID_FIELD: &str = "id";

/// Separator between segments of a nested field path (`address.city`).
pub const PATH_SEPARATOR: char = '.';

/// Prefix marking a descending field inside an order token (`-created`).
pub const DESCENDING_PREFIX: char = '-';

/// Separator between fields inside an order token (`-created,name`).
pub const ORDER_TOKEN_SEPARATOR: char = ',';

/// How many times an out-of-range offset is corrected per load.
///
/// A second empty window after correction is accepted as a legitimately
/// empty page.
pub const MAX_OFFSET_CORRECTIONS: usize = 1;

// =============================================================================
// EXTERNAL STATE TOKENS
// =============================================================================

/// External token carrying the 1-based page number.
pub const PAGE_TOKEN: &str = "p";

/// External token carrying the order (`-created,name`).
pub const ORDER_TOKEN: &str = "o";

/// External token carrying the global search text.
pub const SEARCH_TOKEN: &str = "q";

/// External token carrying a selected row key (repeatable).
pub const SELECTED_TOKEN: &str = "selected";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for a field path.
pub const MAX_FIELD_PATH_LENGTH: usize = 256;

/// Maximum length for a raw filter or search value.
pub const MAX_FILTER_VALUE_LENGTH: usize = 1024;
