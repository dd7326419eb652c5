//! # Reconciliation Engine
//!
//! Stateful page / sort / filter reconciliation for one table view.
//!
//! Every [`ReconciliationEngine::load`] performs one cycle:
//!
//! 1. merge the requested ordering with the previous one and the defaults
//! 2. merge column filters, external filter tokens and supplied criteria
//!    into required criteria; the global search becomes optional criteria
//! 3. detect a criteria change
//! 4. recount only when `cached_total <= 0` or the criteria changed
//! 5. detect next/previous navigation and offer a cursor hint
//! 6. fetch
//! 7. correct an offset past the end of a shrunken result set, once
//! 8. commit the descriptor, the window and (after a recount) the total
//!
//! A failed fetch leaves the committed state untouched. The engine is
//! single-threaded: each view owns one instance and calls are serialised.

use crate::config::TableConfig;
use crate::criteria::{Criteria, CriteriaSet, CriteriaValue, Predicate};
use crate::external::ExternalState;
use crate::fetcher::{FetchResult, ResultFetcher};
use crate::ordering::OrderBy;
use crate::page::{CursorHint, Direction, PageDescriptor};
use crate::primitives::{MAX_FILTER_VALUE_LENGTH, MAX_OFFSET_CORRECTIONS, UNKNOWN_TOTAL};
use crate::types::{Entity, EntityKey, TabulaError, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Source of externally supplied required criteria, consulted on every load.
pub type CriteriaSupplier = Arc<dyn Fn() -> Criteria + Send + Sync>;

/// Listener notified after each committed interaction.
pub type EventListener = Box<dyn FnMut(&TableEvent) + Send>;

// =============================================================================
// REQUEST / REPORT
// =============================================================================

/// Interaction classes a load or selection change is reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableEvent {
    Load,
    Page,
    Sort,
    Filter,
    Search,
    Select,
}

/// Incoming UI state for one load.
///
/// `None` keeps the previously committed value (page size falls back to the
/// configuration); on the first load, absent values are seeded from
/// `external` tokens, then from the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadRequest {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub ordering: Option<OrderBy>,
    /// Raw per-column filter text keyed by field path. `Some` replaces all
    /// column filters.
    pub filters: Option<BTreeMap<String, String>>,
    /// Global search text. `Some("")` clears it.
    pub search: Option<String>,
    pub external: ExternalState,
}

impl LoadRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn ordering(mut self, ordering: OrderBy) -> Self {
        self.ordering = Some(ordering);
        self
    }

    /// Set one column filter; other fields keep the values already in this request.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters
            .get_or_insert_with(BTreeMap::new)
            .insert(field.into(), value.into());
        self
    }

    /// Clear every column filter.
    #[must_use]
    pub fn clear_filters(mut self) -> Self {
        self.filters = Some(BTreeMap::new());
        self
    }

    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    #[must_use]
    pub fn external(mut self, state: ExternalState) -> Self {
        self.external = state;
        self
    }
}

/// Outcome of one load cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Committed offset (after correction).
    pub offset: usize,
    pub limit: usize,
    /// Known total for the committed criteria, `-1` if unknown.
    pub total: i64,
    pub item_count: usize,
    /// Whether the fetch was asked to recount.
    pub recounted: bool,
    /// Cursor direction, when sequential navigation was detected.
    pub sequential: Option<Direction>,
    /// Whether an out-of-range offset was corrected.
    pub corrected: bool,
    pub events: Vec<TableEvent>,
}

/// Last committed fetch.
struct Window<E> {
    page: PageDescriptor<E>,
    items: Vec<E>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Reconciliation engine for one table view, over an injected fetcher.
pub struct ReconciliationEngine<E, F> {
    config: TableConfig,
    fetcher: F,
    criteria_supplier: Option<CriteriaSupplier>,
    window: Option<Window<E>>,
    cached_total: i64,
    filters: BTreeMap<String, String>,
    global_filter: Option<String>,
    selection: Vec<E>,
    visible_columns: BTreeMap<String, bool>,
    listeners: Vec<EventListener>,
}

impl<E, F> std::fmt::Debug for ReconciliationEngine<E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("offset", &self.window.as_ref().map(|w| w.page.offset()))
            .field("cached_total", &self.cached_total)
            .field("filters", &self.filters)
            .field("global_filter", &self.global_filter)
            .field("selected", &self.selection.len())
            .finish_non_exhaustive()
    }
}

impl<E, F> ReconciliationEngine<E, F>
where
    E: Entity,
    F: ResultFetcher<E>,
{
    /// Create an engine for a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `TabulaError::InvalidConfig` if the configuration is inconsistent.
    pub fn new(config: TableConfig, fetcher: F) -> Result<Self, TabulaError> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            criteria_supplier: None,
            window: None,
            cached_total: UNKNOWN_TOTAL,
            filters: BTreeMap::new(),
            global_filter: None,
            selection: Vec::new(),
            visible_columns: BTreeMap::new(),
            listeners: Vec::new(),
        })
    }

    /// Attach a supplier of externally defined required criteria.
    #[must_use]
    pub fn with_criteria_supplier<S>(mut self, supplier: S) -> Self
    where
        S: Fn() -> Criteria + Send + Sync + 'static,
    {
        self.criteria_supplier = Some(Arc::new(supplier));
        self
    }

    /// Replace the criteria supplier. Takes effect on the next load.
    pub fn set_criteria_supplier(&mut self, supplier: Option<CriteriaSupplier>) {
        self.criteria_supplier = supplier;
    }

    /// Register a listener for committed interactions.
    pub fn on_event<L>(&mut self, listener: L)
    where
        L: FnMut(&TableEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    // =========================================================================
    // LOAD CYCLE
    // =========================================================================

    /// Run one reconciliation cycle.
    ///
    /// # Errors
    ///
    /// - `InvalidLimit` if the resolved limit is not positive
    /// - any fetcher error, in which case committed state is unchanged
    pub fn load(&mut self, request: LoadRequest) -> Result<LoadReport, TabulaError> {
        let initial = self.window.is_none();

        let limit = request
            .limit
            .unwrap_or_else(|| i64::try_from(self.config.page_size).unwrap_or(i64::MAX));
        if limit <= 0 {
            return Err(TabulaError::InvalidLimit(limit));
        }

        let ordering = self.resolve_ordering(&request, initial);
        let offset = self.resolve_offset(&request, initial, limit);
        let filters = self.resolve_filters(&request, initial);
        let global_filter = self.resolve_global_filter(&request, initial);
        let criteria = CriteriaSet::new(
            self.required_criteria(&filters),
            self.optional_criteria(global_filter.as_deref()),
        );

        let mut page = PageDescriptor::new(offset, limit, ordering, criteria)?;
        let criteria_changed = self
            .window
            .as_ref()
            .is_none_or(|w| !w.page.same_criteria(&page));
        let recount = self.cached_total <= 0 || criteria_changed;
        let sequential = self.sequential_hint(&page, criteria_changed);
        if let Some(hint) = sequential.clone() {
            page = page.with_cursor(hint);
        }

        tracing::debug!(
            offset = page.offset(),
            limit = page.limit(),
            ordering = %page.ordering(),
            criteria_changed,
            recount,
            sequential = sequential.is_some(),
            "reconciling page"
        );

        let mut result = self.fetcher.fetch(&page, recount)?;

        // Out-of-range correction: the criteria shrank below the offset.
        let mut corrected = false;
        let known_total = if result.has_total() {
            result.estimated_total
        } else if !criteria_changed {
            self.cached_total
        } else {
            UNKNOWN_TOTAL
        };
        for _ in 0..MAX_OFFSET_CORRECTIONS {
            let requested = i64::try_from(page.offset()).unwrap_or(i64::MAX);
            if !result.items.is_empty() || known_total <= 0 || requested <= known_total {
                break;
            }
            let target = corrected_offset(page.offset(), known_total, page.limit());
            tracing::debug!(
                from = page.offset(),
                to = target,
                total = known_total,
                "correcting out-of-range offset"
            );
            page = page.at_offset(target);
            let retried = self.fetcher.fetch(&page, false)?;
            let total = if retried.has_total() {
                retried.estimated_total
            } else {
                result.estimated_total
            };
            result = FetchResult::new(retried.items, total);
            corrected = true;
        }

        let selection = if initial {
            self.resolve_selection(&request.external, page.ordering())?
        } else {
            None
        };

        // Commit
        let events = self.classify(&page);
        if recount && result.estimated_total != self.cached_total {
            self.cached_total = result.estimated_total;
        }
        self.filters = filters;
        self.global_filter = global_filter;
        let item_count = result.items.len();
        let committed_offset = page.offset();
        let committed_limit = page.limit();
        self.window = Some(Window {
            page,
            items: result.items,
        });
        if let Some(selection) = selection {
            self.selection = selection;
        }

        self.emit(&events);

        Ok(LoadReport {
            offset: committed_offset,
            limit: committed_limit,
            total: self.cached_total,
            item_count,
            recounted: recount,
            sequential: sequential.map(|hint| hint.direction),
            corrected,
            events,
        })
    }

    fn resolve_ordering(&self, request: &LoadRequest, initial: bool) -> OrderBy {
        let defaults = &self.config.default_ordering;
        let requested = request.ordering.as_ref().filter(|o| !o.is_empty());

        let merged = match (requested, &self.window) {
            (Some(requested), _) => OrderBy::normalize(Some(requested), None, defaults),
            (None, Some(window)) => window.page.ordering().clone(),
            (None, None) => {
                let seed = if initial {
                    request.external.order.as_deref()
                } else {
                    None
                };
                OrderBy::normalize(None, seed, defaults)
            }
        };

        merged.retain_fields(|field| self.config.is_sortable(field) || defaults.contains(field))
    }

    fn resolve_offset(&self, request: &LoadRequest, initial: bool, limit: i64) -> i64 {
        if let Some(offset) = request.offset {
            return offset;
        }
        if initial {
            if let Some(page) = request.external.page_number() {
                let page = i64::try_from(page).unwrap_or(i64::MAX);
                return page.saturating_sub(1).saturating_mul(limit);
            }
        }
        self.window
            .as_ref()
            .map_or(0, |w| i64::try_from(w.page.offset()).unwrap_or(i64::MAX))
    }

    fn resolve_filters(&self, request: &LoadRequest, initial: bool) -> BTreeMap<String, String> {
        let incoming = match &request.filters {
            Some(filters) => filters.clone(),
            None if !initial => self.filters.clone(),
            None => BTreeMap::new(),
        };

        let mut resolved = BTreeMap::new();
        for field in self.config.filterable_fields() {
            let raw = incoming
                .get(&field.path)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .or_else(|| request.external.filter(&field.path));
            let Some(raw) = raw else {
                continue;
            };
            if raw.len() > MAX_FILTER_VALUE_LENGTH {
                tracing::warn!(field = field.path.as_str(), "ignoring oversized filter value");
                continue;
            }
            resolved.insert(field.path.clone(), raw.to_string());
        }

        for field in incoming.keys() {
            if !self.config.is_filterable(field) {
                tracing::debug!(field = field.as_str(), "ignoring filter on non-filterable field");
            }
        }
        resolved
    }

    fn resolve_global_filter(&self, request: &LoadRequest, initial: bool) -> Option<String> {
        let current = match &request.search {
            Some(text) => Some(text.trim().to_string()),
            None if !initial => self.global_filter.clone(),
            None => None,
        };
        let text = current
            .filter(|text| !text.is_empty())
            .or_else(|| request.external.search_text().map(str::to_string))?;
        if text.len() > MAX_FILTER_VALUE_LENGTH {
            tracing::warn!(length = text.len(), "ignoring oversized search text");
            return None;
        }
        Some(text)
    }

    /// Supplied criteria merged with the wrapped column filters.
    fn required_criteria(&self, filters: &BTreeMap<String, String>) -> Criteria {
        let mut columns = Criteria::new();
        for (path, raw) in filters {
            let mode = self
                .config
                .field(path)
                .map(|f| f.match_mode)
                .unwrap_or_default();
            if let Some(value) = mode.wrap(raw) {
                columns.merge(path.clone(), value);
            }
        }

        match &self.criteria_supplier {
            Some(supplier) => Criteria::merge_required(&supplier(), &columns),
            None => columns,
        }
    }

    /// `contains(text)` on every searchable field.
    fn optional_criteria(&self, global_filter: Option<&str>) -> Criteria {
        let Some(text) = global_filter else {
            return Criteria::new();
        };
        self.config
            .searchable_fields()
            .map(|f| {
                (
                    f.path.clone(),
                    CriteriaValue::one(Predicate::contains(text)),
                )
            })
            .collect()
    }

    /// Cursor hint when moving exactly one page from a non-empty window
    /// with unchanged criteria, ordering and page size.
    fn sequential_hint(
        &self,
        page: &PageDescriptor<E>,
        criteria_changed: bool,
    ) -> Option<CursorHint<E>> {
        let window = self.window.as_ref()?;
        if criteria_changed
            || window.items.is_empty()
            || window.page.limit() != page.limit()
            || window.page.ordering() != page.ordering()
        {
            return None;
        }

        let previous = window.page.offset();
        if page.offset() == previous.saturating_add(page.limit()) {
            window.items.last().map(|entity| CursorHint {
                entity: entity.clone(),
                direction: Direction::Forward,
            })
        } else if previous >= page.limit() && page.offset() == previous - page.limit() {
            window.items.first().map(|entity| CursorHint {
                entity: entity.clone(),
                direction: Direction::Backward,
            })
        } else {
            None
        }
    }

    fn resolve_selection(
        &mut self,
        external: &ExternalState,
        ordering: &OrderBy,
    ) -> Result<Option<Vec<E>>, TabulaError> {
        let keys = external.selected_keys();
        if keys.is_empty() {
            return Ok(None);
        }
        let mut selection = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entity) = self.fetch_row(key, ordering)? {
                selection.push(entity);
            }
        }
        Ok(Some(selection))
    }

    fn classify(&self, page: &PageDescriptor<E>) -> Vec<TableEvent> {
        let Some(previous) = self.window.as_ref().map(|w| &w.page) else {
            return vec![TableEvent::Load];
        };

        let mut events = Vec::new();
        if previous.required() != page.required() {
            events.push(TableEvent::Filter);
        }
        if previous.optional() != page.optional() {
            events.push(TableEvent::Search);
        }
        if previous.ordering() != page.ordering() {
            events.push(TableEvent::Sort);
        }
        if previous.offset() != page.offset() || previous.limit() != page.limit() {
            events.push(TableEvent::Page);
        }
        if events.is_empty() {
            events.push(TableEvent::Load);
        }
        events
    }

    fn emit(&mut self, events: &[TableEvent]) {
        for event in events {
            for listener in &mut self.listeners {
                listener(event);
            }
        }
    }

    // =========================================================================
    // ROWS, SELECTION, EXPORT
    // =========================================================================

    /// Fetch one row by key through the fetcher, without a recount.
    ///
    /// # Errors
    ///
    /// Propagates fetcher errors.
    pub fn row_data(&mut self, key: EntityKey) -> Result<Option<E>, TabulaError> {
        let ordering = self.ordering();
        self.fetch_row(key, &ordering)
    }

    fn fetch_row(&mut self, key: EntityKey, ordering: &OrderBy) -> Result<Option<E>, TabulaError> {
        let required = Criteria::new().with(
            self.config.id_field.clone(),
            CriteriaValue::one(Value::from(key)),
        );
        let page = PageDescriptor::new(0, 1, ordering.clone(), CriteriaSet::new(required, Criteria::new()))?;
        let result = self.fetcher.fetch(&page, false)?;
        Ok(result.items.into_iter().next())
    }

    #[must_use]
    pub fn row_key(&self, entity: &E) -> EntityKey {
        entity.key()
    }

    /// Replace the selection. Fires `Select` only when the set of keys changed.
    pub fn set_selection(&mut self, selection: Vec<E>) -> bool {
        let keys = |items: &[E]| items.iter().map(Entity::key).collect::<Vec<_>>();
        if keys(selection.as_slice()) == keys(self.selection.as_slice()) {
            return false;
        }
        self.selection = selection;
        self.emit(&[TableEvent::Select]);
        true
    }

    /// Resolve keys through the fetcher and select the rows found.
    ///
    /// # Errors
    ///
    /// Propagates fetcher errors; the selection is unchanged on failure.
    pub fn select_keys(&mut self, keys: &[EntityKey]) -> Result<bool, TabulaError> {
        let mut selection = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entity) = self.row_data(*key)? {
                selection.push(entity);
            }
        }
        Ok(self.set_selection(selection))
    }

    #[must_use]
    pub fn selection(&self) -> &[E] {
        &self.selection
    }

    /// Every row matching the committed criteria and ordering, without
    /// touching the committed window.
    ///
    /// # Errors
    ///
    /// Propagates fetcher errors.
    pub fn export_rows(&mut self) -> Result<Vec<E>, TabulaError> {
        let criteria = match &self.window {
            Some(window) => window.page.criteria().clone(),
            None => CriteriaSet::new(self.required_criteria(&BTreeMap::new()), Criteria::new()),
        };
        let page = PageDescriptor::unbounded(self.ordering(), criteria);
        Ok(self.fetcher.fetch(&page, false)?.items)
    }

    // =========================================================================
    // COLUMNS
    // =========================================================================

    /// Record the visibility of a column.
    pub fn toggle_column(&mut self, field: impl Into<String>, visible: bool) {
        self.visible_columns.insert(field.into(), visible);
    }

    /// Visibility of a column; the first query records `default_visible`.
    pub fn is_visible(&mut self, field: &str, default_visible: bool) -> bool {
        *self
            .visible_columns
            .entry(field.to_string())
            .or_insert(default_visible)
    }

    /// Columns to export: all configured ones, or only the visible ones.
    #[must_use]
    pub fn export_columns(&self, visible_only: bool) -> Vec<String> {
        self.config
            .fields
            .iter()
            .filter(|f| !visible_only || self.visible_columns.get(&f.path).copied().unwrap_or(true))
            .map(|f| f.path.clone())
            .collect()
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Committed ordering, or the configured defaults before the first load.
    #[must_use]
    pub fn ordering(&self) -> OrderBy {
        self.window.as_ref().map_or_else(
            || self.config.default_ordering.clone(),
            |w| w.page.ordering().clone(),
        )
    }

    #[must_use]
    pub fn page(&self) -> Option<&PageDescriptor<E>> {
        self.window.as_ref().map(|w| &w.page)
    }

    #[must_use]
    pub fn criteria(&self) -> Option<&CriteriaSet> {
        self.page().map(PageDescriptor::criteria)
    }

    #[must_use]
    pub fn items(&self) -> &[E] {
        self.window
            .as_ref()
            .map(|w| w.items.as_slice())
            .unwrap_or_default()
    }

    /// Cached total for the committed criteria, `-1` if unknown.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.cached_total
    }

    #[must_use]
    pub const fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    #[must_use]
    pub fn global_filter(&self) -> Option<&str> {
        self.global_filter.as_deref()
    }

    #[must_use]
    pub const fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Render the committed state as external tokens.
    ///
    /// The page token is omitted on page 1 and the order token when the
    /// ordering equals the defaults.
    #[must_use]
    pub fn external_state(&self) -> ExternalState {
        let mut state = ExternalState::new();
        if let Some(page) = self.page() {
            let number = page.offset() / page.limit() + 1;
            if number > 1 {
                state.page = Some(number.to_string());
            }
        }
        let ordering = self.ordering();
        if ordering != OrderBy::normalize(None, None, &self.config.default_ordering) {
            state.order = Some(ordering.to_token());
        }
        state.search = self.global_filter.clone();
        state.filters = self.filters.clone();
        state.selected = self
            .selection
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        state
    }
}

/// Offset of the last page that still intersects `total` rows.
///
/// Only called with `offset > total`. For page-aligned offsets this equals
/// `offset - (((offset - total) / limit) + 1) * limit`; unaligned offsets
/// land on the same page boundary instead of a shifted window.
fn corrected_offset(offset: usize, total: i64, limit: usize) -> usize {
    let total = usize::try_from(total).unwrap_or(0);
    if total == 0 || limit == 0 {
        return 0;
    }
    let last_page_start = ((total - 1) / limit) * limit;
    offset.min(last_page_start)
}

// =============================================================================
// TESTS
// =============================================================================
