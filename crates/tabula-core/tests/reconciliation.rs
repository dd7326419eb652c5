//! # Reconciliation Engine Tests
//!
//! End-to-end load cycles over the in-memory and redb backends.
//!
//! ## Areas
//! - Paging and out-of-range correction
//! - Recount suppression and keyset hints
//! - Criteria merging (columns, global search, supplier, external tokens)
//! - Rows, selection, columns and events

mod common;

use common::{ROWS_PER_PAGE, TOTAL_RECORDS, Person, config, ids, in_memory, in_memory_engine};
use std::sync::{Arc, Mutex};
use tabula_core::{
    Criteria, CriteriaValue, Direction, EntityKey, ExternalState, FetchResult, LoadRequest,
    OrderBy, PageDescriptor, Predicate, RedbStore, ReconciliationEngine, ResultFetcher,
    TabulaError, TableEvent,
};
use tempfile::tempdir;

/// One recorded fetcher call: (offset, estimate_total, cursor direction).
type Call = (usize, bool, Option<Direction>);

/// Wrap a fetcher so every call is recorded.
fn recording<F>(
    mut inner: F,
) -> (
    impl FnMut(&PageDescriptor<Person>, bool) -> Result<FetchResult<Person>, TabulaError>,
    Arc<Mutex<Vec<Call>>>,
)
where
    F: ResultFetcher<Person>,
{
    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);
    let fetcher = move |page: &PageDescriptor<Person>, estimate: bool| {
        log.lock()
            .expect("lock")
            .push((page.offset(), estimate, page.cursor().map(|c| c.direction)));
        inner.fetch(page, estimate)
    };
    (fetcher, calls)
}

fn last_call(calls: &Arc<Mutex<Vec<Call>>>) -> Call {
    *calls.lock().expect("lock").last().expect("at least one call")
}

// =============================================================================
// PAGING
// =============================================================================

mod paging {
    use super::*;

    #[test]
    fn first_and_last_page_by_id_descending() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);

        let first = engine.load(LoadRequest::new()).expect("load");
        assert_eq!(first.total, 200);
        assert_eq!(ids(engine.items()), (191..=200).rev().collect::<Vec<_>>());

        let last = engine.load(LoadRequest::new().offset(190)).expect("load");
        assert_eq!(last.offset, 190);
        assert_eq!(last.total, 200);
        assert_eq!(ids(engine.items()), (1..=10).rev().collect::<Vec<_>>());
    }

    #[test]
    fn shrinking_filter_corrects_offset_to_first_page() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        engine.load(LoadRequest::new().offset(190)).expect("load");

        let report = engine
            .load(LoadRequest::new().offset(190).filter("gender", "OTHER"))
            .expect("load");

        assert!(report.corrected);
        assert_eq!(report.offset, 0);
        assert_eq!(report.total, 3);
        assert_eq!(ids(engine.items()), vec![198, 132, 66]);
    }

    #[test]
    fn out_of_range_offset_corrects_to_last_page() {
        let mut engine = in_memory_engine(45);
        engine.load(LoadRequest::new()).expect("load");

        let report = engine.load(LoadRequest::new().offset(80)).expect("load");

        assert!(report.corrected);
        assert_eq!(report.offset, 40);
        assert_eq!(report.item_count, 5);
        assert_eq!(ids(engine.items()), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn unaligned_offset_corrects_to_page_boundary() {
        let mut engine = in_memory_engine(45);

        let report = engine.load(LoadRequest::new().offset(85)).expect("load");

        assert!(report.corrected);
        assert_eq!(report.offset, 40);
        assert_eq!(report.total, 45);
        assert_eq!(ids(engine.items()), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn correction_uses_cached_total_when_store_skips_count() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("people.redb"), common::accessors(), &config())
            .expect("open db");
        store.insert_batch(&common::people(45)).expect("insert");
        let (fetcher, calls) = recording(store);
        let mut engine = ReconciliationEngine::new(config(), fetcher).expect("engine");

        engine.load(LoadRequest::new()).expect("load");
        let report = engine.load(LoadRequest::new().offset(80)).expect("load");

        assert!(!report.recounted);
        assert!(report.corrected);
        assert_eq!(report.offset, 40);
        assert_eq!(report.total, 45);
        assert_eq!(ids(engine.items()), vec![5, 4, 3, 2, 1]);
        assert_eq!(last_call(&calls), (40, false, None));
    }

    #[test]
    fn persistent_emptiness_is_accepted_after_one_retry() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let fetcher = move |_: &PageDescriptor<Person>, _: bool| {
            *counter.lock().expect("lock") += 1;
            Ok::<FetchResult<Person>, TabulaError>(FetchResult::new(Vec::new(), 5))
        };
        let mut engine = ReconciliationEngine::new(config(), fetcher).expect("engine");

        let report = engine.load(LoadRequest::new().offset(30)).expect("load");

        assert!(report.corrected);
        assert_eq!(report.offset, 0);
        assert_eq!(report.item_count, 0);
        assert_eq!(*calls.lock().expect("lock"), 2);
    }

    #[test]
    fn negative_offset_is_clamped_and_bad_limit_fails_fast() {
        let mut engine = in_memory_engine(20);

        let report = engine.load(LoadRequest::new().offset(-15)).expect("load");
        assert_eq!(report.offset, 0);

        let result = engine.load(LoadRequest::new().limit(0));
        assert!(matches!(result, Err(TabulaError::InvalidLimit(0))));
        assert_eq!(engine.page().map(PageDescriptor::offset), Some(0));
    }

    #[test]
    fn fetch_failure_keeps_committed_state() {
        let failing = Arc::new(Mutex::new(false));
        let switch = Arc::clone(&failing);
        let mut inner = in_memory(50);
        let fetcher = move |page: &PageDescriptor<Person>, estimate: bool| {
            if *switch.lock().expect("lock") {
                return Err(TabulaError::FetchFailed("connection reset".to_string()));
            }
            inner.fetch(page, estimate)
        };
        let mut engine = ReconciliationEngine::new(config(), fetcher).expect("engine");
        engine.load(LoadRequest::new().offset(10)).expect("load");
        let before = ids(engine.items());

        *failing.lock().expect("lock") = true;
        let result = engine.load(LoadRequest::new().offset(20).filter("gender", "MALE"));

        assert!(matches!(result, Err(TabulaError::FetchFailed(_))));
        assert_eq!(ids(engine.items()), before);
        assert_eq!(engine.page().map(PageDescriptor::offset), Some(10));
        assert!(engine.filters().is_empty());
        assert_eq!(engine.total(), 50);
    }
}

// =============================================================================
// RECOUNT AND KEYSET HINTS
// =============================================================================

mod recount_and_keyset {
    use super::*;

    #[test]
    fn recount_only_on_first_load_and_criteria_change() {
        let (fetcher, calls) = recording(in_memory(TOTAL_RECORDS));
        let mut engine = ReconciliationEngine::new(config(), fetcher).expect("engine");

        assert!(engine.load(LoadRequest::new()).expect("load").recounted);
        assert!(!engine.load(LoadRequest::new().offset(50)).expect("load").recounted);
        assert!(
            !engine
                .load(LoadRequest::new().ordering(OrderBy::new().then_asc("email")))
                .expect("load")
                .recounted
        );
        assert!(
            engine
                .load(LoadRequest::new().filter("gender", "MALE"))
                .expect("load")
                .recounted
        );

        let flags: Vec<bool> = calls.lock().expect("lock").iter().map(|c| c.1).collect();
        assert_eq!(flags, vec![true, false, false, true]);
    }

    #[test]
    fn resubmitting_same_filter_does_not_recount() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        engine
            .load(LoadRequest::new().filter("email", "name1"))
            .expect("load");
        let report = engine
            .load(LoadRequest::new().filter("email", " name1 "))
            .expect("load");
        assert!(!report.recounted);
    }

    #[test]
    fn adjacent_pages_pass_cursor_hints() {
        let (fetcher, calls) = recording(in_memory(TOTAL_RECORDS));
        let mut engine = ReconciliationEngine::new(config(), fetcher).expect("engine");

        engine.load(LoadRequest::new()).expect("load");
        let forward = engine.load(LoadRequest::new().offset(10)).expect("load");
        assert_eq!(forward.sequential, Some(Direction::Forward));
        assert_eq!(ids(engine.items()), (181..=190).rev().collect::<Vec<_>>());

        let backward = engine.load(LoadRequest::new().offset(0)).expect("load");
        assert_eq!(backward.sequential, Some(Direction::Backward));

        let jump = engine.load(LoadRequest::new().offset(20)).expect("load");
        assert_eq!(jump.sequential, None);

        let changed = engine
            .load(LoadRequest::new().offset(30).filter("gender", "FEMALE"))
            .expect("load");
        assert_eq!(changed.sequential, None);

        let directions: Vec<Option<Direction>> =
            calls.lock().expect("lock").iter().map(|c| c.2).collect();
        assert_eq!(
            directions,
            vec![None, Some(Direction::Forward), Some(Direction::Backward), None, None]
        );
    }

    #[test]
    fn page_size_change_skips_cursor_hint() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        engine.load(LoadRequest::new().limit(10)).expect("load");
        let report = engine
            .load(LoadRequest::new().offset(20).limit(20))
            .expect("load");
        assert_eq!(report.sequential, None);
    }

    #[test]
    fn keyset_over_store_matches_offset_paging() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("people.redb"), common::accessors(), &config())
            .expect("open db");
        store.insert_batch(&common::people(60)).expect("insert");
        let mut keyset = ReconciliationEngine::new(config(), store).expect("engine");
        let mut offsets = in_memory_engine(60);

        let order = OrderBy::new().then_asc("dateOfBirth");
        for page in 0..6 {
            let request = LoadRequest::new()
                .offset(page * ROWS_PER_PAGE)
                .ordering(order.clone());
            let report = keyset.load(request.clone()).expect("keyset load");
            offsets.load(request).expect("offset load");
            if page > 0 {
                assert_eq!(report.sequential, Some(Direction::Forward));
            }
            assert_eq!(ids(keyset.items()), ids(offsets.items()));
        }
    }
}

// =============================================================================
// CRITERIA MERGING
// =============================================================================

mod criteria {
    use super::*;

    #[test]
    fn global_search_is_trimmed_and_optional() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        let report = engine
            .load(LoadRequest::new().search("  name19@ "))
            .expect("load");

        assert_eq!(report.total, 1);
        assert_eq!(engine.global_filter(), Some("name19@"));
        let criteria = engine.criteria().expect("criteria");
        assert!(criteria.required.is_empty());
        assert_eq!(criteria.optional.len(), 2);
        assert_eq!(report.events, vec![TableEvent::Load]);

        let report = engine.load(LoadRequest::new().search("   ")).expect("load");
        assert_eq!(report.total, 200);
        assert_eq!(report.events, vec![TableEvent::Search]);
    }

    #[test]
    fn oversized_search_is_ignored() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        let long = "x".repeat(tabula_core::primitives::MAX_FILTER_VALUE_LENGTH + 1);

        let report = engine.load(LoadRequest::new().search(long)).expect("load");

        assert_eq!(report.total, 200);
        assert_eq!(engine.global_filter(), None);
        assert!(engine.criteria().expect("criteria").optional.is_empty());
    }

    #[test]
    fn filters_persist_until_replaced() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        engine
            .load(LoadRequest::new().filter("gender", "OTHER"))
            .expect("load");
        let report = engine.load(LoadRequest::new().offset(0)).expect("load");
        assert_eq!(report.total, 3);

        let report = engine
            .load(LoadRequest::new().clear_filters())
            .expect("load");
        assert_eq!(report.total, 200);
        assert!(report.events.contains(&TableEvent::Filter));
    }

    #[test]
    fn non_filterable_and_unsortable_fields_are_ignored() {
        let mut engine = in_memory_engine(30);
        let report = engine
            .load(
                LoadRequest::new()
                    .filter("phones.number", "01000")
                    .ordering(OrderBy::new().then_asc("address.street")),
            )
            .expect("load");

        assert_eq!(report.total, 30);
        assert_eq!(engine.ordering(), OrderBy::new().then_desc("id"));
    }

    #[test]
    fn supplier_criteria_merge_with_column_filters() {
        let mut engine = in_memory_engine(TOTAL_RECORDS).with_criteria_supplier(|| {
            Criteria::new()
                .with("id", CriteriaValue::one(Predicate::between(50i64, 150i64)))
                .with("gender", CriteriaValue::one("OTHER"))
        });

        let report = engine
            .load(LoadRequest::new().filter("gender", "FEMALE").limit(100))
            .expect("load");

        // odd ids 51..=149 plus 66 and 132
        assert_eq!(report.total, 52);
        let gender = engine
            .criteria()
            .and_then(|c| c.required.get("gender"))
            .expect("gender criterion");
        assert_eq!(gender.operands().len(), 2);
        assert!(ids(engine.items()).contains(&132));
    }

    #[test]
    fn nested_and_collection_paths_filter_and_sort() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        let report = engine
            .load(
                LoadRequest::new()
                    .filter("address.city", "city1")
                    .filter("groups", "ADMINISTRATOR")
                    .ordering(OrderBy::new().then_asc("address.city")),
            )
            .expect("load");

        assert!(report.total > 0);
        for person in engine.items() {
            let city = &person.address.as_ref().expect("address").city;
            assert!(city.starts_with("City1"));
            assert!(person.groups.iter().any(|g| g == "ADMINISTRATOR"));
        }
    }

    #[test]
    fn external_tokens_seed_initial_load() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        let external = ExternalState::from_pairs([
            ("p", "3"),
            ("o", "-email"),
            ("gender", "MALE"),
            ("selected", "42"),
        ]);

        let report = engine
            .load(LoadRequest::new().external(external))
            .expect("load");

        assert_eq!(report.offset, 20);
        assert_eq!(report.total, 97);
        assert_eq!(engine.ordering().to_token(), "-email,-id");
        assert_eq!(ids(engine.selection()), vec![42]);

        let state = engine.external_state();
        assert_eq!(state.page.as_deref(), Some("3"));
        assert_eq!(state.order.as_deref(), Some("-email,-id"));
        assert_eq!(state.filters.get("gender").map(String::as_str), Some("MALE"));
        assert_eq!(state.selected, vec!["42".to_string()]);
    }

    #[test]
    fn malformed_external_tokens_fall_back() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        let external = ExternalState::from_pairs([("p", "abc"), ("o", "-,")]);

        let report = engine
            .load(LoadRequest::new().external(external))
            .expect("load");

        assert_eq!(report.offset, 0);
        assert_eq!(engine.ordering(), OrderBy::new().then_desc("id"));
        assert!(engine.external_state().is_empty());
    }
}

// =============================================================================
// ROWS, SELECTION, COLUMNS, EVENTS
// =============================================================================

mod view_state {
    use super::*;

    #[test]
    fn row_lookup_goes_through_fetcher_without_recount() {
        let (fetcher, calls) = recording(in_memory(TOTAL_RECORDS));
        let mut engine = ReconciliationEngine::new(config(), fetcher).expect("engine");

        let row = engine.row_data(EntityKey(77)).expect("row");
        assert_eq!(row.map(|p| p.id), Some(77));
        assert_eq!(last_call(&calls), (0, false, None));
        assert!(engine.row_data(EntityKey(999)).expect("row").is_none());
        assert_eq!(engine.row_key(&common::person(5)), EntityKey(5));
    }

    #[test]
    fn events_are_classified_and_selection_deduplicated() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        engine.on_event(move |event| sink.lock().expect("lock").push(*event));

        engine.load(LoadRequest::new()).expect("load");
        engine.load(LoadRequest::new().offset(10)).expect("load");
        engine
            .load(LoadRequest::new().ordering(OrderBy::new().then_asc("email")))
            .expect("load");
        engine
            .load(LoadRequest::new().filter("gender", "MALE").search("name"))
            .expect("load");

        let picked = engine.items()[..2].to_vec();
        assert!(engine.set_selection(picked.clone()));
        assert!(!engine.set_selection(picked));
        assert!(engine.select_keys(&[EntityKey(3)]).expect("select"));

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![
                TableEvent::Load,
                TableEvent::Page,
                TableEvent::Sort,
                TableEvent::Filter,
                TableEvent::Search,
                TableEvent::Select,
                TableEvent::Select,
            ]
        );
    }

    #[test]
    fn column_visibility_drives_export_columns() {
        let mut engine = in_memory_engine(10);
        assert!(engine.is_visible("email", true));
        assert!(!engine.is_visible("phones.number", false));
        engine.toggle_column("email", false);

        let visible = engine.export_columns(true);
        assert!(!visible.contains(&"email".to_string()));
        assert!(!visible.contains(&"phones.number".to_string()));
        assert_eq!(engine.export_columns(false).len(), config().fields.len());
    }

    #[test]
    fn export_rows_covers_every_match_without_moving_window() {
        let mut engine = in_memory_engine(TOTAL_RECORDS);
        engine
            .load(LoadRequest::new().filter("gender", "FEMALE").offset(10))
            .expect("load");
        let window = ids(engine.items());

        let exported = engine.export_rows().expect("export");

        assert_eq!(exported.len(), 100);
        assert_eq!(exported.first().map(|p| p.id), Some(199));
        assert_eq!(ids(engine.items()), window);
    }
}
