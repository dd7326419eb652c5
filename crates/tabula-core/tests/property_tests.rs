//! # Property-Based Tests
//!
//! Determinism and backend-parity invariants, checked with proptest.

use proptest::collection::vec;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use tabula_core::{
    AccessorTable, Criteria, CriteriaSet, CriteriaValue, Entity, EntityKey, EvaluatorSettings,
    FieldConfig, InMemoryFetcher, LoadRequest, MatchMode, OrderBy, PageDescriptor, Predicate,
    RedbStore, ReconciliationEngine, ResultFetcher, SortKey, TableConfig, Value,
};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Address {
    city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Row {
    id: u64,
    name: Option<String>,
    score: i64,
    address: Option<Address>,
    tags: Vec<String>,
}

impl Entity for Row {
    fn key(&self) -> EntityKey {
        EntityKey(self.id)
    }
}

const FIELDS: [&str; 5] = ["id", "name", "score", "address.city", "tags"];
const NAMES: [&str; 6] = ["alpha", "Beta", "gamma", "alphabet", "DELTA", "beta"];
const CITIES: [&str; 4] = ["Oslo", "oslo", "Bergen", "Åre"];
const TAGS: [&str; 4] = ["red", "Green", "blue", "green"];

fn config() -> TableConfig {
    TableConfig::new(vec![
        FieldConfig::new("id"),
        FieldConfig::new("name")
            .searchable()
            .match_mode(MatchMode::StartsWith),
        FieldConfig::new("score"),
        FieldConfig::new("address.city").searchable(),
        FieldConfig::new("tags"),
    ])
    .with_page_size(4)
}

fn accessors() -> AccessorTable<Row> {
    let address =
        AccessorTable::<Address>::new().field("city", |a| Value::from(a.city.as_deref()));

    AccessorTable::<Row>::new()
        .field("id", |r| Value::from(r.id))
        .field("name", |r| Value::from(r.name.as_deref()))
        .field("score", |r| Value::from(r.score))
        .one("address", |r| r.address.as_ref(), address)
        .collection("tags", |r| r.tags.iter().map(Value::from).collect())
}

/// `None` for no address, `Some(None)` for an address without a city.
fn address_strategy() -> impl Strategy<Value = Option<Address>> {
    proptest::option::of(proptest::option::of(0usize..CITIES.len())).prop_map(|address| {
        address.map(|city| Address {
            city: city.map(|c| CITIES[c].to_string()),
        })
    })
}

/// Rows with unique ids `1..=n`; the other columns are drawn per row.
fn rows_strategy() -> impl Strategy<Value = Vec<Row>> {
    let cell = (
        proptest::option::of(0usize..NAMES.len()),
        -5i64..5,
        address_strategy(),
        vec(0usize..TAGS.len(), 0..3),
    );
    vec(cell, 0..40).prop_map(|cells| {
        cells
            .into_iter()
            .zip(1u64..)
            .map(|((name, score, address, tags), id)| Row {
                id,
                name: name.map(|n| NAMES[n].to_string()),
                score,
                address,
                tags: tags.into_iter().map(|t| TAGS[t].to_string()).collect(),
            })
            .collect()
    })
}

fn ordering_strategy() -> impl Strategy<Value = OrderBy> {
    vec((0usize..FIELDS.len(), any::<bool>()), 0..3).prop_map(|keys| {
        OrderBy::from_keys(
            keys.into_iter()
                .map(|(field, ascending)| SortKey::new(FIELDS[field], ascending)),
        )
    })
}

fn criteria_strategy() -> impl Strategy<Value = Criteria> {
    (
        proptest::option::of(0usize..NAMES.len()),
        proptest::option::of((-5i64..5, 0i64..5)),
        proptest::option::of(proptest::option::of(0usize..CITIES.len())),
        proptest::option::of(vec(0usize..TAGS.len(), 1..3)),
    )
        .prop_map(|(name, range, city, tags)| {
            let mut criteria = Criteria::new();
            if let Some(name) = name {
                criteria.insert(
                    "name",
                    CriteriaValue::one(Predicate::starts_with(&NAMES[name][..3])),
                );
            }
            if let Some((low, width)) = range {
                criteria.insert(
                    "score",
                    CriteriaValue::one(Predicate::between(low, low + width)),
                );
            }
            // `Some(None)` selects rows whose city is null, address or not.
            if let Some(city) = city {
                let value = city.map_or(Value::Null, |c| Value::from(CITIES[c]));
                criteria.insert("address.city", CriteriaValue::one(value));
            }
            let tags = tags.and_then(|t| CriteriaValue::any(t.into_iter().map(|i| TAGS[i])));
            if let Some(tags) = tags {
                criteria.insert("tags", tags);
            }
            criteria
        })
}

fn ids(rows: &[Row]) -> Vec<u64> {
    rows.iter().map(|r| r.id).collect()
}

fn in_memory(rows: Vec<Row>) -> InMemoryFetcher<Row> {
    InMemoryFetcher::new(rows, accessors(), EvaluatorSettings::from(&config()))
}

// =============================================================================
// MODEL PROPERTIES
// =============================================================================

proptest! {
    /// Normalizing twice is the same as normalizing once, and every default
    /// field ends up in the result exactly once.
    #[test]
    fn ordering_normalize_is_idempotent(requested in ordering_strategy()) {
        let defaults = OrderBy::new().then_desc("id");
        let once = OrderBy::normalize(Some(&requested), None, &defaults);
        let twice = OrderBy::normalize(Some(&once), None, &defaults);

        prop_assert_eq!(&once, &twice);
        prop_assert!(once.contains("id"));
        let mut fields: Vec<&str> = once.keys().iter().map(|k| k.field.as_str()).collect();
        let len = fields.len();
        fields.dedup();
        prop_assert_eq!(fields.len(), len);
    }

    /// Order tokens round-trip through parse.
    #[test]
    fn order_token_parses_back(requested in ordering_strategy()) {
        prop_assume!(!requested.is_empty());
        prop_assert_eq!(OrderBy::parse(&requested.to_token()), Some(requested));
    }

    /// Disjunction equality ignores operand order and duplicates.
    #[test]
    fn criteria_value_equality_ignores_order(values in vec(-20i64..20, 1..8)) {
        let forward = CriteriaValue::any(values.iter().copied());
        let mut reversed = values.clone();
        reversed.reverse();
        reversed.extend(values.iter().copied());
        let backward = CriteriaValue::any(reversed);

        prop_assert_eq!(forward, backward);
    }
}

// =============================================================================
// BACKEND PARITY
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The redb store and the in-memory fetcher return the same page and total,
    /// including criteria and orderings over nested and multi-valued fields.
    #[test]
    fn store_matches_in_memory_fetch(
        rows in rows_strategy(),
        criteria in criteria_strategy(),
        ordering in ordering_strategy(),
        offset in 0i64..45,
        limit in 1i64..12,
    ) {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("rows.redb"), accessors(), &config())
            .expect("open db");
        store.insert_batch(&rows).expect("insert");
        let mut memory = in_memory(rows);

        let ordering = OrderBy::normalize(Some(&ordering), None, &config().default_ordering);
        let page: PageDescriptor<Row> = PageDescriptor::new(
            offset,
            limit,
            ordering,
            CriteriaSet::new(criteria, Criteria::new()),
        )
        .expect("valid page");

        let stored = store.fetch(&page, true).expect("store fetch");
        let expected = memory.fetch(&page, true).expect("memory fetch");

        prop_assert_eq!(ids(&stored.items), ids(&expected.items));
        prop_assert_eq!(stored.estimated_total, expected.estimated_total);
    }

    /// Walking forward then backward through every page yields identical
    /// windows whether the store answers through cursor hints or offsets.
    #[test]
    fn engine_paging_parity(
        rows in rows_strategy(),
        ordering in ordering_strategy(),
        search in proptest::option::of(0usize..NAMES.len()),
    ) {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("rows.redb"), accessors(), &config())
            .expect("open db");
        store.insert_batch(&rows).expect("insert");
        let total = rows.len() as i64;

        let mut keyset = ReconciliationEngine::new(config(), store).expect("engine");
        let mut offsets = ReconciliationEngine::new(config(), in_memory(rows)).expect("engine");

        let mut first = LoadRequest::new().ordering(ordering);
        if let Some(name) = search {
            first = first.search(&NAMES[name][..2]);
        }
        keyset.load(first.clone()).expect("keyset load");
        offsets.load(first).expect("offset load");
        prop_assert_eq!(ids(keyset.items()), ids(offsets.items()));

        let pages = (total + 3) / 4;
        let walk = (1..pages).chain((0..pages.saturating_sub(1)).rev());
        for page in walk {
            let request = LoadRequest::new().offset(page * 4);
            keyset.load(request.clone()).expect("keyset load");
            offsets.load(request).expect("offset load");
            prop_assert_eq!(ids(keyset.items()), ids(offsets.items()));
        }
    }
}
