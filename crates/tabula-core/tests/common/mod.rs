//! Shared person fixture for integration tests.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use tabula_core::{
    AccessorTable, Entity, EntityKey, EvaluatorSettings, FieldConfig, InMemoryFetcher, MatchMode,
    ReconciliationEngine, TableConfig, Value,
};

pub const TOTAL_RECORDS: u64 = 200;
pub const ROWS_PER_PAGE: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone {
    pub kind: String,
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: u64,
    pub email: String,
    pub gender: String,
    pub date_of_birth: String,
    pub address: Option<Address>,
    pub phones: Vec<Phone>,
    pub groups: Vec<String>,
}

impl Entity for Person {
    fn key(&self) -> EntityKey {
        EntityKey(self.id)
    }
}

const PHONE_TYPES: [&str; 3] = ["MOBILE", "HOME", "WORK"];
const GROUPS: [&str; 3] = ["USER", "DEVELOPER", "ADMINISTRATOR"];

/// Deterministic person; exactly three of the first 200 (66, 132, 198) have gender `OTHER`.
pub fn person(id: u64) -> Person {
    let i = id - 1;
    let gender = if id % 66 == 0 {
        "OTHER"
    } else if id % 2 == 0 {
        "MALE"
    } else {
        "FEMALE"
    };
    let phones = (0..(id % 3) + 1)
        .map(|j| Phone {
            kind: PHONE_TYPES[((id + j) % 3) as usize].to_string(),
            number: format!("0{}", id * 1000 + j),
        })
        .collect();
    let groups = GROUPS[..((id % 3) + 1) as usize]
        .iter()
        .map(|g| (*g).to_string())
        .collect();

    Person {
        id,
        email: format!("name{i}@example.com"),
        gender: gender.to_string(),
        date_of_birth: format!(
            "{:04}-{:02}-{:02}",
            1900 + (id * 37) % 100,
            1 + id % 12,
            1 + id % 28
        ),
        address: (id % 10 != 0).then(|| Address {
            street: format!("Street{i}"),
            city: format!("City{}", id % 17),
        }),
        phones,
        groups,
    }
}

pub fn people(n: u64) -> Vec<Person> {
    (1..=n).map(person).collect()
}

pub fn accessors() -> AccessorTable<Person> {
    let address = AccessorTable::<Address>::new()
        .field("street", |a| Value::from(&a.street))
        .field("city", |a| Value::from(&a.city));
    let phones = AccessorTable::<Phone>::new()
        .field("type", |p| Value::from(&p.kind))
        .field("number", |p| Value::from(&p.number));

    AccessorTable::<Person>::new()
        .field("id", |p| Value::from(p.id))
        .field("email", |p| Value::from(&p.email))
        .field("gender", |p| Value::from(&p.gender))
        .field("dateOfBirth", |p| Value::from(&p.date_of_birth))
        .one("address", |p| p.address.as_ref(), address)
        .many("phones", |p| p.phones.as_slice(), phones)
        .collection("groups", |p| p.groups.iter().map(Value::from).collect())
}

pub fn config() -> TableConfig {
    TableConfig::new(vec![
        FieldConfig::new("id"),
        FieldConfig::new("email")
            .searchable()
            .match_mode(MatchMode::Contains),
        FieldConfig::new("gender"),
        FieldConfig::new("dateOfBirth"),
        FieldConfig::new("address.street").not_sortable(),
        FieldConfig::new("address.city")
            .searchable()
            .match_mode(MatchMode::StartsWith),
        FieldConfig::new("phones.type"),
        FieldConfig::new("phones.number").not_filterable(),
        FieldConfig::new("groups"),
    ])
    .with_page_size(ROWS_PER_PAGE as usize)
}

pub fn in_memory(n: u64) -> InMemoryFetcher<Person> {
    let config = config();
    InMemoryFetcher::new(people(n), accessors(), EvaluatorSettings::from(&config))
}

pub fn in_memory_engine(n: u64) -> ReconciliationEngine<Person, InMemoryFetcher<Person>> {
    ReconciliationEngine::new(config(), in_memory(n)).expect("valid config")
}

pub fn ids(items: &[Person]) -> Vec<u64> {
    items.iter().map(|p| p.id).collect()
}
