//! # Storage Module
//!
//! Persistent backends implementing the result fetcher contract.

mod redb_store;

pub use redb_store::RedbStore;
