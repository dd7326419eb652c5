//! # tabula
//!
//! The Tabula binary's library half: CLI, HTTP API, configuration and the
//! schemaless record type served over a `tabula-core` engine.

pub mod api;
pub mod cli;
pub mod config;
pub mod record;
