//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{self, AppState, LoadBody};
use crate::config::AppConfig;
use crate::record::{Record, accessors};
use std::path::{Path, PathBuf};
use tabula_core::{RedbStore, ReconciliationEngine, TabulaError};

// =============================================================================
// FILE LIMITS
// =============================================================================

/// Maximum file size for import (100 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum rows per import file.
const MAX_IMPORT_ROWS: usize = 1_000_000;

/// Resolve an input path to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TabulaError> {
    let canonical = path.canonicalize().map_err(|e| {
        TabulaError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TabulaError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    let size = std::fs::metadata(&canonical)
        .map_err(|e| TabulaError::IoError(format!("Cannot read file metadata: {}", e)))?
        .len();
    if size > MAX_IMPORT_FILE_SIZE {
        return Err(TabulaError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            size, MAX_IMPORT_FILE_SIZE
        )));
    }

    Ok(canonical)
}

/// Open the row store described by the configuration.
fn open_store(db_path: &Path, config: &AppConfig) -> Result<RedbStore<Record>, TabulaError> {
    RedbStore::open(db_path, accessors(&config.table), &config.table)
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    db_path: &Path,
    config_path: &Path,
    host: &str,
    port: u16,
) -> Result<(), TabulaError> {
    let config = AppConfig::load_or_default(config_path)?;
    let store = open_store(db_path, &config)?;

    println!("Tabula Table Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Database: {}", db_path.display());
    println!("  Rows:     {}", store.len()?);
    println!("  Columns:  {}", config.table.fields.len());
    println!();
    println!("Endpoints:");
    println!("  POST /views                - Create a view");
    println!("  DELETE /views/{{id}}         - Drop a view");
    println!("  POST /views/{{id}}/load      - Load a page");
    println!("  PUT  /views/{{id}}/criteria  - Replace supplied criteria");
    println!("  PUT  /views/{{id}}/selection - Replace the selection");
    println!("  GET  /views/{{id}}/row/{{key}} - Fetch one row");
    println!("  POST /views/{{id}}/export    - Export matching rows");
    println!("  GET  /status               - Store status");
    println!("  GET  /health               - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, AppState::new(store, config.table)).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store status.
pub fn cmd_status(db_path: &Path, config_path: &Path, json_mode: bool) -> Result<(), TabulaError> {
    let config = AppConfig::load_or_default(config_path)?;
    let store = open_store(db_path, &config)?;
    let rows = store.len()?;
    let columns: Vec<&str> = config.table.fields.iter().map(|f| f.path.as_str()).collect();

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "row_count": rows,
            "page_size": config.table.page_size,
            "default_ordering": config.table.default_ordering.to_token(),
            "columns": columns,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Tabula Store Status");
    println!("===================");
    println!("Database:  {}", db_path.display());
    println!();
    println!("Rows:      {}", rows);
    println!("Page size: {}", config.table.page_size);
    println!("Ordering:  {}", config.table.default_ordering);
    println!("Columns:   {}", columns.join(", "));

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty database, replacing an existing one only with `force`.
pub fn cmd_init(db_path: &Path, config_path: &Path, force: bool) -> Result<(), TabulaError> {
    if db_path.exists() {
        if !force {
            return Err(TabulaError::IoError(format!(
                "Database {} already exists (use --force to replace it)",
                db_path.display()
            )));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| TabulaError::IoError(format!("Remove database: {}", e)))?;
        tracing::info!("Removed existing database {}", db_path.display());
    }

    let config = AppConfig::load_or_default(config_path)?;
    open_store(db_path, &config)?;
    println!("Initialized empty database at {}", db_path.display());
    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Import rows from a JSON array of objects, each carrying the id field.
pub fn cmd_import(db_path: &Path, config_path: &Path, file: &Path) -> Result<(), TabulaError> {
    let config = AppConfig::load_or_default(config_path)?;
    let store = open_store(db_path, &config)?;

    let path = validate_file_path(file)?;
    tracing::info!("Importing rows from {}", path.display());
    let contents = std::fs::read(&path)
        .map_err(|e| TabulaError::IoError(format!("Read file: {}", e)))?;
    let values: Vec<serde_json::Value> = serde_json::from_slice(&contents)
        .map_err(|e| TabulaError::DeserializationError(e.to_string()))?;

    if values.len() > MAX_IMPORT_ROWS {
        return Err(TabulaError::DeserializationError(format!(
            "Row count {} exceeds maximum allowed {}",
            values.len(),
            MAX_IMPORT_ROWS
        )));
    }

    let records = values
        .into_iter()
        .map(|value| Record::from_json(value, &config.table.id_field))
        .collect::<Result<Vec<_>, _>>()?;
    let inserted = store.insert_batch(&records)?;

    println!(
        "Imported {} rows ({} new, {} replaced)",
        records.len(),
        inserted,
        records.len() as u64 - inserted
    );
    println!("Store now has {} rows", store.len()?);
    Ok(())
}

// =============================================================================
// PAGE COMMAND
// =============================================================================

/// Arguments of the `page` command.
#[derive(Debug, Clone, Default)]
pub struct PageArgs {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub order: Option<String>,
    pub search: Option<String>,
    pub filters: Vec<(String, String)>,
}

/// Run a single load cycle and print the window.
pub fn cmd_page(
    db_path: &Path,
    config_path: &Path,
    json_mode: bool,
    args: PageArgs,
) -> Result<(), TabulaError> {
    let config = AppConfig::load_or_default(config_path)?;
    let store = open_store(db_path, &config)?;
    let id_field = config.table.id_field.clone();

    let body = LoadBody {
        offset: args.offset,
        limit: args.limit,
        order: args.order,
        filters: (!args.filters.is_empty()).then(|| args.filters.into_iter().collect()),
        search: args.search,
        external: Vec::new(),
    };
    let mut engine = ReconciliationEngine::new(config.table, store)?;
    let report = engine.load(body.to_request()?)?;
    let rows: Vec<serde_json::Value> = engine.items().iter().map(|r| r.to_json(&id_field)).collect();

    if json_mode {
        let output = serde_json::json!({
            "offset": report.offset,
            "limit": report.limit,
            "total": report.total,
            "corrected": report.corrected,
            "order": engine.ordering().to_token(),
            "items": rows,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    let total = if report.total < 0 {
        "unknown".to_string()
    } else {
        report.total.to_string()
    };
    println!(
        "Rows {}-{} of {} (order: {})",
        report.offset + usize::from(report.item_count > 0),
        report.offset + report.item_count,
        total,
        engine.ordering()
    );
    if report.corrected {
        println!("Offset corrected to the last page");
    }
    println!();
    for row in rows {
        println!("{}", row);
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
