//! # Tabula CLI Module
//!
//! This module implements the CLI interface for Tabula.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show store status
//! - `init` - Initialize a new row database
//! - `import` - Import rows from a JSON file
//! - `page` - Load one page and print it

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabula_core::TabulaError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Tabula - paged, sortable, filterable tables over a redb row store.
#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the row database
    #[arg(short = 'D', long, global = true, default_value = "tabula.db")]
    pub database: PathBuf,

    /// Path to the TOML table configuration
    #[arg(short = 'C', long, global = true, default_value = "tabula.toml")]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show store status
    Status,

    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Import rows from a JSON array of objects
    Import {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Load one page and print it
    Page {
        /// Row offset
        #[arg(short, long)]
        offset: Option<i64>,

        /// Page size (defaults to the configured page size)
        #[arg(short, long)]
        limit: Option<i64>,

        /// Order token, e.g. "-dateOfBirth,email"
        #[arg(short = 'O', long, allow_hyphen_values = true)]
        order: Option<String>,

        /// Global search text
        #[arg(short, long)]
        search: Option<String>,

        /// Column filter as field=value (repeatable)
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
}

/// Parse a `field=value` filter argument.
fn parse_filter(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(field, _)| !field.trim().is_empty())
        .map(|(field, value)| (field.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected field=value, got '{}'", raw))
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TabulaError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            cmd_server(&cli.database, &cli.config, &host, port).await
        }
        Some(Commands::Status) => cmd_status(&cli.database, &cli.config, json_mode),
        Some(Commands::Init { force }) => cmd_init(&cli.database, &cli.config, force),
        Some(Commands::Import { file }) => cmd_import(&cli.database, &cli.config, &file),
        Some(Commands::Page {
            offset,
            limit,
            order,
            search,
            filters,
        }) => cmd_page(
            &cli.database,
            &cli.config,
            json_mode,
            PageArgs {
                offset,
                limit,
                order,
                search,
                filters,
            },
        ),
        None => cmd_status(&cli.database, &cli.config, json_mode),
    }
}

// =============================================================================
// TESTS
// =============================================================================
