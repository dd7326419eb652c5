//! # Tabula - Paged Table Server
//!
//! The main binary for the Tabula reconciliation engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                apps/tabula (THE BINARY)                  │
//! │                                                          │
//! │   ┌─────────────┐              ┌──────────────────────┐  │
//! │   │    CLI      │              │      HTTP API        │  │
//! │   │   (clap)    │              │ (axum, view engines) │  │
//! │   └──────┬──────┘              └──────────┬───────────┘  │
//! │          └──────────────┬─────────────────┘              │
//! │                         ▼                                │
//! │                 ┌───────────────┐     ┌──────────────┐   │
//! │                 │  tabula-core  │────▶│  redb store  │   │
//! │                 │  (THE LOGIC)  │     │  (postcard)  │   │
//! │                 └───────────────┘     └──────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! tabula init
//! tabula import -f people.json
//! tabula page --offset 20 --order -dateOfBirth -f gender=FEMALE
//! tabula server --host 0.0.0.0 --port 8080
//! ```

use clap::Parser;
use tabula::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // TABULA_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TABULA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "tabula=debug,tabula_core=debug,tower_http=debug"
    } else {
        "tabula=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        println!("Tabula v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
