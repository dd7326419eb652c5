//! # Tabula HTTP API Module
//!
//! This module implements the HTTP REST API server using axum. Every view
//! owns one reconciliation engine over a shared redb store; requests for
//! one view are serialised by the view's mutex.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Row count, view count and columns
//! - `POST /views` - Create a view
//! - `DELETE /views/{id}` - Drop a view
//! - `POST /views/{id}/load` - Apply a load request
//! - `PUT /views/{id}/criteria` - Replace externally supplied criteria
//! - `PUT /views/{id}/selection` - Replace the selection by key
//! - `GET /views/{id}/row/{key}` - Fetch one row by key
//! - `POST /views/{id}/export` - Export matching rows
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `TABULA_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `TABULA_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `TABULA_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV, get_api_key_from_env};
pub use middleware::{RATE_LIMIT_ENV, create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    AckResponse, CreateViewResponse, CriteriaRequest, ExportRequest, ExportResponse,
    HealthResponse, LoadBody, LoadResponse, OperandJson, PredicateJson, RowResponse,
    SelectionRequest, SelectionResponse, StatusResponse,
};

use crate::record::Record;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tabula_core::{RedbStore, ReconciliationEngine, TableConfig, TabulaError};
use tokio::sync::{Mutex, RwLock};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Environment variable holding the allowed CORS origins.
pub const CORS_ORIGINS_ENV: &str = "TABULA_CORS_ORIGINS";

/// Maximum number of live views per server.
pub const MAX_VIEWS: usize = 1024;

/// One view's engine.
pub type ViewEngine = ReconciliationEngine<Record, RedbStore<Record>>;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the row store, the table configuration and the views.
#[derive(Clone)]
pub struct AppState {
    pub store: RedbStore<Record>,
    pub config: Arc<TableConfig>,
    views: Arc<RwLock<BTreeMap<u64, Arc<Mutex<ViewEngine>>>>>,
    next_view: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(store: RedbStore<Record>, config: TableConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            views: Arc::new(RwLock::new(BTreeMap::new())),
            next_view: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a view with a fresh engine and return its id.
    pub async fn create_view(&self) -> Result<u64, TabulaError> {
        let mut views = self.views.write().await;
        if views.len() >= MAX_VIEWS {
            return Err(TabulaError::InvalidConfig(format!(
                "View limit {} reached",
                MAX_VIEWS
            )));
        }

        let id = self.next_view.fetch_add(1, Ordering::Relaxed);
        let mut engine = ReconciliationEngine::new((*self.config).clone(), self.store.clone())?;
        engine.on_event(move |event| tracing::debug!(view = id, event = ?event, "view event"));
        views.insert(id, Arc::new(Mutex::new(engine)));
        tracing::info!(view = id, "Created view");
        Ok(id)
    }

    /// Drop a view. Returns whether it existed.
    pub async fn remove_view(&self, id: u64) -> bool {
        let removed = self.views.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(view = id, "Removed view");
        }
        removed
    }

    pub async fn view(&self, id: u64) -> Option<Arc<Mutex<ViewEngine>>> {
        self.views.read().await.get(&id).cloned()
    }

    pub async fn view_count(&self) -> usize {
        self.views.read().await.len()
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from `TABULA_CORS_ORIGINS`.
///
/// `*` allows every origin, a comma-separated list allows those origins,
/// and an unset or entirely invalid value allows localhost only.
fn build_cors_layer() -> CorsLayer {
    let configured = std::env::var(CORS_ORIGINS_ENV).ok();

    let origins: Vec<HeaderValue> = match configured.as_deref() {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins ({}=*)", CORS_ORIGINS_ENV);
            return CorsLayer::permissive();
        }
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                    None
                }
            })
            .collect(),
        None => Vec::new(),
    };

    let origins = if origins.is_empty() {
        tracing::info!("CORS: defaulting to localhost only");
        localhost_origins()
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn localhost_origins() -> Vec<HeaderValue> {
    [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect()
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit, rate
/// limiting (if enabled), authentication (if configured).
pub fn create_router(state: AppState) -> Router {
    let rate_limiter = create_rate_limiter(get_rate_limit_from_env());
    if rate_limiter.is_none() {
        tracing::info!("Rate limiting disabled");
    }

    let has_auth = get_api_key_from_env().is_some();
    if !has_auth {
        tracing::warn!(
            "API key authentication DISABLED - set {} to require a bearer token",
            API_KEY_ENV
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/views", post(handlers::create_view_handler))
        .route("/views/{id}", delete(handlers::delete_view_handler))
        .route("/views/{id}/load", post(handlers::load_handler))
        .route("/views/{id}/criteria", put(handlers::criteria_handler))
        .route("/views/{id}/selection", put(handlers::selection_handler))
        .route("/views/{id}/row/{key}", get(handlers::row_handler))
        .route("/views/{id}/export", post(handlers::export_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), TabulaError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TabulaError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Tabula HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| TabulaError::IoError(format!("Server error: {}", e)))
}
