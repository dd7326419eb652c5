//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        AckResponse, CreateViewResponse, CriteriaRequest, ExportRequest, ExportResponse,
        HealthResponse, LoadBody, LoadResponse, RowResponse, SelectionRequest, SelectionResponse,
        StatusResponse,
    },
};
use crate::record::property_json;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;
use tabula_core::{EntityKey, TabulaError};

/// HTTP status for an engine or store error.
fn error_status(error: &TabulaError) -> StatusCode {
    match error {
        TabulaError::InvalidLimit(_)
        | TabulaError::InvalidConfig(_)
        | TabulaError::UnknownField(_)
        | TabulaError::DeserializationError(_) => StatusCode::BAD_REQUEST,
        TabulaError::UnsupportedPredicate(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TabulaError::FetchFailed(_)
        | TabulaError::SerializationError(_)
        | TabulaError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn view_not_found(id: u64) -> String {
    format!("View {} not found", id)
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Row count and view summary.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let row_count = match state.store.len() {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Status failed: {}", e);
            return (error_status(&e), e.to_string()).into_response();
        }
    };

    let response = StatusResponse {
        row_count,
        view_count: state.view_count().await,
        page_size: state.config.page_size,
        columns: state.config.fields.iter().map(|f| f.path.clone()).collect(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

// =============================================================================
// VIEWS
// =============================================================================

/// Create a view.
pub async fn create_view_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.create_view().await {
        Ok(id) => (StatusCode::CREATED, Json(CreateViewResponse::success(id))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(CreateViewResponse::error(e.to_string())),
        ),
    }
}

/// Drop a view and its engine.
pub async fn delete_view_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    if state.remove_view(id).await {
        (StatusCode::OK, Json(AckResponse::ok()))
    } else {
        (StatusCode::NOT_FOUND, Json(AckResponse::error(view_not_found(id))))
    }
}

/// Run one load cycle on a view.
pub async fn load_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<LoadBody>,
) -> impl IntoResponse {
    let Some(view) = state.view(id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(LoadResponse::error(view_not_found(id))),
        );
    };

    let request = match body.to_request() {
        Ok(request) => request,
        Err(e) => {
            return (
                error_status(&e),
                Json(LoadResponse::error(format!("Invalid load request: {}", e))),
            );
        }
    };

    let mut engine = view.lock().await;
    match engine.load(request) {
        Ok(report) => {
            let id_field = &state.config.id_field;
            let items = engine.items().iter().map(|r| r.to_json(id_field)).collect();
            let tokens = engine.external_state();
            (
                StatusCode::OK,
                Json(LoadResponse::success(report, items, tokens)),
            )
        }
        Err(e) => {
            tracing::warn!(view = id, "Load failed: {}", e);
            (
                error_status(&e),
                Json(LoadResponse::error(format!("Load failed: {}", e))),
            )
        }
    }
}

/// Replace the externally supplied criteria of a view. Applies on the next load.
pub async fn criteria_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<CriteriaRequest>,
) -> impl IntoResponse {
    let Some(view) = state.view(id).await else {
        return (StatusCode::NOT_FOUND, Json(AckResponse::error(view_not_found(id))));
    };

    let criteria = match request.to_criteria() {
        Ok(criteria) => criteria,
        Err(e) => {
            return (
                error_status(&e),
                Json(AckResponse::error(format!("Invalid criteria: {}", e))),
            );
        }
    };

    let mut engine = view.lock().await;
    if criteria.is_empty() {
        engine.set_criteria_supplier(None);
    } else {
        engine.set_criteria_supplier(Some(Arc::new(move || criteria.clone())));
    }
    (StatusCode::OK, Json(AckResponse::ok()))
}

/// Replace the selection of a view by row keys.
pub async fn selection_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<SelectionRequest>,
) -> impl IntoResponse {
    let Some(view) = state.view(id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(SelectionResponse::error(view_not_found(id))),
        );
    };

    let keys: Vec<EntityKey> = request.keys.iter().copied().map(EntityKey).collect();
    let mut engine = view.lock().await;
    match engine.select_keys(&keys) {
        Ok(changed) => {
            let selected = engine.selection().iter().map(|r| r.id).collect();
            (
                StatusCode::OK,
                Json(SelectionResponse::success(changed, selected)),
            )
        }
        Err(e) => (
            error_status(&e),
            Json(SelectionResponse::error(format!("Selection failed: {}", e))),
        ),
    }
}

/// Fetch one row of a view by key.
pub async fn row_handler(
    State(state): State<AppState>,
    Path((id, key)): Path<(u64, u64)>,
) -> impl IntoResponse {
    let Some(view) = state.view(id).await else {
        return (StatusCode::NOT_FOUND, Json(RowResponse::error(view_not_found(id))));
    };

    let mut engine = view.lock().await;
    match engine.row_data(EntityKey(key)) {
        Ok(Some(row)) => (
            StatusCode::OK,
            Json(RowResponse::found(row.to_json(&state.config.id_field))),
        ),
        Ok(None) => (StatusCode::NOT_FOUND, Json(RowResponse::not_found())),
        Err(e) => (
            error_status(&e),
            Json(RowResponse::error(format!("Row lookup failed: {}", e))),
        ),
    }
}

/// Export every row matching the view's criteria, projected onto the
/// exported columns.
pub async fn export_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ExportRequest>,
) -> impl IntoResponse {
    let Some(view) = state.view(id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ExportResponse::error(view_not_found(id))),
        );
    };

    let mut engine = view.lock().await;
    for (column, visible) in request.columns {
        engine.toggle_column(column, visible);
    }
    let columns = engine.export_columns(request.visible_only);

    let rows = match engine.export_rows() {
        Ok(rows) => rows,
        Err(e) => {
            return (
                error_status(&e),
                Json(ExportResponse::error(format!("Export failed: {}", e))),
            );
        }
    };

    let id_field = &state.config.id_field;
    let projected = rows
        .iter()
        .map(|row| {
            let object = columns
                .iter()
                .map(|column| {
                    let value = if column == id_field {
                        serde_json::Value::from(row.id)
                    } else {
                        property_json(&row.lookup(column))
                    };
                    (column.clone(), value)
                })
                .collect::<serde_json::Map<_, _>>();
            serde_json::Value::Object(object)
        })
        .collect();

    tracing::info!(view = id, rows = rows.len(), "Exported rows");
    (
        StatusCode::OK,
        Json(ExportResponse::success(columns, projected)),
    )
}
