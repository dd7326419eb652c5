//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tabula_core::{
    CompareOp, Criteria, CriteriaValue, Direction, ExternalState, LoadReport, LoadRequest,
    Operand, OrderBy, Predicate, TableEvent, TabulaError, Value,
    primitives::{MAX_FILTER_VALUE_LENGTH, MAX_PAGE_SIZE},
};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub row_count: u64,
    pub view_count: usize,
    pub page_size: usize,
    pub columns: Vec<String>,
}

// =============================================================================
// VIEW CREATION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateViewResponse {
    pub success: bool,
    pub view_id: Option<u64>,
    pub error: Option<String>,
}

impl CreateViewResponse {
    pub fn success(view_id: u64) -> Self {
        Self {
            success: true,
            view_id: Some(view_id),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            view_id: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// LOAD REQUEST/RESPONSE
// =============================================================================

/// View load request.
///
/// Absent fields keep the view's committed state. `external` carries raw
/// query-string tokens (`p`, `o`, `q`, per-field filters, `selected`) that
/// seed the first load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBody {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    /// Order token, e.g. `"-dateOfBirth,email"`.
    pub order: Option<String>,
    pub filters: Option<BTreeMap<String, String>>,
    pub search: Option<String>,
    pub external: Vec<(String, String)>,
}

impl LoadBody {
    /// Convert to an engine request.
    ///
    /// # Validation
    ///
    /// - `limit` must not exceed `MAX_PAGE_SIZE` (non-positive limits are
    ///   left to the engine, which rejects them)
    /// - a malformed `order` token is ignored, keeping the view's ordering
    pub fn to_request(&self) -> Result<LoadRequest, TabulaError> {
        if let Some(limit) = self.limit
            && limit > MAX_PAGE_SIZE as i64
        {
            return Err(TabulaError::InvalidConfig(format!(
                "Limit {} exceeds maximum {}",
                limit, MAX_PAGE_SIZE
            )));
        }

        let mut request = LoadRequest::new().external(ExternalState::from_pairs(
            self.external.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ));
        request.offset = self.offset;
        request.limit = self.limit;
        request.filters = self.filters.clone();
        request.search = self.search.clone();
        if let Some(token) = &self.order {
            request.ordering = OrderBy::parse(token);
            if request.ordering.is_none() {
                tracing::warn!("Ignoring malformed order token '{}'", token);
            }
        }
        Ok(request)
    }
}

/// View load response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResponse {
    pub success: bool,
    pub items: Vec<serde_json::Value>,
    pub offset: usize,
    pub limit: usize,
    /// `-1` when unknown.
    pub total: i64,
    pub recounted: bool,
    pub sequential: Option<Direction>,
    pub corrected: bool,
    pub events: Vec<TableEvent>,
    /// Current state rendered as external tokens.
    pub state: ExternalState,
    pub error: Option<String>,
}

impl LoadResponse {
    pub fn success(report: LoadReport, items: Vec<serde_json::Value>, state: ExternalState) -> Self {
        Self {
            success: true,
            items,
            offset: report.offset,
            limit: report.limit,
            total: report.total,
            recounted: report.recounted,
            sequential: report.sequential,
            corrected: report.corrected,
            events: report.events,
            state,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            items: Vec::new(),
            offset: 0,
            limit: 0,
            total: -1,
            recounted: false,
            sequential: None,
            corrected: false,
            events: Vec::new(),
            state: ExternalState::default(),
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// CRITERIA REQUEST
// =============================================================================

/// Predicate operand (tagged by `op`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PredicateJson {
    StartsWith { value: String },
    EndsWith { value: String },
    Contains { value: String },
    Between { low: serde_json::Value, high: serde_json::Value },
    Lt { value: serde_json::Value },
    Lte { value: serde_json::Value },
    Gt { value: serde_json::Value },
    Gte { value: serde_json::Value },
    Not { value: serde_json::Value },
    IgnoreCase { value: String },
}

/// One operand: a plain JSON scalar (equality) or a predicate object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperandJson {
    Predicate(PredicateJson),
    Scalar(serde_json::Value),
}

/// Externally supplied required criteria: field path to a disjunction of operands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriteriaRequest {
    #[serde(default)]
    pub criteria: BTreeMap<String, Vec<OperandJson>>,
}

impl CriteriaRequest {
    /// Convert to core criteria. Fields with no operands are dropped.
    pub fn to_criteria(&self) -> Result<Criteria, TabulaError> {
        let mut criteria = Criteria::new();
        for (field, operands) in &self.criteria {
            let operands = operands
                .iter()
                .map(OperandJson::to_operand)
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(value) = CriteriaValue::normalize(operands) {
                criteria.insert(field.clone(), value);
            }
        }
        Ok(criteria)
    }
}

impl OperandJson {
    fn to_operand(&self) -> Result<Operand, TabulaError> {
        match self {
            Self::Scalar(value) => Ok(Operand::Value(scalar(value)?)),
            Self::Predicate(predicate) => Ok(Operand::Predicate(predicate.to_predicate()?)),
        }
    }
}

impl PredicateJson {
    fn to_predicate(&self) -> Result<Predicate, TabulaError> {
        Ok(match self {
            Self::StartsWith { value } => Predicate::starts_with(bounded(value)?),
            Self::EndsWith { value } => Predicate::ends_with(bounded(value)?),
            Self::Contains { value } => Predicate::contains(bounded(value)?),
            Self::Between { low, high } => Predicate::between(scalar(low)?, scalar(high)?),
            Self::Lt { value } => Predicate::compare(CompareOp::Lt, scalar(value)?),
            Self::Lte { value } => Predicate::compare(CompareOp::Lte, scalar(value)?),
            Self::Gt { value } => Predicate::compare(CompareOp::Gt, scalar(value)?),
            Self::Gte { value } => Predicate::compare(CompareOp::Gte, scalar(value)?),
            Self::Not { value } => Predicate::not(scalar(value)?),
            Self::IgnoreCase { value } => Predicate::ignore_case(bounded(value)?),
        })
    }
}

fn bounded(text: &str) -> Result<&str, TabulaError> {
    if text.len() > MAX_FILTER_VALUE_LENGTH {
        return Err(TabulaError::InvalidConfig(format!(
            "Criterion length {} exceeds maximum {} bytes",
            text.len(),
            MAX_FILTER_VALUE_LENGTH
        )));
    }
    Ok(text)
}

/// JSON scalar to a core value. Arrays, objects and non-integer numbers are rejected.
fn scalar(value: &serde_json::Value) -> Result<Value, TabulaError> {
    match value {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int).ok_or_else(|| {
            TabulaError::InvalidConfig(format!("Unsupported numeric criterion {}", n))
        }),
        serde_json::Value::String(s) => Ok(Value::text(bounded(s)?)),
        other => Err(TabulaError::InvalidConfig(format!(
            "Criterion operand must be a scalar, got {}",
            other
        ))),
    }
}

// =============================================================================
// SELECTION / ROW / EXPORT
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionRequest {
    #[serde(default)]
    pub keys: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResponse {
    pub success: bool,
    pub changed: bool,
    pub selected: Vec<u64>,
    pub error: Option<String>,
}

impl SelectionResponse {
    pub fn success(changed: bool, selected: Vec<u64>) -> Self {
        Self {
            success: true,
            changed,
            selected,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            changed: false,
            selected: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowResponse {
    pub success: bool,
    pub found: bool,
    pub row: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl RowResponse {
    pub fn found(row: serde_json::Value) -> Self {
        Self {
            success: true,
            found: true,
            row: Some(row),
            error: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            success: true,
            found: false,
            row: None,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            found: false,
            row: None,
            error: Some(msg.into()),
        }
    }
}

/// Export request. `columns` toggles column visibility before exporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    pub visible_only: bool,
    pub columns: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(columns: Vec<String>, rows: Vec<serde_json::Value>) -> Self {
        Self {
            success: true,
            columns,
            rows,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
        }
    }
}
