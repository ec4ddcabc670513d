//! REST API handlers for the HR dashboard
//!
//! The sheet proxies answer with the raw 2-D array. Each one keeps the failure
//! body its dashboard page already understands, so the error shapes differ
//! from endpoint to endpoint.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use super::service::{DashboardService, DashboardSummary, ServiceError};
use crate::fetch::FetchError;
use crate::models::Source;
use crate::reports::{attendance, performance, recruitment, sector, sortie, turnover, workforce};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// `null` when the upstream sent no content type at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_content_type: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn details(mut self, details: impl Into<Value>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(now());
        self
    }
}

pub type AppState = Arc<DashboardService>;
pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn fail(status: StatusCode, body: ErrorResponse) -> ApiError {
    (status, Json(body))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "timestamp": now()}))
}

/// GET /api/ping
pub async fn ping() -> impl IntoResponse {
    let message = std::env::var("PING_MESSAGE").unwrap_or_else(|_| "ping".into());
    Json(serde_json::json!({ "message": message }))
}

/// Proxy whose every failure is a 500 `{error, message}`.
async fn plain_proxy(service: &DashboardService, source: Source) -> Result<Json<Value>, ApiError> {
    service.fetch_rows(source).await.map(Json).map_err(|e| {
        error!(%source, error = %e, "Proxy fetch failed");
        fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(format!("Failed to fetch {source} data")).message(e.to_string()),
        )
    })
}

/// GET /api/workforce
pub async fn get_workforce(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    plain_proxy(&service, Source::Workforce).await
}

/// GET /api/performance
pub async fn get_performance(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    plain_proxy(&service, Source::Performance).await
}

/// GET /api/sortie
pub async fn get_sortie(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    plain_proxy(&service, Source::Sortie).await
}

/// GET /api/attendance
pub async fn get_attendance(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    let rows = match service.fetch_rows(Source::Attendance).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "Attendance fetch failed");
            return Err(match e {
                ServiceError::Fetch(FetchError::Timeout(_) | FetchError::Network(_)) => {
                    let mut body = ErrorResponse::new("Service temporarily unavailable")
                        .details(
                            "Unable to reach the data source after multiple attempts. \
                             The server may have network connectivity issues.",
                        )
                        .stamped();
                    body.attempts = Some(service.policy(Source::Attendance).attempts);
                    fail(StatusCode::SERVICE_UNAVAILABLE, body)
                }
                ServiceError::Fetch(FetchError::Status { status, reason, .. }) => fail(
                    status,
                    ErrorResponse::new(format!("Data source error: {}", status.as_u16()))
                        .details(reason)
                        .stamped(),
                ),
                ServiceError::Fetch(FetchError::InvalidJson(_)) => fail(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Invalid response format").details("Server returned non-JSON data"),
                ),
                other => fail(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Server error").details(other.to_string()).stamped(),
                ),
            });
        }
    };

    match rows.as_array() {
        Some(list) if !list.is_empty() => Ok(Json(rows)),
        _ => Err(fail(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("Invalid data format").details("Expected array with at least one row"),
        )),
    }
}

/// GET /api/turnover
pub async fn get_turnover(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    service.fetch_rows(Source::Turnover).await.map(Json).map_err(|e| {
        error!(error = %e, "Turnover fetch failed");
        let mut body = ErrorResponse::new("Failed to fetch turnover data").message(e.to_string());
        body.data = Some(Vec::new());
        fail(StatusCode::INTERNAL_SERVER_ERROR, body)
    })
}

/// GET /api/recruitment
pub async fn get_recruitment(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    service.fetch_rows(Source::Recruitment).await.map(Json).map_err(|e| {
        error!(error = %e, "Recruitment fetch failed");
        match e {
            ServiceError::Fetch(FetchError::Timeout(_)) => fail(
                StatusCode::GATEWAY_TIMEOUT,
                ErrorResponse::new("Gateway Timeout")
                    .message("Failed to fetch recruitment data after multiple attempts"),
            ),
            other => fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Failed to fetch recruitment data").message(other.to_string()),
            ),
        }
    })
}

/// GET /api/admin/auth
pub async fn get_admin_auth(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    service.fetch_rows(Source::Auth).await.map(Json).map_err(|e| {
        error!(error = %e, "Credential sheet fetch failed");
        match e {
            ServiceError::Fetch(FetchError::Status { status, reason, .. }) => {
                let mut body = ErrorResponse::new("Failed to fetch authentication data");
                body.status = Some(status.as_u16());
                body.status_text = Some(reason);
                fail(status, body)
            }
            ServiceError::Fetch(FetchError::Content { content_type, .. }) => {
                let mut body = ErrorResponse::new("Invalid response format from Google Sheets");
                body.received_content_type = Some(content_type.map_or(Value::Null, Value::String));
                fail(StatusCode::INTERNAL_SERVER_ERROR, body)
            }
            other => fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Internal server error").message(other.to_string()),
            ),
        }
    })
}

/// POST /api/admin/upload
///
/// Forwards the body, minus `googleScriptUrl`, to that URL as `text/plain`.
pub async fn post_admin_upload(
    State(service): State<AppState>,
    Json(mut payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let url = payload
        .as_object_mut()
        .and_then(|fields| fields.remove("googleScriptUrl"))
        .and_then(|url| url.as_str().map(str::to_string))
        .filter(|url| !url.is_empty());
    let Some(url) = url else {
        return Err(fail(StatusCode::BAD_REQUEST, ErrorResponse::new("googleScriptUrl is required")));
    };

    match service.upload(&url, &payload).await {
        Ok(response) if response.status.is_success() => Ok(Json(response.body)),
        Ok(response) => {
            error!(status = %response.status, "Upload rejected upstream");
            Err(fail(
                response.status,
                ErrorResponse::new("Failed to upload to Google Sheets").details(response.body),
            ))
        }
        Err(e) => {
            error!(error = %e, "Upload failed");
            Err(fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Internal server error").message(e.to_string()),
            ))
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

fn report_error(name: &str, e: ServiceError) -> ApiError {
    error!(report = name, error = %e, "Report failed");
    fail(
        e.status_code(),
        ErrorResponse::new(format!("Failed to build {name} report")).message(e.to_string()),
    )
}

/// GET /api/reports/attendance
pub async fn attendance_report(
    State(service): State<AppState>,
    Query(filters): Query<attendance::Filters>,
) -> Result<Json<attendance::AttendanceReport>, ApiError> {
    service
        .attendance_report(&filters)
        .await
        .map(Json)
        .map_err(|e| report_error("attendance", e))
}

/// GET /api/reports/performance
pub async fn performance_report(
    State(service): State<AppState>,
    Query(filters): Query<performance::Filters>,
) -> Result<Json<performance::PerformanceReport>, ApiError> {
    service
        .performance_report(&filters)
        .await
        .map(Json)
        .map_err(|e| report_error("performance", e))
}

/// GET /api/reports/recruitment
pub async fn recruitment_report(
    State(service): State<AppState>,
    Query(filters): Query<recruitment::Filters>,
) -> Result<Json<recruitment::RecruitmentReport>, ApiError> {
    service
        .recruitment_report(&filters)
        .await
        .map(Json)
        .map_err(|e| report_error("recruitment", e))
}

/// GET /api/reports/sortie
pub async fn sortie_report(
    State(service): State<AppState>,
    Query(filters): Query<sortie::Filters>,
) -> Result<Json<sortie::SortieReport>, ApiError> {
    service
        .sortie_report(&filters)
        .await
        .map(Json)
        .map_err(|e| report_error("sortie", e))
}

/// GET /api/reports/turnover
pub async fn turnover_report(
    State(service): State<AppState>,
    Query(filters): Query<turnover::Filters>,
) -> Result<Json<turnover::TurnoverReport>, ApiError> {
    service
        .turnover_report(&filters)
        .await
        .map(Json)
        .map_err(|e| report_error("turnover", e))
}

/// GET /api/reports/workforce
pub async fn workforce_report(
    State(service): State<AppState>,
    Query(filters): Query<workforce::Filters>,
) -> Result<Json<workforce::WorkforceReport>, ApiError> {
    service
        .workforce_report(&filters)
        .await
        .map(Json)
        .map_err(|e| report_error("workforce", e))
}

/// GET /api/reports/dashboard
pub async fn dashboard(State(service): State<AppState>) -> Json<DashboardSummary> {
    Json(service.dashboard().await)
}

/// POST /api/reports/sector
pub async fn sector_report(
    State(service): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<sector::SectorReport>, ApiError> {
    let request: sector::SectorRequest = serde_json::from_value(body).map_err(|e| {
        fail(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("Invalid sector request").message(e.to_string()),
        )
    })?;
    Ok(Json(service.sector_report(&request)))
}
