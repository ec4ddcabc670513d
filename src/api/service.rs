//! Shared logic behind the REST handlers
//!
//! Fetches sheets through the retry layer and runs the page reports. Holds no
//! mutable state: the configuration and a pooled client only.

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::fetch::{FetchError, RetryPolicy, SheetClient, UpstreamResponse};
use crate::models::Source;
use crate::reports::{attendance, performance, recruitment, sector, sortie, turnover, workforce};
use crate::table::{RecordTable, TableError};

/// Uploads are forwarded once and may be slow to be acknowledged.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no URL configured for the {0} sheet")]
    NotConfigured(Source),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl ServiceError {
    /// Status the report endpoints answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Fetch(FetchError::Status { status, .. }) => *status,
            ServiceError::Fetch(FetchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Fetch(FetchError::Network(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Table(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub workforce: Option<workforce::WorkforceSummary>,
    pub attendance: Option<attendance::AttendanceSummary>,
}

// ============================================================================
// Dashboard Service
// ============================================================================

pub struct DashboardService {
    config: Config,
    client: SheetClient,
}

impl DashboardService {
    pub fn new(config: Config) -> Self {
        Self::with_client(config, SheetClient::new())
    }

    pub fn with_client(config: Config, client: SheetClient) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self, source: Source) -> RetryPolicy {
        self.config.source(source).policy
    }

    /// Raw JSON rows of a sheet, as the script returned them.
    pub async fn fetch_rows(&self, source: Source) -> Result<Value, ServiceError> {
        let config = self.config.source(source);
        let url = config.url.ok_or(ServiceError::NotConfigured(source))?;
        info!(%source, "Fetching sheet");

        let rows = match source {
            Source::Auth => self.client.get_json_strict(&url, source.name(), &config.policy).await?,
            _ => self.client.get_json(&url, source.name(), &config.policy).await?,
        };
        if let Some(rows) = rows.as_array() {
            info!(%source, rows = rows.len(), "Sheet fetched");
        }
        Ok(rows)
    }

    pub async fn fetch_table(&self, source: Source) -> Result<RecordTable, ServiceError> {
        let rows = self.fetch_rows(source).await?;
        Ok(RecordTable::from_value(rows)?)
    }

    /// Forward an upload payload to an arbitrary script URL.
    pub async fn upload(&self, url: &str, payload: &Value) -> Result<UpstreamResponse, ServiceError> {
        let body = payload.to_string();
        info!(url, bytes = body.len(), "Forwarding upload");
        Ok(self.client.post_text(url, body, &RetryPolicy::once(UPLOAD_TIMEOUT)).await?)
    }

    // ========================================================================
    // Reports
    // ========================================================================

    pub async fn attendance_report(&self, filters: &attendance::Filters) -> Result<attendance::AttendanceReport, ServiceError> {
        let table = self.fetch_table(Source::Attendance).await?;
        Ok(attendance::build(&table, filters))
    }

    pub async fn performance_report(&self, filters: &performance::Filters) -> Result<performance::PerformanceReport, ServiceError> {
        let table = self.fetch_table(Source::Performance).await?;
        Ok(performance::build(&table, filters))
    }

    pub async fn recruitment_report(&self, filters: &recruitment::Filters) -> Result<recruitment::RecruitmentReport, ServiceError> {
        let table = self.fetch_table(Source::Recruitment).await?;
        Ok(recruitment::build(&table, filters))
    }

    pub async fn sortie_report(&self, filters: &sortie::Filters) -> Result<sortie::SortieReport, ServiceError> {
        let table = self.fetch_table(Source::Sortie).await?;
        Ok(sortie::build(&table, filters))
    }

    pub async fn turnover_report(&self, filters: &turnover::Filters) -> Result<turnover::TurnoverReport, ServiceError> {
        let table = self.fetch_table(Source::Turnover).await?;
        Ok(turnover::build(&table, filters))
    }

    /// With `fallback` set, a failed fetch is answered from the sample sheet.
    pub async fn workforce_report(&self, filters: &workforce::Filters) -> Result<workforce::WorkforceReport, ServiceError> {
        let table = match self.fetch_table(Source::Workforce).await {
            Ok(table) => table,
            Err(e) if filters.fallback => {
                warn!(error = %e, "Workforce sheet unavailable, using sample data");
                RecordTable::from_value(workforce::fallback_table())?
            }
            Err(e) => return Err(e),
        };
        Ok(workforce::build(&table))
    }

    pub fn sector_report(&self, request: &sector::SectorRequest) -> sector::SectorReport {
        let as_of = request.as_of.unwrap_or_else(today);
        sector::build(request, as_of)
    }

    /// Headline figures of the home page. A sheet that cannot be fetched
    /// leaves its half empty.
    pub async fn dashboard(&self) -> DashboardSummary {
        let (workforce, attendance) = tokio::join!(
            self.fetch_table(Source::Workforce),
            self.fetch_table(Source::Attendance)
        );
        DashboardSummary {
            workforce: log_failure(Source::Workforce, workforce).map(|t| workforce::summary(&t)),
            attendance: log_failure(Source::Attendance, attendance).map(|t| attendance::summary(&t)),
        }
    }
}

fn log_failure<T>(source: Source, result: Result<T, ServiceError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(%source, error = %e, "Summary source unavailable");
            None
        }
    }
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}
