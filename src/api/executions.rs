//! Execution trigger, job status and history handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::api::clamp_paging;
use crate::api::error::AppError;
use crate::common::error::VigilError;
use crate::db::executions::ExecutionFilter;
use crate::types::execution::{ExecutionHistory, ExecutionStatus, ExecutionSummary};
use crate::types::job::JobStatus;
use crate::AppState;

/// Trigger query parameters.
#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    /// `sync` (default) waits for the result; `async` returns a job id.
    #[serde(default)]
    pub mode: Option<String>,
}

/// `POST /api/checks/{id}/execute`
///
/// Ad-hoc executions go through the worker pool and skip the scheduler and
/// its lease, so they may overlap with scheduled runs.
pub async fn trigger(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<TriggerQuery>,
) -> Result<Response, AppError> {
    match query.mode.as_deref() {
        None | Some("sync") => {
            let history = state.pool.execute_sync(id).await?;
            Ok(Json(history).into_response())
        }
        Some("async") => {
            // Fail fast on unknown checks; the job itself revalidates.
            state.checks.get(id).await?;
            let job_id = state.jobs.submit(&state.pool, id).await?;
            Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))).into_response())
        }
        Some(other) => Err(VigilError::Validation(format!(
            "invalid mode '{other}' (expected 'sync' or 'async')"
        ))
        .into()),
    }
}

/// `GET /api/jobs/{id}`
pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatus>, AppError> {
    state
        .jobs
        .get(id)
        .map(Json)
        .ok_or_else(|| VigilError::NotFound(format!("job {id}")).into())
}

/// List query parameters. `from`/`to` are ISO-8601 instants.
#[derive(Debug, Deserialize)]
pub struct ListExecutionsQuery {
    /// Filter on check id.
    #[serde(default)]
    pub config_id: Option<Uuid>,
    /// Filter on terminal status.
    #[serde(default)]
    pub status: Option<String>,
    /// Lower bound on `executed_at`.
    #[serde(default)]
    pub from: Option<String>,
    /// Upper bound on `executed_at`.
    #[serde(default)]
    pub to: Option<String>,
    /// 1-based page.
    #[serde(default)]
    pub page: Option<usize>,
    /// Page size.
    #[serde(default)]
    pub per_page: Option<usize>,
}

/// List response body.
#[derive(Debug, Serialize)]
pub struct ListExecutionsResponse {
    /// Page of execution summaries.
    pub executions: Vec<ExecutionSummary>,
    /// Unpaginated total.
    pub total: usize,
    /// Echoed page.
    pub page: usize,
    /// Echoed page size.
    pub per_page: usize,
}

fn parse_instant(raw: &str, what: &str) -> Result<DateTime<Utc>, VigilError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VigilError::Validation(format!("invalid {what} timestamp '{raw}': {e}")))
}

/// `GET /api/executions`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<ListExecutionsResponse>, AppError> {
    let (page, per_page) = clamp_paging(query.page, query.per_page);

    let status = query
        .status
        .as_deref()
        .map(str::parse::<ExecutionStatus>)
        .transpose()?;
    let from = query
        .from
        .as_deref()
        .map(|raw| parse_instant(raw, "from"))
        .transpose()?;
    let to = query
        .to
        .as_deref()
        .map(|raw| parse_instant(raw, "to"))
        .transpose()?;

    let filter = ExecutionFilter {
        config_id: query.config_id,
        status,
        from,
        to,
    };
    let (histories, total) = state.executions.list(&filter, page, per_page).await?;
    Ok(Json(ListExecutionsResponse {
        executions: histories.iter().map(ExecutionSummary::from).collect(),
        total,
        page,
        per_page,
    }))
}

/// `GET /api/executions/{correlation_id}`
pub async fn get_by_correlation_id(
    State(state): State<AppState>,
    Path(correlation_id): Path<Uuid>,
) -> Result<Json<ExecutionHistory>, AppError> {
    Ok(Json(
        state
            .executions
            .get_by_correlation_id(correlation_id)
            .await?,
    ))
}
