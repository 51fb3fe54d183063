//! Alert log handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::clamp_paging;
use crate::api::error::AppError;
use crate::db::alerts::AlertFilter;
use crate::types::alert::{AckStatus, AlertLog, AlertSummary, FinalStatus};
use crate::AppState;

/// List query parameters.
#[derive(Debug, Deserialize)]
pub struct ListAlertsQuery {
    /// Filter on check id.
    #[serde(default)]
    pub config_id: Option<Uuid>,
    /// Filter on delivery status.
    #[serde(default)]
    pub final_status: Option<String>,
    /// Filter on acknowledgment state.
    #[serde(default)]
    pub ack_status: Option<String>,
    /// 1-based page.
    #[serde(default)]
    pub page: Option<usize>,
    /// Page size.
    #[serde(default)]
    pub per_page: Option<usize>,
}

/// List response body.
#[derive(Debug, Serialize)]
pub struct ListAlertsResponse {
    /// Page of alert summaries.
    pub alerts: Vec<AlertSummary>,
    /// Unpaginated total.
    pub total: usize,
    /// Echoed page.
    pub page: usize,
    /// Echoed page size.
    pub per_page: usize,
}

/// Acknowledge request body.
#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    /// Who acknowledges (email or username).
    pub acknowledged_by: String,
}

/// `GET /api/alerts`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListAlertsQuery>,
) -> Result<Json<ListAlertsResponse>, AppError> {
    let (page, per_page) = clamp_paging(query.page, query.per_page);

    let final_status = query
        .final_status
        .as_deref()
        .map(str::parse::<FinalStatus>)
        .transpose()?;
    let ack_status = query
        .ack_status
        .as_deref()
        .map(str::parse::<AckStatus>)
        .transpose()?;

    let filter = AlertFilter {
        config_id: query.config_id,
        final_status,
        ack_status,
    };
    let (logs, total) = state.alerts.list(&filter, page, per_page).await?;
    Ok(Json(ListAlertsResponse {
        alerts: logs.iter().map(AlertSummary::from).collect(),
        total,
        page,
        per_page,
    }))
}

/// `GET /api/alerts/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertLog>, AppError> {
    Ok(Json(state.alerts.get(id).await?))
}

/// `POST /api/alerts/{id}/acknowledge`
pub async fn acknowledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AcknowledgeRequest>,
) -> Result<Json<AlertLog>, AppError> {
    state
        .alerts
        .acknowledge(id, &request.acknowledged_by, Utc::now())
        .await?;
    Ok(Json(state.alerts.get(id).await?))
}
