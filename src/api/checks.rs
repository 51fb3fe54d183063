//! Check CRUD handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::clamp_paging;
use crate::api::error::AppError;
use crate::db::checks::CheckFilter;
use crate::types::check::{CheckConfig, CheckSummary, Rule, Target, WebhookSpec};
use crate::AppState;

/// Create / replace request body.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Unique name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the check may execute; defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Target endpoint.
    pub target: Target,
    /// Evaluation rules.
    pub rules: Vec<Rule>,
    /// Alert webhook.
    pub webhook: WebhookSpec,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Five-field cron expression.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Whether the scheduler picks this check up.
    #[serde(default)]
    pub schedule_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// List query parameters.
#[derive(Debug, Deserialize)]
pub struct ListChecksQuery {
    /// Filter on the enabled flag.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Filter on a tag.
    #[serde(default)]
    pub tag: Option<String>,
    /// 1-based page.
    #[serde(default)]
    pub page: Option<usize>,
    /// Page size.
    #[serde(default)]
    pub per_page: Option<usize>,
}

/// List response body.
#[derive(Debug, Serialize)]
pub struct ListChecksResponse {
    /// Page of check summaries.
    pub checks: Vec<CheckSummary>,
    /// Unpaginated total.
    pub total: usize,
    /// Echoed page.
    pub page: usize,
    /// Echoed page size.
    pub per_page: usize,
}

/// `POST /api/checks`
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut config = CheckConfig {
        id: Uuid::new_v4(),
        name: request.name,
        description: request.description,
        enabled: request.enabled,
        target: request.target,
        rules: request.rules,
        webhook: request.webhook,
        tags: request.tags,
        schedule: request.schedule,
        schedule_enabled: request.schedule_enabled,
        last_scheduled_run: None,
        next_scheduled_run: None,
        created_at: now,
        updated_at: now,
    };
    config.validate()?;
    state.checks.create(&config).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

/// `GET /api/checks`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListChecksQuery>,
) -> Result<Json<ListChecksResponse>, AppError> {
    let (page, per_page) = clamp_paging(query.page, query.per_page);
    let filter = CheckFilter {
        enabled: query.enabled,
        tag: query.tag,
    };
    let (configs, total) = state.checks.list(&filter, page, per_page).await?;
    Ok(Json(ListChecksResponse {
        checks: configs.iter().map(CheckSummary::from).collect(),
        total,
        page,
        per_page,
    }))
}

/// `GET /api/checks/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckConfig>, AppError> {
    Ok(Json(state.checks.get(id).await?))
}

/// `PUT /api/checks/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckConfig>, AppError> {
    let existing = state.checks.get(id).await?;

    let mut config = CheckConfig {
        id,
        name: request.name,
        description: request.description,
        enabled: request.enabled,
        target: request.target,
        rules: request.rules,
        webhook: request.webhook,
        tags: request.tags,
        schedule: request.schedule.clone(),
        schedule_enabled: request.schedule_enabled,
        // Schedule bookkeeping is the scheduler's; carry it over unless the
        // expression changed, in which case the next run is recomputed.
        last_scheduled_run: existing.last_scheduled_run,
        next_scheduled_run: if request.schedule == existing.schedule {
            existing.next_scheduled_run
        } else {
            None
        },
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    config.validate()?;
    state.checks.update(&config).await?;
    Ok(Json(config))
}

/// `DELETE /api/checks/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.checks.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
