//! REST API surface.

/// Alert log endpoints.
pub mod alerts;

/// Check CRUD endpoints.
pub mod checks;

/// Error response mapping.
pub mod error;

/// Execution and job endpoints.
pub mod executions;

/// Health endpoint.
pub mod system;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

/// Default page size for listings.
pub(crate) const DEFAULT_PAGE_SIZE: usize = 20;

/// Hard cap on page size.
pub(crate) const MAX_PAGE_SIZE: usize = 100;

/// Clamp pagination inputs to sane values.
pub(crate) fn clamp_paging(page: Option<usize>, per_page: Option<usize>) -> (usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    (page, per_page)
}

/// Build the application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(system::healthz))
        .route("/api/checks", post(checks::create).get(checks::list))
        .route(
            "/api/checks/{id}",
            get(checks::get).put(checks::update).delete(checks::delete),
        )
        .route("/api/checks/{id}/execute", post(executions::trigger))
        .route("/api/jobs/{id}", get(executions::job_status))
        .route("/api/executions", get(executions::list))
        .route(
            "/api/executions/{correlation_id}",
            get(executions::get_by_correlation_id),
        )
        .route("/api/alerts", get(alerts::list))
        .route("/api/alerts/{id}", get(alerts::get))
        .route("/api/alerts/{id}/acknowledge", post(alerts::acknowledge))
        .with_state(state)
}
