//! Liveness endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::api::error::AppError;
use crate::common::error::VigilError;
use crate::AppState;

/// `GET /healthz`: liveness plus a store ping.
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    sqlx::query("SELECT 1")
        .execute(&state.db_pool)
        .await
        .map_err(|e| VigilError::Database(format!("store ping failed: {e}")))?;

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
