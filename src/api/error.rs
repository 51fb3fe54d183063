//! API error responses.
//!
//! Maps [`VigilError`] onto HTTP status codes with safe external messages;
//! full detail stays in server logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::common::error::VigilError;

/// Axum-compatible wrapper around the crate error.
#[derive(Debug)]
pub struct AppError(pub VigilError);

impl From<VigilError> for AppError {
    fn from(err: VigilError) -> Self {
        AppError(err)
    }
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            VigilError::Validation(_) => StatusCode::BAD_REQUEST,
            VigilError::NotFound(_) => StatusCode::NOT_FOUND,
            VigilError::Disabled(_) => StatusCode::CONFLICT,
            VigilError::Database(_)
            | VigilError::Serialization(_)
            | VigilError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VigilError::Http(_) => StatusCode::BAD_GATEWAY,
            VigilError::CircuitOpen | VigilError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.external_message() }))).into_response()
    }
}
