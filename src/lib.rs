//! vigil: API health-check monitoring and webhook alerting service.
//!
//! Checks are stored in SQLite and executed either on a cron schedule
//! (coordinated across replicas with TTL leases) or ad hoc through the API.
//! Responses are evaluated with JSONPath rules; matches fire webhook alerts
//! delivered with retries behind a circuit breaker.

#![warn(missing_docs)]

/// REST API handlers.
pub mod api;

/// Shared definitions (errors).
pub mod common;

/// Environment-variable configuration.
pub mod config;

/// SQLite persistence.
pub mod db;

/// Rule evaluation over JSON responses.
pub mod evaluator;

/// Check execution engine, worker pool and job registry.
pub mod executor;

/// Logging initialization.
pub mod logging;

/// Five-field cron helpers.
pub mod schedule;

/// Cron scheduler with distributed leasing.
pub mod scheduler;

/// Cooperative shutdown signal.
pub mod shutdown;

/// Domain model.
pub mod types;

/// Webhook alert delivery.
pub mod webhook;

use std::sync::Arc;

/// Shared application state handed to API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db_pool: sqlx::SqlitePool,
    /// Check configuration storage.
    pub checks: Arc<db::checks::CheckStore>,
    /// Execution history storage.
    pub executions: Arc<db::executions::ExecutionStore>,
    /// Alert log storage.
    pub alerts: Arc<db::alerts::AlertStore>,
    /// Worker pool submission handle.
    pub pool: executor::pool::PoolHandle,
    /// Async job registry.
    pub jobs: executor::jobs::JobRegistry,
    /// Cooperative shutdown controller.
    pub shutdown: shutdown::ShutdownController,
}
