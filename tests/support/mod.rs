//! Shared fixtures for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use vigil::api;
use vigil::db::alerts::AlertStore;
use vigil::db::checks::CheckStore;
use vigil::db::executions::ExecutionStore;
use vigil::executor::jobs::JobRegistry;
use vigil::executor::pool::WorkerPool;
use vigil::executor::Executor;
use vigil::shutdown::ShutdownController;
use vigil::webhook::{CircuitBreaker, WebhookDispatcher};
use vigil::AppState;

/// In-memory SQLite pool with migrations applied. Pinned to one connection:
/// each in-memory connection is a separate database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// A fully wired application over an in-memory store.
#[allow(dead_code)]
pub struct TestApp {
    /// Base URL of the running server, e.g. `http://127.0.0.1:PORT`.
    pub base_url: String,
    /// The shared state backing the server.
    pub state: AppState,
    shutdown: ShutdownController,
    worker_pool: Option<WorkerPool>,
    server_stop: Option<oneshot::Sender<()>>,
    server_handle: JoinHandle<()>,
}

impl TestApp {
    /// Build the full service wiring and serve it on an ephemeral port.
    pub async fn spawn() -> Self {
        let pool = test_pool().await;
        let checks = Arc::new(CheckStore::new(pool.clone()));
        let executions = Arc::new(ExecutionStore::new(pool.clone()));
        let alerts = Arc::new(AlertStore::new(pool.clone()));

        let client = reqwest::Client::new();
        let shutdown = ShutdownController::new();
        let dispatcher = WebhookDispatcher::new(
            client.clone(),
            Arc::new(CircuitBreaker::default()),
            Duration::from_secs(5),
            shutdown.clone(),
        );
        let executor = Arc::new(Executor::new(
            client,
            dispatcher,
            checks.clone(),
            executions.clone(),
            alerts.clone(),
        ));
        let jobs = JobRegistry::new();
        let worker_pool = WorkerPool::new(2, 16, executor, jobs.clone(), shutdown.clone());

        let state = AppState {
            db_pool: pool,
            checks,
            executions,
            alerts,
            pool: worker_pool.handle(),
            jobs,
            shutdown: shutdown.clone(),
        };

        let app = api::create_app(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
                .expect("test server error");
        });

        TestApp {
            base_url: format!("http://{addr}"),
            state,
            shutdown,
            worker_pool: Some(worker_pool),
            server_stop: Some(stop_tx),
            server_handle,
        }
    }

    /// Stop the server and the worker pool.
    pub async fn stop(mut self) {
        self.shutdown.request_shutdown();
        if let Some(pool) = self.worker_pool.take() {
            pool.stop().await;
        }
        if let Some(stop) = self.server_stop.take() {
            let _ = stop.send(());
        }
        let _ = self.server_handle.await;
    }
}
