//! vigil server entry point.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::sqlite::SqliteConnectOptions;
use tracing::{error, info};

use vigil::config::{self, HttpConfig, SchedulerConfig, WorkerPoolConfig};
use vigil::db::alerts::AlertStore;
use vigil::db::checks::CheckStore;
use vigil::db::executions::ExecutionStore;
use vigil::executor::jobs::JobRegistry;
use vigil::executor::pool::WorkerPool;
use vigil::executor::Executor;
use vigil::scheduler::{replica_identity, Scheduler};
use vigil::shutdown::ShutdownController;
use vigil::webhook::{CircuitBreaker, WebhookDispatcher};
use vigil::{api, logging, AppState};

/// API health-check monitoring and webhook alerting service.
#[derive(Parser)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// Bind host.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Bind port.
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

async fn init_db_pool(database_url: &str) -> sqlx::Result<sqlx::SqlitePool> {
    // SQLite cannot create a file in a missing directory.
    if let Some(path) = database_url.strip_prefix("sqlite:") {
        if !path.starts_with(':') {
            let normalized = path.trim_start_matches("//");
            let file = normalized.split('?').next().unwrap_or(normalized);
            if let Some(parent) = std::path::Path::new(file).parent() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    sqlx::SqlitePool::connect_with(options).await
}

fn database_url() -> String {
    config::get_env("VIGIL_DATABASE_URL").unwrap_or_else(|| {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        format!("sqlite:{home}/.vigil/vigil.db")
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init().expect("failed to initialize logging");

    info!("vigil v{}", env!("CARGO_PKG_VERSION"));

    let db_pool = init_db_pool(&database_url())
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let checks = Arc::new(CheckStore::new(db_pool.clone()));
    let executions = Arc::new(ExecutionStore::new(db_pool.clone()));
    let alerts = Arc::new(AlertStore::new(db_pool.clone()));
    let leases = vigil::db::leases::LeaseStore::new(db_pool.clone());

    let http_client = reqwest::Client::builder()
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client");

    let shutdown = ShutdownController::new();
    let http_config = HttpConfig::from_env();

    let dispatcher = WebhookDispatcher::new(
        http_client.clone(),
        Arc::new(CircuitBreaker::default()),
        http_config.webhook_timeout,
        shutdown.clone(),
    );
    let executor = Arc::new(Executor::new(
        http_client,
        dispatcher,
        checks.clone(),
        executions.clone(),
        alerts.clone(),
    ));

    let jobs = JobRegistry::new();
    let pool_config = WorkerPoolConfig::from_env();
    let worker_pool = WorkerPool::new(
        pool_config.workers,
        pool_config.queue_size,
        executor.clone(),
        jobs.clone(),
        shutdown.clone(),
    );

    let scheduler_config = SchedulerConfig::from_env();
    let scheduler = Arc::new(Scheduler::new(
        scheduler_config.clone(),
        executor,
        leases,
        checks.clone(),
        replica_identity(),
        shutdown.clone(),
    ));
    let scheduler_handle = if scheduler_config.enabled {
        Some(scheduler.start())
    } else {
        info!("Scheduler is disabled by configuration");
        None
    };

    let state = AppState {
        db_pool,
        checks,
        executions,
        alerts,
        pool: worker_pool.handle(),
        jobs,
        shutdown: shutdown.clone(),
    };
    let app = api::create_app(state);

    let bind_addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");
    info!("vigil server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("Server error");

    // The serve future resolves once the signal fires; wind the background
    // services down in order, releasing leases last.
    shutdown.request_shutdown();

    let grace = config::shutdown_grace_period();
    worker_pool.stop().await;
    scheduler.stop(grace).await;
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler loop panicked");
        }
    }

    info!("Server shutdown complete");
}

/// Resolve on SIGINT, SIGTERM, or an internal shutdown request.
async fn shutdown_signal(shutdown: ShutdownController) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
        _ = shutdown.wait() => info!("Shutdown requested, shutting down..."),
    }
}
