//! Configuration via environment variables.

use std::time::Duration;

/// Read an environment variable.
pub fn get_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Read an environment variable with a default.
pub fn get_env_or(name: &str, default: &str) -> String {
    get_env(name).unwrap_or_else(|| default.to_string())
}

/// Read and parse an environment variable, falling back to `default` when
/// unset or unparsable (with a warning for the latter).
pub fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match get_env(name) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    "Invalid value '{}' for {}, using the default",
                    raw,
                    name
                );
                default
            }
        },
        None => default,
    }
}

/// Read a boolean environment variable (`1/true/yes/on`).
pub fn get_env_bool(name: &str, default: bool) -> bool {
    match get_env(name) {
        Some(raw) => matches!(
            raw.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Whether the scheduler runs at all.
    pub enabled: bool,
    /// Wake-up period for due detection.
    pub tick_interval: Duration,
    /// Lease TTL; must exceed expected execution duration.
    pub lock_ttl: Duration,
    /// Concurrent scheduled executions per replica.
    pub concurrency: usize,
}

impl SchedulerConfig {
    /// Load from `VIGIL_SCHEDULER_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            enabled: get_env_bool("VIGIL_SCHEDULER_ENABLED", true),
            tick_interval: Duration::from_secs(get_env_parse(
                "VIGIL_SCHEDULER_TICK_INTERVAL_SECS",
                60,
            )),
            lock_ttl: Duration::from_secs(get_env_parse("VIGIL_SCHEDULER_LOCK_TTL_SECS", 300)),
            concurrency: get_env_parse("VIGIL_SCHEDULER_CONCURRENCY", 10),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval: Duration::from_secs(60),
            lock_ttl: Duration::from_secs(300),
            concurrency: 10,
        }
    }
}

/// Worker pool tuning.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Bounded job queue capacity.
    pub queue_size: usize,
}

impl WorkerPoolConfig {
    /// Load from `VIGIL_WORKER_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            workers: get_env_parse("VIGIL_WORKER_POOL_SIZE", 10),
            queue_size: get_env_parse("VIGIL_JOB_QUEUE_SIZE", 1000),
        }
    }
}

/// Outbound HTTP tuning.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Dispatcher-wide webhook attempt timeout.
    pub webhook_timeout: Duration,
}

impl HttpConfig {
    /// Load from `VIGIL_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            webhook_timeout: Duration::from_secs(get_env_parse(
                "VIGIL_WEBHOOK_TIMEOUT_SECS",
                10,
            )),
        }
    }
}

/// Graceful-shutdown wait for in-flight work.
pub fn shutdown_grace_period() -> Duration {
    Duration::from_secs(get_env_parse("VIGIL_SHUTDOWN_GRACE_SECS", 30))
}
