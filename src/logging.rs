//! Logging initialization.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Filtering comes from `VIGIL_LOG`, then `RUST_LOG`, then `info`.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = std::env::var("VIGIL_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .try_init()?;
    Ok(())
}
