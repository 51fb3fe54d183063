//! Cooperative shutdown signal.
//!
//! `main.rs` combines this with OS signals; long-running services select on
//! [`ShutdownController::wait`] to exit their loops, and the webhook
//! dispatcher uses it to abort retry backoff sleeps.

use tokio_util::sync::CancellationToken;

/// Clonable shutdown handle shared by every long-running component.
#[derive(Clone, Debug, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    /// Create a fresh controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request shutdown and wake every waiter.
    pub fn request_shutdown(&self) {
        self.token.cancel();
    }

    /// Resolve when shutdown is requested; immediately if it already was.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn initial_state_is_running() {
        let ctrl = ShutdownController::new();
        assert!(!ctrl.is_shutdown());
    }

    #[test]
    fn request_is_sticky_and_idempotent() {
        let ctrl = ShutdownController::new();
        ctrl.request_shutdown();
        ctrl.request_shutdown();
        assert!(ctrl.is_shutdown());
    }

    #[test]
    fn clones_share_state() {
        let ctrl = ShutdownController::new();
        let observer = ctrl.clone();
        observer.request_shutdown();
        assert!(ctrl.is_shutdown());
    }

    #[tokio::test]
    async fn wait_resolves_on_request() {
        let ctrl = ShutdownController::new();
        let waiter = ctrl.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        ctrl.request_shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("wait should resolve")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_requested() {
        let ctrl = ShutdownController::new();
        ctrl.request_shutdown();
        tokio::time::timeout(Duration::from_millis(100), ctrl.wait())
            .await
            .expect("wait should not block");
    }
}
