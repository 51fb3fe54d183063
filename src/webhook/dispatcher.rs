//! Webhook delivery with retries, attempt logging and circuit breaking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::shutdown::ShutdownController;
use crate::types::alert::{AlertAttempt, AlertLog, FinalStatus};
use crate::types::check::WebhookSpec;
use crate::webhook::circuit_breaker::CircuitBreaker;
use crate::webhook::payload::AlertPayload;
use crate::webhook::retry::RetryStrategy;

/// Response bodies from webhook sinks are kept to 1 KiB per attempt.
const WEBHOOK_RESPONSE_LIMIT: usize = 1024;

/// Delivers alert payloads to webhook sinks.
///
/// All attempts of one delivery share a single [`AlertLog`], whose id is
/// assigned before the first attempt; the caller persists the returned log
/// whatever the outcome.
pub struct WebhookDispatcher {
    client: Client,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    shutdown: ShutdownController,
}

impl WebhookDispatcher {
    /// Create a dispatcher with a per-attempt timeout.
    pub fn new(
        client: Client,
        breaker: Arc<CircuitBreaker>,
        timeout: Duration,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            client,
            breaker,
            timeout,
            shutdown,
        }
    }

    /// Current circuit breaker state name, for diagnostics.
    pub fn circuit_state(&self) -> &'static str {
        self.breaker.state().as_str()
    }

    /// Deliver `payload` to `webhook`, retrying per the webhook's policy.
    ///
    /// The returned log carries the outcome: `delivered` on a 2xx response,
    /// otherwise `failed` with per-attempt errors. A refusal by the circuit
    /// breaker yields a zero-attempt `failed` log.
    pub async fn send_alert(
        &self,
        webhook: &WebhookSpec,
        mut payload: AlertPayload,
        correlation_id: Uuid,
    ) -> AlertLog {
        payload.metadata["timestamp"] = json!(Utc::now().to_rfc3339());

        let mut log = AlertLog::new(correlation_id, webhook.url.clone(), payload.text.clone());

        if !self.breaker.can_attempt() {
            warn!(
                correlation_id = %correlation_id,
                webhook_url = %webhook.url,
                circuit_state = self.circuit_state(),
                "Circuit breaker is open, skipping webhook delivery"
            );
            log.final_status = FinalStatus::Failed;
            log.completed_at = Some(Utc::now());
            return log;
        }

        let strategy = RetryStrategy::new(webhook.retry);

        for attempt_number in 1..=strategy.max_attempts() {
            info!(
                correlation_id = %correlation_id,
                webhook_url = %webhook.url,
                attempt = attempt_number,
                max_attempts = strategy.max_attempts(),
                "Attempting webhook delivery"
            );

            let attempt = self
                .deliver_once(webhook, &payload, attempt_number)
                .await;
            let status_code = attempt.status_code;
            let attempt_error = attempt.error.clone();
            log.attempts.push(attempt);

            if matches!(status_code, Some(code) if (200..300).contains(&code)) {
                info!(
                    correlation_id = %correlation_id,
                    webhook_url = %webhook.url,
                    attempt = attempt_number,
                    status_code = status_code.unwrap_or_default(),
                    "Webhook delivered"
                );
                log.final_status = FinalStatus::Delivered;
                log.completed_at = Some(Utc::now());
                self.breaker.record_success();
                return log;
            }

            if !strategy.should_retry(attempt_number, status_code) {
                error!(
                    correlation_id = %correlation_id,
                    webhook_url = %webhook.url,
                    attempt = attempt_number,
                    status_code = status_code.unwrap_or_default(),
                    error = attempt_error.as_deref().unwrap_or_default(),
                    "Webhook delivery failed, not retrying"
                );
                log.final_status = FinalStatus::Failed;
                log.completed_at = Some(Utc::now());
                self.breaker.record_failure();
                return log;
            }

            if attempt_number < strategy.max_attempts() {
                let delay = strategy.delay(attempt_number);
                warn!(
                    correlation_id = %correlation_id,
                    webhook_url = %webhook.url,
                    attempt = attempt_number,
                    next_retry_ms = delay.as_millis() as u64,
                    error = attempt_error.as_deref().unwrap_or_default(),
                    "Webhook delivery failed, retrying"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.shutdown.wait() => {
                        log.final_status = FinalStatus::Failed;
                        log.completed_at = Some(Utc::now());
                        return log;
                    }
                }
            }
        }

        error!(
            correlation_id = %correlation_id,
            webhook_url = %webhook.url,
            attempts = strategy.max_attempts(),
            "Webhook delivery failed after all retries"
        );
        log.final_status = FinalStatus::Failed;
        log.completed_at = Some(Utc::now());
        self.breaker.record_failure();
        log
    }

    /// One HTTP transaction with the sink.
    async fn deliver_once(
        &self,
        webhook: &WebhookSpec,
        payload: &AlertPayload,
        attempt_number: u32,
    ) -> AlertAttempt {
        let started = Instant::now();
        let mut attempt = AlertAttempt {
            attempt_number,
            timestamp: Utc::now(),
            status_code: None,
            response_body: None,
            error: None,
            duration_ms: 0,
        };

        let method = match webhook.method.parse::<reqwest::Method>() {
            Ok(m) => m,
            Err(e) => {
                attempt.error = Some(format!("invalid webhook method: {e}"));
                attempt.duration_ms = started.elapsed().as_millis() as i64;
                return attempt;
            }
        };

        let mut request = self
            .client
            .request(method, &webhook.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&json!({ "text": payload.text }));
        for (key, value) in &webhook.headers {
            request = request.header(key, value);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                attempt.error = Some(format!("Request failed: {e}"));
                attempt.duration_ms = started.elapsed().as_millis() as i64;
                return attempt;
            }
        };

        let status = response.status().as_u16();
        attempt.status_code = Some(status);

        match response.bytes().await {
            Ok(body) => {
                let excerpt = &body[..body.len().min(WEBHOOK_RESPONSE_LIMIT)];
                attempt.response_body = Some(String::from_utf8_lossy(excerpt).into_owned());
            }
            Err(e) => {
                warn!(error = %e, "Failed to read webhook response body");
            }
        }

        attempt.duration_ms = started.elapsed().as_millis() as i64;

        if !(200..300).contains(&status) {
            attempt.error = Some(format!("Webhook returned status {status}"));
        }

        attempt
    }
}
