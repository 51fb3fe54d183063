//! End-to-end check execution.
//!
//! Loads the config, calls the target API, evaluates rules over the response
//! body, dispatches webhook alerts for matching rules, and persists the
//! execution history. Transport and evaluation failures are captured on the
//! persisted record instead of propagating to the caller.

/// In-memory registry for fire-and-forget jobs.
pub mod jobs;

/// Bounded worker pool.
pub mod pool;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::common::error::{VigilError, VigilResult};
use crate::db::alerts::AlertStore;
use crate::db::checks::CheckStore;
use crate::db::executions::ExecutionStore;
use crate::evaluator::RuleEvaluator;
use crate::types::check::{AuthSpec, CheckConfig, Target};
use crate::types::execution::{
    AlertTriggered, ExecutionHistory, ExecutionRequest, ExecutionResponse, ExecutionStatus,
    RuleEvaluation,
};
use crate::webhook::{format_alert_payload, WebhookDispatcher};

/// Target response bodies are truncated at 1 MiB.
const TARGET_RESPONSE_LIMIT: usize = 1024 * 1024;

/// Executes health checks end to end.
pub struct Executor {
    client: Client,
    evaluator: RuleEvaluator,
    dispatcher: WebhookDispatcher,
    checks: Arc<CheckStore>,
    executions: Arc<ExecutionStore>,
    alerts: Arc<AlertStore>,
}

impl Executor {
    /// Assemble an executor from its collaborators.
    pub fn new(
        client: Client,
        dispatcher: WebhookDispatcher,
        checks: Arc<CheckStore>,
        executions: Arc<ExecutionStore>,
        alerts: Arc<AlertStore>,
    ) -> Self {
        Self {
            client,
            evaluator: RuleEvaluator::new(),
            dispatcher,
            checks,
            executions,
            alerts,
        }
    }

    /// Execute the check identified by `config_id` under `correlation_id`.
    ///
    /// Missing and disabled checks error out; everything past config
    /// resolution lands in the returned (and persisted) history instead.
    pub async fn execute(
        &self,
        config_id: Uuid,
        correlation_id: Uuid,
    ) -> VigilResult<ExecutionHistory> {
        info!(
            correlation_id = %correlation_id,
            config_id = %config_id,
            "Starting check execution"
        );

        let started = Instant::now();
        let executed_at = Utc::now();

        let config = self.checks.get(config_id).await?;
        if !config.enabled {
            return Err(VigilError::Disabled(config_id));
        }

        let api_started = Instant::now();
        let (request, response) = self.call_target(&config.target).await;
        let api_duration_ms = api_started.elapsed().as_millis() as i64;
        let transport_failed = response.error.is_some();

        let mut rules_evaluation: Vec<RuleEvaluation> = Vec::new();
        let mut alerts_triggered: Vec<AlertTriggered> = Vec::new();

        let status_2xx = matches!(response.status_code, Some(code) if (200..300).contains(&code));
        if !transport_failed && status_2xx {
            rules_evaluation = self.evaluator.evaluate_rules(&config.rules, &response.body);
            let matched = self
                .evaluator
                .matched_alert_rules(&rules_evaluation, &config.rules);

            // Alerts go out serially, in rule declaration order.
            for verdict in &matched {
                let alert_id = self
                    .trigger_alert(
                        &config,
                        verdict,
                        response.status_code,
                        correlation_id,
                        api_duration_ms,
                    )
                    .await;
                alerts_triggered.push(AlertTriggered {
                    alert_id,
                    triggered_by_rule: verdict.rule_name.clone(),
                    webhook_url: config.webhook.url.clone(),
                });
            }
        }

        let status = if transport_failed {
            ExecutionStatus::Failed
        } else if rules_evaluation.iter().any(|v| v.error.is_some()) {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Success
        };

        let history = ExecutionHistory {
            id: Uuid::new_v4(),
            correlation_id,
            config_id: config.id,
            config_name: config.name.clone(),
            executed_at,
            duration_ms: started.elapsed().as_millis() as i64,
            request,
            response,
            rules_evaluation,
            alerts_triggered,
            status,
        };

        if let Err(e) = self.executions.create(&history).await {
            error!(
                correlation_id = %correlation_id,
                error = %e,
                "Failed to save execution history"
            );
        }

        info!(
            correlation_id = %correlation_id,
            config_name = %config.name,
            status = %history.status,
            duration_ms = history.duration_ms,
            alerts_triggered = history.alerts_triggered.len(),
            "Check execution completed"
        );

        Ok(history)
    }

    /// Call the target API, capturing request and response. Transport
    /// failures land in `response.error`; the body is truncated at 1 MiB and
    /// headers keep the first value per key.
    async fn call_target(&self, target: &Target) -> (ExecutionRequest, ExecutionResponse) {
        let request_record = ExecutionRequest {
            url: target.url.clone(),
            method: target.method.clone(),
            headers: target.headers.clone(),
            body: target.body.clone(),
        };
        let mut response_record = ExecutionResponse::default();

        debug!(
            url = %target.url,
            method = %target.method,
            timeout_secs = target.timeout_secs,
            "Calling target API"
        );

        let method = match target.method.parse::<reqwest::Method>() {
            Ok(m) => m,
            Err(e) => {
                response_record.error = Some(format!("invalid method: {e}"));
                return (request_record, response_record);
            }
        };

        let mut request = self
            .client
            .request(method, &target.url)
            .timeout(Duration::from_secs(target.timeout_secs));
        for (key, value) in &target.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &target.body {
            request = request.body(body.clone());
        }
        request = match &target.auth {
            AuthSpec::None => request,
            AuthSpec::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthSpec::Bearer { token } => request.bearer_auth(token),
        };

        let mut response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                response_record.error = Some(format!("Request failed: {e}"));
                return (request_record, response_record);
            }
        };

        response_record.status_code = Some(response.status().as_u16());
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_record
                    .headers
                    .entry(key.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }

        let mut body: Vec<u8> = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let remaining = TARGET_RESPONSE_LIMIT - body.len();
                    body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
                    if body.len() >= TARGET_RESPONSE_LIMIT {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    response_record.error = Some(format!("Failed to read response: {e}"));
                    return (request_record, response_record);
                }
            }
        }
        response_record.body = String::from_utf8_lossy(&body).into_owned();

        debug!(
            url = %target.url,
            status_code = response_record.status_code.unwrap_or_default(),
            body_length = response_record.body.len(),
            "Target API call completed"
        );

        (request_record, response_record)
    }

    /// Dispatch one alert and persist its log. Returns the log id, which is
    /// valid even when delivery failed.
    async fn trigger_alert(
        &self,
        config: &CheckConfig,
        verdict: &RuleEvaluation,
        status_code: Option<u16>,
        correlation_id: Uuid,
        response_time_ms: i64,
    ) -> Uuid {
        info!(
            correlation_id = %correlation_id,
            rule_name = %verdict.rule_name,
            webhook_url = %config.webhook.url,
            "Triggering alert"
        );

        let payload = format_alert_payload(
            &config.name,
            verdict,
            &config.target.url,
            status_code,
            correlation_id,
            response_time_ms,
        );

        let mut alert_log = self
            .dispatcher
            .send_alert(&config.webhook, payload, correlation_id)
            .await;
        alert_log.config_id = Some(config.id);

        if let Err(e) = self.alerts.create(&alert_log).await {
            error!(
                correlation_id = %correlation_id,
                alert_id = %alert_log.id,
                error = %e,
                "Failed to save alert log"
            );
        }

        alert_log.id
    }
}
