//! Execution history: captured request/response, rule verdicts, alerts.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::VigilError;
use crate::types::check::RuleOperator;

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Target call and every rule evaluation succeeded.
    Success,
    /// Target call failed at the transport level.
    Failed,
    /// At least one rule verdict carried an error.
    Partial,
}

impl ExecutionStatus {
    /// Stable wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            "partial" => Ok(ExecutionStatus::Partial),
            other => Err(VigilError::Validation(format!(
                "invalid execution status: {other}"
            ))),
        }
    }
}

/// The HTTP request as sent to the target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Request URL.
    pub url: String,
    /// Request method.
    pub method: String,
    /// Headers as sent (auth headers excluded).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request body, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// The HTTP response captured from the target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResponse {
    /// Response status code; absent on transport failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// First value per header key.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Response body, truncated at 1 MiB.
    #[serde(default)]
    pub body: String,
    /// Transport error, if the call never produced a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The verdict of applying one rule to one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvaluation {
    /// Rule name.
    pub rule_name: String,
    /// Echoed JSONPath expression.
    pub expression: String,
    /// Echoed operator.
    pub operator: RuleOperator,
    /// Echoed expected value.
    pub expected_value: serde_json::Value,
    /// Value extracted from the response, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_value: Option<serde_json::Value>,
    /// Whether the operator returned true. An errored rule never matches.
    pub matched: bool,
    /// Evaluation error (parse, compile, lookup, coercion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of an alert fired during an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertTriggered {
    /// Id of the persisted alert log.
    pub alert_id: Uuid,
    /// Name of the rule that fired.
    pub triggered_by_rule: String,
    /// Destination webhook URL.
    pub webhook_url: String,
}

/// A complete execution history document. Immutable after creation except for
/// the append-only list of triggered alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionHistory {
    /// Row identifier.
    pub id: Uuid,
    /// Correlation id threading the execution through logs and alerts.
    pub correlation_id: Uuid,
    /// Owning check id.
    pub config_id: Uuid,
    /// Owning check name at execution time.
    pub config_name: String,
    /// When the execution started.
    pub executed_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
    /// Request as sent.
    pub request: ExecutionRequest,
    /// Response as captured.
    pub response: ExecutionResponse,
    /// Per-rule verdicts in declaration order.
    pub rules_evaluation: Vec<RuleEvaluation>,
    /// Alerts fired by this execution.
    pub alerts_triggered: Vec<AlertTriggered>,
    /// Terminal status.
    pub status: ExecutionStatus,
}

/// Summary row for execution list responses.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    /// Correlation id.
    pub correlation_id: Uuid,
    /// Owning check id.
    pub config_id: Uuid,
    /// Owning check name.
    pub config_name: String,
    /// When the execution started.
    pub executed_at: DateTime<Utc>,
    /// Duration in milliseconds.
    pub duration_ms: i64,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Number of alerts fired.
    pub alerts_triggered: usize,
}

impl From<&ExecutionHistory> for ExecutionSummary {
    fn from(history: &ExecutionHistory) -> Self {
        ExecutionSummary {
            correlation_id: history.correlation_id,
            config_id: history.config_id,
            config_name: history.config_name.clone(),
            executed_at: history.executed_at,
            duration_ms: history.duration_ms,
            status: history.status,
            alerts_triggered: history.alerts_triggered.len(),
        }
    }
}
