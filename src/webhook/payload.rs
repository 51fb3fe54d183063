//! Alert payload construction.
//!
//! The wire body posted to a webhook is only `{"text": <text>}`; metadata and
//! details stay local for logging and future expansion.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::evaluator::coercion;
use crate::types::execution::RuleEvaluation;

/// Service name stamped into alert metadata.
const ALERT_SERVICE_NAME: &str = "vigil-alert";

/// A fully formatted alert, ready for dispatch.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    /// Human-readable alert message; this is what goes over the wire.
    pub text: String,
    /// Local metadata (service, config, rule, correlation id, severity).
    pub metadata: Value,
    /// Local details (target, response, comparison context).
    pub details: Value,
}

/// Format an alert payload from a rule verdict.
pub fn format_alert_payload(
    config_name: &str,
    evaluation: &RuleEvaluation,
    target_url: &str,
    status_code: Option<u16>,
    correlation_id: Uuid,
    response_time_ms: i64,
) -> AlertPayload {
    let text = match &evaluation.error {
        Some(error) => format!("🚨 Alert: {config_name} - Rule evaluation error: {error}"),
        None => format!(
            "🚨 Alert: {} - Rule '{}' matched (extracted: {}, operator: {}, expected: {})",
            config_name,
            evaluation.rule_name,
            evaluation
                .extracted_value
                .as_ref()
                .map(coercion::to_display_string)
                .unwrap_or_else(|| "null".to_string()),
            evaluation.operator,
            coercion::to_display_string(&evaluation.expected_value),
        ),
    };

    AlertPayload {
        text,
        metadata: json!({
            "service": ALERT_SERVICE_NAME,
            "config_name": config_name,
            "rule_name": evaluation.rule_name,
            "correlation_id": correlation_id,
            "timestamp": Value::Null,
            "severity": severity(evaluation),
        }),
        details: json!({
            "target_url": target_url,
            "status_code": status_code,
            "response_time_ms": response_time_ms,
            "extracted_value": evaluation.extracted_value,
            "expected_value": evaluation.expected_value,
            "operator": evaluation.operator.as_str(),
            "jsonpath_expression": evaluation.expression,
        }),
    }
}

/// An errored verdict is an `error`-severity alert; plain matches are
/// warnings.
fn severity(evaluation: &RuleEvaluation) -> &'static str {
    if evaluation.error.is_some() {
        "error"
    } else {
        "warning"
    }
}
