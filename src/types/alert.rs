//! Alert logs: per-attempt delivery records and acknowledgment state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::VigilError;

/// One HTTP transaction with the webhook sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertAttempt {
    /// 1-based attempt number.
    pub attempt_number: u32,
    /// When the attempt started.
    pub timestamp: DateTime<Utc>,
    /// Response status, absent on transport failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Response body excerpt, truncated at 1 KiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Attempt error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempt duration in milliseconds.
    pub duration_ms: i64,
}

/// Terminal delivery status of an alert log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    /// A 2xx response was received.
    Delivered,
    /// Delivery gave up.
    Failed,
    /// Attempts still in flight.
    Retrying,
}

impl FinalStatus {
    /// Stable wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Delivered => "delivered",
            FinalStatus::Failed => "failed",
            FinalStatus::Retrying => "retrying",
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FinalStatus {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivered" => Ok(FinalStatus::Delivered),
            "failed" => Ok(FinalStatus::Failed),
            "retrying" => Ok(FinalStatus::Retrying),
            other => Err(VigilError::Validation(format!(
                "invalid alert final status: {other}"
            ))),
        }
    }
}

/// Acknowledgment state of an alert log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    /// Not yet acknowledged.
    #[default]
    Open,
    /// Acknowledged by an operator.
    Acknowledged,
}

impl AckStatus {
    /// Stable wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AckStatus::Open => "open",
            AckStatus::Acknowledged => "acknowledged",
        }
    }
}

impl FromStr for AckStatus {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AckStatus::Open),
            "acknowledged" => Ok(AckStatus::Acknowledged),
            other => Err(VigilError::Validation(format!(
                "invalid acknowledgment status: {other}"
            ))),
        }
    }
}

/// An alert log document. The id is assigned when the dispatcher builds the
/// log, before any attempt runs, so executions can reference it even when
/// delivery fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertLog {
    /// Log identifier, assigned at creation.
    pub id: Uuid,
    /// Correlation id of the owning execution.
    pub correlation_id: Uuid,
    /// Owning check id; stamped by the execution engine before persisting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<Uuid>,
    /// Destination webhook URL.
    pub webhook_url: String,
    /// The `text` payload that was (or would have been) posted.
    pub payload_text: String,
    /// Append-only attempt records.
    pub attempts: Vec<AlertAttempt>,
    /// Terminal delivery status.
    pub final_status: FinalStatus,
    /// Acknowledgment state.
    #[serde(default)]
    pub ack_status: AckStatus,
    /// Who acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    /// When it was acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When the log was created.
    pub created_at: DateTime<Utc>,
    /// When delivery reached its terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AlertLog {
    /// Build a fresh log in `retrying` state with no attempts.
    pub fn new(correlation_id: Uuid, webhook_url: String, payload_text: String) -> Self {
        AlertLog {
            id: Uuid::new_v4(),
            correlation_id,
            config_id: None,
            webhook_url,
            payload_text,
            attempts: Vec::new(),
            final_status: FinalStatus::Retrying,
            ack_status: AckStatus::Open,
            acknowledged_by: None,
            acknowledged_at: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Summary row for alert list responses.
#[derive(Debug, Clone, Serialize)]
pub struct AlertSummary {
    /// Log identifier.
    pub id: Uuid,
    /// Correlation id of the owning execution.
    pub correlation_id: Uuid,
    /// Destination webhook URL.
    pub webhook_url: String,
    /// Terminal delivery status.
    pub final_status: FinalStatus,
    /// Acknowledgment state.
    pub ack_status: AckStatus,
    /// Who acknowledged, if anyone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    /// Number of delivery attempts.
    pub attempts_count: usize,
    /// When the log was created.
    pub created_at: DateTime<Utc>,
    /// When delivery completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&AlertLog> for AlertSummary {
    fn from(log: &AlertLog) -> Self {
        AlertSummary {
            id: log.id,
            correlation_id: log.correlation_id,
            webhook_url: log.webhook_url.clone(),
            final_status: log.final_status,
            ack_status: log.ack_status,
            acknowledged_by: log.acknowledged_by.clone(),
            attempts_count: log.attempts.len(),
            created_at: log.created_at,
            completed_at: log.completed_at,
        }
    }
}
