//! Check configuration: target, rules, webhook, schedule.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::{VigilError, VigilResult};
use crate::schedule;

/// Default timeout for target calls when the config does not set one.
pub const DEFAULT_TARGET_TIMEOUT_SECS: u64 = 30;

/// HTTP methods accepted for targets.
const VALID_TARGET_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

/// Authentication applied to target requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthSpec {
    /// No authentication.
    #[default]
    None,
    /// HTTP Basic authentication.
    Basic {
        /// Basic auth user.
        username: String,
        /// Basic auth password.
        password: String,
    },
    /// Bearer token in the `Authorization` header.
    Bearer {
        /// The token value.
        token: String,
    },
}

impl AuthSpec {
    fn validate(&self) -> VigilResult<()> {
        match self {
            AuthSpec::None => Ok(()),
            AuthSpec::Basic { username, password } => {
                if username.is_empty() || password.is_empty() {
                    return Err(VigilError::Validation(
                        "username and password required for basic auth".into(),
                    ));
                }
                Ok(())
            }
            AuthSpec::Bearer { token } => {
                if token.is_empty() {
                    return Err(VigilError::Validation(
                        "token required for bearer auth".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// The API endpoint a check monitors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Target URL (http or https).
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Extra request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Optional request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Authentication spec.
    #[serde(default)]
    pub auth: AuthSpec,
    /// Per-request timeout in seconds. Defaults to 30.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Target {
    fn validate(&mut self) -> VigilResult<()> {
        validate_http_url(&self.url, "target URL")?;

        let method = self.method.to_uppercase();
        if !VALID_TARGET_METHODS.contains(&method.as_str()) {
            return Err(VigilError::Validation(format!(
                "invalid HTTP method: {}",
                self.method
            )));
        }
        self.method = method;

        self.auth.validate()?;

        if self.timeout_secs == 0 {
            self.timeout_secs = DEFAULT_TARGET_TIMEOUT_SECS;
        }

        Ok(())
    }
}

/// Comparison operator applied by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOperator {
    /// Equal with type coercion.
    Eq,
    /// Not equal.
    Ne,
    /// Numerically greater than.
    Gt,
    /// Numerically less than.
    Lt,
    /// Numerically greater than or equal.
    Gte,
    /// Numerically less than or equal.
    Lte,
    /// Substring or array membership.
    Contains,
    /// Extracted value is present and non-null.
    Exists,
    /// Extracted value matches the expected regex.
    Regex,
}

impl RuleOperator {
    /// Stable wire name of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleOperator::Eq => "eq",
            RuleOperator::Ne => "ne",
            RuleOperator::Gt => "gt",
            RuleOperator::Lt => "lt",
            RuleOperator::Gte => "gte",
            RuleOperator::Lte => "lte",
            RuleOperator::Contains => "contains",
            RuleOperator::Exists => "exists",
            RuleOperator::Regex => "regex",
        }
    }
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleOperator {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eq" => Ok(RuleOperator::Eq),
            "ne" => Ok(RuleOperator::Ne),
            "gt" => Ok(RuleOperator::Gt),
            "lt" => Ok(RuleOperator::Lt),
            "gte" => Ok(RuleOperator::Gte),
            "lte" => Ok(RuleOperator::Lte),
            "contains" => Ok(RuleOperator::Contains),
            "exists" => Ok(RuleOperator::Exists),
            "regex" => Ok(RuleOperator::Regex),
            other => Err(VigilError::Validation(format!(
                "invalid operator: {other}"
            ))),
        }
    }
}

/// A JSONPath rule evaluated against the target response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Rule name, unique within the check.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSONPath expression selecting the value to compare.
    pub expression: String,
    /// Comparison operator.
    pub operator: RuleOperator,
    /// Expected value (any JSON scalar).
    #[serde(default)]
    pub expected_value: serde_json::Value,
    /// Whether a match fires a webhook alert.
    #[serde(default)]
    pub alert_on_match: bool,
}

impl Rule {
    fn validate(&self) -> VigilResult<()> {
        if self.name.is_empty() {
            return Err(VigilError::Validation("rule name is required".into()));
        }
        if self.expression.is_empty() {
            return Err(VigilError::Validation(format!(
                "rule '{}': expression is required",
                self.name
            )));
        }
        Ok(())
    }
}

/// Exponential backoff parameters for webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum delivery attempts.
    pub max_attempts: u32,
    /// First backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Replace zeroed fields with their defaults.
    pub fn fill_defaults(&mut self) {
        let defaults = RetryPolicy::default();
        if self.max_attempts == 0 {
            self.max_attempts = defaults.max_attempts;
        }
        if self.initial_delay_ms == 0 {
            self.initial_delay_ms = defaults.initial_delay_ms;
        }
        if self.max_delay_ms == 0 {
            self.max_delay_ms = defaults.max_delay_ms;
        }
        if self.multiplier == 0.0 {
            self.multiplier = defaults.multiplier;
        }
    }
}

/// Webhook sink for alerts fired by this check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSpec {
    /// Webhook URL (http or https).
    pub url: String,
    /// HTTP method, defaults to POST.
    #[serde(default)]
    pub method: String,
    /// Extra headers merged over `Content-Type: application/json`.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Retry parameters.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl WebhookSpec {
    fn validate(&mut self) -> VigilResult<()> {
        validate_http_url(&self.url, "webhook URL")?;
        if self.method.is_empty() {
            self.method = "POST".to_string();
        }
        self.method = self.method.to_uppercase();
        self.retry.fill_defaults();
        Ok(())
    }
}

/// A health check configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Unique identifier.
    pub id: Uuid,
    /// Unique name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the check may execute at all.
    pub enabled: bool,
    /// Target endpoint.
    pub target: Target,
    /// Ordered evaluation rules. At least one is required.
    pub rules: Vec<Rule>,
    /// Alert webhook.
    pub webhook: WebhookSpec,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Five-field cron expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Whether the scheduler picks this check up.
    #[serde(default)]
    pub schedule_enabled: bool,
    /// Last scheduled execution instant, written by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scheduled_run: Option<DateTime<Utc>>,
    /// Next due instant, written by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scheduled_run: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl CheckConfig {
    /// Validate the whole configuration, normalizing methods, filling retry
    /// defaults and computing the first `next_scheduled_run` when scheduling
    /// is enabled and none is set.
    pub fn validate(&mut self) -> VigilResult<()> {
        if self.name.is_empty() {
            return Err(VigilError::Validation("check name is required".into()));
        }
        if self.name.len() > 255 {
            return Err(VigilError::Validation(
                "check name must be 255 characters or less".into(),
            ));
        }

        self.target.validate()?;

        if self.rules.is_empty() {
            return Err(VigilError::Validation(
                "at least one rule is required".into(),
            ));
        }
        for rule in &self.rules {
            rule.validate()?;
        }

        self.webhook.validate()?;

        if self.schedule_enabled {
            let expr = self.schedule.as_deref().unwrap_or_default();
            if expr.is_empty() {
                return Err(VigilError::Validation(
                    "schedule is required when schedule_enabled is true".into(),
                ));
            }
            let parsed = schedule::parse(expr)?;
            if self.next_scheduled_run.is_none() {
                self.next_scheduled_run = schedule::next_run(&parsed, Utc::now());
            }
        }

        Ok(())
    }
}

/// Summary row for check list responses.
#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    /// Unique identifier.
    pub id: Uuid,
    /// Unique name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the check may execute.
    pub enabled: bool,
    /// Target URL.
    pub target_url: String,
    /// Number of rules.
    pub rules_count: usize,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Cron expression, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Whether scheduling is on.
    pub schedule_enabled: bool,
    /// Last scheduled run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scheduled_run: Option<DateTime<Utc>>,
    /// Next due instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scheduled_run: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&CheckConfig> for CheckSummary {
    fn from(config: &CheckConfig) -> Self {
        CheckSummary {
            id: config.id,
            name: config.name.clone(),
            description: config.description.clone(),
            enabled: config.enabled,
            target_url: config.target.url.clone(),
            rules_count: config.rules.len(),
            tags: config.tags.clone(),
            schedule: config.schedule.clone(),
            schedule_enabled: config.schedule_enabled,
            last_scheduled_run: config.last_scheduled_run,
            next_scheduled_run: config.next_scheduled_run,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

fn validate_http_url(raw: &str, what: &str) -> VigilResult<()> {
    if raw.is_empty() {
        return Err(VigilError::Validation(format!("{what} is required")));
    }
    let parsed = reqwest::Url::parse(raw)
        .map_err(|e| VigilError::Validation(format!("invalid {what}: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(VigilError::Validation(format!(
            "{what} must start with http:// or https://"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_config() -> CheckConfig {
        let now = Utc::now();
        CheckConfig {
            id: Uuid::new_v4(),
            name: "orders-api".into(),
            description: None,
            enabled: true,
            target: Target {
                url: "https://api.example.com/status".into(),
                method: "get".into(),
                headers: HashMap::new(),
                body: None,
                auth: AuthSpec::None,
                timeout_secs: 0,
            },
            rules: vec![Rule {
                name: "status-ok".into(),
                description: None,
                expression: "$.status".into(),
                operator: RuleOperator::Eq,
                expected_value: json!("ok"),
                alert_on_match: false,
            }],
            webhook: WebhookSpec {
                url: "https://hooks.example.com/alerts".into(),
                method: String::new(),
                headers: HashMap::new(),
                retry: RetryPolicy {
                    max_attempts: 0,
                    initial_delay_ms: 0,
                    max_delay_ms: 0,
                    multiplier: 0.0,
                },
            },
            tags: vec![],
            schedule: None,
            schedule_enabled: false,
            last_scheduled_run: None,
            next_scheduled_run: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn validate_normalizes_method_and_defaults() {
        let mut config = sample_config();
        config.validate().expect("config should validate");
        assert_eq!(config.target.method, "GET");
        assert_eq!(config.target.timeout_secs, DEFAULT_TARGET_TIMEOUT_SECS);
        assert_eq!(config.webhook.method, "POST");
        assert_eq!(config.webhook.retry, RetryPolicy::default());
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut config = sample_config();
        config.name = String::new();
        assert!(matches!(
            config.validate(),
            Err(VigilError::Validation(msg)) if msg.contains("name is required")
        ));
    }

    #[test]
    fn validate_rejects_overlong_name() {
        let mut config = sample_config();
        config.name = "x".repeat(256);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_scheme() {
        let mut config = sample_config();
        config.target.url = "ftp://example.com".into();
        assert!(matches!(
            config.validate(),
            Err(VigilError::Validation(msg)) if msg.contains("http://")
        ));
    }

    #[test]
    fn validate_rejects_unknown_method() {
        let mut config = sample_config();
        config.target.method = "TRACE".into();
        assert!(matches!(
            config.validate(),
            Err(VigilError::Validation(msg)) if msg.contains("invalid HTTP method")
        ));
    }

    #[test]
    fn validate_requires_at_least_one_rule() {
        let mut config = sample_config();
        config.rules.clear();
        assert!(matches!(
            config.validate(),
            Err(VigilError::Validation(msg)) if msg.contains("at least one rule")
        ));
    }

    #[test]
    fn validate_rejects_incomplete_basic_auth() {
        let mut config = sample_config();
        config.target.auth = AuthSpec::Basic {
            username: "svc".into(),
            password: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_bearer_token() {
        let mut config = sample_config();
        config.target.auth = AuthSpec::Bearer {
            token: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_schedule_when_enabled() {
        let mut config = sample_config();
        config.schedule_enabled = true;
        config.schedule = None;
        assert!(matches!(
            config.validate(),
            Err(VigilError::Validation(msg)) if msg.contains("schedule is required")
        ));
    }

    #[test]
    fn validate_rejects_bad_cron() {
        let mut config = sample_config();
        config.schedule_enabled = true;
        config.schedule = Some("not a cron".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_computes_first_next_run() {
        let mut config = sample_config();
        config.schedule_enabled = true;
        config.schedule = Some("*/5 * * * *".into());
        config.validate().expect("config should validate");
        let next = config.next_scheduled_run.expect("next run computed");
        assert!(next > Utc::now());
    }

    #[test]
    fn operator_round_trips_through_str() {
        for op in [
            RuleOperator::Eq,
            RuleOperator::Ne,
            RuleOperator::Gt,
            RuleOperator::Lt,
            RuleOperator::Gte,
            RuleOperator::Lte,
            RuleOperator::Contains,
            RuleOperator::Exists,
            RuleOperator::Regex,
        ] {
            let parsed: RuleOperator = op.as_str().parse().unwrap();
            assert_eq!(parsed, op);
        }
        assert!("between".parse::<RuleOperator>().is_err());
    }

    #[test]
    fn operator_parse_is_case_insensitive() {
        let parsed: RuleOperator = "CONTAINS".parse().unwrap();
        assert_eq!(parsed, RuleOperator::Contains);
    }

    #[test]
    fn auth_spec_serde_tagging() {
        let bearer = AuthSpec::Bearer {
            token: "tok".into(),
        };
        let json = serde_json::to_value(&bearer).unwrap();
        assert_eq!(json["type"], "bearer");
        assert_eq!(json["token"], "tok");

        let none: AuthSpec = serde_json::from_value(json!({"type": "none"})).unwrap();
        assert_eq!(none, AuthSpec::None);
    }

    #[test]
    fn summary_reflects_config() {
        let mut config = sample_config();
        config.validate().unwrap();
        let summary = CheckSummary::from(&config);
        assert_eq!(summary.name, config.name);
        assert_eq!(summary.rules_count, 1);
        assert_eq!(summary.target_url, config.target.url);
    }
}
