//! Rule evaluation against target response bodies.
//!
//! Each rule extracts a value with JSONPath and applies a coercing operator.
//! Evaluation failures (JSON parse, path compile, empty lookup, coercion,
//! regex compile) are recorded on the verdict; an errored rule never matches.

pub mod coercion;

use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::debug;

use crate::types::check::{Rule, RuleOperator};
use crate::types::execution::RuleEvaluation;

/// Stateless rule evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Create an evaluator.
    pub fn new() -> Self {
        RuleEvaluator
    }

    /// Evaluate a single rule against a raw response body.
    pub fn evaluate_rule(&self, rule: &Rule, response_body: &str) -> RuleEvaluation {
        let mut verdict = RuleEvaluation {
            rule_name: rule.name.clone(),
            expression: rule.expression.clone(),
            operator: rule.operator,
            expected_value: rule.expected_value.clone(),
            extracted_value: None,
            matched: false,
            error: None,
        };

        let body: Value = match serde_json::from_str(response_body) {
            Ok(v) => v,
            Err(e) => {
                verdict.error = Some(format!("parse: {e}"));
                return verdict;
            }
        };

        let extracted = match extract_value(&body, &rule.expression) {
            Ok(v) => v,
            Err(e) => {
                verdict.error = Some(e);
                return verdict;
            }
        };
        verdict.extracted_value = Some(extracted.clone());

        match apply_operator(rule.operator, &extracted, &rule.expected_value) {
            Ok(matched) => verdict.matched = matched,
            Err(e) => verdict.error = Some(e),
        }

        debug!(
            rule = %rule.name,
            expression = %rule.expression,
            operator = %rule.operator,
            matched = verdict.matched,
            error = ?verdict.error,
            "Rule evaluated"
        );

        verdict
    }

    /// Evaluate all rules in declaration order.
    pub fn evaluate_rules(&self, rules: &[Rule], response_body: &str) -> Vec<RuleEvaluation> {
        rules
            .iter()
            .map(|rule| self.evaluate_rule(rule, response_body))
            .collect()
    }

    /// The sublist of verdicts that matched on a rule with `alert_on_match`.
    pub fn matched_alert_rules(
        &self,
        evaluations: &[RuleEvaluation],
        rules: &[Rule],
    ) -> Vec<RuleEvaluation> {
        evaluations
            .iter()
            .filter(|eval| {
                eval.matched
                    && rules
                        .iter()
                        .any(|rule| rule.name == eval.rule_name && rule.alert_on_match)
            })
            .cloned()
            .collect()
    }
}

/// Compile the expression and look up the first matching node.
fn extract_value(body: &Value, expression: &str) -> Result<Value, String> {
    let path = JsonPath::parse(expression)
        .map_err(|e| format!("invalid expression '{expression}': {e}"))?;
    let nodes = path.query(body).all();
    match nodes.first() {
        Some(value) => Ok((*value).clone()),
        None => Err("no result".to_string()),
    }
}

/// Apply an operator to extracted and expected values.
fn apply_operator(
    operator: RuleOperator,
    extracted: &Value,
    expected: &Value,
) -> Result<bool, String> {
    match operator {
        RuleOperator::Eq => Ok(coercion::values_equal(extracted, expected)),
        RuleOperator::Ne => Ok(!coercion::values_equal(extracted, expected)),
        RuleOperator::Gt => numeric_cmp(extracted, expected).map(|o| o.is_gt()),
        RuleOperator::Lt => numeric_cmp(extracted, expected).map(|o| o.is_lt()),
        RuleOperator::Gte => numeric_cmp(extracted, expected).map(|o| o.is_ge()),
        RuleOperator::Lte => numeric_cmp(extracted, expected).map(|o| o.is_le()),
        RuleOperator::Contains => Ok(evaluate_contains(extracted, expected)),
        RuleOperator::Exists => Ok(!extracted.is_null()),
        RuleOperator::Regex => evaluate_regex(extracted, expected),
    }
}

fn numeric_cmp(extracted: &Value, expected: &Value) -> Result<std::cmp::Ordering, String> {
    coercion::compare_numbers(extracted, expected).map_err(|e| e.to_string())
}

/// Array membership by coercing equality, or substring over string forms.
fn evaluate_contains(extracted: &Value, expected: &Value) -> bool {
    if let Value::Array(items) = extracted {
        return items
            .iter()
            .any(|item| coercion::values_equal(item, expected));
    }
    coercion::to_display_string(extracted).contains(&coercion::to_display_string(expected))
}

fn evaluate_regex(extracted: &Value, expected: &Value) -> Result<bool, String> {
    let pattern = coercion::to_display_string(expected);
    let regex =
        Regex::new(&pattern).map_err(|e| format!("invalid regex pattern '{pattern}': {e}"))?;
    Ok(regex.is_match(&coercion::to_display_string(extracted)))
}
