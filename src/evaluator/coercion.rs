//! Type-coercing comparisons over JSON values.
//!
//! Response bodies are untyped JSON, so every operator works on
//! `serde_json::Value` and coerces as needed: numeric comparison first, then
//! boolean, then string forms.

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

/// Coercion failure.
#[derive(Debug, Error, PartialEq)]
pub enum CoercionError {
    /// The value has no numeric interpretation.
    #[error("cannot convert {0} to a number")]
    NotNumeric(String),
}

/// String form used for display, substring and regex matching.
///
/// Strings render without quotes; null renders as `null`; composites render
/// as compact JSON.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce to f64. Accepts numbers and numeric strings.
pub fn to_number(value: &Value) -> Result<f64, CoercionError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| CoercionError::NotNumeric(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| CoercionError::NotNumeric(format!("string '{s}'"))),
        other => Err(CoercionError::NotNumeric(to_display_string(other))),
    }
}

/// Coerce to bool: non-zero numbers are true; strings follow the usual
/// truthy forms ("true"/"1"/"yes" true, "false"/"0"/"no"/"" false,
/// any other non-empty string true); null is false; composites are true.
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            match lower.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" | "" => false,
                _ => !s.is_empty(),
            }
        }
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Equality with type coercion: numeric if both sides coerce to numbers,
/// boolean if either side is a bool, otherwise string forms.
/// `null == null` is true; null never equals anything else.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }

    if let (Ok(num_a), Ok(num_b)) = (to_number(a), to_number(b)) {
        return num_a == num_b;
    }

    if let Value::Bool(bool_a) = a {
        return *bool_a == to_bool(b);
    }
    if let Value::Bool(bool_b) = b {
        return to_bool(a) == *bool_b;
    }

    to_display_string(a) == to_display_string(b)
}

/// Numeric ordering; fails when either side is not numeric.
pub fn compare_numbers(a: &Value, b: &Value) -> Result<Ordering, CoercionError> {
    let num_a = to_number(a)?;
    let num_b = to_number(b)?;
    Ok(num_a
        .partial_cmp(&num_b)
        .unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_string_forms() {
        assert_eq!(to_display_string(&json!(null)), "null");
        assert_eq!(to_display_string(&json!("ok")), "ok");
        assert_eq!(to_display_string(&json!(42)), "42");
        assert_eq!(to_display_string(&json!(2.5)), "2.5");
        assert_eq!(to_display_string(&json!(true)), "true");
        assert_eq!(to_display_string(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn numbers_coerce() {
        assert_eq!(to_number(&json!(42)).unwrap(), 42.0);
        assert_eq!(to_number(&json!(-1.5)).unwrap(), -1.5);
        assert_eq!(to_number(&json!("42")).unwrap(), 42.0);
        assert_eq!(to_number(&json!(" 3.5 ")).unwrap(), 3.5);
    }

    #[test]
    fn non_numeric_values_fail_coercion() {
        assert!(matches!(
            to_number(&json!("abc")),
            Err(CoercionError::NotNumeric(_))
        ));
        assert!(to_number(&json!(true)).is_err());
        assert!(to_number(&json!(null)).is_err());
        assert!(to_number(&json!({"a": 1})).is_err());
    }

    #[test]
    fn bool_coercion_table() {
        assert!(!to_bool(&json!(null)));
        assert!(to_bool(&json!(true)));
        assert!(!to_bool(&json!(false)));
        assert!(to_bool(&json!(1)));
        assert!(to_bool(&json!(-0.5)));
        assert!(!to_bool(&json!(0)));
        assert!(to_bool(&json!("true")));
        assert!(to_bool(&json!("YES")));
        assert!(!to_bool(&json!("false")));
        assert!(!to_bool(&json!("0")));
        assert!(!to_bool(&json!("No")));
        assert!(!to_bool(&json!("")));
        assert!(to_bool(&json!("anything else")));
        assert!(to_bool(&json!([])));
    }

    #[test]
    fn equality_is_numeric_first() {
        assert!(values_equal(&json!(42), &json!("42")));
        assert!(values_equal(&json!("3.0"), &json!(3)));
        assert!(!values_equal(&json!(42), &json!("43")));
    }

    #[test]
    fn equality_falls_back_to_bool_then_string() {
        assert!(values_equal(&json!(true), &json!("yes")));
        assert!(values_equal(&json!("1"), &json!(true)));
        assert!(values_equal(&json!("ok"), &json!("ok")));
        assert!(!values_equal(&json!("ok"), &json!("down")));
    }

    #[test]
    fn null_equality() {
        assert!(values_equal(&json!(null), &json!(null)));
        assert!(!values_equal(&json!(null), &json!("null")));
        assert!(!values_equal(&json!(0), &json!(null)));
    }

    #[test]
    fn ordering_requires_numbers() {
        assert_eq!(
            compare_numbers(&json!(2), &json!("1")).unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            compare_numbers(&json!("1.5"), &json!(1.5)).unwrap(),
            Ordering::Equal
        );
        assert!(compare_numbers(&json!(2), &json!("abc")).is_err());
        assert!(compare_numbers(&json!(null), &json!(1)).is_err());
    }
}
