//! Output comparison semantics (§4.6): exact by default, numeric
//! tolerance for floats, order-insensitive for set-typed problems,
//! case-sensitive strings except for boolean-like literals.

use crate::domain::ProblemType;
use serde_json::Value;

const FLOAT_TOLERANCE: f64 = 1e-9;

pub fn values_equal(expected: &Value, actual: &Value, problem_type: &ProblemType) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                (a - b).abs() <= FLOAT_TOLERANCE
            } else {
                a == b
            }
        }
        (Value::String(a), Value::String(b)) => strings_equal(a, b),
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return false;
            }
            if matches!(problem_type, ProblemType::SetOperations) {
                arrays_equal_unordered(a, b, problem_type)
            } else {
                a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y, problem_type))
            }
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| values_equal(v, w, problem_type)))
        }
        (a, b) => a == b,
    }
}

fn strings_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if let (Some(x), Some(y)) = (parse_bool_like(a), parse_bool_like(b)) {
        return x == y;
    }
    false
}

fn parse_bool_like(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// O(n^2) unordered comparison; test-output arrays are small enough that
/// this never needs to be a multiset-hash.
fn arrays_equal_unordered(a: &[Value], b: &[Value], problem_type: &ProblemType) -> bool {
    let mut used = vec![false; b.len()];
    for x in a {
        let Some(slot) = b
            .iter()
            .enumerate()
            .find(|(i, y)| !used[*i] && values_equal(x, y, problem_type))
        else {
            return false;
        };
        used[slot.0] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn floats_within_tolerance_are_equal() {
        let pt = ProblemType::Array;
        assert!(values_equal(&json!(1.0000000001), &json!(1.0000000002), &pt));
        assert!(!values_equal(&json!(1.0), &json!(1.01), &pt));
    }

    #[test]
    fn boolean_like_strings_match_case_insensitively() {
        let pt = ProblemType::Array;
        assert!(values_equal(&json!("True"), &json!("true"), &pt));
        assert!(!values_equal(&json!("Hello"), &json!("hello"), &pt));
    }

    #[test]
    fn set_operations_ignore_order() {
        let pt = ProblemType::SetOperations;
        assert!(values_equal(&json!([1, 2, 3]), &json!([3, 1, 2]), &pt));
        let arr = ProblemType::Array;
        assert!(!values_equal(&json!([1, 2, 3]), &json!([3, 1, 2]), &arr));
    }
}
