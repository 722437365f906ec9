//! Problem entity and fingerprinting.

use super::ProblemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: serde_json::Value,
    pub expected_output: serde_json::Value,
    pub hidden: bool,
    /// Coarse coverage tag used to check the "≥5 cases, ≥2 visible / ≥3
    /// hidden, covering normal/empty/single/large/edge" guarantee of
    /// §4.2. Not sent to clients.
    pub category: TestCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Normal,
    Empty,
    Single,
    Large,
    Edge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: ProblemId,
    pub title: String,
    pub description: String,
    pub difficulty: super::Difficulty,
    pub problem_type: super::ProblemType,
    /// 32-hex digest over (normalized title, function name, parameter
    /// signature, first 100 chars of description). Unique.
    pub fingerprint: String,
    pub function_name: String,
    pub parameter_signature: Vec<String>,
    /// language -> starter source.
    pub starter_code: BTreeMap<String, String>,
    pub test_cases: Vec<TestCase>,
    pub constraints: Vec<String>,
    pub hints: Vec<String>,
    pub times_used: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub reference_solution: Option<String>,
    /// `true` when the problem came from the curated fallback library
    /// rather than a validated LLM generation (§4.2, §9).
    pub from_fallback_library: bool,
}

impl Problem {
    pub fn visible_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.test_cases.iter().filter(|c| !c.hidden)
    }

    pub fn hidden_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.test_cases.iter().filter(|c| c.hidden)
    }

    /// §4.2 validation gate: at least 5 cases, 2+ visible, 3+ hidden.
    pub fn satisfies_case_minimums(&self) -> bool {
        self.test_cases.len() >= 5
            && self.visible_cases().count() >= 2
            && self.hidden_cases().count() >= 3
    }

    /// Order-insensitive comparison applies to problems that are
    /// explicitly declared set-typed (§4.6 comparison semantics).
    pub fn uses_set_semantics(&self) -> bool {
        matches!(self.problem_type, super::ProblemType::SetOperations)
    }
}

/// Deterministic md5 fingerprint over `(normalized title, function name,
/// parameter signature, first 100 chars of description)` (§4.2).
pub fn compute_fingerprint(
    title: &str,
    function_name: &str,
    parameter_signature: &[String],
    description: &str,
) -> String {
    let normalized_title = title.trim().to_lowercase();
    let truncated_description: String = description.chars().take(100).collect();
    let basis = format!(
        "{}|{}|{}|{}",
        normalized_title,
        function_name,
        parameter_signature.join(","),
        truncated_description
    );
    format!("{:x}", md5::compute(basis.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_and_hex32() {
        let a = compute_fingerprint("Sum of Array", "solve", &["a".into()], "Return the sum.");
        let b = compute_fingerprint("  sum of array  ", "solve", &["a".into()], "Return the sum.");
        assert_eq!(a, b, "title normalization should fold whitespace/case");
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_changes_with_function_name() {
        let a = compute_fingerprint("Two Sum", "two_sum", &["nums".into()], "desc");
        let b = compute_fingerprint("Two Sum", "twoSum", &["nums".into()], "desc");
        assert_ne!(a, b);
    }
}
