//! C3 — weighted similarity scoring and per-user reuse exclusion.
//!
//! Weights and threshold follow the original service's
//! `ProblemFingerprint.detect_semantic_similarity`: title 0.3, function
//! name 0.25, problem type 0.2, difficulty 0.15, keyword overlap over the
//! first 20 description words 0.1; duplicate at score >= 0.7.

use super::GenerationExclusions;
use crate::domain::{Difficulty, Problem, UserId, UserProblemHistory};
use crate::repository::Repository;
use crate::Result;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

const SIMILARITY_THRESHOLD: f64 = 0.7;

pub struct AntiDuplicateIndex {
    repo: Arc<Repository>,
    ttl_days: i64,
    max_reuse: u32,
}

impl AntiDuplicateIndex {
    pub fn new(repo: Arc<Repository>, ttl_days: i64, max_reuse: u32) -> Self {
        Self { repo, ttl_days, max_reuse }
    }

    /// Fingerprints/titles/function names to avoid for this set of
    /// participants, gathered from everyone's history within the TTL
    /// window (§4.2).
    pub async fn exclusions_for(&self, users: &[UserId], _difficulty: Difficulty) -> Result<GenerationExclusions> {
        let mut exclude_fingerprints = HashSet::new();
        for &user in users {
            for fp in self.repo.recent_fingerprints_for_user(user, self.ttl_days)? {
                exclude_fingerprints.insert(fp);
            }
        }

        let mut exclude_titles = Vec::new();
        let mut exclude_functions = Vec::new();
        for fingerprint in &exclude_fingerprints {
            if let Some(problem) = self.repo.problem_by_fingerprint(fingerprint)? {
                exclude_titles.push(problem.title);
                exclude_functions.push(problem.function_name);
            }
        }

        Ok(GenerationExclusions {
            exclude_titles,
            exclude_functions,
            exclude_fingerprints: exclude_fingerprints.into_iter().collect(),
        })
    }

    /// An existing, under-reused catalog problem not in the exclusion set,
    /// if one exists — avoids generating a fresh problem when reuse is
    /// free of duplication risk.
    pub fn pick_existing_catalog_entry(
        &self,
        difficulty: Difficulty,
        exclude_fingerprints: &[String],
    ) -> Result<Option<Problem>> {
        let candidates = self.repo.problem_candidates(difficulty, self.max_reuse)?;
        Ok(candidates
            .into_iter()
            .find(|p| !exclude_fingerprints.contains(&p.fingerprint)))
    }

    /// `true` when `candidate` scores >= the similarity threshold against
    /// any currently-excluded problem.
    pub fn is_duplicate_of_excluded(&self, candidate: &Problem, exclusions: &GenerationExclusions) -> bool {
        for fingerprint in &exclusions.exclude_fingerprints {
            let Ok(Some(other)) = self.repo.problem_by_fingerprint(fingerprint) else {
                continue;
            };
            if similarity_score(candidate, &other) >= SIMILARITY_THRESHOLD {
                return true;
            }
        }
        false
    }

    pub fn record_attempt(
        &self,
        user: UserId,
        problem: &Problem,
        duel: crate::domain::DuelId,
        solved: bool,
        tests_passed: u32,
        total_tests: u32,
        solve_duration_seconds: Option<i64>,
    ) -> Result<()> {
        self.repo.record_history(&UserProblemHistory {
            user_ref: user,
            problem_ref: problem.id,
            duel_ref: duel,
            fingerprint: problem.fingerprint.clone(),
            used_at: Utc::now(),
            solved,
            tests_passed,
            total_tests,
            solve_duration_seconds,
            reported_as_duplicate: false,
        })
    }
}

/// Weighted similarity in `[0.0, 1.0]`.
pub fn similarity_score(a: &Problem, b: &Problem) -> f64 {
    let mut score = 0.0;

    let title_a = a.title.trim().to_lowercase();
    let title_b = b.title.trim().to_lowercase();
    if title_a == title_b {
        score += 0.3;
    } else if title_a.contains(&title_b) || title_b.contains(&title_a) {
        score += 0.15;
    }

    let func_a = a.function_name.to_lowercase();
    let func_b = b.function_name.to_lowercase();
    if func_a == func_b {
        score += 0.25;
    } else if func_a.replace('_', "") == func_b.replace('_', "") {
        score += 0.15;
    }

    if a.problem_type == b.problem_type {
        score += 0.2;
    }

    if a.difficulty == b.difficulty {
        score += 0.15;
    }

    score += 0.1 * keyword_overlap(&a.description, &b.description);

    score.min(1.0)
}

/// Jaccard-style overlap over the first 20 whitespace-separated words of
/// each description, matching the original's coarse keyword check.
fn keyword_overlap(a: &str, b: &str) -> f64 {
    let lower_a = a.to_lowercase();
    let lower_b = b.to_lowercase();
    let words_a: HashSet<&str> = lower_a.split_whitespace().take(20).collect();
    let words_b: HashSet<&str> = lower_b.split_whitespace().take(20).collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let common = words_a.intersection(&words_b).count();
    if common == 0 {
        return 0.0;
    }
    common as f64 / words_a.len().max(words_b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Difficulty, ProblemId, ProblemType, TestCategory, TestCase};
    use std::collections::BTreeMap;

    fn sample(title: &str, function_name: &str, description: &str) -> Problem {
        Problem {
            id: ProblemId::new(),
            title: title.to_string(),
            description: description.to_string(),
            difficulty: Difficulty::Easy,
            problem_type: ProblemType::Array,
            fingerprint: String::new(),
            function_name: function_name.to_string(),
            parameter_signature: vec!["nums".to_string()],
            starter_code: BTreeMap::new(),
            test_cases: vec![
                TestCase { input: serde_json::json!([1]), expected_output: serde_json::json!(1), hidden: false, category: TestCategory::Normal };
                5
            ],
            constraints: Vec::new(),
            hints: Vec::new(),
            times_used: 0,
            last_used_at: None,
            reference_solution: None,
            from_fallback_library: true,
        }
    }

    #[test]
    fn identical_problems_score_above_threshold() {
        let a = sample("Two Sum", "two_sum", "Given an array of integers, return indices");
        let b = sample("Two Sum", "two_sum", "Given an array of integers, return indices");
        assert!(similarity_score(&a, &b) >= SIMILARITY_THRESHOLD);
    }

    #[test]
    fn unrelated_problems_score_low() {
        let a = sample("Two Sum", "two_sum", "Given an array of integers, return indices");
        let b = sample("Reverse String", "reverse_string", "Reverse the characters of a string in place");
        assert!(similarity_score(&a, &b) < SIMILARITY_THRESHOLD);
    }
}
