//! `UserProblemHistory` — the anti-duplicate audit trail.

use super::{DuelId, ProblemId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique on `(user_ref, problem_ref, duel_ref)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProblemHistory {
    pub user_ref: UserId,
    pub problem_ref: ProblemId,
    pub duel_ref: DuelId,
    pub fingerprint: String,
    pub used_at: DateTime<Utc>,
    pub solved: bool,
    pub tests_passed: u32,
    pub total_tests: u32,
    pub solve_duration_seconds: Option<i64>,
    pub reported_as_duplicate: bool,
}
