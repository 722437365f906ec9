//! Request/response bodies for the REST surface (§6). Kept separate from
//! the domain types: wire shapes are allowed to drift from storage shapes
//! without forcing `#[serde(...)]` attributes onto the aggregate.

use crate::domain::{Difficulty, DuelId, ProblemType};
use crate::judge::JudgeVerdict;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateDuelRequest {
    pub mode: crate::domain::DuelMode,
    pub difficulty: Difficulty,
    pub problem_type: ProblemType,
    pub room_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AiDuelRequest {
    pub difficulty: Difficulty,
    pub problem_type: ProblemType,
}

#[derive(Debug, Deserialize)]
pub struct JoinDuelRequest {
    pub room_code: Option<String>,
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Deserialize)]
pub struct CancelDuelRequest {
    pub duel_id: DuelId,
}

#[derive(Debug, Deserialize)]
pub struct SubmitCodeRequest {
    pub code: String,
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub struct TestCodeRequest {
    pub code: String,
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// `JudgeVerdict` carries internal fields (hidden-case bodies) a client
/// should never see in full; this flattens it to the result shape a
/// candidate actually needs (§4.6).
#[derive(Debug, Serialize)]
pub struct VerdictResponse {
    pub accepted: bool,
    pub tests_passed: u32,
    pub total_tests: u32,
    pub execution_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl From<&JudgeVerdict> for VerdictResponse {
    fn from(verdict: &JudgeVerdict) -> Self {
        let passed = verdict.tests_passed();
        let total = verdict.total_tests(0);
        Self {
            accepted: verdict.is_accepted(),
            tests_passed: passed,
            total_tests: total,
            execution_time_ms: match verdict {
                JudgeVerdict::Accepted { execution_time_ms, .. }
                | JudgeVerdict::WrongAnswer { execution_time_ms, .. } => Some(*execution_time_ms),
                _ => None,
            },
            error: match verdict {
                JudgeVerdict::CompileError { message }
                | JudgeVerdict::RuntimeError { message }
                | JudgeVerdict::SystemError { message } => Some(message.clone()),
                JudgeVerdict::SecurityViolation { reason } => Some(reason.clone()),
                JudgeVerdict::TimeLimitExceeded => Some("time limit exceeded".to_string()),
                JudgeVerdict::MemoryLimitExceeded => Some("memory limit exceeded".to_string()),
                _ => None,
            },
        }
    }
}
