//! C1 — the code execution judge.
//!
//! Generalizes the teacher's `competition::evaluator::Evaluator` trait
//! (`competition/evaluator.rs`): a small async strategy interface with a
//! `create_*` factory function picking the implementation, backed by the
//! teacher's `SolutionValidator` subprocess-running pattern
//! (`competition/validator.rs`) instead of its `cargo test`/`cargo check`
//! invocations. Here the "solutions" are a single submission's source
//! against a problem's hidden+visible test cases, and the judge owns
//! correctness, not ranking.

mod comparison;
mod harness;
mod security;

pub use comparison::values_equal;
pub use security::{scan_for_violations, SecurityViolation};

use crate::domain::{Difficulty, ProblemType, TestCase};
use crate::{DuelError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Resource limits for one execution. Scaled per difficulty by the caller
/// (harder problems get more time) but never exceed the operator-wide caps
/// in `Config`.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    pub time_limit: Duration,
    pub memory_limit_mb: u64,
    pub max_output_bytes: usize,
}

impl ExecutionLimits {
    pub fn for_difficulty(base: Duration, memory_limit_mb: u64, difficulty: Difficulty) -> Self {
        let scale = match difficulty {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
            Difficulty::Expert => 4,
        };
        Self {
            time_limit: base * scale,
            memory_limit_mb,
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Per-test-case result.
#[derive(Debug, Clone)]
pub struct CaseResult {
    pub hidden: bool,
    pub passed: bool,
    pub actual_output: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// The outcome of judging one submission, covering the full failure
/// taxonomy (§4.6): a submission either fully passes, fails on specific
/// cases, or is rejected before any case runs.
#[derive(Debug, Clone)]
pub enum JudgeVerdict {
    Accepted {
        cases: Vec<CaseResult>,
        execution_time_ms: u64,
    },
    WrongAnswer {
        cases: Vec<CaseResult>,
        execution_time_ms: u64,
    },
    CompileError {
        message: String,
    },
    RuntimeError {
        message: String,
    },
    TimeLimitExceeded,
    MemoryLimitExceeded,
    SecurityViolation {
        reason: String,
    },
    SystemError {
        message: String,
    },
}

impl JudgeVerdict {
    pub fn tests_passed(&self) -> u32 {
        match self {
            JudgeVerdict::Accepted { cases, .. } | JudgeVerdict::WrongAnswer { cases, .. } => {
                cases.iter().filter(|c| c.passed).count() as u32
            }
            _ => 0,
        }
    }

    pub fn total_tests(&self, total_if_unknown: u32) -> u32 {
        match self {
            JudgeVerdict::Accepted { cases, .. } | JudgeVerdict::WrongAnswer { cases, .. } => {
                cases.len() as u32
            }
            _ => total_if_unknown,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, JudgeVerdict::Accepted { .. })
    }
}

/// One submission to judge: the candidate's source plus everything needed
/// to build and run a harness around it.
pub struct Submission<'a> {
    pub language: &'a str,
    pub code: &'a str,
    pub function_name: &'a str,
    pub parameter_signature: &'a [String],
    pub test_cases: &'a [TestCase],
    pub problem_type: &'a ProblemType,
}

/// Strategy for running a submission: container-first in production,
/// falling back to a direct subprocess when no sandbox runtime is
/// available. Mirrors `Evaluator`'s `evaluate`/`name` shape.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(&self, submission: &Submission<'_>, limits: ExecutionLimits) -> Result<JudgeVerdict>;

    fn name(&self) -> &'static str;
}

/// Runs the harness-wrapped submission as a child process of the judge
/// host itself. This is the fallback tier: a real deployment puts a
/// container runtime in front of this (see `ContainerBackend`), but the
/// subprocess path is what every submission ultimately goes through.
pub struct SubprocessBackend;

impl SubprocessBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SubprocessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionBackend for SubprocessBackend {
    async fn execute(&self, submission: &Submission<'_>, limits: ExecutionLimits) -> Result<JudgeVerdict> {
        if let Some(violation) = scan_for_violations(submission.language, submission.code) {
            return Ok(JudgeVerdict::SecurityViolation {
                reason: violation.to_string(),
            });
        }

        let harness_source = harness::build_harness(submission)
            .map_err(|e| DuelError::Judge(format!("failed to build harness: {e}")))?;

        harness::run_harness(submission.language, &harness_source, submission.test_cases, submission.problem_type, limits).await
    }

    fn name(&self) -> &'static str {
        "subprocess"
    }
}

/// A container-backed execution tier. Not implemented in this build — no
/// container runtime ships with the judge host — but kept as the seam a
/// production deployment fills in ahead of `SubprocessBackend`.
pub struct ContainerBackend {
    inner: SubprocessBackend,
}

impl ContainerBackend {
    pub fn new() -> Self {
        Self { inner: SubprocessBackend::new() }
    }
}

impl Default for ContainerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionBackend for ContainerBackend {
    async fn execute(&self, submission: &Submission<'_>, limits: ExecutionLimits) -> Result<JudgeVerdict> {
        self.inner.execute(submission, limits).await
    }

    fn name(&self) -> &'static str {
        "container"
    }
}

/// Picks the best available backend. A real deployment probes for a
/// container runtime (docker/nsjail) here; without one we always hand
/// back the subprocess tier.
pub fn create_execution_backend() -> Box<dyn ExecutionBackend> {
    Box::new(SubprocessBackend::new())
}
