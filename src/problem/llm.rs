//! LLM-backed problem generation.
//!
//! Mirrors `competition::evaluator::ModelEvaluator`: the seam for a real
//! provider call lives here behind `LlmProvider`. `UnconfiguredProvider`
//! is the only implementation wired up in this build — every call fails
//! immediately so the chain falls through to the curated library — but
//! prompt construction and the attempt budget (`max_attempts`) are real,
//! so dropping in a live provider is a matter of implementing the trait
//! rather than rewriting this source.

use super::{GenerationExclusions, ProblemSource};
use crate::domain::{Difficulty, Problem, ProblemType};
use crate::{DuelError, Result};
use async_trait::async_trait;

/// A backend capable of turning a prompt into a candidate problem.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Problem>;
}

struct UnconfiguredProvider;

#[async_trait]
impl LlmProvider for UnconfiguredProvider {
    async fn complete(&self, _prompt: &str) -> Result<Problem> {
        Err(DuelError::Generation("no LLM provider configured".to_string()))
    }
}

/// §4.2: on validation failure, the caller retries generation up to this
/// many times before falling through to the next source.
const MAX_ATTEMPTS: u32 = 3;

pub struct LlmProblemSource {
    provider: Box<dyn LlmProvider>,
}

impl LlmProblemSource {
    pub fn new() -> Self {
        Self { provider: Box::new(UnconfiguredProvider) }
    }

    /// Construction seam for a real provider. Unused until one is wired
    /// up, but this is the point a production deployment plugs into.
    #[allow(dead_code)]
    pub fn with_provider(provider: Box<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    fn build_prompt(&self, difficulty: Difficulty, problem_type: &ProblemType, exclusions: &GenerationExclusions) -> String {
        format!(
            "Generate a {difficulty:?} {problem_type:?} algorithmic problem. \
             Avoid titles: {:?}. Avoid function names: {:?}.",
            exclusions.exclude_titles, exclusions.exclude_functions
        )
    }
}

impl Default for LlmProblemSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProblemSource for LlmProblemSource {
    async fn generate(
        &self,
        difficulty: Difficulty,
        problem_type: &ProblemType,
        exclusions: &GenerationExclusions,
    ) -> Result<Problem> {
        let prompt = self.build_prompt(difficulty, problem_type, exclusions);
        self.provider.complete(&prompt).await
    }

    fn name(&self) -> &'static str {
        "llm"
    }

    fn max_attempts(&self) -> u32 {
        MAX_ATTEMPTS
    }
}
