//! C6 — the duel state machine.
//!
//! Composes the judge, problem generator, event fabric, rating service and
//! AI opponent around the `Duel` aggregate. Generalizes the teacher's
//! `daemon::manager::SessionManager` (the thing that owns session lifecycle
//! and mutates shared state behind a registry) into the thing that owns
//! duel lifecycle: create, match, grade, complete.

use crate::ai_opponent;
use crate::config::Config;
use crate::domain::{
    CodeSnapshot, Difficulty, Duel, DuelId, DuelMode, DuelStatus, Participant, ProblemType, UserId,
};
use crate::fabric::{Envelope, EventFabric};
use crate::judge::{ExecutionBackend, ExecutionLimits, JudgeVerdict, Submission};
use crate::problem::ProblemGenerator;
use crate::rate_limit::RateLimiter;
use crate::rating::{synthetic_ai_rating, RatingService};
use crate::repository::Repository;
use crate::{DuelError, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};

/// The central orchestrator. One instance per process, shared behind an
/// `Arc` by the gateway and the sweeper.
pub struct DuelEngine {
    repo: Arc<Repository>,
    judge: Box<dyn ExecutionBackend>,
    problems: Arc<ProblemGenerator>,
    fabric: EventFabric,
    rating: Arc<RatingService>,
    config: Config,
    /// Cancel handles for in-flight AI-opponent simulations, keyed by duel.
    /// A duel reaching any terminal state removes and fires its entry so
    /// the simulation task stops promptly instead of outliving the duel.
    ai_cancels: Mutex<std::collections::HashMap<DuelId, watch::Sender<bool>>>,
    /// Throttles the only two paths that reach the judge (§4.6).
    rate_limiter: RateLimiter,
}

impl DuelEngine {
    pub fn new(
        repo: Arc<Repository>,
        judge: Box<dyn ExecutionBackend>,
        problems: Arc<ProblemGenerator>,
        fabric: EventFabric,
        rating: Arc<RatingService>,
        config: Config,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_max_actions, config.rate_limit_window);
        Self {
            repo,
            judge,
            problems,
            fabric,
            rating,
            config,
            ai_cancels: Mutex::new(std::collections::HashMap::new()),
            rate_limiter,
        }
    }

    /// Creates a new duel for `user`. Any Waiting duel the caller already
    /// has is cancelled first; a repeat call while any duel is already
    /// in progress returns that duel rather than creating a second one
    /// (§4.1).
    pub async fn create_duel(
        &self,
        user: UserId,
        mode: DuelMode,
        difficulty: Difficulty,
        problem_type: ProblemType,
        room_code: Option<String>,
    ) -> Result<Duel> {
        if let Some(existing) = self.repo.active_duel_for_user(user)? {
            match existing.status {
                DuelStatus::Waiting => {
                    self.cancel_duel(existing.id, user)?;
                }
                // Any in-progress duel is returned idempotently (§4.1); a
                // caller re-POSTing `create` shouldn't spawn a second duel
                // out from under their existing one.
                DuelStatus::InProgress => return Ok(existing),
                _ => {}
            }
        }

        let mut duel = Duel::new_waiting(mode, difficulty, problem_type.clone(), room_code);
        let rating = self.rating.rating_for(user)?;
        duel.participants
            .push(Participant::new_human(duel.id, user, rating.elo, "python".to_string()));

        if mode == DuelMode::AiOpponent {
            let problem = self.problems.select_problem(&[user], difficulty, &problem_type).await?;
            let ai_rating = synthetic_ai_rating(difficulty);
            duel.participants.push(Participant::new_ai(duel.id, difficulty, ai_rating));
            duel.problem_ref = Some(problem.id);
            duel.status = DuelStatus::InProgress;
            duel.started_at = Some(Utc::now());
            self.repo.save_duel(&duel)?;

            let think_range = self
                .config
                .ai_think_range_by_difficulty
                .get(&difficulty)
                .cloned()
                .unwrap_or(crate::config::AiThinkRange { min_secs: 30, max_secs: 90 });
            let (cancel_tx, _handle) =
                ai_opponent::spawn(self.fabric.clone(), duel.id, problem, think_range);
            self.ai_cancels
                .lock()
                .expect("ai_cancels poisoned")
                .insert(duel.id, cancel_tx);

            info!(duel = %duel.id, %user, "created ai-opponent duel");
        } else {
            self.repo.save_duel(&duel)?;
            info!(duel = %duel.id, %user, ?mode, "created waiting duel");
        }

        Ok(duel)
    }

    /// Matches `user` into the oldest eligible Waiting duel (or one keyed
    /// by `room_code`). FIFO, and atomic against a second caller matching
    /// into the same duel (§4.1, §5).
    pub async fn join_duel(
        &self,
        user: UserId,
        room_code: Option<String>,
        difficulty: Option<Difficulty>,
    ) -> Result<Duel> {
        if let Some(existing) = self.repo.active_duel_for_user(user)? {
            match existing.status {
                DuelStatus::InProgress => return Ok(existing),
                DuelStatus::Waiting => {
                    return Err(DuelError::Conflict(
                        "you already have a waiting duel".to_string(),
                    ));
                }
                _ => {}
            }
        }

        let mode = if room_code.is_some() { DuelMode::PrivateRoom } else { DuelMode::RandomPlayer };
        let Some(mut duel) =
            self.repo.claim_waiting_duel_for_join(mode, difficulty, room_code.as_deref(), user)?
        else {
            return Err(DuelError::NotFound("no waiting duel available to join".to_string()));
        };

        let rating = self.rating.rating_for(user)?;
        duel.participants
            .push(Participant::new_human(duel.id, user, rating.elo, "python".to_string()));

        let participants: Vec<UserId> = duel.participants.iter().filter_map(|p| p.user_ref).collect();
        let problem = self
            .problems
            .select_problem(&participants, duel.difficulty, &duel.problem_type)
            .await?;
        duel.problem_ref = Some(problem.id);
        duel.started_at = Some(Utc::now());
        self.repo.save_duel(&duel)?;

        self.fabric.broadcast(
            duel.id,
            Envelope::DuelStarted { duel_id: duel.id, timestamp: Utc::now().timestamp_millis() },
            None,
        );
        info!(duel = %duel.id, %user, "joined duel");

        Ok(duel)
    }

    /// Grades `code` against the visible test cases only. Never completes
    /// the duel (§4.1, §4.6).
    pub async fn test_code(
        &self,
        duel_id: DuelId,
        user: UserId,
        code: String,
        language: String,
    ) -> Result<JudgeVerdict> {
        let duel = self.repo.require_duel(duel_id)?;
        self.require_in_progress_participant(&duel, user)?;

        self.rate_limiter.check(user)?;

        let problem_id = duel
            .problem_ref
            .ok_or_else(|| DuelError::Infrastructure("in-progress duel missing a bound problem".into()))?;
        let problem = self.repo.require_problem(problem_id)?;
        let visible: Vec<crate::domain::TestCase> = problem.visible_cases().cloned().collect();

        let limits = ExecutionLimits::for_difficulty(
            self.config.submission_time_limit,
            self.config.submission_memory_mb,
            duel.difficulty,
        );
        let verdict = self
            .run_judge(
                &Submission {
                    language: &language,
                    code: &code,
                    function_name: &problem.function_name,
                    parameter_signature: &problem.parameter_signature,
                    test_cases: &visible,
                    problem_type: &problem.problem_type,
                },
                limits,
            )
            .await?;

        let passed = verdict.tests_passed();
        let total = verdict.total_tests(visible.len() as u32);

        self.repo.append_snapshot(&CodeSnapshot {
            duel_ref: duel.id,
            user_ref: user,
            code,
            language,
            timestamp: Utc::now(),
            tests_passed: passed,
            tests_failed: total.saturating_sub(passed),
            execution_time_ms: execution_time_ms(&verdict).unwrap_or(0),
            error_message: judge_error_message(&verdict),
        })?;

        self.fabric.broadcast(
            duel.id,
            Envelope::TestResult {
                user_id: user,
                passed,
                failed: total.saturating_sub(passed),
                total,
                execution_time_ms: execution_time_ms(&verdict),
                error: judge_error_message(&verdict),
                progress_percent: percent(passed, total),
                is_correct: verdict.is_accepted(),
            },
            None,
        );

        Ok(verdict)
    }

    /// Grades `code` against every test case. A full pass wins the duel
    /// unless someone else's submission already committed first (§4.1,
    /// §5): the win claim and the submission race are both resolved
    /// transactionally in the repository, not here.
    pub async fn submit_code(
        &self,
        duel_id: DuelId,
        user: UserId,
        code: String,
        language: String,
    ) -> Result<JudgeVerdict> {
        let duel = self.repo.require_duel(duel_id)?;
        self.require_in_progress_participant(&duel, user)?;
        self.rate_limiter.check(user)?;

        let problem_id = duel
            .problem_ref
            .ok_or_else(|| DuelError::Infrastructure("in-progress duel missing a bound problem".into()))?;
        let problem = self.repo.require_problem(problem_id)?;

        let limits = ExecutionLimits::for_difficulty(
            self.config.submission_time_limit,
            self.config.submission_memory_mb,
            duel.difficulty,
        );
        let verdict = self
            .run_judge(
                &Submission {
                    language: &language,
                    code: &code,
                    function_name: &problem.function_name,
                    parameter_signature: &problem.parameter_signature,
                    test_cases: &problem.test_cases,
                    problem_type: &problem.problem_type,
                },
                limits,
            )
            .await?;

        let passed = verdict.tests_passed();
        let total = verdict.total_tests(problem.test_cases.len() as u32);
        let is_full_pass = verdict.is_accepted() && total > 0 && passed == total;

        let now = Utc::now();
        let solve_seconds = duel.started_at.map(|started| (now - started).num_seconds());

        self.repo.append_snapshot(&CodeSnapshot {
            duel_ref: duel.id,
            user_ref: user,
            code: code.clone(),
            language: language.clone(),
            timestamp: now,
            tests_passed: passed,
            tests_failed: total.saturating_sub(passed),
            execution_time_ms: execution_time_ms(&verdict).unwrap_or(0),
            error_message: judge_error_message(&verdict),
        })?;
        self.repo
            .record_submission(duel.id, user, passed, total, code, language, now, solve_seconds)?;
        self.problems
            .record_attempt(user, &problem, duel.id, is_full_pass, passed, total, solve_seconds)?;

        let just_completed = if is_full_pass {
            self.repo.try_win_and_complete(duel.id, user, now, solve_seconds)?
        } else {
            false
        };

        self.fabric.broadcast(
            duel.id,
            Envelope::TestResult {
                user_id: user,
                passed,
                failed: total.saturating_sub(passed),
                total,
                execution_time_ms: execution_time_ms(&verdict),
                error: judge_error_message(&verdict),
                progress_percent: percent(passed, total),
                is_correct: is_full_pass,
            },
            None,
        );

        if just_completed {
            self.complete_duel(duel.id).await?;
        }

        Ok(verdict)
    }

    /// Cancels a Waiting duel. A no-op on any duel already past Waiting
    /// (§4.1).
    pub fn cancel_duel(&self, duel_id: DuelId, user: UserId) -> Result<Duel> {
        let mut duel = self.repo.require_duel(duel_id)?;
        if !duel.has_participant(user) {
            return Err(DuelError::Forbidden("not a participant in this duel".to_string()));
        }
        if duel.status != DuelStatus::Waiting {
            return Ok(duel);
        }
        duel.status = DuelStatus::Cancelled;
        duel.completed_at = Some(Utc::now());
        self.repo.save_duel(&duel)?;
        Ok(duel)
    }

    /// Cancels a stale Waiting duel on the sweeper's behalf. Idempotent for
    /// the same reason as `cancel_duel`.
    pub fn cancel_stale_waiting(&self, duel_id: DuelId) -> Result<Duel> {
        let mut duel = self.repo.require_duel(duel_id)?;
        if duel.status != DuelStatus::Waiting {
            return Ok(duel);
        }
        duel.status = DuelStatus::Cancelled;
        duel.completed_at = Some(Utc::now());
        self.repo.save_duel(&duel)?;
        warn!(duel = %duel_id, "cancelled stale waiting duel");
        Ok(duel)
    }

    /// Times out an in-progress duel that has run past its deadline. No
    /// winner is recorded and ratings are left untouched.
    pub async fn time_out_in_progress(&self, duel_id: DuelId) -> Result<Duel> {
        let mut duel = self.repo.require_duel(duel_id)?;
        if duel.status != DuelStatus::InProgress {
            return Ok(duel);
        }

        self.cancel_ai_task(duel_id);

        let completed_at = Utc::now();
        duel.status = DuelStatus::TimedOut;
        duel.completed_at = Some(completed_at);
        duel.duration_seconds = duel.started_at.map(|s| (completed_at - s).num_seconds());
        self.repo.save_duel(&duel)?;
        warn!(duel = %duel_id, "timed out in-progress duel");

        self.fabric.broadcast(
            duel.id,
            Envelope::DuelComplete {
                winner_id: None,
                usernames: BTreeMap::new(),
                solve_time_seconds: duel.duration_seconds,
                rating_deltas: BTreeMap::new(),
            },
            None,
        );
        self.schedule_close(duel.id);

        Ok(duel)
    }

    /// Finalizes a duel whose winner has just been atomically claimed:
    /// cancels any AI simulation, applies rating updates, publishes
    /// `duel_complete`, and closes the event fabric after a short grace
    /// period so the completion payload has time to land before sessions
    /// are torn down.
    async fn complete_duel(&self, duel_id: DuelId) -> Result<Duel> {
        let mut duel = self.repo.require_duel(duel_id)?;

        self.cancel_ai_task(duel_id);
        self.rating.apply_duel_completion(&duel)?;

        let mut rating_deltas = BTreeMap::new();
        for participant in duel.participants.iter_mut().filter(|p| !p.is_ai) {
            let Some(user) = participant.user_ref else { continue };
            let updated = self.rating.rating_for(user)?;
            let delta = updated.elo - participant.rating_before;
            participant.rating_after = Some(updated.elo);
            participant.rating_delta = Some(delta);
            rating_deltas.insert(user, delta);
        }
        self.repo.save_duel(&duel)?;

        info!(duel = %duel.id, winner = ?duel.winner().and_then(|w| w.user_ref), "duel completed");

        self.fabric.broadcast(
            duel.id,
            Envelope::DuelComplete {
                winner_id: duel.winner().and_then(|w| w.user_ref),
                // Usernames live outside this crate's scope; clients
                // resolve them from their own user directory.
                usernames: BTreeMap::new(),
                solve_time_seconds: duel.duration_seconds,
                rating_deltas,
            },
            None,
        );
        self.schedule_close(duel.id);

        Ok(duel)
    }

    fn cancel_ai_task(&self, duel_id: DuelId) {
        if let Some(cancel) = self.ai_cancels.lock().expect("ai_cancels poisoned").remove(&duel_id) {
            let _ = cancel.send(true);
        }
    }

    /// Closes the fabric's sessions for `duel` three seconds after a
    /// terminal broadcast, giving clients time to receive it before the
    /// channel disappears out from under them.
    fn schedule_close(&self, duel_id: DuelId) {
        let fabric = self.fabric.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            fabric.close(duel_id);
        });
    }

    fn require_in_progress_participant(&self, duel: &Duel, user: UserId) -> Result<()> {
        if !duel.has_participant(user) {
            return Err(DuelError::Forbidden("not a participant in this duel".to_string()));
        }
        if duel.status != DuelStatus::InProgress {
            return Err(DuelError::Conflict("duel is not in progress".to_string()));
        }
        Ok(())
    }

    /// Runs the submission once; a `SystemError` (infrastructure failure
    /// unrelated to the candidate's code) is retried a single time before
    /// being surfaced as an error the gateway turns into a 5xx (§7).
    async fn run_judge(&self, submission: &Submission<'_>, limits: ExecutionLimits) -> Result<JudgeVerdict> {
        let verdict = self.judge.execute(submission, limits).await?;
        if let JudgeVerdict::SystemError { message } = &verdict {
            warn!(error = %message, "judge system error, retrying once");
            let retry = self.judge.execute(submission, limits).await?;
            if let JudgeVerdict::SystemError { message } = &retry {
                return Err(DuelError::Judge(message.clone()));
            }
            return Ok(retry);
        }
        Ok(verdict)
    }
}

fn percent(passed: u32, total: u32) -> u32 {
    if total == 0 {
        0
    } else {
        passed * 100 / total
    }
}

fn execution_time_ms(verdict: &JudgeVerdict) -> Option<u64> {
    match verdict {
        JudgeVerdict::Accepted { execution_time_ms, .. } | JudgeVerdict::WrongAnswer { execution_time_ms, .. } => {
            Some(*execution_time_ms)
        }
        _ => None,
    }
}

fn judge_error_message(verdict: &JudgeVerdict) -> Option<String> {
    match verdict {
        JudgeVerdict::CompileError { message }
        | JudgeVerdict::RuntimeError { message }
        | JudgeVerdict::SystemError { message } => Some(message.clone()),
        JudgeVerdict::SecurityViolation { reason } => Some(reason.clone()),
        JudgeVerdict::TimeLimitExceeded => Some("time limit exceeded".to_string()),
        JudgeVerdict::MemoryLimitExceeded => Some("memory limit exceeded".to_string()),
        _ => None,
    }
}
