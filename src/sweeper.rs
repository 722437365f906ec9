//! C9 — the background sweep that enforces duel timeouts.
//!
//! Mirrors the teacher's habit of a small periodic task driven by
//! `tokio::time::interval` rather than a cron-style scheduler external to
//! the process (see the daemon's session idle checks). Every tick asks the
//! repository for stale duels and hands each one to the duel engine's
//! timeout operations; the engine owns what "stale" means for a duel's
//! lifecycle, this loop only owns the polling cadence.

use crate::duel_engine::DuelEngine;
use crate::repository::Repository;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// How often the sweep runs. Independent of any single duel's timeout —
/// this just bounds how late a timeout is noticed.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct Sweeper {
    repo: Arc<Repository>,
    engine: Arc<DuelEngine>,
    waiting_timeout_random: ChronoDuration,
    waiting_timeout_ai: ChronoDuration,
    waiting_timeout_private: ChronoDuration,
    in_progress_timeout: ChronoDuration,
}

impl Sweeper {
    pub fn new(
        repo: Arc<Repository>,
        engine: Arc<DuelEngine>,
        waiting_timeout_random: Duration,
        waiting_timeout_ai: Duration,
        waiting_timeout_private: Duration,
        in_progress_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            engine,
            waiting_timeout_random: to_chrono(waiting_timeout_random),
            waiting_timeout_ai: to_chrono(waiting_timeout_ai),
            waiting_timeout_private: to_chrono(waiting_timeout_private),
            in_progress_timeout: to_chrono(in_progress_timeout),
        }
    }

    /// Runs the sweep loop forever. Intended to be spawned as its own
    /// task at startup; a sweep failure is logged and the loop continues
    /// rather than taking the whole process down.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "sweep pass failed");
            }
        }
    }

    /// Runs a single sweep pass. Exposed for the operator CLI's
    /// `sweep-once` subcommand and for tests.
    pub async fn sweep_once(&self) -> crate::Result<()> {
        let (waiting_stale, in_progress_stale) = self.repo.stale_duels(
            self.waiting_timeout_random,
            self.waiting_timeout_ai,
            self.waiting_timeout_private,
            self.in_progress_timeout,
        )?;

        for duel in &waiting_stale {
            if let Err(e) = self.engine.cancel_stale_waiting(duel.id) {
                error!(duel = %duel.id, error = %e, "failed to cancel stale waiting duel");
            }
        }
        for duel in &in_progress_stale {
            if let Err(e) = self.engine.time_out_in_progress(duel.id).await {
                error!(duel = %duel.id, error = %e, "failed to time out in-progress duel");
            }
        }

        if !waiting_stale.is_empty() || !in_progress_stale.is_empty() {
            info!(
                cancelled = waiting_stale.len(),
                timed_out = in_progress_stale.len(),
                "sweep pass complete"
            );
        }

        Ok(())
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::zero())
}
