//! C4 — AI Opponent: a cooperative task simulating a human coding session.
//!
//! Ported from the original service's `_simulate_professional_coding`:
//! think for a difficulty-scaled delay, break a reference solution into
//! chunks the way a person would pause while typing, publish each chunk
//! as a code update with a pause in between, and stop — the AI never
//! calls submit, it only ever shows code.

use crate::config::AiThinkRange;
use crate::domain::{ai_opponent_user_id, DuelId, Problem};
use crate::fabric::{Envelope, EventFabric};
use rand::Rng;
use tokio::sync::watch;
use tracing::info;

/// Between-chunk pause, matching `chunk_pause = random.uniform(2, 8)`.
const CHUNK_PAUSE_MIN_SECS: f64 = 2.0;
const CHUNK_PAUSE_MAX_SECS: f64 = 8.0;

/// Pause after the final chunk lands, before the AI goes idle — mirrors a
/// person reviewing their own solution instead of submitting the instant
/// the last keystroke is typed.
const REVIEW_PAUSE_MIN_SECS: f64 = 3.0;
const REVIEW_PAUSE_MAX_SECS: f64 = 10.0;

/// A line longer than this forces a chunk break even mid-block, mirroring
/// `_break_code_into_chunks`'s 100-character cutoff.
const MAX_CHUNK_LINE_LEN: usize = 100;

/// Spawns the AI opponent's task for one duel. Returns a `watch::Sender`
/// the duel engine uses to cancel the simulation the instant the duel
/// reaches a terminal state — the AI must never block completion.
pub fn spawn(
    fabric: EventFabric,
    duel: DuelId,
    problem: Problem,
    think_range: AiThinkRange,
) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = tokio::spawn(run(fabric, duel, problem, think_range, cancel_rx));
    (cancel_tx, handle)
}

async fn run(
    fabric: EventFabric,
    duel: DuelId,
    problem: Problem,
    think_range: AiThinkRange,
    mut cancel: watch::Receiver<bool>,
) {
    let ai_user = ai_opponent_user_id();

    let think_secs = rand::thread_rng().gen_range(think_range.min_secs..=think_range.max_secs);
    info!(%duel, think_secs, "ai opponent thinking");
    if sleep_or_cancelled(think_secs as f64, &mut cancel).await {
        return;
    }

    let Some(solution) = problem.reference_solution.clone() else {
        info!(%duel, "ai opponent has no reference solution for this problem, staying idle");
        return;
    };

    fabric.broadcast(duel, Envelope::TypingStatus { user_id: ai_user, is_typing: true, timestamp: now_ms() }, None);

    let chunks = break_into_chunks(&solution);
    let mut accumulated = String::new();
    let mut cancelled = false;
    for chunk in chunks {
        if *cancel.borrow() {
            cancelled = true;
            break;
        }
        accumulated.push_str(&chunk);
        fabric.send_code_update(duel, ai_user, accumulated.clone(), "python".to_string(), None);

        let pause = rand::thread_rng().gen_range(CHUNK_PAUSE_MIN_SECS..=CHUNK_PAUSE_MAX_SECS);
        if sleep_or_cancelled(pause, &mut cancel).await {
            cancelled = true;
            break;
        }
    }

    fabric.broadcast(duel, Envelope::TypingStatus { user_id: ai_user, is_typing: false, timestamp: now_ms() }, None);

    if !cancelled {
        // One last look at the finished solution before going idle, the
        // same way a human pauses before (not) hitting submit.
        let review_pause = rand::thread_rng().gen_range(REVIEW_PAUSE_MIN_SECS..=REVIEW_PAUSE_MAX_SECS);
        sleep_or_cancelled(review_pause, &mut cancel).await;
    }

    info!(%duel, "ai opponent finished showing its solution without submitting");
}

/// Sleeps for `secs`, waking early (and returning `true`) if the duel is
/// cancelled mid-sleep.
async fn sleep_or_cancelled(secs: f64, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(tokio::time::Duration::from_secs_f64(secs.max(0.0))) => false,
        _ = cancel.changed() => true,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Splits `source` into human-sized typing chunks: a chunk ends at a
/// blank line, a line ending in `:` or `"""` (block boundaries), or once
/// it exceeds `MAX_CHUNK_LINE_LEN` characters — matching
/// `_break_code_into_chunks`.
fn break_into_chunks(source: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in source.split_inclusive('\n') {
        current.push_str(line);
        let trimmed = line.trim_end_matches('\n');
        let is_boundary = trimmed.trim_end().ends_with(':')
            || trimmed.trim_end().ends_with("\"\"\"")
            || trimmed.trim().is_empty()
            || current.len() > MAX_CHUNK_LINE_LEN;

        if is_boundary {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaks_at_block_boundaries() {
        let source = "def f(n):\n    if n == 0:\n        return 1\n    return n\n";
        let chunks = break_into_chunks(source);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks.concat(), source);
    }

    #[test]
    fn never_drops_characters() {
        let source = "a = 1\nb = 2\n\nc = a + b\n";
        let chunks = break_into_chunks(source);
        assert_eq!(chunks.concat(), source);
    }
}
