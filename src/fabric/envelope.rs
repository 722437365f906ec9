//! The wire message taxonomy exchanged over a duel's streaming channel
//! (§4.5). Tagged exactly like the original service's JSON dicts, so a
//! client written against that service's messages needs no changes.

use crate::domain::{Difficulty, DuelId, ProblemType, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    CodeUpdate {
        user_id: UserId,
        code: String,
        language: String,
        cursor_position: Option<serde_json::Value>,
        timestamp: i64,
    },
    TypingStatus {
        user_id: UserId,
        is_typing: bool,
        timestamp: i64,
    },
    TestCode {
        code: String,
        language: String,
    },
    TestResult {
        user_id: UserId,
        passed: u32,
        failed: u32,
        total: u32,
        execution_time_ms: Option<u64>,
        error: Option<String>,
        progress_percent: u32,
        is_correct: bool,
    },
    DuelStarted {
        duel_id: DuelId,
        timestamp: i64,
    },
    DuelComplete {
        winner_id: Option<UserId>,
        usernames: BTreeMap<UserId, String>,
        solve_time_seconds: Option<i64>,
        rating_deltas: BTreeMap<UserId, i32>,
    },
    UserStatus {
        user_id: UserId,
        status: String,
    },
    Ping {
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
    /// Full snapshot sent on (re)connect so a reconnecting client can
    /// catch up without replaying history.
    DuelState {
        duel_id: DuelId,
        status: String,
        difficulty: Difficulty,
        problem_type: ProblemType,
        code_by_user: BTreeMap<UserId, String>,
    },
    /// Internal-only: sent to an evicted session when a newer connection
    /// takes its place. Never appears in the wire taxonomy table — the
    /// gateway translates this into WebSocket close code 4000.
    Replaced,
}
