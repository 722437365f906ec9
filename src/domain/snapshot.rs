//! `CodeSnapshot` — the append-only per-submission/test audit trail.

use super::{DuelId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnapshot {
    pub duel_ref: DuelId,
    pub user_ref: UserId,
    pub code: String,
    pub language: String,
    pub timestamp: DateTime<Utc>,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub execution_time_ms: u64,
    pub error_message: Option<String>,
}
