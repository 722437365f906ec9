//! The `Duel` aggregate and its state machine.

use super::{DuelId, ProblemId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a duel was (or is to be) matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelMode {
    RandomPlayer,
    AiOpponent,
    PrivateRoom,
}

/// The duel's lifecycle state. Transitions are owned exclusively by the
/// duel engine (`crate::duel_engine`); terminal variants have no outbound
/// edges (invariant 4 of the data model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
    TimedOut,
}

impl DuelStatus {
    /// Terminal states never transition out (invariant 4).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DuelStatus::Completed | DuelStatus::Cancelled | DuelStatus::TimedOut
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, DuelStatus::Waiting | DuelStatus::InProgress)
    }
}

/// Difficulty band; also used to key AI behavior profiles and problem
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

/// The category of algorithmic problem requested; also drives comparison
/// semantics in the judge (set-typed problems compare order-insensitively).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Array,
    String,
    Graph,
    DynamicProgramming,
    Tree,
    SetOperations,
    Other(String),
}

/// One side of a duel: a human user or the simulated AI opponent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub duel_ref: DuelId,
    /// `None` iff `is_ai` is true — exactly one of the pair is set.
    pub user_ref: Option<UserId>,
    pub is_ai: bool,
    pub ai_difficulty: Option<Difficulty>,
    pub rating_before: i32,
    pub rating_after: Option<i32>,
    pub rating_delta: Option<i32>,
    pub is_winner: bool,
    pub submission_time: Option<DateTime<Utc>>,
    pub solve_duration_seconds: Option<i64>,
    pub tests_passed: u32,
    pub total_tests: u32,
    pub final_code: Option<String>,
    pub language: String,
}

impl Participant {
    pub fn new_human(duel_ref: DuelId, user_ref: UserId, rating_before: i32, language: String) -> Self {
        Self {
            duel_ref,
            user_ref: Some(user_ref),
            is_ai: false,
            ai_difficulty: None,
            rating_before,
            rating_after: None,
            rating_delta: None,
            is_winner: false,
            submission_time: None,
            solve_duration_seconds: None,
            tests_passed: 0,
            total_tests: 0,
            final_code: None,
            language,
        }
    }

    pub fn new_ai(duel_ref: DuelId, difficulty: Difficulty, rating: i32) -> Self {
        Self {
            duel_ref,
            user_ref: None,
            is_ai: true,
            ai_difficulty: Some(difficulty),
            rating_before: rating,
            rating_after: None,
            rating_delta: None,
            is_winner: false,
            submission_time: None,
            solve_duration_seconds: None,
            tests_passed: 0,
            total_tests: 0,
            final_code: None,
            language: "python".to_string(),
        }
    }

    /// `true` when this participant represents `user`.
    pub fn belongs_to(&self, user: UserId) -> bool {
        self.user_ref == Some(user)
    }
}

/// The central aggregate. Owns its participants inline (Design Note §9:
/// the original's cyclic duel/participant/snapshot graph is collapsed to a
/// single aggregate; other entities reach the duel by id only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Duel {
    pub id: DuelId,
    pub mode: DuelMode,
    pub status: DuelStatus,
    pub difficulty: Difficulty,
    pub problem_type: ProblemType,
    pub problem_ref: Option<ProblemId>,
    pub room_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub participants: Vec<Participant>,
}

impl Duel {
    pub fn new_waiting(
        mode: DuelMode,
        difficulty: Difficulty,
        problem_type: ProblemType,
        room_code: Option<String>,
    ) -> Self {
        Self {
            id: DuelId::new(),
            mode,
            status: DuelStatus::Waiting,
            difficulty,
            problem_type,
            problem_ref: None,
            room_code,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            participants: Vec::new(),
        }
    }

    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.iter().any(|p| p.belongs_to(user))
    }

    pub fn participant(&self, user: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.belongs_to(user))
    }

    pub fn participant_mut(&mut self, user: UserId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.belongs_to(user))
    }

    pub fn human_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| !p.is_ai)
    }

    pub fn winner(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_winner)
    }

    /// Invariant 3: at most one winner.
    pub fn winner_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_winner).count()
    }

    /// Invariant 2: `InProgress` implies a bound problem, a start time, and
    /// exactly two participants.
    pub fn check_in_progress_invariant(&self) -> bool {
        self.status != DuelStatus::InProgress
            || (self.problem_ref.is_some()
                && self.started_at.is_some()
                && self.participants.len() == 2)
    }
}
