//! Duelcode: real-time competitive-coding duel runtime.
//!
//! Two participants race to solve an algorithmic problem; the first to pass
//! every test wins and ratings update. This crate owns the concurrent duel
//! runtime: matchmaking, problem selection, the event fabric that streams
//! code/test/lifecycle events between sessions, the AI-opponent simulator,
//! the code-execution judge, and ELO rating computation. Registration,
//! OAuth, and database schema migrations are out of scope.

pub mod ai_opponent;
pub mod config;
pub mod domain;
pub mod duel_engine;
pub mod fabric;
pub mod gateway;
pub mod judge;
pub mod problem;
pub mod rate_limit;
pub mod rating;
pub mod repository;
pub mod sweeper;

use thiserror::Error;

/// Crate-wide error taxonomy. Every subsystem returns one of these
/// variants rather than throwing; transport and session errors are kept
/// out of this type entirely since they must never affect duel state
/// (see `fabric::FabricError`).
#[derive(Error, Debug)]
pub enum DuelError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    #[error("judge error: {0}")]
    Judge(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DuelError>;
