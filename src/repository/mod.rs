//! SQLite-backed persistence for all six entities of the data model.
//!
//! Mirrors the teacher's `state::StateStore` (`state/mod.rs`): WAL mode, a
//! `schema_migrations` marker table, and hand-rolled row (de)serialization
//! rather than an ORM. Generalized from one table (`sessions`) to six, and
//! from a single-threaded CLI's `Connection` to one shared across the
//! duel runtime's concurrent tasks behind a `Mutex` — `rusqlite::Connection`
//! is `!Sync`, so callers on different tokio tasks still only ever touch
//! it one at a time.

mod duels;
mod history;
mod problems;
mod ratings;
mod snapshots;

use crate::{DuelError, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// Shared SQLite store. Cheap to clone (wraps an `Arc` internally via the
/// owning `Mutex` not being cloned — callers hold this behind their own
/// `Arc<Repository>`, matching how `duel_engine` and `gateway` share it).
pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.init_schema()?;
        Ok(repo)
    }

    /// In-memory database, used by integration tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.init_schema()?;
        Ok(repo)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS schema_migrations (
              version INTEGER PRIMARY KEY,
              applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS duels (
              id TEXT PRIMARY KEY,
              mode TEXT NOT NULL,
              status TEXT NOT NULL,
              difficulty TEXT NOT NULL,
              problem_type TEXT NOT NULL,
              problem_id TEXT,
              room_code TEXT,
              created_at TEXT NOT NULL,
              started_at TEXT,
              completed_at TEXT,
              duration_seconds INTEGER,
              updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_duels_status_updated_at ON duels(status, updated_at);
            CREATE INDEX IF NOT EXISTS idx_duels_status ON duels(status);
            CREATE INDEX IF NOT EXISTS idx_duels_room_code ON duels(room_code);

            CREATE TABLE IF NOT EXISTS participants (
              duel_id TEXT NOT NULL REFERENCES duels(id),
              seq INTEGER NOT NULL,
              user_id TEXT,
              is_ai INTEGER NOT NULL,
              ai_difficulty TEXT,
              rating_before INTEGER NOT NULL,
              rating_after INTEGER,
              rating_delta INTEGER,
              is_winner INTEGER NOT NULL,
              submission_time TEXT,
              solve_duration_seconds INTEGER,
              tests_passed INTEGER NOT NULL,
              total_tests INTEGER NOT NULL,
              final_code TEXT,
              language TEXT NOT NULL,
              PRIMARY KEY (duel_id, seq)
            );
            CREATE INDEX IF NOT EXISTS idx_participants_user_id ON participants(user_id);

            CREATE TABLE IF NOT EXISTS problems (
              id TEXT PRIMARY KEY,
              title TEXT NOT NULL,
              description TEXT NOT NULL,
              difficulty TEXT NOT NULL,
              problem_type TEXT NOT NULL,
              fingerprint TEXT NOT NULL UNIQUE,
              function_name TEXT NOT NULL,
              parameter_signature TEXT NOT NULL,
              starter_code TEXT NOT NULL,
              test_cases TEXT NOT NULL,
              constraints TEXT NOT NULL,
              hints TEXT NOT NULL,
              times_used INTEGER NOT NULL,
              last_used_at TEXT,
              reference_solution TEXT,
              from_fallback_library INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_problems_last_used_at ON problems(last_used_at);

            CREATE TABLE IF NOT EXISTS player_ratings (
              user_id TEXT PRIMARY KEY,
              elo INTEGER NOT NULL,
              rank TEXT NOT NULL,
              wins INTEGER NOT NULL,
              losses INTEGER NOT NULL,
              draws INTEGER NOT NULL,
              total_duels INTEGER NOT NULL,
              current_streak INTEGER NOT NULL,
              best_streak INTEGER NOT NULL,
              avg_solve_seconds REAL,
              fastest_solve_seconds INTEGER,
              xp INTEGER NOT NULL,
              level INTEGER NOT NULL,
              last_duel_at TEXT,
              achievements TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_player_ratings_elo ON player_ratings(elo);

            CREATE TABLE IF NOT EXISTS user_problem_history (
              user_id TEXT NOT NULL,
              problem_id TEXT NOT NULL,
              duel_id TEXT NOT NULL,
              fingerprint TEXT NOT NULL,
              used_at TEXT NOT NULL,
              solved INTEGER NOT NULL,
              tests_passed INTEGER NOT NULL,
              total_tests INTEGER NOT NULL,
              solve_duration_seconds INTEGER,
              reported_as_duplicate INTEGER NOT NULL,
              PRIMARY KEY (user_id, problem_id, duel_id)
            );
            CREATE INDEX IF NOT EXISTS idx_history_user_fingerprint ON user_problem_history(user_id, fingerprint);

            CREATE TABLE IF NOT EXISTS code_snapshots (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              duel_id TEXT NOT NULL REFERENCES duels(id),
              user_id TEXT NOT NULL,
              code TEXT NOT NULL,
              language TEXT NOT NULL,
              timestamp TEXT NOT NULL,
              tests_passed INTEGER NOT NULL,
              tests_failed INTEGER NOT NULL,
              execution_time_ms INTEGER NOT NULL,
              error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_duel_id ON code_snapshots(duel_id);
            "#,
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES(1, ?1)",
            [Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }
}

pub(crate) fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DuelError::Infrastructure(format!("invalid timestamp '{value}': {e}")))
}

pub(crate) fn to_sql_err(err: DuelError) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(err))
}

pub(crate) fn bool_to_int(b: bool) -> i64 {
    if b {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(i: i64) -> bool {
    i != 0
}
