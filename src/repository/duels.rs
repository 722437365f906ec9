//! Duel and participant persistence.

use super::{bool_to_int, int_to_bool, parse_rfc3339, to_sql_err, Repository};
use crate::domain::{
    Difficulty, Duel, DuelId, DuelMode, DuelStatus, Participant, ProblemId, ProblemType, UserId,
};
use crate::{DuelError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl Repository {
    /// Inserts or replaces a duel and its full participant list in one
    /// transaction — the aggregate is always written as a unit.
    pub fn save_duel(&self, duel: &Duel) -> Result<()> {
        let mut conn = self.conn.lock().expect("repository connection poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            r#"
            INSERT INTO duels (
              id, mode, status, difficulty, problem_type, problem_id, room_code,
              created_at, started_at, completed_at, duration_seconds, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
              status = excluded.status,
              problem_id = excluded.problem_id,
              started_at = excluded.started_at,
              completed_at = excluded.completed_at,
              duration_seconds = excluded.duration_seconds,
              updated_at = excluded.updated_at
            "#,
            params![
                duel.id.to_string(),
                mode_to_str(duel.mode),
                status_to_str(duel.status),
                difficulty_to_str(duel.difficulty),
                problem_type_to_str(&duel.problem_type),
                duel.problem_ref.map(|p| p.to_string()),
                duel.room_code,
                duel.created_at.to_rfc3339(),
                duel.started_at.map(|t| t.to_rfc3339()),
                duel.completed_at.map(|t| t.to_rfc3339()),
                duel.duration_seconds,
                now,
            ],
        )?;

        tx.execute("DELETE FROM participants WHERE duel_id = ?1", [duel.id.to_string()])?;
        for (seq, p) in duel.participants.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO participants (
                  duel_id, seq, user_id, is_ai, ai_difficulty, rating_before, rating_after,
                  rating_delta, is_winner, submission_time, solve_duration_seconds,
                  tests_passed, total_tests, final_code, language
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
                params![
                    duel.id.to_string(),
                    seq as i64,
                    p.user_ref.map(|u| u.to_string()),
                    bool_to_int(p.is_ai),
                    p.ai_difficulty.map(difficulty_to_str),
                    p.rating_before,
                    p.rating_after,
                    p.rating_delta,
                    bool_to_int(p.is_winner),
                    p.submission_time.map(|t| t.to_rfc3339()),
                    p.solve_duration_seconds,
                    p.tests_passed,
                    p.total_tests,
                    p.final_code,
                    p.language,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_duel(&self, id: DuelId) -> Result<Option<Duel>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let duel = Self::load_duel_row(&conn, id)?;
        Ok(duel)
    }

    pub fn require_duel(&self, id: DuelId) -> Result<Duel> {
        self.get_duel(id)?
            .ok_or_else(|| DuelError::NotFound(format!("duel {id} not found")))
    }

    /// Duels a user currently has active (`waiting` or `in_progress`),
    /// backing the "one active duel per user" rule (§4.1).
    pub fn active_duel_for_user(&self, user: UserId) -> Result<Option<Duel>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT d.id FROM duels d
            JOIN participants p ON p.duel_id = d.id
            WHERE p.user_id = ?1 AND d.status IN ('waiting', 'in_progress')
            ORDER BY d.created_at DESC LIMIT 1
            "#,
        )?;
        let id: Option<String> = stmt
            .query_row([user.to_string()], |row| row.get(0))
            .optional()?;
        match id {
            Some(id) => {
                let duel_id: DuelId = id.parse().map_err(|_| {
                    DuelError::Infrastructure("corrupt duel id in participants table".into())
                })?;
                Self::load_duel_row(&conn, duel_id)
            }
            None => Ok(None),
        }
    }

    /// The oldest `waiting` duel of the given mode/difficulty not created
    /// by `exclude_user`, for FIFO matchmaking (§4.1).
    pub fn oldest_waiting_duel(
        &self,
        mode: DuelMode,
        difficulty: Difficulty,
        exclude_user: UserId,
    ) -> Result<Option<Duel>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let mut stmt = conn.prepare(
            r#"
            SELECT d.id FROM duels d
            WHERE d.status = 'waiting' AND d.mode = ?1 AND d.difficulty = ?2
              AND NOT EXISTS (
                SELECT 1 FROM participants p WHERE p.duel_id = d.id AND p.user_id = ?3
              )
            ORDER BY d.created_at ASC LIMIT 1
            "#,
        )?;
        let id: Option<String> = stmt
            .query_row(
                params![mode_to_str(mode), difficulty_to_str(difficulty), exclude_user.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => {
                let duel_id: DuelId = id.parse().map_err(|_| {
                    DuelError::Infrastructure("corrupt duel id in duels table".into())
                })?;
                Self::load_duel_row(&conn, duel_id)
            }
            None => Ok(None),
        }
    }

    /// Atomically claims the oldest eligible `waiting` duel for joining,
    /// flipping it to `in_progress` within the same transaction that finds
    /// it. Two concurrent joiners therefore can never pair into the same
    /// duel — the second one's `SELECT` simply no longer sees it (§4.1,
    /// §5 "row-level locking"; this connection's single mutex plays that
    /// role since SQLite has no true row locks).
    ///
    /// The returned duel reflects the flipped status but not yet a bound
    /// problem or second participant — the caller fills those in and calls
    /// `save_duel` to finish the join.
    pub fn claim_waiting_duel_for_join(
        &self,
        mode: DuelMode,
        difficulty: Option<Difficulty>,
        room_code: Option<&str>,
        exclude_user: UserId,
    ) -> Result<Option<Duel>> {
        let mut conn = self.conn.lock().expect("repository connection poisoned");
        let tx = conn.transaction()?;

        let id: Option<String> = if let Some(code) = room_code {
            tx.query_row(
                r#"
                SELECT id FROM duels
                WHERE status = 'waiting' AND room_code = ?1
                  AND NOT EXISTS (SELECT 1 FROM participants p WHERE p.duel_id = duels.id AND p.user_id = ?2)
                LIMIT 1
                "#,
                params![code, exclude_user.to_string()],
                |row| row.get(0),
            )
            .optional()?
        } else if let Some(d) = difficulty {
            tx.query_row(
                r#"
                SELECT id FROM duels
                WHERE status = 'waiting' AND mode = ?1 AND difficulty = ?2
                  AND NOT EXISTS (SELECT 1 FROM participants p WHERE p.duel_id = duels.id AND p.user_id = ?3)
                ORDER BY created_at ASC LIMIT 1
                "#,
                params![mode_to_str(mode), difficulty_to_str(d), exclude_user.to_string()],
                |row| row.get(0),
            )
            .optional()?
        } else {
            tx.query_row(
                r#"
                SELECT id FROM duels
                WHERE status = 'waiting' AND mode = ?1
                  AND NOT EXISTS (SELECT 1 FROM participants p WHERE p.duel_id = duels.id AND p.user_id = ?2)
                ORDER BY created_at ASC LIMIT 1
                "#,
                params![mode_to_str(mode), exclude_user.to_string()],
                |row| row.get(0),
            )
            .optional()?
        };

        let Some(id) = id else {
            tx.commit()?;
            return Ok(None);
        };

        tx.execute("UPDATE duels SET status = 'in_progress' WHERE id = ?1", [&id])?;
        let duel_id: DuelId = id
            .parse()
            .map_err(|_| DuelError::Infrastructure("corrupt duel id in duels table".into()))?;
        let duel = Self::load_duel_row(&tx, duel_id)?;
        tx.commit()?;
        Ok(duel)
    }

    /// Writes back one participant's graded submission without touching
    /// duel status — always safe to call, win/loss bookkeeping is a
    /// separate atomic step (`try_win_and_complete`).
    #[allow(clippy::too_many_arguments)]
    pub fn record_submission(
        &self,
        duel_id: DuelId,
        user: UserId,
        tests_passed: u32,
        total_tests: u32,
        final_code: String,
        language: String,
        submission_time: DateTime<Utc>,
        solve_duration_seconds: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        conn.execute(
            r#"
            UPDATE participants SET
              tests_passed = ?1, total_tests = ?2, final_code = ?3, language = ?4,
              submission_time = ?5, solve_duration_seconds = ?6
            WHERE duel_id = ?7 AND user_id = ?8
            "#,
            params![
                tests_passed,
                total_tests,
                final_code,
                language,
                submission_time.to_rfc3339(),
                solve_duration_seconds,
                duel_id.to_string(),
                user.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Atomically claims the win for `user` and completes the duel, but
    /// only if the duel is still `in_progress` and nobody else has already
    /// won — the race rule of §5: whichever commit lands first wins, and a
    /// later full-pass submission is simply graded without ever flipping
    /// the duel.
    pub fn try_win_and_complete(
        &self,
        duel_id: DuelId,
        user: UserId,
        completed_at: DateTime<Utc>,
        duration_seconds: Option<i64>,
    ) -> Result<bool> {
        let mut conn = self.conn.lock().expect("repository connection poisoned");
        let tx = conn.transaction()?;

        let status: Option<String> = tx
            .query_row("SELECT status FROM duels WHERE id = ?1", [duel_id.to_string()], |row| row.get(0))
            .optional()?;
        let Some(status) = status else {
            tx.commit()?;
            return Ok(false);
        };
        if status != "in_progress" {
            tx.commit()?;
            return Ok(false);
        }

        let existing_winner: i64 = tx.query_row(
            "SELECT COUNT(*) FROM participants WHERE duel_id = ?1 AND is_winner = 1",
            [duel_id.to_string()],
            |row| row.get(0),
        )?;
        if existing_winner > 0 {
            tx.commit()?;
            return Ok(false);
        }

        tx.execute(
            "UPDATE duels SET status = 'completed', completed_at = ?1, duration_seconds = ?2, updated_at = ?3 WHERE id = ?4",
            params![completed_at.to_rfc3339(), duration_seconds, Utc::now().to_rfc3339(), duel_id.to_string()],
        )?;
        tx.execute(
            "UPDATE participants SET is_winner = 1 WHERE duel_id = ?1 AND user_id = ?2",
            params![duel_id.to_string(), user.to_string()],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// A user's past (terminal-state) duels, most recent first, for the
    /// history endpoint (§6).
    pub fn duel_history_for_user(&self, user: UserId, limit: u32) -> Result<Vec<Duel>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT d.id, d.completed_at FROM duels d
            JOIN participants p ON p.duel_id = d.id
            WHERE p.user_id = ?1 AND d.status IN ('completed', 'cancelled', 'timed_out')
            ORDER BY d.completed_at DESC LIMIT ?2
            "#,
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![user.to_string(), limit], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let duel_id: DuelId = id.parse().map_err(|_| {
                DuelError::Infrastructure("corrupt duel id in duels table".into())
            })?;
            if let Some(duel) = Self::load_duel_row(&conn, duel_id)? {
                out.push(duel);
            }
        }
        Ok(out)
    }

    pub fn waiting_duel_by_room_code(&self, room_code: &str) -> Result<Option<Duel>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT id FROM duels WHERE status = 'waiting' AND room_code = ?1 LIMIT 1",
        )?;
        let id: Option<String> = stmt.query_row([room_code], |row| row.get(0)).optional()?;
        match id {
            Some(id) => {
                let duel_id: DuelId = id.parse().map_err(|_| {
                    DuelError::Infrastructure("corrupt duel id in duels table".into())
                })?;
                Self::load_duel_row(&conn, duel_id)
            }
            None => Ok(None),
        }
    }

    /// Duels stuck past their deadline, used by the sweeper (C9). Returns
    /// `(waiting duels older than their mode's timeout, in-progress duels
    /// older than `in_progress_deadline`)`.
    pub fn stale_duels(
        &self,
        random_timeout: chrono::Duration,
        ai_timeout: chrono::Duration,
        private_timeout: chrono::Duration,
        in_progress_timeout: chrono::Duration,
    ) -> Result<(Vec<Duel>, Vec<Duel>)> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let now = Utc::now();

        let mut stmt = conn.prepare("SELECT id FROM duels WHERE status = 'waiting'")?;
        let waiting_ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        let mut waiting_stale = Vec::new();
        for id in waiting_ids {
            let duel_id: DuelId = id.parse().map_err(|_| {
                DuelError::Infrastructure("corrupt duel id in duels table".into())
            })?;
            if let Some(duel) = Self::load_duel_row(&conn, duel_id)? {
                let timeout = match duel.mode {
                    DuelMode::RandomPlayer => random_timeout,
                    DuelMode::AiOpponent => ai_timeout,
                    DuelMode::PrivateRoom => private_timeout,
                };
                if now - duel.created_at > timeout {
                    waiting_stale.push(duel);
                }
            }
        }

        let mut stmt = conn.prepare("SELECT id FROM duels WHERE status = 'in_progress'")?;
        let in_progress_ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        let mut in_progress_stale = Vec::new();
        for id in in_progress_ids {
            let duel_id: DuelId = id.parse().map_err(|_| {
                DuelError::Infrastructure("corrupt duel id in duels table".into())
            })?;
            if let Some(duel) = Self::load_duel_row(&conn, duel_id)? {
                if let Some(started_at) = duel.started_at {
                    if now - started_at > in_progress_timeout {
                        in_progress_stale.push(duel);
                    }
                }
            }
        }

        Ok((waiting_stale, in_progress_stale))
    }

    pub fn leaderboard_duel_count(&self) -> Result<i64> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        conn.query_row("SELECT COUNT(*) FROM duels WHERE status = 'completed'", [], |row| row.get(0))
            .map_err(DuelError::from)
    }

    fn load_duel_row(conn: &rusqlite::Connection, id: DuelId) -> Result<Option<Duel>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT mode, status, difficulty, problem_type, problem_id, room_code,
                   created_at, started_at, completed_at, duration_seconds
            FROM duels WHERE id = ?1
            "#,
        )?;
        let row = stmt
            .query_row([id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<i64>>(9)?,
                ))
            })
            .optional()?;

        let Some((
            mode,
            status,
            difficulty,
            problem_type,
            problem_id,
            room_code,
            created_at,
            started_at,
            completed_at,
            duration_seconds,
        )) = row
        else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, is_ai, ai_difficulty, rating_before, rating_after, rating_delta,
                   is_winner, submission_time, solve_duration_seconds, tests_passed, total_tests,
                   final_code, language
            FROM participants WHERE duel_id = ?1 ORDER BY seq ASC
            "#,
        )?;
        let participants = stmt
            .query_map([id.to_string()], |row| {
                Ok(Participant {
                    duel_ref: id,
                    user_ref: row
                        .get::<_, Option<String>>(0)?
                        .map(|s| s.parse::<UserId>().map_err(|_| {
                            to_sql_err(DuelError::Infrastructure("corrupt user id in participants table".into()))
                        }))
                        .transpose()?,
                    is_ai: int_to_bool(row.get(1)?),
                    ai_difficulty: row
                        .get::<_, Option<String>>(2)?
                        .map(|s| str_to_difficulty(&s).map_err(to_sql_err))
                        .transpose()?,
                    rating_before: row.get(3)?,
                    rating_after: row.get(4)?,
                    rating_delta: row.get(5)?,
                    is_winner: int_to_bool(row.get(6)?),
                    submission_time: row
                        .get::<_, Option<String>>(7)?
                        .map(|s| parse_rfc3339(&s).map_err(to_sql_err))
                        .transpose()?,
                    solve_duration_seconds: row.get(8)?,
                    tests_passed: row.get(9)?,
                    total_tests: row.get(10)?,
                    final_code: row.get(11)?,
                    language: row.get(12)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(Duel {
            id,
            mode: str_to_mode(&mode).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
            status: str_to_status(&status).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
            difficulty: str_to_difficulty(&difficulty).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
            problem_type: str_to_problem_type(&problem_type),
            problem_ref: problem_id
                .map(|s| {
                    s.parse::<ProblemId>()
                        .map_err(|_| DuelError::Infrastructure("corrupt problem id in duels table".into()))
                })
                .transpose()
                .map_err(|e: DuelError| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
            room_code,
            created_at: parse_rfc3339(&created_at)?,
            started_at: started_at.map(|s| parse_rfc3339(&s)).transpose()?,
            completed_at: completed_at.map(|s| parse_rfc3339(&s)).transpose()?,
            duration_seconds,
            participants,
        }))
    }
}

fn mode_to_str(mode: DuelMode) -> &'static str {
    match mode {
        DuelMode::RandomPlayer => "random_player",
        DuelMode::AiOpponent => "ai_opponent",
        DuelMode::PrivateRoom => "private_room",
    }
}

fn str_to_mode(s: &str) -> Result<DuelMode> {
    match s {
        "random_player" => Ok(DuelMode::RandomPlayer),
        "ai_opponent" => Ok(DuelMode::AiOpponent),
        "private_room" => Ok(DuelMode::PrivateRoom),
        other => Err(DuelError::Infrastructure(format!("unknown duel mode '{other}'"))),
    }
}

fn status_to_str(status: DuelStatus) -> &'static str {
    match status {
        DuelStatus::Waiting => "waiting",
        DuelStatus::InProgress => "in_progress",
        DuelStatus::Completed => "completed",
        DuelStatus::Cancelled => "cancelled",
        DuelStatus::TimedOut => "timed_out",
    }
}

fn str_to_status(s: &str) -> Result<DuelStatus> {
    match s {
        "waiting" => Ok(DuelStatus::Waiting),
        "in_progress" => Ok(DuelStatus::InProgress),
        "completed" => Ok(DuelStatus::Completed),
        "cancelled" => Ok(DuelStatus::Cancelled),
        "timed_out" => Ok(DuelStatus::TimedOut),
        other => Err(DuelError::Infrastructure(format!("unknown duel status '{other}'"))),
    }
}

pub(crate) fn difficulty_to_str(d: Difficulty) -> &'static str {
    match d {
        Difficulty::Easy => "easy",
        Difficulty::Medium => "medium",
        Difficulty::Hard => "hard",
        Difficulty::Expert => "expert",
    }
}

pub(crate) fn str_to_difficulty(s: &str) -> Result<Difficulty> {
    match s {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        "expert" => Ok(Difficulty::Expert),
        other => Err(DuelError::Infrastructure(format!("unknown difficulty '{other}'"))),
    }
}

fn problem_type_to_str(pt: &ProblemType) -> String {
    match pt {
        ProblemType::Array => "array".to_string(),
        ProblemType::String => "string".to_string(),
        ProblemType::Graph => "graph".to_string(),
        ProblemType::DynamicProgramming => "dynamic_programming".to_string(),
        ProblemType::Tree => "tree".to_string(),
        ProblemType::SetOperations => "set_operations".to_string(),
        ProblemType::Other(s) => format!("other:{s}"),
    }
}

fn str_to_problem_type(s: &str) -> ProblemType {
    match s {
        "array" => ProblemType::Array,
        "string" => ProblemType::String,
        "graph" => ProblemType::Graph,
        "dynamic_programming" => ProblemType::DynamicProgramming,
        "tree" => ProblemType::Tree,
        "set_operations" => ProblemType::SetOperations,
        other => ProblemType::Other(other.strip_prefix("other:").unwrap_or(other).to_string()),
    }
}
