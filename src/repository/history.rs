//! Per-user problem history, the anti-duplicate audit trail (§4.2).

use super::Repository;
use crate::domain::UserProblemHistory;
use crate::Result;
use rusqlite::params;

impl Repository {
    pub fn record_history(&self, entry: &UserProblemHistory) -> Result<()> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        conn.execute(
            r#"
            INSERT INTO user_problem_history (
              user_id, problem_id, duel_id, fingerprint, used_at, solved, tests_passed,
              total_tests, solve_duration_seconds, reported_as_duplicate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(user_id, problem_id, duel_id) DO UPDATE SET
              solved = excluded.solved,
              tests_passed = excluded.tests_passed,
              total_tests = excluded.total_tests,
              solve_duration_seconds = excluded.solve_duration_seconds
            "#,
            params![
                entry.user_ref.to_string(),
                entry.problem_ref.to_string(),
                entry.duel_ref.to_string(),
                entry.fingerprint,
                entry.used_at.to_rfc3339(),
                super::bool_to_int(entry.solved),
                entry.tests_passed,
                entry.total_tests,
                entry.solve_duration_seconds,
                super::bool_to_int(entry.reported_as_duplicate),
            ],
        )?;
        Ok(())
    }

    /// Fingerprints a user has already seen within `within_days` — the
    /// fast exclusion set the anti-duplicate index consults before running
    /// full similarity scoring (§4.2).
    pub fn recent_fingerprints_for_user(&self, user: crate::domain::UserId, within_days: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(within_days)).to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT fingerprint FROM user_problem_history WHERE user_id = ?1 AND used_at >= ?2",
        )?;
        let fingerprints = stmt
            .query_map(params![user.to_string(), cutoff], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(fingerprints)
    }
}
