//! Append-only code snapshot log (§3, `CodeSnapshot`).

use super::{parse_rfc3339, Repository};
use crate::domain::{CodeSnapshot, DuelId};
use crate::Result;
use rusqlite::params;

impl Repository {
    pub fn append_snapshot(&self, snapshot: &CodeSnapshot) -> Result<()> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        conn.execute(
            r#"
            INSERT INTO code_snapshots (
              duel_id, user_id, code, language, timestamp, tests_passed, tests_failed,
              execution_time_ms, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                snapshot.duel_ref.to_string(),
                snapshot.user_ref.to_string(),
                snapshot.code,
                snapshot.language,
                snapshot.timestamp.to_rfc3339(),
                snapshot.tests_passed,
                snapshot.tests_failed,
                snapshot.execution_time_ms,
                snapshot.error_message,
            ],
        )?;
        Ok(())
    }

    pub fn snapshots_for_duel(&self, duel: DuelId) -> Result<Vec<CodeSnapshot>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, code, language, timestamp, tests_passed, tests_failed,
                   execution_time_ms, error_message
            FROM code_snapshots WHERE duel_id = ?1 ORDER BY timestamp ASC
            "#,
        )?;
        let rows = stmt.query_map([duel.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, u64>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (user_id, code, language, timestamp, tests_passed, tests_failed, execution_time_ms, error_message) =
                row?;
            out.push(CodeSnapshot {
                duel_ref: duel,
                user_ref: user_id
                    .parse()
                    .map_err(|_| super::to_sql_err(crate::DuelError::Infrastructure("corrupt user id".into())))?,
                code,
                language,
                timestamp: parse_rfc3339(&timestamp)?,
                tests_passed,
                tests_failed,
                execution_time_ms,
                error_message,
            });
        }
        Ok(out)
    }
}
