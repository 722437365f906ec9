//! Problem catalog persistence and anti-duplicate lookups.

use super::duels::{difficulty_to_str, str_to_difficulty};
use super::{parse_rfc3339, Repository};
use crate::domain::{Problem, ProblemId, ProblemType, TestCase};
use crate::{DuelError, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

impl Repository {
    pub fn save_problem(&self, problem: &Problem) -> Result<()> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        conn.execute(
            r#"
            INSERT INTO problems (
              id, title, description, difficulty, problem_type, fingerprint, function_name,
              parameter_signature, starter_code, test_cases, constraints, hints, times_used,
              last_used_at, reference_solution, from_fallback_library
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
              times_used = excluded.times_used,
              last_used_at = excluded.last_used_at
            "#,
            params![
                problem.id.to_string(),
                problem.title,
                problem.description,
                difficulty_to_str(problem.difficulty),
                problem_type_to_str(&problem.problem_type),
                problem.fingerprint,
                problem.function_name,
                serde_json::to_string(&problem.parameter_signature)?,
                serde_json::to_string(&problem.starter_code)?,
                serde_json::to_string(&problem.test_cases)?,
                serde_json::to_string(&problem.constraints)?,
                serde_json::to_string(&problem.hints)?,
                problem.times_used,
                problem.last_used_at.map(|t| t.to_rfc3339()),
                problem.reference_solution,
                super::bool_to_int(problem.from_fallback_library),
            ],
        )?;
        Ok(())
    }

    pub fn get_problem(&self, id: ProblemId) -> Result<Option<Problem>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        Self::load_problem_by(&conn, "id", &id.to_string())
    }

    pub fn require_problem(&self, id: ProblemId) -> Result<Problem> {
        self.get_problem(id)?
            .ok_or_else(|| DuelError::NotFound(format!("problem {id} not found")))
    }

    pub fn problem_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Problem>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        Self::load_problem_by(&conn, "fingerprint", fingerprint)
    }

    /// Candidate pool for the anti-duplicate similarity check: problems of
    /// the same difficulty used fewer than `max_reuse` times, ordered
    /// least-recently-used first.
    pub fn problem_candidates(&self, difficulty: crate::domain::Difficulty, max_reuse: u32) -> Result<Vec<Problem>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let mut stmt = conn.prepare(
            r#"
            SELECT id FROM problems
            WHERE difficulty = ?1 AND times_used < ?2
            ORDER BY last_used_at ASC NULLS FIRST
            LIMIT 200
            "#,
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![difficulty_to_str(difficulty), max_reuse], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = Self::load_problem_by(&conn, "id", &id)? {
                out.push(p);
            }
        }
        Ok(out)
    }

    /// Marks a problem used: bumps `times_used` and stamps `last_used_at`.
    pub fn record_problem_use(&self, id: ProblemId) -> Result<()> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        conn.execute(
            "UPDATE problems SET times_used = times_used + 1, last_used_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    fn load_problem_by(conn: &rusqlite::Connection, column: &str, value: &str) -> Result<Option<Problem>> {
        let sql = format!(
            r#"
            SELECT id, title, description, difficulty, problem_type, fingerprint, function_name,
                   parameter_signature, starter_code, test_cases, constraints, hints, times_used,
                   last_used_at, reference_solution, from_fallback_library
            FROM problems WHERE {column} = ?1
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
            .query_row([value], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, String>(11)?,
                    row.get::<_, u32>(12)?,
                    row.get::<_, Option<String>>(13)?,
                    row.get::<_, Option<String>>(14)?,
                    row.get::<_, i64>(15)?,
                ))
            })
            .optional()?;

        let Some((
            id,
            title,
            description,
            difficulty,
            problem_type,
            fingerprint,
            function_name,
            parameter_signature,
            starter_code,
            test_cases,
            constraints,
            hints,
            times_used,
            last_used_at,
            reference_solution,
            from_fallback_library,
        )) = row
        else {
            return Ok(None);
        };

        let parameter_signature: Vec<String> = serde_json::from_str(&parameter_signature)?;
        let starter_code: BTreeMap<String, String> = serde_json::from_str(&starter_code)?;
        let test_cases: Vec<TestCase> = serde_json::from_str(&test_cases)?;
        let constraints: Vec<String> = serde_json::from_str(&constraints)?;
        let hints: Vec<String> = serde_json::from_str(&hints)?;

        Ok(Some(Problem {
            id: id.parse().map_err(|_| DuelError::Infrastructure("corrupt problem id".into()))?,
            title,
            description,
            difficulty: str_to_difficulty(&difficulty)?,
            problem_type: str_to_problem_type(&problem_type),
            fingerprint,
            function_name,
            parameter_signature,
            starter_code,
            test_cases,
            constraints,
            hints,
            times_used,
            last_used_at: last_used_at.map(|s| parse_rfc3339(&s)).transpose()?,
            reference_solution,
            from_fallback_library: super::int_to_bool(from_fallback_library),
        }))
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
