//! Player rating persistence.

use super::Repository;
use crate::domain::{rank_for_elo, Achievement, PlayerRating, RankBand, UserId};
use crate::{DuelError, Result};
use rusqlite::{params, OptionalExtension};

impl Repository {
    pub fn save_rating(&self, rating: &PlayerRating) -> Result<()> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        conn.execute(
            r#"
            INSERT INTO player_ratings (
              user_id, elo, rank, wins, losses, draws, total_duels, current_streak,
              best_streak, avg_solve_seconds, fastest_solve_seconds, xp, level,
              last_duel_at, achievements
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(user_id) DO UPDATE SET
              elo = excluded.elo,
              rank = excluded.rank,
              wins = excluded.wins,
              losses = excluded.losses,
              draws = excluded.draws,
              total_duels = excluded.total_duels,
              current_streak = excluded.current_streak,
              best_streak = excluded.best_streak,
              avg_solve_seconds = excluded.avg_solve_seconds,
              fastest_solve_seconds = excluded.fastest_solve_seconds,
              xp = excluded.xp,
              level = excluded.level,
              last_duel_at = excluded.last_duel_at,
              achievements = excluded.achievements
            "#,
            params![
                rating.user_ref.to_string(),
                rating.elo,
                rank_to_str(rating.rank),
                rating.wins,
                rating.losses,
                rating.draws,
                rating.total_duels,
                rating.current_streak,
                rating.best_streak,
                rating.avg_solve_seconds,
                rating.fastest_solve_seconds,
                rating.xp,
                rating.level,
                rating.last_duel_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&rating.achievements)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_rating(&self, user: UserId) -> Result<Option<PlayerRating>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        Self::load_rating_row(&conn, user)
    }

    /// Returns the existing rating or a freshly initialized one — ratings
    /// are lazily created on a player's first duel rather than at
    /// registration (out of this crate's scope).
    pub fn get_or_init_rating(&self, user: UserId) -> Result<PlayerRating> {
        Ok(self.get_rating(user)?.unwrap_or_else(|| PlayerRating::new(user)))
    }

    pub fn leaderboard(&self, limit: u32) -> Result<Vec<PlayerRating>> {
        let conn = self.conn.lock().expect("repository connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT user_id FROM player_ratings ORDER BY elo DESC, wins DESC LIMIT ?1",
        )?;
        let ids: Vec<String> = stmt
            .query_map([limit], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let user: UserId = id.parse().map_err(|_| DuelError::Infrastructure("corrupt user id".into()))?;
            if let Some(r) = Self::load_rating_row(&conn, user)? {
                out.push(r);
            }
        }
        Ok(out)
    }

    fn load_rating_row(conn: &rusqlite::Connection, user: UserId) -> Result<Option<PlayerRating>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT elo, rank, wins, losses, draws, total_duels, current_streak, best_streak,
                   avg_solve_seconds, fastest_solve_seconds, xp, level, last_duel_at, achievements
            FROM player_ratings WHERE user_id = ?1
            "#,
        )?;
        let row = stmt
            .query_row([user.to_string()], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, u32>(7)?,
                    row.get::<_, Option<f64>>(8)?,
                    row.get::<_, Option<i64>>(9)?,
                    row.get::<_, u32>(10)?,
                    row.get::<_, u32>(11)?,
                    row.get::<_, Option<String>>(12)?,
                    row.get::<_, String>(13)?,
                ))
            })
            .optional()?;

        let Some((
            elo,
            rank,
            wins,
            losses,
            draws,
            total_duels,
            current_streak,
            best_streak,
            avg_solve_seconds,
            fastest_solve_seconds,
            xp,
            level,
            last_duel_at,
            achievements,
        )) = row
        else {
            return Ok(None);
        };

        let achievements: Vec<Achievement> = serde_json::from_str(&achievements)?;
        let _ = rank; // rank is derived from `elo` on every read; the stored column is informational.

        Ok(Some(PlayerRating {
            user_ref: user,
            elo,
            rank: rank_for_elo(elo),
            wins,
            losses,
            draws,
            total_duels,
            current_streak,
            best_streak,
            avg_solve_seconds,
            fastest_solve_seconds,
            xp,
            level,
            last_duel_at: last_duel_at.map(|s| super::parse_rfc3339(&s)).transpose()?,
            achievements,
        }))
    }
}

fn rank_to_str(rank: RankBand) -> &'static str {
    match rank {
        RankBand::BronzeI => "bronze_1",
        RankBand::BronzeII => "bronze_2",
        RankBand::BronzeIII => "bronze_3",
        RankBand::SilverI => "silver_1",
        RankBand::SilverII => "silver_2",
        RankBand::SilverIII => "silver_3",
        RankBand::GoldI => "gold_1",
        RankBand::GoldII => "gold_2",
        RankBand::GoldIII => "gold_3",
        RankBand::PlatinumI => "platinum_1",
        RankBand::PlatinumII => "platinum_2",
        RankBand::PlatinumIII => "platinum_3",
        RankBand::DiamondI => "diamond_1",
        RankBand::DiamondII => "diamond_2",
        RankBand::DiamondIII => "diamond_3",
        RankBand::Master => "master",
        RankBand::Grandmaster => "grandmaster",
    }
}
