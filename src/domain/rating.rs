//! Player rating record and rank bands.

use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ELO: i32 = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBand {
    BronzeI,
    BronzeII,
    BronzeIII,
    SilverI,
    SilverII,
    SilverIII,
    GoldI,
    GoldII,
    GoldIII,
    PlatinumI,
    PlatinumII,
    PlatinumIII,
    DiamondI,
    DiamondII,
    DiamondIII,
    Master,
    Grandmaster,
}

/// Fixed ELO thresholds (§4.7), ascending. The band for a rating is the
/// highest threshold not exceeding it.
const RANK_THRESHOLDS: &[(i32, RankBand)] = &[
    (800, RankBand::BronzeI),
    (900, RankBand::BronzeII),
    (1000, RankBand::BronzeIII),
    (1100, RankBand::SilverI),
    (1200, RankBand::SilverII),
    (1300, RankBand::SilverIII),
    (1400, RankBand::GoldI),
    (1500, RankBand::GoldII),
    (1600, RankBand::GoldIII),
    (1700, RankBand::PlatinumI),
    (1800, RankBand::PlatinumII),
    (1900, RankBand::PlatinumIII),
    (2000, RankBand::DiamondI),
    (2100, RankBand::DiamondII),
    (2200, RankBand::DiamondIII),
    (2300, RankBand::Master),
    (2400, RankBand::Grandmaster),
];

pub fn rank_for_elo(elo: i32) -> RankBand {
    RANK_THRESHOLDS
        .iter()
        .rev()
        .find(|(threshold, _)| elo >= *threshold)
        .map(|(_, band)| *band)
        .unwrap_or(RankBand::BronzeI)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    FirstVictory,
    SpeedDemon,
    WinningStreak,
    PerfectWeek,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRating {
    pub user_ref: UserId,
    pub elo: i32,
    pub rank: RankBand,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub total_duels: u32,
    pub current_streak: u32,
    pub best_streak: u32,
    pub avg_solve_seconds: Option<f64>,
    pub fastest_solve_seconds: Option<i64>,
    pub xp: u32,
    pub level: u32,
    pub last_duel_at: Option<DateTime<Utc>>,
    /// Achievements granted at most once per player (§4.7).
    pub achievements: Vec<Achievement>,
}

impl PlayerRating {
    pub fn new(user_ref: UserId) -> Self {
        Self {
            user_ref,
            elo: DEFAULT_ELO,
            rank: rank_for_elo(DEFAULT_ELO),
            wins: 0,
            losses: 0,
            draws: 0,
            total_duels: 0,
            current_streak: 0,
            best_streak: 0,
            avg_solve_seconds: None,
            fastest_solve_seconds: None,
            xp: 0,
            level: 1,
            last_duel_at: None,
            achievements: Vec::new(),
        }
    }

    pub fn has_achievement(&self, achievement: &Achievement) -> bool {
        self.achievements.contains(achievement)
    }

    pub fn grant_once(&mut self, achievement: Achievement) -> bool {
        if self.has_achievement(&achievement) {
            false
        } else {
            self.achievements.push(achievement);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_bands_match_thresholds() {
        assert_eq!(rank_for_elo(799), RankBand::BronzeI);
        assert_eq!(rank_for_elo(800), RankBand::BronzeI);
        assert_eq!(rank_for_elo(899), RankBand::BronzeI);
        assert_eq!(rank_for_elo(900), RankBand::BronzeII);
        assert_eq!(rank_for_elo(1200), RankBand::SilverII);
        assert_eq!(rank_for_elo(2400), RankBand::Grandmaster);
        assert_eq!(rank_for_elo(3000), RankBand::Grandmaster);
    }
}
