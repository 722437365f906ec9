//! C7 — ELO rating updates, rank/streak/XP bookkeeping.
//!
//! The update formula is the standard ELO pairing (K=32 by default),
//! ported directly from the original service's `elo.update_elo_ratings`.
//! The AI opponent's rating is synthetic and difficulty-scaled rather
//! than tracked in `player_ratings` — `get_or_create_player_rating`'s
//! special-cased in-memory `PlayerRating` for `AI_OPPONENT_ID` is the
//! origin of that split here.

use crate::domain::{rank_for_elo, Achievement, Difficulty, Duel, PlayerRating, UserId};
use crate::repository::Repository;
use crate::Result;
use rand::Rng;
use std::sync::Arc;

/// Synthetic ELO ranges the AI opponent draws from per difficulty,
/// matching `calculate_professional_rating`'s junior/mid/senior/expert
/// bands.
fn ai_rating_range(difficulty: Difficulty) -> (i32, i32) {
    match difficulty {
        Difficulty::Easy => (750, 1200),
        Difficulty::Medium => (1100, 1500),
        Difficulty::Hard => (1400, 1800),
        Difficulty::Expert => (1700, 2200),
    }
}

/// Box-Muller transform producing one standard-normal sample.
fn standard_normal_sample(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Draws a synthetic AI rating for `difficulty`, normally distributed
/// around the band's midpoint (std dev = range / 6) and clamped to the
/// band, matching `calculate_professional_rating`'s `random.gauss`.
pub fn synthetic_ai_rating(difficulty: Difficulty) -> i32 {
    let (min, max) = ai_rating_range(difficulty);
    let mean = (min + max) as f64 / 2.0;
    let std_dev = (max - min) as f64 / 6.0;
    let sample = mean + std_dev * standard_normal_sample(&mut rand::thread_rng());
    (sample.round() as i32).clamp(min, max)
}

#[derive(Debug, Clone, Copy)]
pub struct EloUpdate {
    pub winner_rating_after: i32,
    pub winner_delta: i32,
    pub loser_rating_after: i32,
    pub loser_delta: i32,
}

/// The standard logistic ELO update: `expected = 1 / (1 + 10^((other -
/// self) / 400))`, new rating = old + k * (actual - expected), rounded
/// to the nearest integer.
pub fn update_elo(winner_rating: i32, loser_rating: i32, k_factor: i32) -> EloUpdate {
    let expected_winner = 1.0 / (1.0 + 10f64.powf((loser_rating - winner_rating) as f64 / 400.0));
    let expected_loser = 1.0 / (1.0 + 10f64.powf((winner_rating - loser_rating) as f64 / 400.0));

    let winner_rating_after = (winner_rating as f64 + k_factor as f64 * (1.0 - expected_winner)).round() as i32;
    let loser_rating_after = (loser_rating as f64 + k_factor as f64 * (0.0 - expected_loser)).round() as i32;

    EloUpdate {
        winner_rating_after,
        winner_delta: winner_rating_after - winner_rating,
        loser_rating_after,
        loser_delta: loser_rating_after - loser_rating,
    }
}

/// A draw leaves both ratings at their expected-value equilibrium; the
/// duel engine never produces this today (every completed duel has a
/// winner or is abandoned) but rating bookkeeping supports it since a
/// future tie-break rule could.
pub fn update_elo_draw(rating_a: i32, rating_b: i32, k_factor: i32) -> (i32, i32) {
    let expected_a = 1.0 / (1.0 + 10f64.powf((rating_b - rating_a) as f64 / 400.0));
    let expected_b = 1.0 / (1.0 + 10f64.powf((rating_a - rating_b) as f64 / 400.0));
    let a_after = (rating_a as f64 + k_factor as f64 * (0.5 - expected_a)).round() as i32;
    let b_after = (rating_b as f64 + k_factor as f64 * (0.5 - expected_b)).round() as i32;
    (a_after, b_after)
}

pub struct RatingService {
    repo: Arc<Repository>,
    k_factor: i32,
}

impl RatingService {
    pub fn new(repo: Arc<Repository>, k_factor: i32) -> Self {
        Self { repo, k_factor }
    }

    pub fn rating_for(&self, user: UserId) -> Result<PlayerRating> {
        self.repo.get_or_init_rating(user)
    }

    /// Applies a completed duel's result to every human participant's
    /// persisted rating: ELO, win/loss/draw tallies, streaks, XP/level,
    /// and achievement grants. The AI opponent's rating is never
    /// persisted — only used as the opposing rating in the ELO formula.
    pub fn apply_duel_completion(&self, duel: &Duel) -> Result<()> {
        let winner = duel.winner();

        for participant in duel.human_participants() {
            let Some(user) = participant.user_ref else { continue };
            let mut rating = self.repo.get_or_init_rating(user)?;
            let opponent_rating_before = duel
                .participants
                .iter()
                .find(|p| !std::ptr::eq(*p, participant))
                .map(|p| p.rating_before)
                .unwrap_or(rating.elo);

            let won = winner.map(|w| w.belongs_to(user)).unwrap_or(false);
            let elo_update = if won {
                update_elo(rating.elo, opponent_rating_before, self.k_factor)
            } else {
                // mirror the winner/loser formula with roles swapped.
                let reversed = update_elo(opponent_rating_before, rating.elo, self.k_factor);
                EloUpdate {
                    winner_rating_after: reversed.loser_rating_after,
                    winner_delta: reversed.loser_delta,
                    loser_rating_after: reversed.winner_rating_after,
                    loser_delta: reversed.winner_delta,
                }
            };

            rating.elo = elo_update.winner_rating_after;
            rating.rank = rank_for_elo(rating.elo);
            rating.total_duels += 1;
            if won {
                rating.wins += 1;
                rating.current_streak += 1;
                rating.best_streak = rating.best_streak.max(rating.current_streak);
            } else {
                rating.losses += 1;
                rating.current_streak = 0;
            }

            if let Some(seconds) = participant.solve_duration_seconds {
                rating.fastest_solve_seconds = Some(match rating.fastest_solve_seconds {
                    Some(existing) => existing.min(seconds),
                    None => seconds,
                });
                let prior_total = rating.avg_solve_seconds.unwrap_or(0.0) * (rating.total_duels - 1) as f64;
                rating.avg_solve_seconds = Some((prior_total + seconds as f64) / rating.total_duels as f64);
            }

            rating.xp += if won { 100 } else { 25 };
            rating.level = 1 + (rating.xp / 500);
            rating.last_duel_at = duel.completed_at;

            grant_achievements(&mut rating, won, participant.solve_duration_seconds);

            self.repo.save_rating(&rating)?;
        }

        Ok(())
    }

    pub fn leaderboard(&self, limit: u32) -> Result<Vec<PlayerRating>> {
        self.repo.leaderboard(limit)
    }
}

fn grant_achievements(rating: &mut PlayerRating, won: bool, solve_duration_seconds: Option<i64>) {
    if won && rating.wins == 1 {
        rating.grant_once(Achievement::FirstVictory);
    }
    if won && rating.current_streak >= 5 {
        rating.grant_once(Achievement::WinningStreak);
    }
    // No per-day login tracking exists in this crate's scope, so "a week"
    // is read as seven duels won in a row rather than seven calendar days.
    if won && rating.current_streak >= 7 {
        rating.grant_once(Achievement::PerfectWeek);
    }
    if won {
        if let Some(seconds) = solve_duration_seconds {
            if seconds < 120 {
                rating.grant_once(Achievement::SpeedDemon);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_trade_k_over_two() {
        let update = update_elo(1200, 1200, 32);
        assert_eq!(update.winner_delta, 16);
        assert_eq!(update.loser_delta, -16);
    }

    #[test]
    fn underdog_win_gains_more_points() {
        let favorite_win = update_elo(1400, 1200, 32);
        let underdog_win = update_elo(1200, 1400, 32);
        assert!(underdog_win.winner_delta > favorite_win.winner_delta);
    }

    #[test]
    fn ai_rating_falls_within_band() {
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard, Difficulty::Expert] {
            let (min, max) = ai_rating_range(difficulty);
            let rating = synthetic_ai_rating(difficulty);
            assert!(rating >= min && rating <= max);
        }
    }
}
