//! Runtime configuration, loaded from environment variables with defaults.
//!
//! Follows the teacher's `AppConfig` shape (`config.rs`): a plain struct
//! with a `Default` impl, constructed once at startup and threaded through
//! the application context rather than read ad hoc.

use crate::domain::Difficulty;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AiThinkRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub elo_k_factor: i32,
    pub problem_ttl_days: i64,
    pub problem_max_reuse: u32,
    pub waiting_timeout_random: Duration,
    pub waiting_timeout_ai: Duration,
    pub waiting_timeout_private: Duration,
    pub submission_time_limit: Duration,
    pub submission_memory_mb: u64,
    pub code_update_debounce: Duration,
    pub ws_timeout: Duration,
    pub duel_in_progress_timeout: Duration,
    pub ai_think_range_by_difficulty: HashMap<Difficulty, AiThinkRange>,
    pub rate_limit_max_actions: u32,
    pub rate_limit_window: Duration,
    pub db_path: String,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        let mut ai_think_range_by_difficulty = HashMap::new();
        ai_think_range_by_difficulty.insert(Difficulty::Easy, AiThinkRange { min_secs: 15, max_secs: 45 });
        ai_think_range_by_difficulty.insert(Difficulty::Medium, AiThinkRange { min_secs: 30, max_secs: 90 });
        ai_think_range_by_difficulty.insert(Difficulty::Hard, AiThinkRange { min_secs: 60, max_secs: 180 });
        ai_think_range_by_difficulty.insert(Difficulty::Expert, AiThinkRange { min_secs: 120, max_secs: 300 });

        Self {
            elo_k_factor: 32,
            problem_ttl_days: 30,
            problem_max_reuse: 3,
            waiting_timeout_random: Duration::from_secs(30 * 60),
            waiting_timeout_ai: Duration::from_secs(10 * 60),
            waiting_timeout_private: Duration::from_secs(60 * 60),
            submission_time_limit: Duration::from_secs(5),
            submission_memory_mb: 256,
            code_update_debounce: Duration::from_millis(300),
            ws_timeout: Duration::from_secs(60),
            duel_in_progress_timeout: Duration::from_secs(30 * 60),
            ai_think_range_by_difficulty,
            rate_limit_max_actions: 10,
            rate_limit_window: Duration::from_secs(10),
            db_path: "duelcode.db".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Overlay environment variables onto the defaults. Unset/unparsable
    /// variables fall back silently to the default rather than failing
    /// startup — these are tuning knobs, not required configuration.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_i32("ELO_K_FACTOR") {
            cfg.elo_k_factor = v;
        }
        if let Some(v) = env_i64("PROBLEM_TTL_DAYS") {
            cfg.problem_ttl_days = v;
        }
        if let Some(v) = env_u32("PROBLEM_MAX_REUSE") {
            cfg.problem_max_reuse = v;
        }
        if let Some(v) = env_secs("WAITING_TIMEOUT_RANDOM_SEC") {
            cfg.waiting_timeout_random = v;
        }
        if let Some(v) = env_secs("WAITING_TIMEOUT_AI_SEC") {
            cfg.waiting_timeout_ai = v;
        }
        if let Some(v) = env_secs("WAITING_TIMEOUT_PRIVATE_SEC") {
            cfg.waiting_timeout_private = v;
        }
        if let Some(v) = env_secs("SUBMISSION_TIME_LIMIT_SEC") {
            cfg.submission_time_limit = v;
        }
        if let Some(v) = env_u64("SUBMISSION_MEMORY_MB") {
            cfg.submission_memory_mb = v;
        }
        if let Some(v) = env_millis("CODE_UPDATE_DEBOUNCE_MS") {
            cfg.code_update_debounce = v;
        }
        if let Some(v) = env_secs("WS_TIMEOUT_SEC") {
            cfg.ws_timeout = v;
        }
        if let Some(v) = env_secs("DUEL_IN_PROGRESS_TIMEOUT_SEC") {
            cfg.duel_in_progress_timeout = v;
        }
        if let Some(v) = env_u32("RATE_LIMIT_MAX_ACTIONS") {
            cfg.rate_limit_max_actions = v;
        }
        if let Some(v) = env_secs("RATE_LIMIT_WINDOW_SEC") {
            cfg.rate_limit_window = v;
        }
        if let Ok(v) = std::env::var("DUELCODE_DB_PATH") {
            cfg.db_path = v;
        }
        if let Ok(v) = std::env::var("DUELCODE_BIND_ADDR") {
            cfg.bind_addr = v;
        }

        cfg
    }
}

fn env_i32(key: &str) -> Option<i32> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_secs(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_secs)
}
fn env_millis(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_millis)
}
