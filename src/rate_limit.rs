//! Per-user rate limiting for judge executions (§4.6, §5): "Rate-limit
//! counters are per-user in-memory; spec permits a pluggable distributed
//! backend." `DashMap` keyed by user mirrors the same concurrent-registry
//! shape the event fabric uses for its per-duel sessions
//! (`fabric::EventFabric`), rather than anything the teacher itself
//! carries — the teacher's single-threaded CLI had no caller to throttle.

use crate::domain::UserId;
use crate::{DuelError, Result};
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window limiter: at most `max_actions` judge executions per
/// `window` per user. The window resets wholesale once it elapses rather
/// than tracking a sliding log of timestamps — adequate for throttling a
/// single user's submit/test-code cadence, not a general-purpose limiter.
pub struct RateLimiter {
    windows: DashMap<UserId, Window>,
    max_actions: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_actions: u32, window: Duration) -> Self {
        Self { windows: DashMap::new(), max_actions, window }
    }

    /// Records one action for `user`. Errs with `DuelError::RateLimited`
    /// once the window's action count is exhausted.
    pub fn check(&self, user: UserId) -> Result<()> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(user)
            .or_insert_with(|| Window { started_at: now, count: 0 });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.max_actions {
            return Err(DuelError::RateLimited(format!(
                "at most {} judge executions per {:?}",
                self.max_actions, self.window
            )));
        }

        entry.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let user = UserId::new();

        assert!(limiter.check(user).is_ok());
        assert!(limiter.check(user).is_ok());
        assert!(matches!(limiter.check(user), Err(DuelError::RateLimited(_))));
    }

    #[test]
    fn tracks_each_user_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a = UserId::new();
        let b = UserId::new();

        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(b).is_ok());
        assert!(limiter.check(a).is_err());
    }

    #[test]
    fn resets_after_the_window_elapses() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        let user = UserId::new();

        assert!(limiter.check(user).is_ok());
        assert!(limiter.check(user).is_err());
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check(user).is_ok());
    }
}
