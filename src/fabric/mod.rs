//! C5 — Event Fabric: the per-duel publish/subscribe registry.
//!
//! Generalizes the daemon's `SessionManager` (`daemon::manager`) — a
//! registry keyed by id, holding one live handle per connection — to a
//! concurrent, per-duel registry of outbound channels. Message shapes and
//! the replace/debounce/detach-on-dead-send behavior are ported from the
//! original service's `WebSocketManager`.

mod envelope;

pub use envelope::Envelope;

use crate::domain::{DuelId, UserId};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Error, Debug)]
pub enum FabricError {
    #[error("no session registered for user {0} in duel {1}")]
    SessionNotFound(UserId, DuelId),
}

/// One attached session's outbound half. The gateway owns the receiving
/// end and forwards each envelope onto the actual WebSocket.
pub struct Session {
    user: UserId,
    sender: mpsc::UnboundedSender<Envelope>,
    last_code_update_ms: AtomicI64,
}

/// All sessions currently attached to one duel.
#[derive(Default)]
struct DuelSessions {
    by_user: std::collections::HashMap<UserId, Arc<Session>>,
}

/// Per-duel publish/subscribe registry. Cheaply cloneable; shared by the
/// gateway and duel engine via `Arc` (mirroring how `SessionManager` is
/// owned by the daemon and reached through shared state).
#[derive(Clone)]
pub struct EventFabric {
    duels: Arc<DashMap<DuelId, DuelSessions>>,
    code_update_debounce_ms: i64,
}

impl EventFabric {
    pub fn new(code_update_debounce: std::time::Duration) -> Self {
        Self {
            duels: Arc::new(DashMap::new()),
            code_update_debounce_ms: code_update_debounce.as_millis() as i64,
        }
    }

    /// Registers a new session for `(duel, user)`. If one is already
    /// registered it is evicted first with a "replaced" close so the
    /// evicted client can distinguish it from a server-side kick.
    pub fn attach(&self, duel: DuelId, user: UserId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session { user, sender: tx, last_code_update_ms: AtomicI64::new(0) });

        let mut entry = self.duels.entry(duel).or_default();
        if let Some(previous) = entry.by_user.insert(user, session) {
            let _ = previous.sender.send(Envelope::Replaced);
        }
        rx
    }

    /// Removes the session, if present, and notifies the remaining
    /// sessions in the duel that this participant disconnected.
    pub fn detach(&self, duel: DuelId, user: UserId) {
        let should_remove_duel = {
            let Some(mut entry) = self.duels.get_mut(&duel) else { return };
            entry.by_user.remove(&user);
            entry.by_user.is_empty()
        };
        if should_remove_duel {
            self.duels.remove(&duel);
        }
        self.broadcast(duel, Envelope::UserStatus { user_id: user, status: "disconnected".to_string() }, None);
    }

    /// Fans `message` out to every session of `duel`, optionally skipping
    /// `exclude`. Dead sessions (send failures) are detached synchronously.
    pub fn broadcast(&self, duel: DuelId, message: Envelope, exclude: Option<UserId>) {
        let Some(entry) = self.duels.get(&duel) else { return };
        let mut dead = Vec::new();
        for (user, session) in entry.by_user.iter() {
            if Some(*user) == exclude {
                continue;
            }
            if session.sender.send(message.clone()).is_err() {
                dead.push(*user);
            }
        }
        drop(entry);
        for user in dead {
            warn!(%duel, %user, "dropping dead fabric session");
            self.detach(duel, user);
        }
    }

    /// Targeted send to a single participant.
    pub fn send_to_participant(&self, duel: DuelId, user: UserId, message: Envelope) -> Result<(), FabricError> {
        let entry = self.duels.get(&duel).ok_or(FabricError::SessionNotFound(user, duel))?;
        let session = entry.by_user.get(&user).ok_or(FabricError::SessionNotFound(user, duel))?;
        if session.sender.send(message).is_err() {
            drop(entry);
            self.detach(duel, user);
            return Err(FabricError::SessionNotFound(user, duel));
        }
        Ok(())
    }

    /// Broadcasts a code update unless the sender's last update was less
    /// than the configured debounce window ago.
    pub fn send_code_update(&self, duel: DuelId, user: UserId, code: String, language: String, cursor_position: Option<serde_json::Value>) {
        let now_ms = Utc::now().timestamp_millis();
        if let Some(entry) = self.duels.get(&duel) {
            if let Some(session) = entry.by_user.get(&user) {
                let last = session.last_code_update_ms.load(Ordering::Relaxed);
                if now_ms - last < self.code_update_debounce_ms {
                    return;
                }
                session.last_code_update_ms.store(now_ms, Ordering::Relaxed);
            }
        }
        self.broadcast(
            duel,
            Envelope::CodeUpdate { user_id: user, code, language, cursor_position, timestamp: now_ms },
            Some(user),
        );
    }

    /// Closes every session of `duel` by dropping their channels, after
    /// the caller has already broadcast a terminal message (e.g.
    /// `duel_complete`). The gateway observes the closed receiver and
    /// closes the underlying WebSocket.
    pub fn close(&self, duel: DuelId) {
        self.duels.remove(&duel);
    }

    pub fn connected_users(&self, duel: DuelId) -> Vec<UserId> {
        self.duels.get(&duel).map(|e| e.by_user.keys().copied().collect()).unwrap_or_default()
    }

    pub fn is_connected(&self, duel: DuelId, user: UserId) -> bool {
        self.duels.get(&duel).map(|e| e.by_user.contains_key(&user)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Id;

    #[test]
    fn attaching_twice_evicts_the_first_session() {
        let fabric = EventFabric::new(std::time::Duration::from_millis(300));
        let duel: DuelId = Id::new();
        let user: UserId = Id::new();

        let mut first = fabric.attach(duel, user);
        let _second = fabric.attach(duel, user);

        assert_eq!(first.try_recv(), Ok(Envelope::Replaced));
    }

    #[test]
    fn detach_notifies_remaining_sessions() {
        let fabric = EventFabric::new(std::time::Duration::from_millis(300));
        let duel: DuelId = Id::new();
        let user_a: UserId = Id::new();
        let user_b: UserId = Id::new();

        let mut rx_b = fabric.attach(duel, user_b);
        let _rx_a = fabric.attach(duel, user_a);

        fabric.detach(duel, user_a);

        let received = rx_b.try_recv().expect("expected a user_status message");
        assert!(matches!(received, Envelope::UserStatus { user_id, status } if user_id == user_a && status == "disconnected"));
    }

    #[test]
    fn code_update_debounce_drops_rapid_successive_updates() {
        let fabric = EventFabric::new(std::time::Duration::from_secs(60));
        let duel: DuelId = Id::new();
        let sender: UserId = Id::new();
        let receiver: UserId = Id::new();

        let mut rx = fabric.attach(duel, receiver);
        let _rx_sender = fabric.attach(duel, sender);

        fabric.send_code_update(duel, sender, "a".into(), "python".into(), None);
        fabric.send_code_update(duel, sender, "ab".into(), "python".into(), None);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
