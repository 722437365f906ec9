//! Core aggregate and value types shared by every subsystem.
//!
//! `Duel` is the central aggregate: it owns its participants inline rather
//! than the cyclic duel/participant/snapshot graph the original service
//! navigated with lazy loads. Other entities (problems, ratings, history,
//! snapshots) reach a duel only by id.

mod duel;
mod history;
mod problem;
mod rating;
mod snapshot;

pub use duel::*;
pub use history::*;
pub use problem::*;
pub use rating::*;
pub use snapshot::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype id wrapper shared by every aggregate. A bare `Uuid` would let a
/// `ProblemId` be passed where a `DuelId` is expected; this catches that at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound = "", transparent)]
pub struct Id<T>(
    uuid::Uuid,
    #[serde(skip)] std::marker::PhantomData<fn() -> T>,
);

// `fn() -> T` keeps `Id<T>` covariant and `Send + Sync` regardless of `T`,
// unlike a bare `PhantomData<T>` which would tie those to `T`'s own bounds.

impl<T> Id<T> {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4(), std::marker::PhantomData)
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id, std::marker::PhantomData)
    }

    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T> std::str::FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_uuid(uuid::Uuid::parse_str(s)?))
    }
}

pub type DuelId = Id<Duel>;
pub type UserId = Id<User>;
pub type ProblemId = Id<Problem>;

/// Marker type; user identity/profile lives outside this crate's scope.
pub struct User;

/// The well-known synthetic user id the AI opponent submits snapshots
/// under. Never present in `PlayerRating`: the AI's rating is fixed and
/// difficulty-scaled (§4.7), not persisted.
pub fn ai_opponent_user_id() -> UserId {
    Id::from_uuid(uuid::Uuid::nil())
}
