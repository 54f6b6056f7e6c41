//! Speculative mutations with reconciliation.
//!
//! A user action becomes a [`MutationIntent`]. The [`Mutator`] then runs two
//! phases around the network round-trip:
//!
//! 1. [`Mutator::begin`] checks the session is signed in as the actor and
//!    that the actor may act, refuses ids already in flight, captures a
//!    rollback snapshot, and applies the locally computed next state to
//!    every cache key holding the entity.
//! 2. [`Mutator::complete`] takes the transport result and either reconciles
//!    the authoritative response into the store or restores the snapshot.
//!
//! The in-flight ticket taken in phase 1 is released when the pending
//! mutation is completed or dropped, so an id can never stay locked.

mod engine;
mod guard;
mod response;
mod rollback;
mod speculate;

pub use engine::{Begin, Completion, Mutator, MutationOutcome, PendingMutation, RollbackReason};
pub use guard::{InFlightGuard, InFlightTicket};
pub use response::{MutationResponse, ResponseShape};
pub use rollback::RollbackSnapshot;
pub use speculate::{assign_staff, change_status, speculate, toggle_upvote};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::model::{InvalidTransition, IssueStatus, Role, User};

/// The user-initiated change being made speculatively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MutationKind {
    /// Toggle the actor's membership in `upvoters`.
    Upvote,
    /// Assign a staff member (admin only).
    Assign { staff: String },
    /// Move the issue through its lifecycle (staff or admin).
    StatusChange { status: IssueStatus },
}

impl MutationKind {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Upvote => "upvote",
            Self::Assign { .. } => "assign",
            Self::StatusChange { .. } => "status-change",
        }
    }
}

/// Who is acting. `id` is the identifier recorded in `upvoters` (the email).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub is_blocked: bool,
}

impl Actor {
    #[must_use]
    pub fn citizen(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Citizen,
            is_blocked: false,
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.email.clone(),
            role: user.role,
            is_blocked: user.is_blocked,
        }
    }
}

/// A mutation a user action fired. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationIntent {
    pub entity_id: String,
    #[serde(flatten)]
    pub kind: MutationKind,
    pub actor: Actor,
    pub issued_at: DateTime<Utc>,
}

impl MutationIntent {
    #[must_use]
    pub fn new(entity_id: impl Into<String>, kind: MutationKind, actor: Actor) -> Self {
        Self::issued_at(entity_id, kind, actor, Utc::now())
    }

    #[must_use]
    pub fn issued_at(
        entity_id: impl Into<String>,
        kind: MutationKind,
        actor: Actor,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            actor,
            issued_at,
        }
    }
}

/// Why a mutation was refused before anything was applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("no signed-in session to act as {0}")]
    NotSignedIn(String),

    #[error("intent acts as {actor} but the session belongs to {signed_in}")]
    ActorMismatch { actor: String, signed_in: String },

    #[error("issue {0} is not in any cached collection")]
    EntityNotFound(String),

    #[error("account {0} is blocked")]
    ActorBlocked(String),

    #[error("{0} cannot upvote their own issue")]
    SelfUpvote(String),

    #[error("{action} requires role {required}, actor is {actual}")]
    RoleNotPermitted {
        action: &'static str,
        required: Role,
        actual: Role,
    },

    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransition),
}

impl MutationError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotSignedIn(_) => ErrorCode::NotSignedIn,
            Self::ActorMismatch { .. } => ErrorCode::ActorMismatch,
            Self::EntityNotFound(_) => ErrorCode::IssueNotFound,
            Self::ActorBlocked(_) => ErrorCode::ActorBlocked,
            Self::SelfUpvote(_) => ErrorCode::SelfUpvote,
            Self::RoleNotPermitted { .. } => ErrorCode::RoleNotPermitted,
            Self::InvalidTransition(_) => ErrorCode::InvalidStatusTransition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_serializes_with_flat_kind_tag() {
        let intent = MutationIntent::issued_at(
            "i1",
            MutationKind::StatusChange {
                status: IssueStatus::InProgress,
            },
            Actor::citizen("a@x.com"),
            DateTime::<Utc>::UNIX_EPOCH,
        );
        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(value["kind"], "status-change");
        assert_eq!(value["status"], "in-progress");
        assert_eq!(value["entity_id"], "i1");

        let back: MutationIntent = serde_json::from_value(value).unwrap();
        assert_eq!(back, intent);
    }

    #[test]
    fn actor_from_user_uses_email() {
        let mut user = User::new("u1", "s@x.com", Role::Staff);
        user.is_blocked = true;
        let actor = Actor::from(&user);
        assert_eq!(actor.id, "s@x.com");
        assert_eq!(actor.role, Role::Staff);
        assert!(actor.is_blocked);
    }
}
