use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::response::{MutationResponse, ResponseShape};
use super::rollback::RollbackSnapshot;
use super::speculate::{set_upvoted, speculate};
use super::{Actor, InFlightGuard, InFlightTicket, MutationError, MutationIntent, MutationKind};
use crate::config::{MutationConfig, UnrecognizedResponsePolicy};
use crate::model::{InvalidTransition, Issue, IssueStatus, Role};
use crate::session::{LOGIN_ROUTE, Session};
use crate::store::{FingerprintStore, QueryKey};
use crate::transport::{MutationTransport, TransportError};

/// A speculative mutation waiting for its server response.
///
/// Holds the in-flight ticket for its entity. Dropping it without calling
/// [`Mutator::complete`] releases the id but leaves the speculative state in
/// the store.
#[derive(Debug)]
pub struct PendingMutation {
    intent: MutationIntent,
    next_state: Issue,
    snapshot: RollbackSnapshot,
    ticket: InFlightTicket,
}

impl PendingMutation {
    #[must_use]
    pub const fn intent(&self) -> &MutationIntent {
        &self.intent
    }

    /// The speculative entity applied to the store.
    #[must_use]
    pub const fn next_state(&self) -> &Issue {
        &self.next_state
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        self.ticket.id()
    }
}

/// Result of [`Mutator::begin`].
#[derive(Debug)]
pub enum Begin {
    Started(PendingMutation),
    /// The entity already had a mutation in flight; nothing was applied.
    Suppressed,
}

/// Why the speculative state was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RollbackReason {
    Network { detail: String },
    Rejected { status: u16 },
    UnrecognizedResponse,
}

/// How a mutation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum MutationOutcome {
    /// The server response was reconciled into the store.
    Confirmed { shape: ResponseShape },
    /// The response matched no shape and policy kept the speculative state.
    KeptSpeculative,
    /// The pre-mutation snapshot was restored.
    RolledBack { reason: RollbackReason },
    /// Rolled back, and the session was signed out.
    SessionRevoked { redirect: String },
    /// Another mutation for the entity was in flight.
    Suppressed,
}

impl MutationOutcome {
    /// Transient user-facing notice, if the outcome warrants one.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Confirmed { .. } | Self::KeptSpeculative | Self::Suppressed => None,
            Self::RolledBack { reason } => Some(match reason {
                RollbackReason::Network { .. } => {
                    "Could not reach the server. Your change was undone.".to_string()
                }
                RollbackReason::Rejected { status } => {
                    format!("The server refused the change (HTTP {status}). Your change was undone.")
                }
                RollbackReason::UnrecognizedResponse => {
                    "Unexpected server response. Your change was undone.".to_string()
                }
            }),
            Self::SessionRevoked { .. } => {
                Some("Your session has expired. Please sign in again.".to_string())
            }
        }
    }

    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Confirmed { .. } => "confirmed",
            Self::KeptSpeculative => "kept-speculative",
            Self::RolledBack { .. } => "rolled-back",
            Self::SessionRevoked { .. } => "session-revoked",
            Self::Suppressed => "suppressed",
        }
    }
}

/// Everything a caller learns from completing a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub entity_id: String,
    #[serde(flatten)]
    pub outcome: MutationOutcome,
    /// Keys marked stale for refetch (empty unless `refetch_after_mutation`).
    pub invalidated: Vec<QueryKey>,
}

/// Runs speculative mutations against an issue store.
#[derive(Debug, Clone, Default)]
pub struct Mutator {
    config: MutationConfig,
    guard: InFlightGuard,
}

impl Mutator {
    #[must_use]
    pub fn new(config: MutationConfig) -> Self {
        Self::with_guard(config, InFlightGuard::new())
    }

    /// Share an existing in-flight set, e.g. with another view's mutator.
    #[must_use]
    pub const fn with_guard(config: MutationConfig, guard: InFlightGuard) -> Self {
        Self { config, guard }
    }

    #[must_use]
    pub const fn config(&self) -> &MutationConfig {
        &self.config
    }

    #[must_use]
    pub const fn guard(&self) -> &InFlightGuard {
        &self.guard
    }

    /// Phase one: validate, capture the snapshot, apply the speculation.
    ///
    /// # Errors
    ///
    /// Returns a [`MutationError`] when the session has no identity or a
    /// different one than the intent's actor, the entity is not cached, or
    /// the actor may not perform the action. The store is untouched in that
    /// case.
    pub fn begin(
        &self,
        store: &mut FingerprintStore<Issue>,
        session: &Session,
        intent: MutationIntent,
    ) -> Result<Begin, MutationError> {
        check_session(session, &intent.actor)?;

        let id = intent.entity_id.clone();
        if self.guard.is_in_flight(&id) {
            debug!(entity = %id, kind = intent.kind.label(), "mutation suppressed, already in flight");
            return Ok(Begin::Suppressed);
        }

        let current = store
            .find_entity(&id)
            .ok_or_else(|| MutationError::EntityNotFound(id.clone()))?;
        self.authorize(current, &intent)?;

        let Some(ticket) = self.guard.try_acquire(&id) else {
            return Ok(Begin::Suppressed);
        };

        let snapshot = RollbackSnapshot::capture(store, &id, self.config.rollback_scope);
        let next_state = speculate(current, &intent);
        let touched = store.update_entity(&id, |copy| speculate(copy, &intent));
        debug!(
            entity = %id,
            kind = intent.kind.label(),
            keys = touched.len(),
            "applied speculative state"
        );

        Ok(Begin::Started(PendingMutation {
            intent,
            next_state,
            snapshot,
            ticket,
        }))
    }

    fn authorize(&self, issue: &Issue, intent: &MutationIntent) -> Result<(), MutationError> {
        let actor = &intent.actor;
        if actor.is_blocked {
            return Err(MutationError::ActorBlocked(actor.id.clone()));
        }

        match &intent.kind {
            MutationKind::Upvote => {
                if !self.config.allow_self_upvote && issue.created_by == actor.id {
                    return Err(MutationError::SelfUpvote(actor.id.clone()));
                }
            }
            MutationKind::Assign { .. } => {
                require_role(actor, "assign", &[Role::Admin])?;
                if !matches!(issue.status, IssueStatus::Pending | IssueStatus::StaffAssigned) {
                    return Err(MutationError::InvalidTransition(InvalidTransition {
                        from: issue.status,
                        to: IssueStatus::StaffAssigned,
                        reason: "only pending or staff-assigned issues can be assigned",
                    }));
                }
            }
            MutationKind::StatusChange { status } => {
                require_role(actor, "status-change", &[Role::Staff, Role::Admin])?;
                issue.status.can_transition_to(*status)?;
            }
        }
        Ok(())
    }

    /// Phase two: reconcile the server response or roll back.
    ///
    /// The in-flight ticket is released when this returns, whatever the
    /// outcome. On an authorization failure the session is signed out.
    pub fn complete(
        &self,
        store: &mut FingerprintStore<Issue>,
        session: &mut Session,
        pending: PendingMutation,
        result: Result<Value, TransportError>,
    ) -> Completion {
        let PendingMutation {
            intent,
            next_state: _,
            snapshot,
            ticket,
        } = pending;
        let id = ticket.id().to_string();

        let outcome = match result {
            Ok(body) => self.reconcile(store, &intent, snapshot, MutationResponse::decode(body)),
            Err(TransportError::Malformed(detail)) => {
                debug!(entity = %id, "malformed body: {detail}");
                self.reconcile(store, &intent, snapshot, MutationResponse::Unrecognized(Value::Null))
            }
            Err(TransportError::Unauthorized { status }) => {
                snapshot.restore(store);
                warn!(entity = %id, status, "mutation unauthorized, signing out");
                session.sign_out();
                MutationOutcome::SessionRevoked {
                    redirect: LOGIN_ROUTE.to_string(),
                }
            }
            Err(TransportError::Network(detail)) => {
                snapshot.restore(store);
                warn!(entity = %id, "mutation failed, rolled back: {detail}");
                MutationOutcome::RolledBack {
                    reason: RollbackReason::Network { detail },
                }
            }
            Err(TransportError::Status { status, body }) => {
                snapshot.restore(store);
                warn!(entity = %id, status, "mutation rejected, rolled back: {body}");
                MutationOutcome::RolledBack {
                    reason: RollbackReason::Rejected { status },
                }
            }
        };

        let invalidated = if self.config.refetch_after_mutation {
            store
                .keys_containing(&id)
                .into_iter()
                .filter(|key| store.invalidate(key))
                .collect()
        } else {
            Vec::new()
        };

        drop(ticket);
        Completion {
            entity_id: id,
            outcome,
            invalidated,
        }
    }

    fn reconcile(
        &self,
        store: &mut FingerprintStore<Issue>,
        intent: &MutationIntent,
        snapshot: RollbackSnapshot,
        response: MutationResponse,
    ) -> MutationOutcome {
        let id = &intent.entity_id;
        match response {
            MutationResponse::FullEntity(issue) if issue.id == *id => {
                let keys = store.replace_entity(&issue);
                debug!(entity = %id, keys = keys.len(), "reconciled full entity");
                MutationOutcome::Confirmed {
                    shape: ResponseShape::FullEntity,
                }
            }
            MutationResponse::UpvoteDelta { upvoted, upvotes }
                if intent.kind == MutationKind::Upvote =>
            {
                let user = intent.actor.id.as_str();
                let keys = store.update_entity(id, |copy| {
                    let mut next = set_upvoted(copy, user, upvoted);
                    next.upvotes = upvotes;
                    next
                });
                debug!(entity = %id, keys = keys.len(), upvoted, upvotes, "reconciled vote delta");
                MutationOutcome::Confirmed {
                    shape: ResponseShape::UpvoteDelta,
                }
            }
            other => match self.config.unrecognized_response {
                UnrecognizedResponsePolicy::Rollback => {
                    warn!(entity = %id, response = ?other, "unrecognized mutation response, rolled back");
                    snapshot.restore(store);
                    MutationOutcome::RolledBack {
                        reason: RollbackReason::UnrecognizedResponse,
                    }
                }
                UnrecognizedResponsePolicy::KeepSpeculative => {
                    warn!(entity = %id, response = ?other, "unrecognized mutation response, keeping speculative state");
                    MutationOutcome::KeptSpeculative
                }
            },
        }
    }

    /// Run both phases against `transport`.
    ///
    /// # Errors
    ///
    /// Returns a [`MutationError`] when [`Mutator::begin`] refuses the intent.
    pub fn execute(
        &self,
        store: &mut FingerprintStore<Issue>,
        session: &mut Session,
        transport: &mut dyn MutationTransport,
        intent: MutationIntent,
    ) -> Result<Completion, MutationError> {
        let entity_id = intent.entity_id.clone();
        match self.begin(store, session, intent)? {
            Begin::Suppressed => Ok(Completion {
                entity_id,
                outcome: MutationOutcome::Suppressed,
                invalidated: Vec::new(),
            }),
            Begin::Started(pending) => {
                let result = transport.submit(pending.intent());
                Ok(self.complete(store, session, pending, result))
            }
        }
    }
}

fn check_session(session: &Session, actor: &Actor) -> Result<(), MutationError> {
    let Some(user) = session.identity() else {
        return Err(MutationError::NotSignedIn(actor.id.clone()));
    };
    if user.email != actor.id {
        return Err(MutationError::ActorMismatch {
            actor: actor.id.clone(),
            signed_in: user.email.clone(),
        });
    }
    Ok(())
}

fn require_role(actor: &Actor, action: &'static str, allowed: &[Role]) -> Result<(), MutationError> {
    if allowed.contains(&actor.role) {
        Ok(())
    } else {
        Err(MutationError::RoleNotPermitted {
            action,
            required: allowed.first().copied().unwrap_or_default(),
            actual: actor.role,
        })
    }
}
