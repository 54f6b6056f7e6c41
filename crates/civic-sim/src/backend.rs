use std::collections::BTreeMap;

use civic_core::model::{Issue, IssueStatus};
use civic_core::mutation::{MutationIntent, MutationKind, assign_staff, change_status};
use civic_core::transport::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::ClientId;
use crate::rng::SimRng;

/// Fault injection for simulated round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum response delay in rounds.
    pub max_delay_rounds: u8,
    /// Percentage of requests lost before reaching the backend.
    pub drop_rate_percent: u8,
    /// Percentage of requests answered 401.
    pub unauthorized_rate_percent: u8,
    /// Percentage of requests answered with a body matching no shape.
    pub malformed_rate_percent: u8,
    /// Percentage of upvote responses sent as a vote delta instead of the full issue.
    pub delta_shape_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 3,
            drop_rate_percent: 10,
            unauthorized_rate_percent: 2,
            malformed_rate_percent: 5,
            delta_shape_percent: 50,
        }
    }
}

/// What will happen to a request, decided at send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Lost,
    Unauthorized,
    Malformed,
    Process,
}

#[derive(Debug, Clone)]
struct InFlightRequest {
    deliver_at_round: u64,
    client: ClientId,
    seq: u64,
    intent: MutationIntent,
    fate: Fate,
}

/// A response arriving back at a client.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub client: ClientId,
    pub seq: u64,
    pub result: Result<Value, TransportError>,
}

/// Authoritative issue state plus a delayed, fault-injecting request queue.
///
/// Only requests whose fate is `Process` touch the authoritative state; a
/// lost, unauthorized, or malformed exchange leaves it unchanged.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    issues: BTreeMap<String, Issue>,
    queue: Vec<InFlightRequest>,
    fault: FaultConfig,
}

impl SimulatedBackend {
    #[must_use]
    pub fn new(issues: Vec<Issue>, fault: FaultConfig) -> Self {
        Self {
            issues: issues.into_iter().map(|i| (i.id.clone(), i)).collect(),
            queue: Vec::new(),
            fault,
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    /// Authoritative issues in id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Issue> {
        self.issues.values().cloned().collect()
    }

    #[must_use]
    pub fn issue(&self, id: &str) -> Option<&Issue> {
        self.issues.get(id)
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Queue a request; its fate and delay are drawn now.
    pub fn submit(
        &mut self,
        client: ClientId,
        seq: u64,
        intent: MutationIntent,
        round: u64,
        rng: &mut SimRng,
    ) {
        let fate = if rng.chance(self.fault.drop_rate_percent) {
            Fate::Lost
        } else if rng.chance(self.fault.unauthorized_rate_percent) {
            Fate::Unauthorized
        } else if rng.chance(self.fault.malformed_rate_percent) {
            Fate::Malformed
        } else {
            Fate::Process
        };

        let delay = rng.below(u64::from(self.fault.max_delay_rounds).saturating_add(1));
        self.queue.push(InFlightRequest {
            deliver_at_round: round.saturating_add(delay),
            client,
            seq,
            intent,
            fate,
        });
    }

    /// Process and answer every request due by `round`, in submit order.
    pub fn deliver_ready(&mut self, round: u64, rng: &mut SimRng) -> Vec<Delivery> {
        let (ready, future): (Vec<_>, Vec<_>) = self
            .queue
            .drain(..)
            .partition(|request| request.deliver_at_round <= round);
        self.queue = future;

        ready
            .into_iter()
            .map(|request| {
                let result = match request.fate {
                    Fate::Lost => Err(TransportError::Network("request lost".to_string())),
                    Fate::Unauthorized => Err(TransportError::Unauthorized { status: 401 }),
                    Fate::Malformed => Ok(json!({ "message": "accepted" })),
                    Fate::Process => self.process(&request.intent, rng),
                };
                Delivery {
                    client: request.client,
                    seq: request.seq,
                    result,
                }
            })
            .collect()
    }

    fn process(&mut self, intent: &MutationIntent, rng: &mut SimRng) -> Result<Value, TransportError> {
        let Some(current) = self.issues.get(&intent.entity_id) else {
            return Err(TransportError::Status {
                status: 404,
                body: format!("no issue {}", intent.entity_id),
            });
        };

        let (next, delta) = match &intent.kind {
            MutationKind::Upvote => {
                let actor = intent.actor.id.as_str();
                let mut next = current.clone();
                let upvoted = if next.has_upvoted(actor) {
                    next.upvoters.retain(|u| u != actor);
                    false
                } else {
                    next.upvoters.push(actor.to_string());
                    true
                };
                next.upvotes = u64::try_from(next.upvoters.len()).unwrap_or(u64::MAX);
                let delta = rng
                    .chance(self.fault.delta_shape_percent)
                    .then(|| json!({ "upvoted": upvoted, "upvotes": next.upvotes }));
                (next, delta)
            }
            MutationKind::Assign { staff } => {
                if !matches!(current.status, IssueStatus::Pending | IssueStatus::StaffAssigned) {
                    return Err(conflict(current));
                }
                (assign_staff(current, staff), None)
            }
            MutationKind::StatusChange { status } => {
                if current.status.can_transition_to(*status).is_err() {
                    return Err(conflict(current));
                }
                (change_status(current, *status), None)
            }
        };

        let body = delta.unwrap_or_else(|| json!({ "issue": next }));
        self.issues.insert(next.id.clone(), next);
        Ok(body)
    }
}

fn conflict(current: &Issue) -> TransportError {
    TransportError::Status {
        status: 409,
        body: format!("issue {} is {}", current.id, current.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::mutation::Actor;

    fn backend(fault: FaultConfig) -> SimulatedBackend {
        SimulatedBackend::new(vec![Issue::new("i1", "Pothole", "z@x.com")], fault)
    }

    fn upvote(user: &str) -> MutationIntent {
        MutationIntent::new("i1", MutationKind::Upvote, Actor::citizen(user))
    }

    fn clean() -> FaultConfig {
        FaultConfig {
            max_delay_rounds: 0,
            drop_rate_percent: 0,
            unauthorized_rate_percent: 0,
            malformed_rate_percent: 0,
            delta_shape_percent: 100,
        }
    }

    #[test]
    fn clean_upvote_toggles_authoritative_state() {
        let mut rng = SimRng::new(1);
        let mut backend = backend(clean());
        backend.submit(0, 0, upvote("a@x.com"), 0, &mut rng);
        let deliveries = backend.deliver_ready(0, &mut rng);
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            deliveries[0].result,
            Ok(json!({ "upvoted": true, "upvotes": 1 }))
        );
        assert!(backend.issue("i1").unwrap().has_upvoted("a@x.com"));
        assert_eq!(backend.pending_len(), 0);
    }

    #[test]
    fn lost_requests_do_not_apply() {
        let mut rng = SimRng::new(1);
        let mut backend = backend(FaultConfig {
            drop_rate_percent: 100,
            ..clean()
        });
        backend.submit(0, 0, upvote("a@x.com"), 0, &mut rng);
        let deliveries = backend.deliver_ready(0, &mut rng);
        assert!(matches!(deliveries[0].result, Err(TransportError::Network(_))));
        assert!(!backend.issue("i1").unwrap().has_upvoted("a@x.com"));
    }

    #[test]
    fn delay_holds_requests_back() {
        let mut rng = SimRng::new(9);
        let mut backend = backend(FaultConfig {
            max_delay_rounds: 5,
            ..clean()
        });
        for seq in 0..20 {
            backend.submit(0, seq, upvote("a@x.com"), 10, &mut rng);
        }
        assert!(backend.deliver_ready(9, &mut rng).is_empty());
        let mut delivered = 0;
        for round in 10..=15 {
            delivered += backend.deliver_ready(round, &mut rng).len();
        }
        assert_eq!(delivered, 20);
    }

    #[test]
    fn illegal_status_change_conflicts() {
        let mut rng = SimRng::new(1);
        let mut backend = backend(clean());
        let mut staff = Actor::citizen("s@x.com");
        staff.role = civic_core::model::Role::Staff;
        let intent = MutationIntent::new(
            "i1",
            MutationKind::StatusChange {
                status: IssueStatus::Closed,
            },
            staff.clone(),
        );
        // pending -> closed is legal, closed -> working is not.
        backend.submit(0, 0, intent, 0, &mut rng);
        let again = MutationIntent::new(
            "i1",
            MutationKind::StatusChange {
                status: IssueStatus::Working,
            },
            staff,
        );
        backend.submit(0, 1, again, 0, &mut rng);
        let deliveries = backend.deliver_ready(0, &mut rng);
        assert!(deliveries[0].result.is_ok());
        assert!(matches!(
            deliveries[1].result,
            Err(TransportError::Status { status: 409, .. })
        ));
        assert_eq!(backend.issue("i1").unwrap().status, IssueStatus::Closed);
    }
}
