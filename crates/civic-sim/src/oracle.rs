use std::collections::{BTreeMap, BTreeSet};

use civic_core::model::Issue;

use crate::client::{ClientId, ClientState};
use crate::{TraceEvent, TraceEventKind};

/// Oracle result for an invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// One client holds two different copies of the same issue.
    CrossCache {
        client: ClientId,
        entity: String,
        key_a: String,
        key_b: String,
    },

    /// An `upvoters` list holds the same user twice.
    DuplicateUpvoter {
        client: ClientId,
        entity: String,
        user: String,
    },

    /// At quiescence a client disagrees with the backend about its own vote.
    OwnVote {
        client: ClientId,
        entity: String,
        local: bool,
        authoritative: bool,
    },

    /// A client still holds in-flight ids or pending mutations after the run.
    NotQuiescent {
        client: ClientId,
        in_flight: Vec<String>,
        pending: usize,
    },

    /// A suppressed or refused fire changed the store.
    SilentMutation { client: ClientId, entity: String, round: u64 },

    /// A second mutation started while one was in flight for the same entity.
    ConcurrentInFlight { client: ClientId, entity: String, round: u64 },
}

/// Invariant checks over the final client states and the trace.
pub struct MutationOracle;

impl MutationOracle {
    #[must_use]
    pub fn check_all(states: &[ClientState], backend: &[Issue], trace: &[TraceEvent]) -> OracleResult {
        Self::check_cross_cache(states)
            .merge(Self::check_unique_upvoters(states))
            .merge(Self::check_own_votes(states, backend))
            .merge(Self::check_quiescence(states))
            .merge(Self::check_trace(trace))
    }

    /// Every copy of an issue inside one client is identical.
    #[must_use]
    pub fn check_cross_cache(states: &[ClientState]) -> OracleResult {
        let mut violations = Vec::new();
        for state in states {
            let mut first_seen: BTreeMap<&str, (&str, &Issue)> = BTreeMap::new();
            for (key, items) in &state.entries {
                for issue in items {
                    match first_seen.get(issue.id.as_str()) {
                        Some((seen_key, seen)) if *seen != issue => {
                            violations.push(InvariantViolation::CrossCache {
                                client: state.id,
                                entity: issue.id.clone(),
                                key_a: (*seen_key).to_string(),
                                key_b: key.clone(),
                            });
                        }
                        Some(_) => {}
                        None => {
                            first_seen.insert(issue.id.as_str(), (key.as_str(), issue));
                        }
                    }
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_unique_upvoters(states: &[ClientState]) -> OracleResult {
        let mut violations = Vec::new();
        for state in states {
            for issue in state.entries.values().flatten() {
                let mut seen = BTreeSet::new();
                for user in &issue.upvoters {
                    if !seen.insert(user) {
                        violations.push(InvariantViolation::DuplicateUpvoter {
                            client: state.id,
                            entity: issue.id.clone(),
                            user: user.clone(),
                        });
                    }
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Only a client's own user toggles its membership, so once everything
    /// has been answered the local view of that membership must match.
    #[must_use]
    pub fn check_own_votes(states: &[ClientState], backend: &[Issue]) -> OracleResult {
        let authoritative: BTreeMap<&str, &Issue> =
            backend.iter().map(|issue| (issue.id.as_str(), issue)).collect();
        let mut violations = Vec::new();
        for state in states {
            let mut checked = BTreeSet::new();
            for issue in state.entries.values().flatten() {
                if !checked.insert(issue.id.as_str()) {
                    continue;
                }
                let Some(server) = authoritative.get(issue.id.as_str()) else {
                    continue;
                };
                let local = issue.has_upvoted(&state.email);
                let expected = server.has_upvoted(&state.email);
                if local != expected {
                    violations.push(InvariantViolation::OwnVote {
                        client: state.id,
                        entity: issue.id.clone(),
                        local,
                        authoritative: expected,
                    });
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_quiescence(states: &[ClientState]) -> OracleResult {
        let violations = states
            .iter()
            .filter(|state| !state.in_flight.is_empty() || state.pending > 0)
            .map(|state| InvariantViolation::NotQuiescent {
                client: state.id,
                in_flight: state.in_flight.clone(),
                pending: state.pending,
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Suppressed fires leave the store alone, and per client at most one
    /// mutation per entity is open at a time.
    #[must_use]
    pub fn check_trace(trace: &[TraceEvent]) -> OracleResult {
        let mut open: BTreeSet<(ClientId, &str)> = BTreeSet::new();
        let mut violations = Vec::new();
        for event in trace {
            match &event.kind {
                TraceEventKind::Fired { client, entity, .. } => {
                    if !open.insert((*client, entity.as_str())) {
                        violations.push(InvariantViolation::ConcurrentInFlight {
                            client: *client,
                            entity: entity.clone(),
                            round: event.round,
                        });
                    }
                }
                TraceEventKind::Completed { client, entity, .. } => {
                    open.remove(&(*client, entity.as_str()));
                }
                TraceEventKind::Suppressed {
                    client,
                    entity,
                    store_changed,
                }
                | TraceEventKind::Refused {
                    client,
                    entity,
                    store_changed,
                    ..
                } if *store_changed => {
                    violations.push(InvariantViolation::SilentMutation {
                        client: *client,
                        entity: entity.clone(),
                        round: event.round,
                    });
                }
                _ => {}
            }
        }
        OracleResult::from_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(entries: Vec<(&str, Vec<Issue>)>) -> ClientState {
        ClientState {
            id: 0,
            email: "a@x.com".to_string(),
            entries: entries
                .into_iter()
                .map(|(key, items)| (key.to_string(), items))
                .collect(),
            in_flight: Vec::new(),
            pending: 0,
            revoked: false,
        }
    }

    fn voted(by: &[&str]) -> Issue {
        let mut issue = Issue::new("i1", "Pothole", "z@x.com");
        issue.upvoters = by.iter().map(ToString::to_string).collect();
        issue.upvotes = issue.upvoters.len() as u64;
        issue
    }

    #[test]
    fn consistent_state_passes() {
        let issue = voted(&["a@x.com"]);
        let states = vec![state(vec![
            ("issues", vec![issue.clone()]),
            ("latest", vec![issue.clone()]),
        ])];
        assert!(MutationOracle::check_all(&states, &[issue], &[]).passed);
    }

    #[test]
    fn divergent_copies_are_reported() {
        let states = vec![state(vec![
            ("issues", vec![voted(&["a@x.com"])]),
            ("latest", vec![voted(&[])]),
        ])];
        let result = MutationOracle::check_cross_cache(&states);
        assert!(!result.passed);
        assert!(matches!(
            &result.violations[0],
            InvariantViolation::CrossCache { key_a, key_b, .. } if key_a == "issues" && key_b == "latest"
        ));
    }

    #[test]
    fn own_vote_mismatch_is_reported() {
        let states = vec![state(vec![("issues", vec![voted(&["a@x.com"])])])];
        let result = MutationOracle::check_own_votes(&states, &[voted(&[])]);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::OwnVote {
                client: 0,
                entity: "i1".to_string(),
                local: true,
                authoritative: false,
            }]
        );
        // Other users' votes are not this client's concern.
        assert!(MutationOracle::check_own_votes(&states, &[voted(&["a@x.com", "b@x.com"])]).passed);
    }

    #[test]
    fn duplicate_upvoter_is_reported() {
        let states = vec![state(vec![("issues", vec![voted(&["a@x.com", "a@x.com"])])])];
        assert!(!MutationOracle::check_unique_upvoters(&states).passed);
    }

    #[test]
    fn overlapping_fires_are_reported() {
        let fired = |round| TraceEvent {
            round,
            kind: TraceEventKind::Fired {
                client: 0,
                seq: round,
                entity: "i1".to_string(),
                kind: "upvote".to_string(),
            },
        };
        let completed = TraceEvent {
            round: 2,
            kind: TraceEventKind::Completed {
                client: 0,
                seq: 0,
                entity: "i1".to_string(),
                outcome: "confirmed".to_string(),
            },
        };
        assert!(MutationOracle::check_trace(&[fired(0), completed.clone(), fired(3)]).passed);
        assert!(!MutationOracle::check_trace(&[fired(0), fired(1), completed]).passed);
    }

    #[test]
    fn pending_at_end_is_reported() {
        let mut pending = state(vec![]);
        pending.in_flight = vec!["i1".to_string()];
        pending.pending = 1;
        assert!(!MutationOracle::check_quiescence(&[pending]).passed);
    }
}
