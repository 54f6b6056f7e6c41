//! Deterministic simulation of concurrent speculative mutations.
//!
//! Several clients, each with its own cache, session, and mutator, fire
//! mutations against one authoritative [`SimulatedBackend`]. Requests are
//! delayed, lost, refused, or answered with garbage according to a seeded
//! [`FaultConfig`]. After the last round every outstanding response is
//! delivered and [`oracle::MutationOracle`] checks the final states.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod backend;
pub mod campaign;
pub mod client;
pub mod oracle;
pub mod rng;

pub use backend::{FaultConfig, SimulatedBackend};
pub use campaign::{
    CampaignConfig, CampaignReport, DetailedTrace, SeedFailure, format_violation, replay_seed,
    run_campaign, run_single_seed,
};
pub use client::{ClientId, ClientState, SimulatedClient};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use civic_core::config::MutationConfig;
use civic_core::model::{Issue, IssueStatus, Role, User};
use civic_core::{MutationIntent, MutationKind, QueryKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::Fire;
use crate::rng::SimRng;

/// Parameters for one simulated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub citizens: usize,
    pub staff: usize,
    pub admins: usize,
    pub issues: usize,
    /// Rounds in which clients act. Draining outstanding responses afterwards
    /// takes extra rounds.
    pub rounds: u64,
    /// Per-client chance to fire a mutation each round.
    pub action_rate_percent: u8,
    /// Per idle client chance to reload from the backend each round.
    pub refetch_rate_percent: u8,
    pub fault: FaultConfig,
    pub mutation: MutationConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            citizens: 4,
            staff: 1,
            admins: 1,
            issues: 6,
            rounds: 32,
            action_rate_percent: 60,
            refetch_rate_percent: 5,
            fault: FaultConfig::default(),
            mutation: MutationConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if a population or the round count is zero.
    pub fn validate(&self) -> Result<()> {
        if self.citizens == 0 {
            bail!("citizens must be > 0");
        }
        if self.issues == 0 {
            bail!("issues must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TraceEventKind {
    Fired {
        client: ClientId,
        seq: u64,
        entity: String,
        kind: String,
    },
    Suppressed {
        client: ClientId,
        entity: String,
        store_changed: bool,
    },
    Refused {
        client: ClientId,
        entity: String,
        code: String,
        store_changed: bool,
    },
    Completed {
        client: ClientId,
        seq: u64,
        entity: String,
        outcome: String,
    },
    Refetched {
        client: ClientId,
    },
    SignedIn {
        client: ClientId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    pub trace: Vec<TraceEvent>,
    pub states: Vec<ClientState>,
    /// Authoritative issues at the end of the run.
    pub backend: Vec<Issue>,
    /// Total rounds including the drain.
    pub rounds_run: u64,
    /// A rollback, sign-out, or suppression happened at least once.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    /// Stable hash of the trace, for comparing replays.
    ///
    /// # Errors
    ///
    /// Returns an error if a trace event fails to serialize.
    pub fn trace_fingerprint(&self) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        for event in &self.trace {
            hasher.update(&serde_json::to_vec(event)?);
            hasher.update(b"\n");
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

/// Drives clients and backend round by round.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: SimRng,
    backend: SimulatedBackend,
    clients: Vec<SimulatedClient>,
    staff_emails: Vec<String>,
    trace: Vec<TraceEvent>,
    round: u64,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error when the config fails validation.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let mut users = Vec::new();
        for (role, count, prefix) in [
            (Role::Citizen, config.citizens, "citizen"),
            (Role::Staff, config.staff, "staff"),
            (Role::Admin, config.admins, "admin"),
        ] {
            for n in 0..count {
                users.push(User::new(
                    format!("{prefix}-{n}"),
                    format!("{prefix}{n}@civic.test"),
                    role,
                ));
            }
        }

        let issues: Vec<Issue> = (0..config.issues)
            .map(|n| {
                let owner = &users[n % config.citizens];
                Issue::new(format!("issue-{n:03}"), format!("Issue {n}"), owner.email.clone())
            })
            .collect();

        let staff_emails = users
            .iter()
            .filter(|u| u.role == Role::Staff)
            .map(|u| u.email.clone())
            .collect();
        let clients = users
            .into_iter()
            .enumerate()
            .map(|(id, user)| SimulatedClient::new(id, user, config.mutation.clone(), &issues))
            .collect();

        Ok(Self {
            rng: SimRng::new(config.seed),
            backend: SimulatedBackend::new(issues, config.fault),
            clients,
            staff_emails,
            trace: Vec::new(),
            round: 0,
            config,
        })
    }

    /// Run the acting rounds, then deliver everything still in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if outstanding requests fail to drain.
    pub fn run(&mut self) -> Result<SimulationResult> {
        for _ in 0..self.config.rounds {
            self.step(true);
        }

        let drain_limit = u64::from(self.config.fault.max_delay_rounds).saturating_add(2);
        let mut drained = 0;
        while self.backend.pending_len() > 0 {
            if drained >= drain_limit {
                bail!(
                    "{} requests still queued after {drain_limit} drain rounds",
                    self.backend.pending_len()
                );
            }
            self.step(false);
            drained += 1;
        }

        let interesting_state_reached = self.trace.iter().any(|event| match &event.kind {
            TraceEventKind::Suppressed { .. } => true,
            TraceEventKind::Completed { outcome, .. } => outcome != "confirmed",
            _ => false,
        });

        info!(
            seed = self.config.seed,
            rounds = self.round,
            events = self.trace.len(),
            "simulation complete"
        );

        Ok(SimulationResult {
            trace: self.trace.clone(),
            states: self.clients.iter().map(SimulatedClient::snapshot).collect(),
            backend: self.backend.snapshot(),
            rounds_run: self.round,
            interesting_state_reached,
        })
    }

    fn step(&mut self, act: bool) {
        let round = self.round;

        for delivery in self.backend.deliver_ready(round, &mut self.rng) {
            let Some(client) = self.clients.get_mut(delivery.client) else {
                continue;
            };
            if let Some(done) = client.receive(delivery.seq, delivery.result) {
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Completed {
                        client: delivery.client,
                        seq: delivery.seq,
                        entity: done.entity_id,
                        outcome: done.outcome.label().to_string(),
                    },
                });
            }
        }

        if act {
            for index in 0..self.clients.len() {
                self.act(index);
            }
        }

        let authoritative = self.backend.snapshot();
        for client in &mut self.clients {
            if client.is_idle()
                && (client.has_stale_keys() || self.rng.chance(self.config.refetch_rate_percent))
            {
                client.load(&authoritative);
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Refetched { client: client.id() },
                });
            }
        }

        debug!(round, queued = self.backend.pending_len(), "round complete");
        self.round = self.round.saturating_add(1);
    }

    fn act(&mut self, index: usize) {
        let round = self.round;
        let Some(client) = self.clients.get_mut(index) else {
            return;
        };

        if client.session().is_revoked() {
            client.sign_in_again();
            self.trace.push(TraceEvent {
                round,
                kind: TraceEventKind::SignedIn { client: index },
            });
            return;
        }
        if !self.rng.chance(self.config.action_rate_percent) {
            return;
        }
        let Some(intent) = choose_intent(&mut self.rng, client, &self.staff_emails, round) else {
            return;
        };

        let entity = intent.entity_id.clone();
        let before = client.store().clone();
        let kind = match client.fire(intent) {
            Fire::Started { seq, intent } => {
                let kind = TraceEventKind::Fired {
                    client: index,
                    seq,
                    entity,
                    kind: intent.kind.label().to_string(),
                };
                self.backend.submit(index, seq, intent, round, &mut self.rng);
                kind
            }
            Fire::Suppressed => TraceEventKind::Suppressed {
                client: index,
                entity,
                store_changed: client.store() != &before,
            },
            Fire::Refused(err) => TraceEventKind::Refused {
                client: index,
                entity,
                code: err.code().to_string(),
                store_changed: client.store() != &before,
            },
        };
        self.trace.push(TraceEvent { round, kind });
    }
}

fn choose_intent(
    rng: &mut SimRng,
    client: &SimulatedClient,
    staff: &[String],
    round: u64,
) -> Option<MutationIntent> {
    let issues = client.store().peek(&QueryKey::new("issues"))?;
    let issue = rng.pick(issues)?;
    let actor = client.actor();

    let kind = match actor.role {
        Role::Citizen => MutationKind::Upvote,
        Role::Staff => {
            let legal: Vec<IssueStatus> = IssueStatus::ALL
                .into_iter()
                .filter(|status| issue.status.can_transition_to(*status).is_ok())
                .collect();
            match rng.pick(&legal) {
                Some(status) if rng.chance(50) => MutationKind::StatusChange { status: *status },
                _ => MutationKind::Upvote,
            }
        }
        Role::Admin => match rng.pick(staff) {
            Some(staff) if rng.chance(50) => MutationKind::Assign {
                staff: staff.clone(),
            },
            _ => MutationKind::Upvote,
        },
    };

    Some(MutationIntent::issued_at(
        issue.id.clone(),
        kind,
        actor,
        simulated_time(round),
    ))
}

/// Rounds map to seconds after the epoch so intents replay identically.
fn simulated_time(round: u64) -> DateTime<Utc> {
    i64::try_from(round)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_trace() {
        let config = SimulationConfig {
            seed: 11,
            ..SimulationConfig::default()
        };
        let a = Simulator::new(config.clone()).unwrap().run().unwrap();
        let b = Simulator::new(config).unwrap().run().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.trace_fingerprint().unwrap(), b.trace_fingerprint().unwrap());
    }

    #[test]
    fn different_seeds_diverge() {
        let a = Simulator::new(SimulationConfig::default()).unwrap().run().unwrap();
        let b = Simulator::new(SimulationConfig {
            seed: 99,
            ..SimulationConfig::default()
        })
        .unwrap()
        .run()
        .unwrap();
        assert_ne!(a.trace_fingerprint().unwrap(), b.trace_fingerprint().unwrap());
    }

    #[test]
    fn run_ends_quiescent() {
        let result = Simulator::new(SimulationConfig::default()).unwrap().run().unwrap();
        assert!(result.rounds_run >= 32);
        assert!(result.states.iter().all(|s| s.pending == 0 && s.in_flight.is_empty()));
        assert_eq!(result.states.len(), 6);
        assert!(result
            .trace
            .iter()
            .any(|e| matches!(e.kind, TraceEventKind::Fired { .. })));
    }

    #[test]
    fn zero_citizens_rejected() {
        let config = SimulationConfig {
            citizens: 0,
            ..SimulationConfig::default()
        };
        assert!(Simulator::new(config).is_err());
    }

    #[test]
    fn trace_events_serialize_flat() {
        let event = TraceEvent {
            round: 3,
            kind: TraceEventKind::SignedIn { client: 2 },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "signed-in");
        assert_eq!(value["round"], 3);
        assert_eq!(value["client"], 2);
    }
}
