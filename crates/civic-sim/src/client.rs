use std::collections::BTreeMap;

use civic_core::config::MutationConfig;
use civic_core::model::{Issue, User};
use civic_core::mutation::{Actor, Begin, Completion, MutationError, PendingMutation};
use civic_core::session::Session;
use civic_core::transport::TransportError;
use civic_core::{FingerprintStore, MutationIntent, Mutator, QueryKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable identifier for a simulated client.
pub type ClientId = usize;

/// Number of issues cached under the `latest` key.
pub const LATEST_LEN: usize = 3;

/// Immutable snapshot of a client's local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    pub id: ClientId,
    pub email: String,
    /// Cache contents keyed by the rendered query key.
    pub entries: BTreeMap<String, Vec<Issue>>,
    pub in_flight: Vec<String>,
    pub pending: usize,
    pub revoked: bool,
}

/// What happened when the client fired an intent.
#[derive(Debug)]
pub enum Fire {
    Started { seq: u64, intent: MutationIntent },
    Suppressed,
    Refused(MutationError),
}

/// One browser tab: its own cache, session, and mutator.
#[derive(Debug)]
pub struct SimulatedClient {
    id: ClientId,
    user: User,
    session: Session,
    mutator: Mutator,
    store: FingerprintStore<Issue>,
    pending: BTreeMap<u64, PendingMutation>,
    next_seq: u64,
}

impl SimulatedClient {
    #[must_use]
    pub fn new(id: ClientId, user: User, config: MutationConfig, issues: &[Issue]) -> Self {
        let mut client = Self {
            id,
            session: Session::signed_in(user.clone()),
            user,
            mutator: Mutator::new(config),
            store: FingerprintStore::new(),
            pending: BTreeMap::new(),
            next_seq: 0,
        };
        client.load(issues);
        client
    }

    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    #[must_use]
    pub const fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub const fn store(&self) -> &FingerprintStore<Issue> {
        &self.store
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn actor(&self) -> Actor {
        Actor::from(&self.user)
    }

    /// No mutation awaiting a response.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn has_stale_keys(&self) -> bool {
        !self.store.stale_keys().is_empty()
    }

    /// Cache keys this client populates on load.
    #[must_use]
    pub fn cache_keys(&self) -> [QueryKey; 3] {
        [
            QueryKey::new("issues"),
            QueryKey::new("latest"),
            own_issues_key(&self.user.email),
        ]
    }

    /// Replace every cached collection with authoritative data.
    pub fn load(&mut self, issues: &[Issue]) {
        let [all, latest, mine] = self.cache_keys();
        self.store.set(all, issues.to_vec());
        self.store
            .set(latest, issues.iter().take(LATEST_LEN).cloned().collect());
        self.store.set(
            mine,
            issues
                .iter()
                .filter(|issue| issue.created_by == self.user.email)
                .cloned()
                .collect(),
        );
    }

    pub fn sign_in_again(&mut self) {
        self.session.sign_in(self.user.clone());
    }

    pub fn fire(&mut self, intent: MutationIntent) -> Fire {
        match self.mutator.begin(&mut self.store, &self.session, intent) {
            Ok(Begin::Started(pending)) => {
                let seq = self.next_seq;
                self.next_seq = self.next_seq.saturating_add(1);
                let intent = pending.intent().clone();
                self.pending.insert(seq, pending);
                Fire::Started { seq, intent }
            }
            Ok(Begin::Suppressed) => Fire::Suppressed,
            Err(err) => Fire::Refused(err),
        }
    }

    /// Complete the mutation that sent request `seq`. Unknown sequence
    /// numbers are ignored.
    pub fn receive(&mut self, seq: u64, result: Result<Value, TransportError>) -> Option<Completion> {
        let pending = self.pending.remove(&seq)?;
        Some(
            self.mutator
                .complete(&mut self.store, &mut self.session, pending, result),
        )
    }

    #[must_use]
    pub fn snapshot(&self) -> ClientState {
        ClientState {
            id: self.id,
            email: self.user.email.clone(),
            entries: self
                .store
                .keys()
                .filter_map(|key| {
                    self.store
                        .peek(key)
                        .map(|items| (key.to_string(), items.to_vec()))
                })
                .collect(),
            in_flight: self.mutator.guard().in_flight(),
            pending: self.pending.len(),
            revoked: self.session.is_revoked(),
        }
    }
}

#[must_use]
pub fn own_issues_key(email: &str) -> QueryKey {
    QueryKey::new("issues").with_param("createdBy", email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::MutationKind;
    use civic_core::model::Role;
    use serde_json::json;

    fn issues() -> Vec<Issue> {
        (0..5)
            .map(|n| Issue::new(format!("i{n}"), "Pothole", if n % 2 == 0 { "a@x.com" } else { "b@x.com" }))
            .collect()
    }

    fn client() -> SimulatedClient {
        SimulatedClient::new(
            0,
            User::new("u0", "a@x.com", Role::Citizen),
            MutationConfig::default(),
            &issues(),
        )
    }

    #[test]
    fn load_populates_three_keys() {
        let client = client();
        let state = client.snapshot();
        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.entries["issues"].len(), 5);
        assert_eq!(state.entries["latest"].len(), LATEST_LEN);
        assert_eq!(state.entries["issues?createdBy=a@x.com"].len(), 3);
    }

    #[test]
    fn fire_then_receive_releases_in_flight() {
        let mut client = client();
        let intent = MutationIntent::new("i1", MutationKind::Upvote, client.actor());
        let Fire::Started { seq, .. } = client.fire(intent.clone()) else {
            panic!("expected start");
        };
        assert!(matches!(client.fire(intent), Fire::Suppressed));
        assert!(!client.is_idle());

        let done = client
            .receive(seq, Ok(json!({ "upvoted": true, "upvotes": 1 })))
            .unwrap();
        assert!(done.outcome.is_confirmed());
        assert!(client.is_idle());
        assert!(client.snapshot().in_flight.is_empty());
        assert!(client.receive(seq, Ok(json!({}))).is_none());
    }

    #[test]
    fn unauthorized_revokes_until_sign_in() {
        let mut client = client();
        let Fire::Started { seq, .. } =
            client.fire(MutationIntent::new("i1", MutationKind::Upvote, client.actor()))
        else {
            panic!("expected start");
        };
        client.receive(seq, Err(TransportError::Unauthorized { status: 401 }));
        assert!(client.session().is_revoked());

        let before = client.store().clone();
        let retry = MutationIntent::new("i1", MutationKind::Upvote, client.actor());
        assert!(matches!(
            client.fire(retry.clone()),
            Fire::Refused(MutationError::NotSignedIn(_))
        ));
        assert_eq!(client.store(), &before);

        client.sign_in_again();
        assert!(!client.session().is_revoked());
        assert!(matches!(client.fire(retry), Fire::Started { .. }));
    }

    #[test]
    fn self_upvote_is_refused() {
        let mut client = client();
        let intent = MutationIntent::new("i0", MutationKind::Upvote, client.actor());
        assert!(matches!(
            client.fire(intent),
            Fire::Refused(MutationError::SelfUpvote(_))
        ));
    }
}
