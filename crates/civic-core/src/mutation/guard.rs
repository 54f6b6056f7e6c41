use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Set of entity ids with an outstanding mutation.
///
/// Clones share the same set, so a guard can be handed to every view that
/// mutates the same entities.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    ids: Arc<Mutex<BTreeSet<String>>>,
}

impl InFlightGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `id`. Returns `None` when it is already in flight.
    #[must_use]
    pub fn try_acquire(&self, id: &str) -> Option<InFlightTicket> {
        if !self.lock().insert(id.to_string()) {
            return None;
        }
        Some(InFlightTicket {
            ids: Arc::clone(&self.ids),
            id: id.to_string(),
        })
    }

    #[must_use]
    pub fn is_in_flight(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    #[must_use]
    pub fn in_flight(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock().is_empty()
    }
}

/// RAII claim on one entity id. The id is released on drop.
#[derive(Debug)]
pub struct InFlightTicket {
    ids: Arc<Mutex<BTreeSet<String>>>,
    id: String,
}

impl InFlightTicket {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::InFlightGuard;

    #[test]
    fn second_claim_is_refused_until_release() {
        let guard = InFlightGuard::new();
        let ticket = guard.try_acquire("i1").expect("first claim");
        assert!(guard.try_acquire("i1").is_none());
        assert!(guard.is_in_flight("i1"));

        drop(ticket);
        assert!(!guard.is_in_flight("i1"));
        assert!(guard.try_acquire("i1").is_some());
    }

    #[test]
    fn distinct_ids_are_independent() {
        let guard = InFlightGuard::new();
        let _a = guard.try_acquire("i1").expect("i1");
        let _b = guard.try_acquire("i2").expect("i2");
        assert_eq!(guard.in_flight(), vec!["i1", "i2"]);
    }

    #[test]
    fn clones_share_state() {
        let guard = InFlightGuard::new();
        let other_view = guard.clone();
        let ticket = guard.try_acquire("i1").expect("claim");
        assert!(other_view.try_acquire("i1").is_none());
        assert_eq!(ticket.id(), "i1");
        drop(ticket);
        assert!(other_view.is_idle());
    }
}
