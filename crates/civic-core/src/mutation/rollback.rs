use crate::config::RollbackScope;
use crate::model::Issue;
use crate::store::{FingerprintStore, QueryKey};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Saved {
    Collection { items: Vec<Issue>, stale: bool },
    Entity(Issue),
}

/// Pre-mutation state of every key holding one entity.
///
/// Must be captured before the speculative update is applied; restoring a
/// snapshot taken afterwards is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackSnapshot {
    entity_id: String,
    saved: Vec<(QueryKey, Saved)>,
}

impl RollbackSnapshot {
    #[must_use]
    pub fn capture(store: &FingerprintStore<Issue>, entity_id: &str, scope: RollbackScope) -> Self {
        let saved = store
            .keys_containing(entity_id)
            .into_iter()
            .filter_map(|key| {
                let saved = match scope {
                    RollbackScope::Collection => {
                        let (items, stale) = store.entry_state(&key)?;
                        Saved::Collection { items, stale }
                    }
                    RollbackScope::Entity => Saved::Entity(store.entity(&key, entity_id)?.clone()),
                };
                Some((key, saved))
            })
            .collect();

        Self {
            entity_id: entity_id.to_string(),
            saved,
        }
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Keys this snapshot will restore.
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.saved.iter().map(|(key, _)| key)
    }

    /// The entity as it was before the mutation, from the first saved key.
    #[must_use]
    pub fn original(&self) -> Option<&Issue> {
        self.saved.iter().find_map(|(_, saved)| match saved {
            Saved::Entity(issue) => Some(issue),
            Saved::Collection { items, .. } => items.iter().find(|i| i.id == self.entity_id),
        })
    }

    /// Put every saved key back. Returns the keys restored.
    pub fn restore(self, store: &mut FingerprintStore<Issue>) -> Vec<QueryKey> {
        let entity_id = self.entity_id;
        self.saved
            .into_iter()
            .map(|(key, saved)| {
                match saved {
                    Saved::Collection { items, stale } => {
                        store.restore_entry(key.clone(), items, stale);
                    }
                    Saved::Entity(original) => store.update(&key, |items| {
                        items
                            .iter()
                            .map(|i| if i.id == entity_id { original.clone() } else { i.clone() })
                            .collect()
                    }),
                }
                key
            })
            .collect()
    }
}
