//! Fingerprint Store: cached entity collections keyed by query identity.
//!
//! Each [`QueryKey`] maps to the last snapshot written for it, whether that
//! snapshot came from the server or from a speculative update. Writes are
//! last-writer-wins; there is no merge between keys.
//!
//! The same entity commonly appears under several keys (the full issue list
//! and a "latest" list, say). [`FingerprintStore::update_entity`] and
//! [`FingerprintStore::replace_entity`] touch every key holding an id so the
//! copies cannot drift apart.

mod key;

pub use key::QueryKey;

use std::collections::BTreeMap;

use crate::model::{Issue, User};

/// Anything cached by id.
pub trait Entity: Clone {
    fn entity_id(&self) -> &str;
}

impl Entity for Issue {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Entity for User {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry<E> {
    items: Vec<E>,
    stale: bool,
}

/// In-memory keyed cache of entity snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintStore<E> {
    entries: BTreeMap<QueryKey, Entry<E>>,
}

impl<E> Default for FingerprintStore<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<E: Entity> FingerprintStore<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot for `key`, or an empty collection.
    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Vec<E> {
        self.peek(key).map(<[E]>::to_vec).unwrap_or_default()
    }

    /// Borrow the snapshot for `key` without cloning.
    #[must_use]
    pub fn peek(&self, key: &QueryKey) -> Option<&[E]> {
        self.entries.get(key).map(|entry| entry.items.as_slice())
    }

    /// Replace the snapshot unconditionally. Clears any stale mark.
    pub fn set(&mut self, key: QueryKey, items: Vec<E>) {
        self.entries.insert(key, Entry { items, stale: false });
    }

    /// Store `f(current)` under `key`, treating a missing key as empty.
    pub fn update(&mut self, key: &QueryKey, f: impl FnOnce(&[E]) -> Vec<E>) {
        match self.entries.get_mut(key) {
            Some(entry) => entry.items = f(&entry.items),
            None => {
                let items = f(&[]);
                self.entries
                    .insert(key.clone(), Entry { items, stale: false });
            }
        }
    }

    /// Drop a key entirely.
    pub fn remove(&mut self, key: &QueryKey) -> Option<Vec<E>> {
        self.entries.remove(key).map(|entry| entry.items)
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every key whose snapshot holds an entity with this id, in key order.
    #[must_use]
    pub fn keys_containing(&self, id: &str) -> Vec<QueryKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.items.iter().any(|e| e.entity_id() == id))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// The copy of entity `id` cached under `key`.
    #[must_use]
    pub fn entity(&self, key: &QueryKey, id: &str) -> Option<&E> {
        self.peek(key)?.iter().find(|e| e.entity_id() == id)
    }

    /// First cached copy of entity `id` under any key.
    #[must_use]
    pub fn find_entity(&self, id: &str) -> Option<&E> {
        self.entries
            .values()
            .flat_map(|entry| entry.items.iter())
            .find(|e| e.entity_id() == id)
    }

    /// Apply `f` to every cached copy of entity `id`, returning the keys touched.
    ///
    /// `f` receives the key's current copy and returns its replacement; the
    /// position of the entity in each collection is preserved.
    pub fn update_entity(&mut self, id: &str, f: impl Fn(&E) -> E) -> Vec<QueryKey> {
        let mut touched = Vec::new();
        for (key, entry) in &mut self.entries {
            let mut hit = false;
            for item in entry.items.iter_mut().filter(|e| e.entity_id() == id) {
                *item = f(item);
                hit = true;
            }
            if hit {
                touched.push(key.clone());
            }
        }
        touched
    }

    /// Splice `entity` over every cached copy with the same id.
    pub fn replace_entity(&mut self, entity: &E) -> Vec<QueryKey> {
        self.update_entity(entity.entity_id(), |_| entity.clone())
    }

    /// Mark a key as needing a refetch. Returns false if the key is absent.
    pub fn invalidate(&mut self, key: &QueryKey) -> bool {
        self.entries.get_mut(key).is_some_and(|entry| {
            entry.stale = true;
            true
        })
    }

    #[must_use]
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.stale)
    }

    /// Snapshot and stale flag for `key`, for verbatim restore.
    pub(crate) fn entry_state(&self, key: &QueryKey) -> Option<(Vec<E>, bool)> {
        self.entries
            .get(key)
            .map(|entry| (entry.items.clone(), entry.stale))
    }

    pub(crate) fn restore_entry(&mut self, key: QueryKey, items: Vec<E>, stale: bool) {
        self.entries.insert(key, Entry { items, stale });
    }

    /// Keys currently marked stale.
    #[must_use]
    pub fn stale_keys(&self) -> Vec<QueryKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.stale)
            .map(|(key, _)| key.clone())
            .collect()
    }
}
