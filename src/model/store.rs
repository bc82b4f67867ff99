//! KeyedStore - The single-key storage primitive every backend builds on.

use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Atomic single-key operations.
///
/// Each call is atomic on its own key; nothing here coordinates across keys.
/// Multi-step operations are serialized by the mutation gate above this layer.
pub trait KeyedStore<K, V>: Send + Sync {
    /// Insert only if the key is absent. Returns true if inserted.
    fn insert(&self, key: K, value: V) -> bool;

    /// A copy of the current value.
    fn get(&self, key: &K) -> Option<V>;

    /// Compare-and-swap: replace the value only if it still equals `expected`.
    fn replace(&self, key: &K, expected: &V, value: V) -> bool;

    /// Unconditional remove. Returns true if the key existed.
    fn remove(&self, key: &K) -> bool;

    /// Remove only if the value still equals `expected`.
    fn remove_if(&self, key: &K, expected: &V) -> bool;

    fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Snapshot of all keys.
    fn keys(&self) -> Vec<K>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

/// Sharded concurrent map implementing [`KeyedStore`].
#[derive(Debug)]
pub struct ConcurrentMap<K: Eq + Hash, V> {
    entries: DashMap<K, V>,
}

impl<K: Eq + Hash, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> ConcurrentMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> ConcurrentMap<K, V> {
    /// Snapshot of all keys.
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> ConcurrentMap<K, V> {
    /// Get the value for `key`, installing `make()` if absent. Racing callers
    /// for the same absent key all observe the single installed value.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        self.entries.entry(key).or_insert_with(make).value().clone()
    }

    /// A copy of the value for `key`, without installing anything.
    pub fn lookup(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
}

impl<K, V> KeyedStore<K, V> for ConcurrentMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + PartialEq + Send + Sync,
{
    fn insert(&self, key: K, value: V) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                true
            }
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.lookup(key)
    }

    fn replace(&self, key: &K, expected: &V, value: V) -> bool {
        match self.entries.get_mut(key) {
            Some(mut current) if *current == *expected => {
                *current = value;
                true
            }
            _ => false,
        }
    }

    fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    fn remove_if(&self, key: &K, expected: &V) -> bool {
        self.entries
            .remove_if(key, |_, current| current == expected)
            .is_some()
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn keys(&self) -> Vec<K> {
        ConcurrentMap::keys(self)
    }

    fn len(&self) -> usize {
        ConcurrentMap::len(self)
    }

    fn clear(&self) {
        self.entries.clear();
    }
}
