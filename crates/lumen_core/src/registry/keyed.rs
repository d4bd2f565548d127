//! # Keyed Registry
//!
//! Thread-safe key to value association backed by a slot map.
//!
//! Keys carry a generation, so a key taken before a removal never resolves to
//! an entry added afterwards, even if the slot is reused.

use std::fmt;

use parking_lot::Mutex;
use slotmap::{Key, SlotMap};

use crate::error::{CoreError, CoreResult};

/// A registry of `V` values addressed by generation-tagged keys `K`.
///
/// Every operation holds the internal lock only for the duration of the call.
/// Iteration works on a snapshot taken under the lock, so concurrent mutation
/// never corrupts an iterator, but the snapshot may be stale by the time it is
/// consumed.
///
/// Removing an entry does not notify the value. Releasing whatever the value
/// owns is its own lifecycle, driven by the caller.
pub struct KeyedRegistry<K: Key, V> {
    entries: Mutex<SlotMap<K, V>>,
    sealed: bool,
}

impl<K: Key, V: Clone> KeyedRegistry<K, V> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty registry with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(SlotMap::with_capacity_and_key(capacity)),
            sealed: false,
        }
    }

    /// Creates a registry that is permanently empty.
    ///
    /// Reads succeed and see nothing; every mutation fails with
    /// [`CoreError::InvalidState`]. One such instance is typically shared as
    /// the default for owners that have no entries of their own.
    #[must_use]
    pub fn sealed() -> Self {
        Self {
            entries: Mutex::new(SlotMap::with_key()),
            sealed: true,
        }
    }

    /// Returns true for a sealed registry.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn ensure_mutable(&self) -> CoreResult<()> {
        if self.sealed {
            return Err(CoreError::invalid_state("the shared empty registry cannot be mutated"));
        }
        Ok(())
    }

    /// Inserts `value` and returns its key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] on a sealed registry.
    pub fn add(&self, value: V) -> CoreResult<K> {
        self.ensure_mutable()?;
        Ok(self.entries.lock().insert(value))
    }

    /// Inserts a value built from its own key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] on a sealed registry.
    pub fn add_with_key(&self, build: impl FnOnce(K) -> V) -> CoreResult<K> {
        self.ensure_mutable()?;
        Ok(self.entries.lock().insert_with_key(build))
    }

    /// Removes the entry for `key`, returning it if it was present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] on a sealed registry.
    pub fn remove(&self, key: K) -> CoreResult<Option<V>> {
        self.ensure_mutable()?;
        Ok(self.entries.lock().remove(key))
    }

    /// Looks up `key`. A miss is `None`.
    pub fn get(&self, key: K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    /// Looks up `key`, treating a miss as an error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no entry exists for `key`.
    pub fn require(&self, key: K) -> CoreResult<V> {
        self.get(key)
            .ok_or_else(|| CoreError::NotFound(format!("{key:?}")))
    }

    /// Returns true if `key` resolves to a live entry.
    pub fn contains(&self, key: K) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies all entries out under the lock.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.entries
            .lock()
            .iter()
            .map(|(k, v)| (k, v.clone()))
            .collect()
    }

    /// Copies all values out under the lock.
    pub fn values(&self) -> Vec<V> {
        self.entries.lock().values().cloned().collect()
    }
}

impl<K: Key, V: Clone> Default for KeyedRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V: Clone> Clone for KeyedRegistry<K, V> {
    /// Copies the entries under the lock. Keys stay valid in the copy.
    fn clone(&self) -> Self {
        Self {
            entries: Mutex::new(self.entries.lock().clone()),
            sealed: self.sealed,
        }
    }
}

impl<'a, K: Key, V: Clone> IntoIterator for &'a KeyedRegistry<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshot().into_iter()
    }
}

impl<K: Key, V> fmt::Debug for KeyedRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedRegistry")
            .field("len", &self.entries.lock().len())
            .field("sealed", &self.sealed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    slotmap::new_key_type! {
        struct TestKey;
    }

    #[test]
    fn test_distinct_keys() {
        let registry: KeyedRegistry<TestKey, &str> = KeyedRegistry::new();
        let a = registry.add("a").unwrap();
        let b = registry.add("b").unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.get(a), Some("a"));
        assert_eq!(registry.get(b), Some("b"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_then_get_misses() {
        let registry: KeyedRegistry<TestKey, u32> = KeyedRegistry::new();
        let key = registry.add(1).unwrap();

        assert_eq!(registry.remove(key), Ok(Some(1)));
        assert_eq!(registry.get(key), None);
        assert!(matches!(registry.require(key), Err(CoreError::NotFound(_))));
        assert_eq!(registry.remove(key), Ok(None));
    }

    #[test]
    fn test_stale_key_does_not_alias_new_entry() {
        let registry: KeyedRegistry<TestKey, u32> = KeyedRegistry::new();
        let old = registry.add(1).unwrap();
        registry.remove(old).unwrap();

        let new = registry.add(2).unwrap();
        assert_ne!(old, new);
        assert_eq!(registry.get(old), None);
        assert_eq!(registry.get(new), Some(2));
    }

    #[test]
    fn test_sealed_registry_rejects_mutation() {
        let registry: KeyedRegistry<TestKey, u32> = KeyedRegistry::sealed();

        assert!(matches!(registry.add(1), Err(CoreError::InvalidState(_))));
        assert!(matches!(
            registry.remove(TestKey::default()),
            Err(CoreError::InvalidState(_))
        ));
        assert_eq!(registry.len(), 0);
        assert!(registry.snapshot().is_empty());
        assert!(registry.clone().is_sealed());
    }

    #[test]
    fn test_clone_is_independent_snapshot() {
        let registry: KeyedRegistry<TestKey, u32> = KeyedRegistry::new();
        let key = registry.add(5).unwrap();
        let copy = registry.clone();

        registry.remove(key).unwrap();

        assert_eq!(copy.get(key), Some(5));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mutation_during_iteration() {
        let registry: KeyedRegistry<TestKey, u32> = KeyedRegistry::new();
        for i in 0..4 {
            registry.add(i).unwrap();
        }

        let mut seen = 0;
        for (key, _) in &registry {
            registry.remove(key).unwrap();
            registry.add(100).unwrap();
            seen += 1;
        }

        assert_eq!(seen, 4);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_concurrent_adds() {
        let registry: Arc<KeyedRegistry<TestKey, usize>> = Arc::new(KeyedRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| registry.add(t * 100 + i).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut keys: Vec<TestKey> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        keys.sort();
        keys.dedup();

        assert_eq!(keys.len(), 400);
        assert_eq!(registry.len(), 400);
    }
}
