use foldhash::HashMap;
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, hash::Hash};

/// A map of objects that are built once and then shared for the lifetime of the map.
///
/// Readers never block each other, except when an entry is vacant. In that case it gets written
/// to once and then never again, entries are immutable after insertion.
#[derive(Debug)]
pub(crate) struct OnceCache<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for OnceCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> OnceCache<K, V> {
    /// Creates a new `OnceCache`.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the number of entries.
    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Removes every entry and returns them.
    pub(crate) fn drain(&self) -> Vec<(K, V)> {
        self.inner.write().drain().collect()
    }
}

impl<K, V> OnceCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns the value for the specified `key`, if it exists.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    /// Returns the value for the specified `key`. The entry gets written to with the value
    /// returned by `f` if it doesn't exist. If `f` returns [`Err`], the error is propagated and
    /// the entry isn't written to.
    pub(crate) fn get_or_try_insert<E>(
        &self,
        key: K,
        f: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = f()?;

        Ok(self
            .inner
            .write()
            .entry(key)
            .or_insert_with(|| value.clone())
            .clone())
    }

    /// Inserts `value` unless another thread got there first.
    ///
    /// Returns the value that ended up in the map, and `value` back if it lost the race.
    pub(crate) fn insert_or_get(&self, key: K, value: V) -> (V, Option<V>) {
        match self.inner.write().entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), Some(value)),
            Entry::Vacant(entry) => (entry.insert(value).clone(), None),
        }
    }

    /// Returns a snapshot of every value.
    pub(crate) fn values(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::OnceCache;

    #[test]
    fn failed_insert_leaves_entry_vacant() {
        let cache = OnceCache::<u64, u32>::new();

        assert_eq!(cache.get_or_try_insert(1, || Err::<u32, _>(())), Err(()));
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.get_or_try_insert(1, || Ok::<_, ()>(7)), Ok(7));
        assert_eq!(cache.get_or_try_insert(1, || Ok::<_, ()>(8)), Ok(7));
    }

    #[test]
    fn insert_race_keeps_first() {
        let cache = OnceCache::<u64, u32>::new();

        assert_eq!(cache.insert_or_get(3, 1), (1, None));
        assert_eq!(cache.insert_or_get(3, 2), (1, Some(2)));
        assert_eq!(cache.len(), 1);
    }
}
