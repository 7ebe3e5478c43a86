//! Per-instance memoization.
//!
//! Importers own their caches: nothing here is global. A [`CacheSlot`] starts
//! in an explicit not-yet-fetched state and is only filled by a successful
//! load, so a failed fetch leaves it empty.

use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Single lazily filled value.
#[derive(Debug, Clone)]
pub struct CacheSlot<T> {
    value: Option<T>,
}

impl<T> Default for CacheSlot<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> CacheSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_cached(&self) -> bool {
        self.value.is_some()
    }

    pub fn set(&mut self, value: T) -> &T {
        self.value.insert(value)
    }

    /// Return the cached value, or run `load` and cache its success.
    pub fn get_or_try_insert_with<E>(&mut self, load: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        let value = match self.value.take() {
            Some(v) => v,
            None => load()?,
        };
        Ok(&*self.value.insert(value))
    }

    pub fn clear(&mut self) {
        self.value = None;
    }
}

/// Values keyed by the effective request parameters.
#[derive(Debug, Clone)]
pub struct KeyedCache<K, V> {
    entries: FxHashMap<K, V>,
}

impl<K, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash, V> KeyedCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<&V, E> {
        use std::collections::hash_map::Entry;
        match self.entries.entry(key) {
            Entry::Occupied(e) => Ok(&*e.into_mut()),
            Entry::Vacant(e) => Ok(&*e.insert(load()?)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn slot_loads_once() {
        let loads = Cell::new(0);
        let mut slot = CacheSlot::new();
        for _ in 0..3 {
            let v = slot
                .get_or_try_insert_with(|| {
                    loads.set(loads.get() + 1);
                    Ok::<_, ()>(7)
                })
                .unwrap();
            assert_eq!(*v, 7);
        }
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn slot_failure_leaves_empty() {
        let mut slot: CacheSlot<i32> = CacheSlot::new();
        assert!(slot.get_or_try_insert_with(|| Err("boom")).is_err());
        assert!(!slot.is_cached());
    }

    #[test]
    fn clear_is_idempotent() {
        let mut slot = CacheSlot::new();
        slot.set(1);
        slot.clear();
        slot.clear();
        assert!(slot.get().is_none());
    }

    #[test]
    fn keyed_cache_separates_keys() {
        let mut cache: KeyedCache<(String, u32), usize> = KeyedCache::new();
        cache.insert(("GDP".into(), 2), 10);
        assert!(cache.contains(&("GDP".into(), 2)));
        assert!(!cache.contains(&("GDP".into(), 6)));
        let v = cache
            .get_or_try_insert_with(("POP".into(), 2), || Ok::<_, ()>(3))
            .unwrap();
        assert_eq!(*v, 3);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
