//! Generic keyed registry with lazy, race-free creation

use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

type Factory<K, V> = Box<dyn Fn(&K) -> V + Send + Sync>;

/// Concurrent `K -> Arc<V>` map that builds missing values with a factory
///
/// Creation goes through the map's entry API, so two threads racing on the
/// same unseen key both end up holding the one value that was inserted.
/// Operations on different keys only contend when they hash to the same shard.
pub struct KeyedStore<K, V> {
    entries: DashMap<K, Arc<V>>,
    factory: Factory<K, V>,
}

impl<K, V> KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(factory: impl Fn(&K) -> V + Send + Sync + 'static) -> Self {
        KeyedStore {
            entries: DashMap::new(),
            factory: Box::new(factory),
        }
    }

    pub fn with_capacity(
        capacity: usize,
        factory: impl Fn(&K) -> V + Send + Sync + 'static,
    ) -> Self {
        KeyedStore {
            entries: DashMap::with_capacity(capacity),
            factory: Box::new(factory),
        }
    }

    /// `shard_amount` must be a power of two greater than one
    pub fn with_capacity_and_shards(
        capacity: usize,
        shard_amount: usize,
        factory: impl Fn(&K) -> V + Send + Sync + 'static,
    ) -> Self {
        KeyedStore {
            entries: DashMap::with_capacity_and_shard_amount(capacity, shard_amount),
            factory: Box::new(factory),
        }
    }

    /// Existing value for `key`, never creating one
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Existing value for `key`, or the value the factory builds for it
    pub fn get_or_create<Q>(&self, key: &Q) -> Arc<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        // Read-only fast path avoids a shard write lock and a key allocation
        if let Some(existing) = self.get(key) {
            return existing;
        }

        let owned = key.to_owned();
        let entry = self
            .entries
            .entry(owned.clone())
            .or_insert_with(|| Arc::new((self.factory)(&owned)));
        Arc::clone(entry.value())
    }

    /// Remove and return the value for `key`
    pub fn remove<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Remove the value for `key` if no caller still holds a handle to it.
    ///
    /// The check and the removal run under the shard's write lock, so no
    /// handle can be cloned out of the map in between.
    pub fn remove_if_unshared<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .remove_if(key, |_, value| Arc::strong_count(value) == 1)
            .is_some()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<K, V> fmt::Debug for KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedStore")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_get_does_not_create() {
        let store: KeyedStore<String, usize> = KeyedStore::new(|k: &String| k.len());

        assert!(store.get("abc").is_none());
        assert!(store.is_empty());

        assert_eq!(*store.get_or_create("abc"), 3);
        assert_eq!(store.get("abc").map(|v| *v), Some(3));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let store: KeyedStore<String, Vec<u8>> = KeyedStore::new(|_| Vec::new());
        let a = store.get_or_create("k");
        let b = store.get_or_create("k");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_remove_then_recreate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let store: KeyedStore<String, usize> =
            KeyedStore::new(move |_| counter.fetch_add(1, Ordering::SeqCst));

        let first = store.get_or_create("k");
        assert!(store.remove("k").is_some());
        assert!(store.remove("k").is_none());
        let second = store.get_or_create("k");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove_if_unshared_keeps_held_values() {
        let store: KeyedStore<String, ()> = KeyedStore::new(|_| ());
        let held = store.get_or_create("held");

        assert!(!store.remove_if_unshared("held"));
        assert!(store.contains_key("held"));

        drop(held);
        assert!(store.remove_if_unshared("held"));
        assert!(store.is_empty());
        assert!(!store.remove_if_unshared("missing"));
    }

    #[test]
    fn test_concurrent_first_access_creates_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let store: Arc<KeyedStore<String, usize>> = Arc::new(KeyedStore::with_capacity_and_shards(
            16,
            4,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                7
            },
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get_or_create("shared"))
            })
            .collect();
        let values: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_keys_and_clear() {
        let store: KeyedStore<String, ()> = KeyedStore::with_capacity(4, |_| ());
        store.get_or_create("a");
        store.get_or_create("b");

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert!(store.contains_key("a"));

        store.clear();
        assert!(store.is_empty());
    }
}
