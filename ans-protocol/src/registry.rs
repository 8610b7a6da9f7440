//! Reference-counted object registry.
//!
//! Boards and peers are shared between worker threads. A [`Registry`] owns them together
//! with an explicit reference count; looking an object up takes a reference and releasing
//! the last reference removes it, both under the same lock. An entry is reachable exactly
//! as long as its count is above zero.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

#[derive(Debug)]
struct Entry<V> {
    value: Arc<V>,
    references: usize,
}

#[derive(Debug)]
pub struct Registry<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Registry {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V> Registry<K, V> {
    pub fn new() -> Registry<K, V> {
        Registry::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `value` with a reference count of one.
    /// Returns `None` if `key` is already registered.
    pub fn create(&self, key: K, value: V) -> Option<Arc<V>> {
        let mut entries = self.entries();
        if entries.contains_key(&key) {
            return None;
        }
        let value = Arc::new(value);
        entries.insert(
            key,
            Entry {
                value: value.clone(),
                references: 1,
            },
        );
        Some(value)
    }

    /// Looks `key` up and takes a reference. No implicit creation.
    pub fn request(&self, key: &K) -> Option<Arc<V>> {
        let mut entries = self.entries();
        let entry = entries.get_mut(key)?;
        entry.references += 1;
        Some(entry.value.clone())
    }

    /// Takes a reference to `key`, creating the object first if it does not exist.
    ///
    /// Lookup and creation happen under one lock, so concurrent callers always end up
    /// with the same object.
    pub fn request_or_create(&self, key: K, create: impl FnOnce() -> V) -> Arc<V> {
        let mut entries = self.entries();
        let entry = entries.entry(key).or_insert_with(|| Entry {
            value: Arc::new(create()),
            references: 0,
        });
        entry.references += 1;
        entry.value.clone()
    }

    /// Drops one reference to `key`.
    ///
    /// When the last reference is gone the object is removed and handed back so the
    /// caller can tear it down. Unknown keys are ignored.
    pub fn release(&self, key: &K) -> Option<Arc<V>> {
        let mut entries = self.entries();
        let entry = entries.get_mut(key)?;
        entry.references -= 1;
        if entry.references == 0 {
            entries.remove(key).map(|entry| entry.value)
        } else {
            None
        }
    }

    /// Current reference count, zero for unknown keys.
    pub fn ref_count(&self, key: &K) -> usize {
        self.entries()
            .get(key)
            .map(|entry| entry.references)
            .unwrap_or(0)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries().keys().cloned().collect()
    }

    /// Looks `key` up without taking a reference.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.entries().get(key).map(|entry| entry.value.clone())
    }

    /// Removes every entry regardless of its count.
    pub fn drain(&self) -> Vec<Arc<V>> {
        self.entries()
            .drain()
            .map(|(_, entry)| entry.value)
            .collect()
    }
}
