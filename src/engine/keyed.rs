//! Keyed state table with one lock per key.
//!
//! The outer map lock is held only long enough to find or insert a slot; the
//! caller's closure then runs under that slot's own lock. Updates for
//! different keys never wait on each other, while updates for the same key
//! are serialized.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ---

#[derive(Debug)]
pub struct KeyedStore<K, V> {
    slots: Mutex<HashMap<K, Arc<Mutex<Option<V>>>>>,
}

impl<K, V> Default for KeyedStore<K, V> {
    fn default() -> Self {
        KeyedStore {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the state for `key`.
    ///
    /// The slot holds `None` until the first write.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut Option<V>) -> R) -> R {
        // ---
        let slot = {
            let mut slots = lock(&self.slots);
            match slots.get(key) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot = Arc::new(Mutex::new(None));
                    slots.insert(key.clone(), Arc::clone(&slot));
                    slot
                }
            }
        };

        let mut state = lock(&slot);
        f(&mut *state)
    }

    /// Snapshot of the state for `key`, if any has been written.
    pub fn get(&self, key: &K) -> Option<V> {
        // ---
        let slot = lock(&self.slots).get(key).map(Arc::clone)?;
        let state = lock(&slot);
        state.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A panic inside one key's closure must not wedge the table for every other key.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
