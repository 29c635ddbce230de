use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use locus_core::{Key, Payload};

/// The worker's local key -> payload map.
#[derive(Debug, Default)]
pub struct Store {
    data: Mutex<HashMap<Key, Payload>>,
}

impl Store {
    fn data(&self) -> MutexGuard<'_, HashMap<Key, Payload>> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &Key) -> Option<Payload> {
        self.data().get(key).cloned()
    }

    pub fn insert(&self, key: Key, payload: Payload) {
        self.data().insert(key, payload);
    }

    pub fn remove(&self, key: &Key) -> Option<Payload> {
        self.data().remove(key)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.data().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}
