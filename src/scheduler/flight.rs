//! Per-fingerprint single flight
//!
//! Each fingerprint gets one slot for the lifetime of a run. The first task
//! to initialize a slot does the work while later tasks on the same
//! fingerprint wait for it and reuse the value. A failed initialization
//! leaves the slot empty, so the next waiter retries. Unrelated fingerprints
//! never share a lock.

use crate::cache::Fingerprint;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Map of fingerprint to shared, lazily computed value
#[derive(Debug)]
pub struct SingleFlight<T> {
    slots: Mutex<HashMap<Fingerprint, Arc<OnceCell<T>>>>,
}

impl<T> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Slot for `key`, created on first use
    pub fn slot(&self, key: &Fingerprint) -> Arc<OnceCell<T>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Number of distinct fingerprints seen
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
