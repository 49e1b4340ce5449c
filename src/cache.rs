use std::sync::{Arc, PoisonError, RwLock};

use crate::snapshot::ConfigSnapshot;

/// The current snapshot together with the number of updates that produced it
struct Slot {
    snapshot: Arc<ConfigSnapshot>,
    generation: u64,
}

/// A thread-safe holder for the latest configuration snapshot.
///
/// Clones share the same slot. Locks are only held for an `Arc` clone or swap,
/// so a reader never waits longer than a concurrent `update`, and a reader that
/// already holds a snapshot keeps it after the swap.
#[derive(Clone)]
pub struct ConfigCache {
    inner: Arc<RwLock<Slot>>,
}

impl ConfigCache {
    /// Create a cache serving the default snapshot
    pub fn new() -> Self {
        Self::with_snapshot(ConfigSnapshot::default())
    }

    /// Create a cache serving the given snapshot until the first update
    pub fn with_snapshot(snapshot: ConfigSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Slot {
                snapshot: Arc::new(snapshot),
                generation: 0,
            })),
        }
    }

    /// Get the current snapshot
    pub fn read(&self) -> Arc<ConfigSnapshot> {
        // The slot is only ever replaced wholesale, so a poisoned lock still holds a valid value
        let slot = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slot.snapshot)
    }

    /// Replace the current snapshot
    pub fn update(&self, snapshot: ConfigSnapshot) {
        let snapshot = Arc::new(snapshot);
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        slot.snapshot = snapshot;
        slot.generation += 1;
    }

    /// Number of successful updates so far; 0 while the initial snapshot is served
    pub fn generation(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new()
    }
}
