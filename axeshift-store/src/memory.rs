//! In-memory snapshot store
//!
//! Used for testing and development without touching disk.

use crate::error::StoreError;
use crate::repository::SnapshotStore;
use crate::snapshot::StatsSnapshot;
use async_trait::async_trait;
use std::sync::RwLock;

/// In-memory store for testing. Keeps every saved snapshot.
pub struct MemorySnapshotStore {
    snapshots: RwLock<Vec<StatsSnapshot>>,
}

impl MemorySnapshotStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(Vec::new()),
        }
    }

    /// Number of saves so far
    pub fn save_count(&self) -> usize {
        self.snapshots.read().unwrap().len()
    }

    /// All saved snapshots, oldest first
    pub fn snapshots(&self) -> Vec<StatsSnapshot> {
        self.snapshots.read().unwrap().clone()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &StatsSnapshot) -> Result<(), StoreError> {
        self.snapshots.write().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn latest(&self) -> Result<Option<StatsSnapshot>, StoreError> {
        Ok(self.snapshots.read().unwrap().last().cloned())
    }
}
