//! Repository trait definitions (Ports)
//!
//! Implementations can be a JSON file, in-memory, or mock for testing.

use crate::error::StoreError;
use crate::snapshot::StatsSnapshot;
use async_trait::async_trait;

/// Destination for statistics snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, replacing the previous one
    async fn save(&self, snapshot: &StatsSnapshot) -> Result<(), StoreError>;

    /// Most recently saved snapshot, if any
    async fn latest(&self) -> Result<Option<StatsSnapshot>, StoreError>;
}
