//! JSON file snapshot store
//!
//! Each save writes a sibling temp file and renames it over the target,
//! so readers never observe a partial snapshot.

use crate::error::StoreError;
use crate::repository::SnapshotStore;
use crate::snapshot::StatsSnapshot;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot store backed by a single JSON file
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &StatsSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();

        tokio::fs::write(&temp, &body).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), devices = snapshot.devices.len(), "Saved stats snapshot");
        Ok(())
    }

    async fn latest(&self) -> Result<Option<StatsSnapshot>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{DeviceSnapshot, PeriodPerformance};
    use axeshift_domain::Period;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn snapshot(sample_count: u64) -> StatsSnapshot {
        let mut periods = BTreeMap::new();
        periods.insert(
            Period::Day,
            PeriodPerformance {
                average_hashrate: 500.0,
                average_power: 12.0,
                sample_count,
            },
        );
        periods.insert(Period::Night, PeriodPerformance::default());

        let mut snapshot = StatsSnapshot::new(Utc::now());
        snapshot.insert(
            "bitaxe1",
            DeviceSnapshot {
                address: "http://192.168.1.100".to_string(),
                online: true,
                last_update: Some(Utc::now()),
                periods,
            },
        );
        snapshot
    }

    #[tokio::test]
    async fn test_save_replaces_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileSnapshotStore::new(dir.path().join("stats.json"));

        assert!(store.latest().await?.is_none());

        store.save(&snapshot(1)).await?;
        store.save(&snapshot(2)).await?;

        let loaded = store.latest().await?.expect("snapshot written");
        assert_eq!(loaded.devices["bitaxe1"].periods[&Period::Day].sample_count, 2);
        assert!(!dir.path().join("stats.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("missing").join("stats.json"));

        assert!(matches!(
            store.save(&snapshot(1)).await,
            Err(StoreError::Io(_))
        ));
    }
}
