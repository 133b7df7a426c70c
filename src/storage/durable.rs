use super::persistence::{DurabilityMode, PersistenceManager, WalEntry, WalSink};
use super::{InMemoryRowStore, RowStore};
use crate::core::{Columns, Result, RowEntity, RowPage};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Row store backed by a local write-ahead log and periodic snapshots.
///
/// Reads are served from the in-memory engine. Writes go to the log first
/// and are applied in memory before `upsert` returns, so a caller always
/// reads its own writes. Log appends are serialised by `persistence`; the
/// lock is private to this store and never held by readers.
pub struct DurableRowStore {
    rows: InMemoryRowStore,
    persistence: Mutex<PersistenceManager>,
    data_dir: PathBuf,
}

impl DurableRowStore {
    pub fn open(data_dir: impl AsRef<Path>, durability_mode: DurabilityMode) -> Result<Self> {
        Self::open_with_threshold(data_dir, durability_mode, None)
    }

    pub fn open_with_threshold(
        data_dir: impl AsRef<Path>,
        durability_mode: DurabilityMode,
        checkpoint_threshold: Option<usize>,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let persistence = PersistenceManager::new(&data_dir, durability_mode)?;
        Self::recover(data_dir, persistence, durability_mode, checkpoint_threshold)
    }

    /// Opens the store with log appends going through `sink`, which must
    /// append to `<data_dir>/trackdb.wal`.
    pub fn open_with_wal_sink(
        data_dir: impl AsRef<Path>,
        durability_mode: DurabilityMode,
        sink: Box<dyn WalSink>,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let persistence = PersistenceManager::with_wal_sink(&data_dir, sink, durability_mode);
        Self::recover(data_dir, persistence, durability_mode, None)
    }

    fn recover(
        data_dir: PathBuf,
        mut persistence: PersistenceManager,
        durability_mode: DurabilityMode,
        checkpoint_threshold: Option<usize>,
    ) -> Result<Self> {
        if let Some(threshold) = checkpoint_threshold {
            persistence.wal_mut().set_checkpoint_threshold(threshold);
        }

        let partitions = persistence.recover()?;
        info!(
            data_dir = %data_dir.display(),
            ?durability_mode,
            partitions = partitions.len(),
            "durable row store opened"
        );

        Ok(Self {
            rows: InMemoryRowStore::from_partitions(partitions),
            persistence: Mutex::new(persistence),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Force a snapshot and truncate the log.
    pub async fn checkpoint(&self) -> Result<()> {
        let mut persistence = self.persistence.lock().await;
        let partitions = self.rows.snapshot_partitions().await;
        persistence.checkpoint(partitions)
    }

    pub async fn wal_entries_since_checkpoint(&self) -> usize {
        self.persistence.lock().await.wal().entries_since_checkpoint()
    }
}

#[async_trait]
impl RowStore for DurableRowStore {
    async fn upsert(&self, partition_key: &str, row_key: &str, columns: Columns) -> Result<()> {
        let mut persistence = self.persistence.lock().await;

        let timestamp = Utc::now();
        let entry = WalEntry::Upsert {
            partition_key: partition_key.to_string(),
            row_key: row_key.to_string(),
            timestamp,
            columns,
        };
        persistence.log(&entry)?;

        let WalEntry::Upsert { columns, .. } = entry;
        let replaced = self
            .rows
            .apply_upsert(partition_key, row_key, columns, timestamp)
            .await;
        debug!(partition = partition_key, row_key, replaced, "row logged and applied");

        if persistence.needs_checkpoint() {
            let partitions = self.rows.snapshot_partitions().await;
            persistence.checkpoint(partitions)?;
        }
        Ok(())
    }

    async fn get(&self, partition_key: &str, row_key: &str) -> Result<Option<RowEntity>> {
        self.rows.get(partition_key, row_key).await
    }

    async fn scan_page(
        &self,
        partition_key: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> Result<RowPage> {
        self.rows.scan_page(partition_key, continuation, limit).await
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        self.rows.partitions().await
    }
}
