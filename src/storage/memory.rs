use super::{Partition, RowStore};
use crate::core::{Columns, Result, RowEntity, RowPage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub struct InMemoryRowStore {
    /// Partitions with individual locks
    partitions: RwLock<HashMap<String, Arc<RwLock<Partition>>>>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_partitions(partitions: HashMap<String, Partition>) -> Self {
        let partitions = partitions
            .into_iter()
            .map(|(name, partition)| (name, Arc::new(RwLock::new(partition))))
            .collect();
        Self {
            partitions: RwLock::new(partitions),
        }
    }

    /// Handle for an existing partition. The map lock is released before the
    /// caller touches the partition itself.
    async fn partition(&self, name: &str) -> Option<Arc<RwLock<Partition>>> {
        self.partitions.read().await.get(name).cloned()
    }

    async fn partition_or_create(&self, name: &str) -> Arc<RwLock<Partition>> {
        if let Some(handle) = self.partition(name).await {
            return handle;
        }
        let mut partitions = self.partitions.write().await;
        partitions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Partition::new(name))))
            .clone()
    }

    /// Apply an upsert with a caller-supplied timestamp. Used by log replay,
    /// which must reproduce the original write time.
    pub async fn apply_upsert(
        &self,
        partition_key: &str,
        row_key: &str,
        columns: Columns,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let handle = self.partition_or_create(partition_key).await;
        let mut partition = handle.write().await;
        partition.upsert(row_key, columns, timestamp)
    }

    /// Copy of every partition, for checkpoints.
    pub async fn snapshot_partitions(&self) -> HashMap<String, Partition> {
        let handles: Vec<(String, Arc<RwLock<Partition>>)> = self
            .partitions
            .read()
            .await
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();

        let mut partitions = HashMap::with_capacity(handles.len());
        for (name, handle) in handles {
            partitions.insert(name, handle.read().await.clone());
        }
        partitions
    }

    pub async fn row_count(&self, partition_key: &str) -> usize {
        match self.partition(partition_key).await {
            Some(handle) => handle.read().await.row_count(),
            None => 0,
        }
    }
}

impl Default for InMemoryRowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn upsert(&self, partition_key: &str, row_key: &str, columns: Columns) -> Result<()> {
        let replaced = self
            .apply_upsert(partition_key, row_key, columns, Utc::now())
            .await;
        debug!(partition = partition_key, row_key, replaced, "row upserted");
        Ok(())
    }

    async fn get(&self, partition_key: &str, row_key: &str) -> Result<Option<RowEntity>> {
        let Some(handle) = self.partition(partition_key).await else {
            return Ok(None);
        };
        let partition = handle.read().await;
        Ok(partition.get(row_key).cloned())
    }

    async fn scan_page(
        &self,
        partition_key: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> Result<RowPage> {
        let Some(handle) = self.partition(partition_key).await else {
            return Ok(RowPage::default());
        };
        let partition = handle.read().await;
        Ok(partition.page(continuation, limit))
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        let handles: Vec<(String, Arc<RwLock<Partition>>)> = self
            .partitions
            .read()
            .await
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();

        let mut names = Vec::new();
        for (name, handle) in handles {
            if handle.read().await.row_count() > 0 {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
