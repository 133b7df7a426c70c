// ============================================================================
// trackdb Library
// ============================================================================

pub mod codec;
pub mod config;
pub mod core;
pub mod domain;
pub mod query;
pub mod registry;
pub mod storage;
pub mod web;

use std::sync::Arc;

// Re-export main types for convenience
pub use config::RegistryConfig;
pub use crate::core::{Columns, RegistryError, Result, RowEntity, RowPage, Value};
pub use domain::{TrackedObjectRecord, VisionState};
pub use query::{CountSummary, QueryService};
pub use registry::{RecordStore, RetryPolicy, put_with_retry};
pub use storage::{DurabilityMode, DurableRowStore, InMemoryRowStore, RowStore};

/// Opens the row store described by `config`: durable when a data
/// directory is configured, in-memory otherwise.
pub fn open_row_store(config: &RegistryConfig) -> Result<Arc<dyn RowStore>> {
    match &config.data_dir {
        Some(data_dir) => {
            let store = DurableRowStore::open_with_threshold(
                data_dir,
                config.durability,
                Some(config.checkpoint_threshold),
            )?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryRowStore::new())),
    }
}

/// Wires a [`RecordStore`] for the configured partition over `rows`.
pub fn record_store(rows: Arc<dyn RowStore>, config: &RegistryConfig) -> RecordStore {
    RecordStore::new(rows, config.partition_key.clone()).with_page_size(config.scan_page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn in_memory_store_when_no_data_dir() {
        let config = RegistryConfig::default();
        let store = record_store(open_row_store(&config).unwrap(), &config);
        store
            .put(&TrackedObjectRecord::new("Mug").unwrap())
            .await
            .unwrap();
        assert_eq!(store.partition_key(), config.partition_key);
        assert!(store.get("Mug").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn durable_store_when_data_dir_is_set() {
        let temp_dir = TempDir::new().unwrap();
        let config = RegistryConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            durability: DurabilityMode::Sync,
            ..RegistryConfig::default()
        };

        let store = record_store(open_row_store(&config).unwrap(), &config);
        store
            .put(&TrackedObjectRecord::new("Mug").unwrap())
            .await
            .unwrap();
        drop(store);

        let reopened = record_store(open_row_store(&config).unwrap(), &config);
        assert!(reopened.get("Mug").await.unwrap().is_some());
    }
}
