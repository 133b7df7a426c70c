use crate::core::{RegistryError, Result};
use crate::domain::{TrackedObjectRecord, validate_name};
use crate::registry::RecordStore;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

/// Outcome of a full count: decoded records plus rows that could not be
/// decoded. Only `records` is the answer; `corrupt_rows` is diagnostic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountSummary {
    pub records: u64,
    pub corrupt_rows: u64,
}

/// Read-only queries over a [`RecordStore`].
///
/// Holds no state of its own; every call goes to the store.
#[derive(Clone)]
pub struct QueryService {
    store: RecordStore,
}

impl QueryService {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub async fn count_all(&self) -> Result<u64> {
        Ok(self.count_all_with_diagnostics().await?.records)
    }

    pub async fn count_all_with_diagnostics(&self) -> Result<CountSummary> {
        let mut summary = CountSummary::default();
        let mut rows = self.store.scan();

        while let Some(item) = rows.next().await {
            match item {
                Ok(_) => summary.records += 1,
                Err(RegistryError::CorruptPayload { row_key, reason }) => {
                    warn!(row_key = %row_key, reason = %reason, "skipping corrupt row in count");
                    summary.corrupt_rows += 1;
                }
                Err(err) => return Err(err),
            }
        }

        debug!(
            partition = %self.store.partition_key(),
            records = summary.records,
            corrupt_rows = summary.corrupt_rows,
            "count complete"
        );
        Ok(summary)
    }

    /// Blank names are rejected without touching the store. Otherwise the
    /// name is looked up exactly as given.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<TrackedObjectRecord>> {
        validate_name(name)?;
        self.store.get(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryRowStore;
    use std::sync::Arc;

    fn service() -> QueryService {
        QueryService::new(RecordStore::new(Arc::new(InMemoryRowStore::new()), "t"))
    }

    #[tokio::test]
    async fn empty_registry_counts_zero() {
        assert_eq!(service().count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_by_name_is_exact() {
        let service = service();
        service
            .store()
            .put(&TrackedObjectRecord::new("Mug").unwrap())
            .await
            .unwrap();
        assert!(service.find_by_name("Mug").await.unwrap().is_some());
        assert!(service.find_by_name("mug").await.unwrap().is_none());
        assert!(service.find_by_name(" Mug").await.unwrap().is_none());
    }
}
