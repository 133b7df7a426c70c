use crate::core::{Columns, Result, RowEntity, RowPage};
use async_trait::async_trait;

/// Row store trait - allows pluggable backing stores.
///
/// Rows are addressed by `(partition_key, row_key)` and hold only primitive
/// columns. Implementations must give read-your-write for a single caller:
/// once `upsert` returns, `get` on the same instance observes the write.
/// Transient infrastructure failures are reported as
/// `RegistryError::StoreUnavailable`; implementations do not retry.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert the row, or replace every column of an existing one.
    async fn upsert(&self, partition_key: &str, row_key: &str, columns: Columns) -> Result<()>;

    /// Point lookup by exact key.
    async fn get(&self, partition_key: &str, row_key: &str) -> Result<Option<RowEntity>>;

    /// Fetch the next page of a partition, starting after `continuation`.
    async fn scan_page(
        &self,
        partition_key: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> Result<RowPage>;

    /// Names of all non-empty partitions.
    async fn partitions(&self) -> Result<Vec<String>>;
}
