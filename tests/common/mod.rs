#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use trackdb::{Columns, InMemoryRowStore, RegistryError, Result, RowEntity, RowPage, RowStore};

/// In-memory row store that counts calls and can be told to fail.
#[derive(Default)]
pub struct InstrumentedRowStore {
    inner: InMemoryRowStore,
    pub calls: AtomicUsize,
    pub fail_reads: AtomicBool,
    /// Number of upcoming upserts that fail before writes succeed again.
    pub failing_writes: AtomicUsize,
}

impl InstrumentedRowStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RegistryError::unavailable("injected read failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RowStore for InstrumentedRowStore {
    async fn upsert(&self, partition_key: &str, row_key: &str, columns: Columns) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(RegistryError::unavailable("injected write failure"));
        }
        self.inner.upsert(partition_key, row_key, columns).await
    }

    async fn get(&self, partition_key: &str, row_key: &str) -> Result<Option<RowEntity>> {
        self.check_read()?;
        self.inner.get(partition_key, row_key).await
    }

    async fn scan_page(
        &self,
        partition_key: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> Result<RowPage> {
        self.check_read()?;
        self.inner.scan_page(partition_key, continuation, limit).await
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        self.check_read()?;
        self.inner.partitions().await
    }
}
