use crate::codec;
use crate::core::{RegistryError, Result, RowEntity};
use crate::domain::TrackedObjectRecord;
use crate::storage::RowStore;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_PARTITION: &str = "tracked-objects";
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 100;

/// Persists tracked objects in one partition of a [`RowStore`], keyed by
/// record name.
///
/// Writes are last-write-wins: there is no version or etag check, so two
/// callers writing the same name race and the later write replaces the
/// earlier one entirely.
#[derive(Clone)]
pub struct RecordStore {
    rows: Arc<dyn RowStore>,
    partition_key: String,
    page_size: usize,
}

impl RecordStore {
    pub fn new(rows: Arc<dyn RowStore>, partition_key: impl Into<String>) -> Self {
        Self {
            rows,
            partition_key: partition_key.into(),
            page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Create or fully replace the record stored under `record.name`.
    pub async fn put(&self, record: &TrackedObjectRecord) -> Result<()> {
        let columns = codec::encode(record)?;
        self.rows
            .upsert(&self.partition_key, &record.name, columns)
            .await?;
        debug!(partition = %self.partition_key, name = %record.name, "record stored");
        Ok(())
    }

    /// Point lookup. `Ok(None)` is the not-found outcome.
    pub async fn get(&self, name: &str) -> Result<Option<TrackedObjectRecord>> {
        match self.rows.get(&self.partition_key, name).await? {
            Some(row) => decode_row(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Enumerates the partition page by page.
    ///
    /// Every call starts over from the first row. Rows that fail to decode
    /// show up as `Err(CorruptPayload)` items and the scan carries on. A
    /// store failure is yielded once and ends the stream.
    pub fn scan(&self) -> BoxStream<'static, Result<TrackedObjectRecord>> {
        let state = ScanState {
            rows: self.rows.clone(),
            partition_key: self.partition_key.clone(),
            page_size: self.page_size,
            buffer: VecDeque::new(),
            continuation: None,
            exhausted: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(row) = state.buffer.pop_front() {
                    return Some((decode_row(&row), state));
                }
                if state.exhausted {
                    return None;
                }

                let page = state
                    .rows
                    .scan_page(
                        &state.partition_key,
                        state.continuation.as_deref(),
                        state.page_size,
                    )
                    .await;
                match page {
                    Ok(page) => {
                        state.exhausted = page.continuation.is_none();
                        state.continuation = page.continuation;
                        state.buffer.extend(page.rows);
                    }
                    Err(err) => {
                        state.exhausted = true;
                        return Some((Err(err), state));
                    }
                }
            }
        })
        .boxed()
    }
}

struct ScanState {
    rows: Arc<dyn RowStore>,
    partition_key: String,
    page_size: usize,
    buffer: VecDeque<RowEntity>,
    continuation: Option<String>,
    exhausted: bool,
}

/// Decodes a row and checks that the stored name still matches its key.
fn decode_row(row: &RowEntity) -> Result<TrackedObjectRecord> {
    let record = codec::decode(&row.columns).map_err(|err| match err {
        RegistryError::CorruptPayload { reason, .. } => {
            RegistryError::corrupt(row.row_key.as_str(), reason)
        }
        other => other,
    })?;

    if record.name != row.row_key {
        return Err(RegistryError::corrupt(
            row.row_key.as_str(),
            format!("stored name '{}' does not match row key", record.name),
        ));
    }
    Ok(record)
}
