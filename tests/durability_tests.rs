use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use trackdb::storage::persistence::WAL_FILE_NAME;
use trackdb::storage::{FileSink, WalSink};
use trackdb::{
    DurabilityMode, DurableRowStore, QueryService, RecordStore, TrackedObjectRecord, VisionState,
};

fn open(dir: &TempDir, threshold: Option<usize>) -> (Arc<DurableRowStore>, QueryService) {
    let rows = Arc::new(
        DurableRowStore::open_with_threshold(dir.path(), DurabilityMode::Sync, threshold)
            .expect("durable store should open"),
    );
    let queries = QueryService::new(RecordStore::new(rows.clone(), "lab"));
    (rows, queries)
}

fn record(name: &str, images: &[&str]) -> TrackedObjectRecord {
    TrackedObjectRecord::new(name)
        .unwrap()
        .with_spatial_anchor_id(format!("anchor-{}", name))
        .with_vision_state(
            VisionState::new("proj-1")
                .with_tag(name.to_lowercase(), format!("tag-{}", name))
                .with_images(images.iter().copied()),
        )
}

#[tokio::test]
async fn records_survive_restart_with_payload_intact() {
    let dir = TempDir::new().unwrap();
    let mug = record("Mug", &["i1", "i2", "i1"]);
    {
        let (_, queries) = open(&dir, None);
        queries.store().put(&mug).await.unwrap();
        queries
            .store()
            .put(&record("Plant", &[]))
            .await
            .unwrap();
    }

    let (_, queries) = open(&dir, None);
    assert_eq!(queries.count_all().await.unwrap(), 2);
    assert_eq!(queries.find_by_name("Mug").await.unwrap(), Some(mug));
}

#[tokio::test]
async fn last_write_wins_after_restart() {
    let dir = TempDir::new().unwrap();
    {
        let (_, queries) = open(&dir, None);
        queries.store().put(&record("Mug", &["old"])).await.unwrap();
        queries.store().put(&record("Mug", &["new"])).await.unwrap();
    }

    let (_, queries) = open(&dir, None);
    let mug = queries.find_by_name("Mug").await.unwrap().unwrap();
    assert_eq!(mug.vision_state.image_ids, vec!["new"]);
    assert_eq!(queries.count_all().await.unwrap(), 1);
}

#[tokio::test]
async fn torn_trailing_write_is_dropped_and_log_stays_usable() {
    let dir = TempDir::new().unwrap();
    {
        let (_, queries) = open(&dir, None);
        queries.store().put(&record("Mug", &["i1"])).await.unwrap();
    }

    // Simulate a crash halfway through the next frame.
    let mut wal = OpenOptions::new()
        .append(true)
        .open(dir.path().join(WAL_FILE_NAME))
        .unwrap();
    wal.write_all(&200u32.to_le_bytes()).unwrap();
    wal.write_all(b"{\"half").unwrap();
    drop(wal);

    {
        let (_, queries) = open(&dir, None);
        assert_eq!(queries.count_all().await.unwrap(), 1);
        queries.store().put(&record("Plant", &[])).await.unwrap();
    }

    let (_, queries) = open(&dir, None);
    assert_eq!(queries.count_all().await.unwrap(), 2);
    assert!(queries.find_by_name("Plant").await.unwrap().is_some());
}

#[tokio::test]
async fn checkpoint_and_log_tail_recover_together() {
    let dir = TempDir::new().unwrap();
    {
        let (rows, queries) = open(&dir, Some(3));
        for i in 0..7 {
            queries
                .store()
                .put(&record(&format!("obj-{}", i), &["x"]))
                .await
                .unwrap();
        }
        assert_eq!(rows.wal_entries_since_checkpoint().await, 1);
    }

    let (_, queries) = open(&dir, Some(3));
    assert_eq!(queries.count_all().await.unwrap(), 7);
}

#[tokio::test]
async fn explicit_checkpoint_truncates_log() {
    let dir = TempDir::new().unwrap();
    let (rows, queries) = open(&dir, None);
    queries.store().put(&record("Mug", &[])).await.unwrap();
    assert_eq!(rows.wal_entries_since_checkpoint().await, 1);

    rows.checkpoint().await.unwrap();
    assert_eq!(rows.wal_entries_since_checkpoint().await, 0);
    let wal_len = std::fs::metadata(dir.path().join(WAL_FILE_NAME)).unwrap().len();
    assert_eq!(wal_len, 0);
    drop(queries);
    drop(rows);

    let (_, queries) = open(&dir, None);
    assert!(queries.find_by_name("Mug").await.unwrap().is_some());
}

/// Log file whose writes and truncates can be made to fail. A failing write
/// lands half of its bytes first, like a disk filling up mid-frame.
struct FlakySink {
    inner: FileSink,
    fail_writes: Arc<AtomicBool>,
    fail_truncates: Arc<AtomicBool>,
}

impl Write for FlakySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.inner.write_all(&buf[..buf.len() / 2])?;
            self.inner.flush()?;
            return Err(io::Error::other("no space left on device"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl WalSink for FlakySink {
    fn len(&self) -> io::Result<u64> {
        self.inner.len()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        if self.fail_truncates.load(Ordering::SeqCst) {
            return Err(io::Error::other("read-only file system"));
        }
        self.inner.truncate(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.inner.sync()
    }
}

fn open_flaky(dir: &TempDir) -> (QueryService, Arc<AtomicBool>, Arc<AtomicBool>) {
    let fail_writes = Arc::new(AtomicBool::new(false));
    let fail_truncates = Arc::new(AtomicBool::new(false));
    let sink = FlakySink {
        inner: FileSink::open(dir.path().join(WAL_FILE_NAME)).unwrap(),
        fail_writes: fail_writes.clone(),
        fail_truncates: fail_truncates.clone(),
    };
    let rows = Arc::new(
        DurableRowStore::open_with_wal_sink(dir.path(), DurabilityMode::Sync, Box::new(sink))
            .unwrap(),
    );
    let queries = QueryService::new(RecordStore::new(rows, "lab"));
    (queries, fail_writes, fail_truncates)
}

#[tokio::test]
async fn failed_append_is_rolled_back_and_later_writes_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let (queries, fail_writes, _) = open_flaky(&dir);
        queries.store().put(&record("A", &["a1"])).await.unwrap();

        fail_writes.store(true, Ordering::SeqCst);
        let big: Vec<String> = (0..500).map(|i| format!("image-{}", i)).collect();
        let big_refs: Vec<&str> = big.iter().map(String::as_str).collect();
        let err = queries.store().put(&record("B", &big_refs)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(queries.find_by_name("B").await.unwrap().is_none());

        fail_writes.store(false, Ordering::SeqCst);
        queries.store().put(&record("C", &["c1"])).await.unwrap();
    }

    let (_, queries) = open(&dir, None);
    assert!(queries.find_by_name("A").await.unwrap().is_some());
    assert!(queries.find_by_name("B").await.unwrap().is_none());
    assert_eq!(
        queries.find_by_name("C").await.unwrap(),
        Some(record("C", &["c1"]))
    );
    assert_eq!(queries.count_all().await.unwrap(), 2);
}

#[tokio::test]
async fn log_stays_blocked_until_a_failed_append_can_be_cut_off() {
    let dir = TempDir::new().unwrap();
    {
        let (queries, fail_writes, fail_truncates) = open_flaky(&dir);
        queries.store().put(&record("A", &[])).await.unwrap();

        fail_writes.store(true, Ordering::SeqCst);
        fail_truncates.store(true, Ordering::SeqCst);
        assert!(queries.store().put(&record("B", &["b1"])).await.is_err());

        // Writes succeed again but the torn frame is still on disk.
        fail_writes.store(false, Ordering::SeqCst);
        let err = queries.store().put(&record("C", &[])).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(queries.find_by_name("C").await.unwrap().is_none());

        fail_truncates.store(false, Ordering::SeqCst);
        queries.store().put(&record("D", &["d1"])).await.unwrap();
    }

    let (_, queries) = open(&dir, None);
    assert!(queries.find_by_name("A").await.unwrap().is_some());
    assert!(queries.find_by_name("B").await.unwrap().is_none());
    assert!(queries.find_by_name("C").await.unwrap().is_none());
    assert!(queries.find_by_name("D").await.unwrap().is_some());
}

#[tokio::test]
async fn oversized_frame_header_is_treated_as_torn_tail() {
    let dir = TempDir::new().unwrap();
    {
        let (_, queries) = open(&dir, None);
        queries.store().put(&record("Mug", &[])).await.unwrap();
    }

    let mut wal = OpenOptions::new()
        .append(true)
        .open(dir.path().join(WAL_FILE_NAME))
        .unwrap();
    wal.write_all(&u32::MAX.to_le_bytes()).unwrap();
    drop(wal);

    let (_, queries) = open(&dir, None);
    assert_eq!(queries.count_all().await.unwrap(), 1);
}
