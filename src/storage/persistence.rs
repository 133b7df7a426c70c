//! Write-Ahead Logging (WAL) and snapshot checkpoints for the durable row store

use crate::core::{Columns, RegistryError, Result};
use crate::storage::table::Partition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::{info, warn};

pub const WAL_FILE_NAME: &str = "trackdb.wal";
pub const SNAPSHOT_FILE_NAME: &str = "trackdb.snapshot";
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;
pub const DEFAULT_CHECKPOINT_THRESHOLD: usize = 1000;

// ============================================================================
// WAL Entry Types
// ============================================================================

/// One durable mutation. A whole upsert, payload column included, is one
/// entry and therefore one log frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    Upsert {
        partition_key: String,
        row_key: String,
        timestamp: DateTime<Utc>,
        columns: Columns,
    },
}

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub partitions: HashMap<String, Partition>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub row_count: usize,
    pub partition_count: usize,
}

impl StoreSnapshot {
    pub fn new(partitions: HashMap<String, Partition>) -> Self {
        let row_count = partitions.values().map(|p| p.row_count()).sum();
        let partition_count = partitions.len();

        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            partitions,
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                row_count,
                partition_count,
            },
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync after every log frame.
    Sync,
    /// Flush to the OS after every frame; fsync only on checkpoint.
    #[default]
    Async,
    /// No log, no snapshots.
    None,
}

impl FromStr for DurabilityMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            "none" => Ok(Self::None),
            other => Err(format!(
                "unknown durability mode '{}', expected sync|async|none",
                other
            )),
        }
    }
}

fn io_error(context: &str, err: impl std::fmt::Display) -> RegistryError {
    RegistryError::StoreUnavailable(format!("{}: {}", context, err))
}

// ============================================================================
// WAL Sink
// ============================================================================

/// Append-only byte sink behind the log. Besides writing it must report its
/// current length and cut itself back to an earlier length, which is how a
/// failed append is rolled back.
pub trait WalSink: Write + Send {
    fn len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

/// The log file on disk, opened in append mode.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl WalSink for FileSink {
    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    sink: Option<Box<dyn WalSink>>,
    durability_mode: DurabilityMode,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
    /// Set when a failed append could not be cut back off the log. No new
    /// frame is written until the log is truncated to this length.
    pending_rollback: Option<u64>,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error("Failed to create WAL directory", e))?;
        }

        let sink: Option<Box<dyn WalSink>> = if durability_mode != DurabilityMode::None {
            let file =
                FileSink::open(&wal_path).map_err(|e| io_error("Failed to open WAL file", e))?;
            Some(Box::new(file))
        } else {
            None
        };
        Ok(Self::from_parts(wal_path, sink, durability_mode))
    }

    /// Log over a caller-supplied sink. `wal_path` must name the file the
    /// sink appends to; recovery reads frames back from it.
    pub fn with_sink<P: AsRef<Path>>(
        wal_path: P,
        sink: Box<dyn WalSink>,
        durability_mode: DurabilityMode,
    ) -> Self {
        let sink = (durability_mode != DurabilityMode::None).then_some(sink);
        Self::from_parts(wal_path.as_ref().to_path_buf(), sink, durability_mode)
    }

    fn from_parts(
        wal_path: PathBuf,
        sink: Option<Box<dyn WalSink>>,
        durability_mode: DurabilityMode,
    ) -> Self {
        Self {
            wal_path,
            sink,
            durability_mode,
            entries_since_checkpoint: 0,
            checkpoint_threshold: DEFAULT_CHECKPOINT_THRESHOLD,
            pending_rollback: None,
        }
    }

    /// Appends one length-prefixed frame with a single `write_all`.
    ///
    /// Either the whole frame is on the log when this returns `Ok`, or the
    /// log is back at its previous length. If a failed frame cannot be cut
    /// off, every later append retries the cut first and fails with
    /// `StoreUnavailable` until it succeeds.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.finish_rollback()?;

        let serialized = rmp_serde::to_vec(entry)
            .map_err(|e| io_error("Failed to serialize WAL entry", e))?;
        let len = u32::try_from(serialized.len())
            .map_err(|_| RegistryError::validation("WAL entry exceeds 4 GiB"))?;

        let mut frame = Vec::with_capacity(4 + serialized.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&serialized);

        let sync = self.durability_mode == DurabilityMode::Sync;
        let sink = self.sink_mut()?;
        let start = sink.len().map_err(|e| io_error("Failed to stat WAL", e))?;

        let written = sink
            .write_all(&frame)
            .map_err(|e| io_error("Failed to write WAL", e))
            .and_then(|()| sink.flush().map_err(|e| io_error("Failed to flush WAL", e)))
            .and_then(|()| {
                if sync {
                    sink.sync().map_err(|e| io_error("Failed to sync WAL", e))
                } else {
                    Ok(())
                }
            });

        if let Err(err) = written {
            if let Err(rollback_err) = sink.truncate(start) {
                warn!(
                    path = %self.wal_path.display(),
                    error = %rollback_err,
                    "could not roll back failed WAL append, log is blocked"
                );
                self.pending_rollback = Some(start);
            }
            return Err(err);
        }

        self.entries_since_checkpoint += 1;
        Ok(())
    }

    fn sink_mut(&mut self) -> Result<&mut Box<dyn WalSink>> {
        self.sink
            .as_mut()
            .ok_or_else(|| RegistryError::unavailable("WAL file not initialized"))
    }

    fn finish_rollback(&mut self) -> Result<()> {
        let Some(len) = self.pending_rollback else {
            return Ok(());
        };
        let sink = self.sink_mut()?;
        sink.truncate(len)
            .and_then(|()| sink.sync())
            .map_err(|e| io_error("WAL is blocked by an unfinished rollback", e))?;
        info!(path = %self.wal_path.display(), len, "failed WAL append rolled back");
        self.pending_rollback = None;
        Ok(())
    }

    /// Reads every complete frame. A truncated trailing frame (crash in the
    /// middle of an append) is dropped; a complete frame that fails to
    /// deserialize is an error.
    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        Ok(self.read_frames()?.0)
    }

    /// Like `read_all`, but also cuts a torn tail off the file so later
    /// appends start on a frame boundary.
    pub fn repair(&mut self) -> Result<Vec<WalEntry>> {
        if self.durability_mode == DurabilityMode::None {
            return self.read_all();
        }
        self.finish_rollback()?;

        let (entries, valid_len) = self.read_frames()?;
        let wal_path = self.wal_path.clone();
        let sink = self.sink_mut()?;
        let file_len = sink.len().map_err(|e| io_error("Failed to stat WAL", e))?;
        if valid_len < file_len {
            warn!(
                path = %wal_path.display(),
                recovered = entries.len(),
                dropped_bytes = file_len - valid_len,
                "discarding torn WAL frame"
            );
            sink.truncate(valid_len)
                .map_err(|e| io_error("Failed to truncate torn WAL tail", e))?;
            sink.sync().map_err(|e| io_error("Failed to sync WAL", e))?;
        }
        Ok(entries)
    }

    /// Complete entries plus the byte length they occupy.
    fn read_frames(&self) -> Result<(Vec<WalEntry>, u64)> {
        if !self.wal_path.exists() {
            return Ok((Vec::new(), 0));
        }
        let file = File::open(&self.wal_path)
            .map_err(|e| io_error("Failed to open WAL for reading", e))?;
        let file_len = file
            .metadata()
            .map_err(|e| io_error("Failed to stat WAL", e))?
            .len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut valid_len = 0u64;
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(io_error("Failed to read WAL entry length", e)),
            }
            let len = u64::from(u32::from_le_bytes(len_bytes));
            // A header promising more bytes than the file holds is a torn tail.
            if valid_len + 4 + len > file_len {
                break;
            }
            let mut data = Vec::with_capacity(len as usize);
            (&mut reader)
                .take(len)
                .read_to_end(&mut data)
                .map_err(|e| io_error("Failed to read WAL entry data", e))?;
            if data.len() as u64 != len {
                break;
            }
            let entry: WalEntry = rmp_serde::from_slice(&data)
                .map_err(|e| io_error("Failed to deserialize WAL entry", e))?;
            entries.push(entry);
            valid_len += 4 + len;
        }
        Ok((entries, valid_len))
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let sink = self.sink_mut()?;
        sink.truncate(0)
            .map_err(|e| io_error("Failed to truncate WAL", e))?;
        self.pending_rollback = None;
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold.max(1);
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Writes to a temp file in the same directory and renames it over the
    /// previous snapshot, so readers only ever see a complete file.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let parent = self
            .snapshot_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)
            .map_err(|e| io_error("Failed to create snapshot directory", e))?;

        let serialized = rmp_serde::to_vec(snapshot)
            .map_err(|e| io_error("Failed to serialize snapshot", e))?;

        let mut temp = NamedTempFile::new_in(&parent)
            .map_err(|e| io_error("Failed to create temp file", e))?;
        temp.write_all(&serialized)
            .map_err(|e| io_error("Failed to write snapshot", e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| io_error("Failed to sync snapshot", e))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| io_error("Failed to rename snapshot", e.error))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)
            .map_err(|e| io_error("Failed to open snapshot", e))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| io_error("Failed to read snapshot", e))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data)
            .map_err(|e| io_error("Failed to deserialize snapshot", e))?;
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(RegistryError::unavailable(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let wal = WalManager::new(data_dir.join(WAL_FILE_NAME), durability_mode)?;
        let snapshot = SnapshotManager::new(data_dir.join(SNAPSHOT_FILE_NAME));
        Ok(Self {
            wal,
            snapshot,
            durability_mode,
        })
    }

    /// Like `new`, but the log writes through `sink` instead of opening the
    /// log file itself.
    pub fn with_wal_sink<P: AsRef<Path>>(
        data_dir: P,
        sink: Box<dyn WalSink>,
        durability_mode: DurabilityMode,
    ) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            wal: WalManager::with_sink(data_dir.join(WAL_FILE_NAME), sink, durability_mode),
            snapshot: SnapshotManager::new(data_dir.join(SNAPSHOT_FILE_NAME)),
            durability_mode,
        }
    }

    pub fn log(&mut self, entry: &WalEntry) -> Result<()> {
        self.wal.append(entry)
    }

    pub fn checkpoint(&mut self, partitions: HashMap<String, Partition>) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let snapshot = StoreSnapshot::new(partitions);
        self.snapshot.save(&snapshot)?;
        self.wal.clear()?;
        info!(
            rows = snapshot.metadata.row_count,
            partitions = snapshot.metadata.partition_count,
            "checkpoint written"
        );
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    /// Rebuilds partitions from the last snapshot plus every logged upsert
    /// after it.
    pub fn recover(&mut self) -> Result<HashMap<String, Partition>> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(HashMap::new());
        }

        let mut partitions = match self.snapshot.load()? {
            Some(snapshot) => snapshot.partitions,
            None => HashMap::new(),
        };

        let entries = self.wal.repair()?;
        let replayed = entries.len();
        for entry in entries {
            match entry {
                WalEntry::Upsert {
                    partition_key,
                    row_key,
                    timestamp,
                    columns,
                } => {
                    partitions
                        .entry(partition_key.clone())
                        .or_insert_with(|| Partition::new(partition_key))
                        .upsert(&row_key, columns, timestamp);
                }
            }
        }

        info!(
            partitions = partitions.len(),
            replayed, "recovered row store"
        );
        Ok(partitions)
    }

    pub fn wal(&self) -> &WalManager {
        &self.wal
    }

    pub fn wal_mut(&mut self) -> &mut WalManager {
        &mut self.wal
    }
}
