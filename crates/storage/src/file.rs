//! File-backed event store
//!
//! All workspaces share one append-only log file, `events.log`, inside the
//! data directory. The file is the source of truth; an
//! [`InMemoryEventStore`] index is rebuilt from it on open and kept in step
//! with every append.
//!
//! Only one handle may own a log at a time. `open` takes an exclusive
//! advisory lock on `events.log` and fails while another handle, in this or
//! any other process, holds it. The lock is released when the store drops.
//!
//! ## Append sequence
//!
//! ```text
//! 1. lock writer                 (serializes appends through this handle)
//! 2. check prev_hash == tip      (Conflict otherwise, nothing written)
//! 3. write record + flush        (sync_data as well in Strict mode)
//!    on failure: truncate back   (no partial record survives)
//! 4. apply to index              (visibility)
//! ```
//!
//! ## Recovery
//!
//! On open every record is decoded and replayed. A damaged *final* record is
//! a torn write from a crash: it is truncated away and a warning is logged. A
//! damaged record followed by valid data is corruption and fails the open.

use crate::format::{decode_record, encode_record};
use crate::sharded::InMemoryEventStore;
use crate::store::{tip_conflict, EventStore};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use taskledger_core::{DurabilityMode, Error, Event, Result, TaskId, WorkspaceId};
use tracing::{debug, info, warn};

/// Name of the log file inside the data directory
pub const LOG_FILE_NAME: &str = "events.log";

/// Persistent event store backed by an append-only log file
pub struct FileEventStore {
    path: PathBuf,
    mode: DurabilityMode,
    writer: Mutex<LogWriter<File>>,
    index: InMemoryEventStore,
}

/// Log file operations an append needs
///
/// Implemented for [`File`]; tests substitute files that fail on demand.
trait LogFile: Write {
    fn len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&self) -> io::Result<()>;
}

impl LogFile for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Unbuffered record writer
///
/// A failed write is truncated back to the length the log had before it
/// started. If that truncation fails too, the writer refuses every later
/// append, since the file may now hold bytes the index never saw.
struct LogWriter<F> {
    file: F,
    poisoned: bool,
}

impl<F: LogFile> LogWriter<F> {
    fn new(file: F) -> Self {
        Self {
            file,
            poisoned: false,
        }
    }

    fn write_record(&mut self, record: &[u8], sync: bool) -> Result<()> {
        if self.poisoned {
            return Err(Error::Storage(
                "event log is in an unknown state after a failed rollback, reopen the store".into(),
            ));
        }

        let start = self.file.len()?;
        let written = self
            .file
            .write_all(record)
            .and_then(|()| self.file.flush())
            .and_then(|()| if sync { self.file.sync() } else { Ok(()) });

        if let Err(e) = written {
            match self.file.truncate(start) {
                Ok(()) => warn!(offset = start, error = %e, "append failed, log rolled back"),
                Err(rollback) => {
                    self.poisoned = true;
                    warn!(
                        offset = start,
                        error = %e,
                        rollback_error = %rollback,
                        "append failed and rollback failed, refusing further appends"
                    );
                }
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// What recovery found while replaying the log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records replayed into the index
    pub records: usize,
    /// Bytes discarded from a torn tail
    pub truncated_bytes: u64,
}

impl FileEventStore {
    /// Open (or create) the log in `dir`
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: `mode` is `InMemory`
    /// - `Corruption`: a damaged record is followed by further data, or the
    ///   log contains a fork
    /// - `Storage`: another handle holds the log lock
    /// - `Io`: the directory or file cannot be created or read
    pub fn open(dir: impl AsRef<Path>, mode: DurabilityMode) -> Result<Self> {
        Self::open_with_report(dir, mode).map(|(store, _)| store)
    }

    /// Open and also return what recovery did
    pub fn open_with_report(
        dir: impl AsRef<Path>,
        mode: DurabilityMode,
    ) -> Result<(Self, RecoveryReport)> {
        if !mode.requires_log() {
            return Err(Error::InvalidInput(
                "file event store needs buffered or strict durability".into(),
            ));
        }
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(LOG_FILE_NAME);

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|e| {
            Error::Storage(format!(
                "{} is locked by another handle: {}",
                path.display(),
                e
            ))
        })?;

        let index = InMemoryEventStore::new();
        let report = replay(&mut file, &index, &path)?;
        if report.truncated_bytes > 0 {
            file.sync_data()?;
        }
        info!(
            path = %path.display(),
            records = report.records,
            truncated_bytes = report.truncated_bytes,
            "event log opened"
        );

        Ok((
            Self {
                path,
                mode,
                writer: Mutex::new(LogWriter::new(file)),
                index,
            },
            report,
        ))
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durability mode appends run under
    pub fn durability_mode(&self) -> DurabilityMode {
        self.mode
    }

    /// Force buffered bytes to stable storage
    pub fn flush(&self) -> Result<()> {
        let writer = self.writer.lock();
        writer.file.sync_data()?;
        Ok(())
    }
}

fn replay(file: &mut File, index: &InMemoryEventStore, path: &Path) -> Result<RecoveryReport> {
    file.seek(SeekFrom::Start(0))?;
    let total_len = file.metadata()?.len();
    let mut reader = BufReader::new(&*file);
    let mut report = RecoveryReport::default();
    let mut valid_len: u64 = 0;
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }
        let complete = line.last() == Some(&b'\n');
        let is_last = valid_len + read as u64 == total_len;
        let decoded = if complete {
            decode_record(&line[..line.len() - 1]).map_err(|e| e.to_string())
        } else {
            Err("missing newline".to_string())
        };

        match decoded {
            Ok(event) => {
                index.append(&event).map_err(|e| {
                    Error::Corruption(format!(
                        "{}: record at byte {} does not extend its chain: {}",
                        path.display(),
                        valid_len,
                        e
                    ))
                })?;
                valid_len += read as u64;
                report.records += 1;
            }
            Err(reason) if is_last => {
                warn!(
                    path = %path.display(),
                    offset = valid_len,
                    bytes = read,
                    %reason,
                    "truncating torn tail of event log"
                );
                report.truncated_bytes = read as u64;
                break;
            }
            Err(reason) => {
                return Err(Error::Corruption(format!(
                    "{}: record at byte {}: {}",
                    path.display(),
                    valid_len,
                    reason
                )));
            }
        }
    }

    drop(reader);
    if report.truncated_bytes > 0 {
        file.set_len(valid_len)?;
    }
    Ok(report)
}

impl EventStore for FileEventStore {
    fn append(&self, event: &Event) -> Result<()> {
        let mut writer = self.writer.lock();

        let tip = self.index.latest_hash(&event.workspace_id)?;
        if tip.as_deref() != event.prev_hash.as_deref() {
            return Err(tip_conflict(
                &event.workspace_id,
                event.prev_hash.as_deref(),
                tip.as_deref(),
            ));
        }

        let record = encode_record(event)?;
        writer.write_record(&record, self.mode.syncs_every_append())?;

        self.index.append(event)?;
        debug!(
            workspace = %event.workspace_id,
            event_id = %event.id,
            bytes = record.len(),
            "event persisted"
        );
        Ok(())
    }

    fn latest_hash(&self, workspace: &WorkspaceId) -> Result<Option<String>> {
        self.index.latest_hash(workspace)
    }

    fn list_workspace(&self, workspace: &WorkspaceId) -> Result<Vec<Event>> {
        self.index.list_workspace(workspace)
    }

    fn list_task(&self, task: &TaskId) -> Result<Vec<Event>> {
        self.index.list_task(task)
    }

    fn workspaces(&self) -> Result<Vec<WorkspaceId>> {
        self.index.workspaces()
    }

    fn len(&self, workspace: &WorkspaceId) -> Result<usize> {
        self.index.len(workspace)
    }
}

impl std::fmt::Debug for FileEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEventStore")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("workspaces", &self.index.shard_count())
            .finish()
    }
}
