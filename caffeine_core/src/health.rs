//! External health-record store interface and its built-in implementations.
//!
//! The tracker only talks to the health store through [`HealthRecordStore`].
//! [`JsonlHealthLog`] keeps records in a JSON Lines file with file locking so
//! several processes can share it; [`LocalOnly`] refuses authorization and
//! keeps the tracker purely local.

use crate::{DoseRecord, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A third-party store that can report and accept dose records
#[async_trait]
pub trait HealthRecordStore: Send + Sync {
    /// Ask for access. `false` means stay local-only; it is never fatal.
    async fn authorize(&self) -> bool;

    /// Records consumed at or after `since`, excluding deleted ones
    async fn fetch_new_doses(&self, since: DateTime<Utc>) -> Result<Vec<DoseRecord>>;

    /// Ids of records deleted from the store
    async fn fetch_deleted_ids(&self) -> Result<HashSet<Uuid>>;

    /// Push one record
    async fn record_dose(&self, record: &DoseRecord) -> Result<()>;

    /// Mark the record with `id` as deleted
    async fn delete_dose(&self, id: Uuid) -> Result<()>;
}

/// Health store stand-in for running without any external service
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalOnly;

#[async_trait]
impl HealthRecordStore for LocalOnly {
    async fn authorize(&self) -> bool {
        false
    }

    async fn fetch_new_doses(&self, _since: DateTime<Utc>) -> Result<Vec<DoseRecord>> {
        Ok(Vec::new())
    }

    async fn fetch_deleted_ids(&self) -> Result<HashSet<Uuid>> {
        Ok(HashSet::new())
    }

    async fn record_dose(&self, _record: &DoseRecord) -> Result<()> {
        Err(Error::Health("health store not authorized".into()))
    }

    async fn delete_dose(&self, _id: Uuid) -> Result<()> {
        Err(Error::Health("health store not authorized".into()))
    }
}

/// One line of the health log: a dose, or a tombstone for a deleted one
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum LogEntry {
    Deleted { deleted_id: Uuid },
    Record(DoseRecord),
}

/// Everything a health log currently holds
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HealthLogContents {
    /// Records without a tombstone, in file order
    pub records: Vec<DoseRecord>,
    pub deleted: HashSet<Uuid>,
}

/// JSONL-based health log with file locking
#[derive(Clone, Debug)]
pub struct JsonlHealthLog {
    path: PathBuf,
}

impl JsonlHealthLog {
    /// Create a new health log for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn append_blocking(&self, entry: &LogEntry) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // Acquire exclusive lock
        file.lock_exclusive()?;

        // One entry per line, written in a single flush
        let mut writer = std::io::BufWriter::new(&file);
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        writer.write_all(&line)?;
        writer.flush()?;

        file.unlock()?;
        Ok(())
    }

    async fn append(&self, entry: LogEntry) -> Result<()> {
        let log = self.clone();
        tokio::task::spawn_blocking(move || log.append_blocking(&entry))
            .await
            .map_err(|e| Error::Health(format!("health log writer failed: {}", e)))?
    }

    async fn read(&self) -> Result<HealthLogContents> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_log(&path))
            .await
            .map_err(|e| Error::Health(format!("health log reader failed: {}", e)))?
    }
}

/// Read a health log file.
///
/// Lines that are not valid entries (bad JSON, invalid UTF-8, a torn last
/// line) are skipped with a warning; a missing file is empty.
pub fn read_log(path: &Path) -> Result<HealthLogContents> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HealthLogContents::default()),
        Err(e) => return Err(e.into()),
    };
    // Acquire shared lock for reading
    file.lock_shared()?;

    let mut contents = HealthLogContents::default();
    for (line_num, line) in BufReader::new(&file).split(b'\n').enumerate() {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<LogEntry>(&line) {
            Ok(LogEntry::Record(record)) => contents.records.push(record),
            Ok(LogEntry::Deleted { deleted_id }) => {
                contents.deleted.insert(deleted_id);
            }
            Err(e) => {
                tracing::warn!("Skipping malformed health log line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;

    let deleted = &contents.deleted;
    contents
        .records
        .retain(|r| !deleted.contains(&r.external_id));
    tracing::debug!(
        "Read {} records and {} deletions from health log",
        contents.records.len(),
        contents.deleted.len()
    );
    Ok(contents)
}

#[async_trait]
impl HealthRecordStore for JsonlHealthLog {
    async fn authorize(&self) -> bool {
        match self.ensure_parent_dir() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Health log at {:?} is not usable: {}", self.path, e);
                false
            }
        }
    }

    async fn fetch_new_doses(&self, since: DateTime<Utc>) -> Result<Vec<DoseRecord>> {
        let contents = self.read().await?;
        Ok(contents
            .records
            .into_iter()
            .filter(|r| r.consumed_at >= since)
            .collect())
    }

    async fn fetch_deleted_ids(&self) -> Result<HashSet<Uuid>> {
        Ok(self.read().await?.deleted)
    }

    async fn record_dose(&self, record: &DoseRecord) -> Result<()> {
        self.append(LogEntry::Record(record.clone())).await?;
        tracing::debug!("Appended dose {} to health log", record.external_id);
        Ok(())
    }

    async fn delete_dose(&self, id: Uuid) -> Result<()> {
        self.append(LogEntry::Deleted { deleted_id: id }).await?;
        tracing::debug!("Marked dose {} deleted in health log", id);
        Ok(())
    }
}
