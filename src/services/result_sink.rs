// Result Storage
// Persists one record per checked submission

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::StoredRecord;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Storage lock poisoned")]
    Poisoned,
}

pub trait ResultSink: Send + Sync {
    /// Store the record and return its document id
    fn store(&self, record: StoredRecord) -> Result<String, SinkError>;
}

/// Fill in id and timestamp when the caller left them blank
fn stamp(mut record: StoredRecord) -> StoredRecord {
    if record.id.is_empty() {
        record.id = Uuid::new_v4().to_string();
    }
    if record.timestamp.is_empty() {
        record.timestamp = chrono::Utc::now().to_rfc3339();
    }
    record
}

/// Appends JSON lines to `<dir>/results.jsonl`
pub struct JsonlResultSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlResultSink {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("results.jsonl"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored record, oldest first; malformed lines are skipped
    pub fn load_all(&self) -> Result<Vec<StoredRecord>, SinkError> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let file = fs::File::open(&self.path)?;
        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredRecord>(&line) {
                Ok(r) => records.push(r),
                Err(e) => warn!("[STORAGE] Skipping malformed line {}: {}", i + 1, e),
            }
        }
        Ok(records)
    }
}

impl ResultSink for JsonlResultSink {
    fn store(&self, record: StoredRecord) -> Result<String, SinkError> {
        let record = stamp(record);
        let line = serde_json::to_string(&record)?;

        let _guard = self.write_lock.lock().map_err(|_| SinkError::Poisoned)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;

        debug!("[STORAGE] Stored {} in {}", record.id, self.path.display());
        Ok(record.id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryResultSink {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryResultSink {
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ResultSink for MemoryResultSink {
    fn store(&self, record: StoredRecord) -> Result<String, SinkError> {
        let record = stamp(record);
        let id = record.id.clone();
        self.records.lock().map_err(|_| SinkError::Poisoned)?.push(record);
        Ok(id)
    }
}
