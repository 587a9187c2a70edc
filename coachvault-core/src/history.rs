/*!
Append-only backup history.

The engine writes one [`HistoryEntry`] after every backup or restore that did
not fail fatally. It never reads the log back; listing entries is left to
tooling such as the CLI.
*/

use crate::stats::{Outcome, Statistics};
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Backup,
    Restore,
}

/// One line of backup history
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub kind: OperationKind,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub archive_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub encrypted: bool,
    pub compression: u8,
    pub outcome: Outcome,
    pub statistics: Statistics,
    /// Records that failed, by name
    #[serde(default)]
    pub failed_records: Vec<String>,
}

impl HistoryEntry {
    pub fn new(kind: OperationKind, outcome: Outcome, statistics: Statistics) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            at: Utc::now(),
            archive_id: None,
            note: None,
            encrypted: false,
            compression: 0,
            outcome,
            statistics,
            failed_records: Vec::new(),
        }
    }
}

/// Append-only sink for history entries
pub trait HistoryLog {
    fn append(&self, entry: &HistoryEntry) -> Result<()>;
}

impl<H: HistoryLog + ?Sized> HistoryLog for &H {
    fn append(&self, entry: &HistoryEntry) -> Result<()> {
        (**self).append(entry)
    }
}

/// `None` behaves like [`NoHistory`]
impl<H: HistoryLog> HistoryLog for Option<H> {
    fn append(&self, entry: &HistoryEntry) -> Result<()> {
        match self {
            Some(log) => log.append(entry),
            None => Ok(()),
        }
    }
}

/// History sink that drops every entry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl HistoryLog for NoHistory {
    fn append(&self, _entry: &HistoryEntry) -> Result<()> {
        Ok(())
    }
}

/// In-memory history, mostly useful in tests and embedding hosts
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl HistoryLog for MemoryHistory {
    fn append(&self, entry: &HistoryEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| VaultError::store("history lock poisoned"))?
            .push(entry.clone());
        Ok(())
    }
}

/// History kept as one JSON object per line in a file
#[derive(Debug, Clone)]
pub struct JsonLinesHistory {
    path: PathBuf,
}

impl JsonLinesHistory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry in file order. A missing file is an empty history.
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

impl HistoryLog for JsonLinesHistory {
    fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                VaultError::store(format!(
                    "Failed to open history log {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
