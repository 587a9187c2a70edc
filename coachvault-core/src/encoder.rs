/*!
Snapshot encoder: reads every catalog record from the store and produces an
archive together with per-record statistics.
*/

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::catalog::RecordCatalog;
use crate::crypto::{KdfParams, Passphrase};
use crate::error::{RecordFailure, RecordFailureKind};
use crate::metadata::{ArchiveFormat, ArchiveMetadata, MAX_COMPRESSION};
use crate::stats::{entry_count, Outcome, Statistics};
use crate::store::KeyValueStore;
use crate::{Result, VaultError};

/// Options for a single backup
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub note: Option<String>,
    pub format: ArchiveFormat,
    /// Requested compression, 0 (none) to 100 (maximum)
    pub compression: u8,
    pub encrypted: bool,
    /// Required when `encrypted` is set
    pub passphrase: Option<Passphrase>,
    /// Key derivation cost used when encrypting
    pub kdf: KdfParams,
}

impl BackupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_compression(mut self, level: u8) -> Self {
        self.compression = level;
        self
    }

    /// Encrypt the archive under `passphrase`
    pub fn encrypted_with(mut self, passphrase: Passphrase) -> Self {
        self.encrypted = true;
        self.passphrase = Some(passphrase);
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.compression > MAX_COMPRESSION {
            return Err(VaultError::validation(format!(
                "compression level must be within 0-{MAX_COMPRESSION}, got {}",
                self.compression
            )));
        }
        if self.encrypted {
            if self.passphrase.is_none() {
                return Err(VaultError::validation(
                    "encrypted backups require a passphrase",
                ));
            }
            self.kdf.validate()?;
        }
        Ok(())
    }
}

/// Result of a successful encode
#[derive(Debug, Clone)]
pub struct BackupOutput {
    pub archive: Archive,
    pub statistics: Statistics,
    /// Records that could not be read or parsed; each counts as zero
    pub failures: Vec<RecordFailure>,
}

impl BackupOutput {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_failures(&self.failures)
    }
}

/// Read one record, degrading to `null` or the raw string instead of failing.
fn read_record<S>(store: &S, name: &str) -> (Value, usize, Option<RecordFailure>)
where
    S: KeyValueStore + ?Sized,
{
    let raw = match store.get(name) {
        Ok(Some(raw)) => raw,
        Ok(None) => return (Value::Null, 0, None),
        Err(e) => {
            warn!(record = name, error = %e, "Failed to read record, backing it up as null");
            let failure = RecordFailure::new(name, RecordFailureKind::Read, e.to_string());
            return (Value::Null, 0, Some(failure));
        }
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => {
            let count = entry_count(&value);
            (value, count, None)
        }
        Err(e) => {
            warn!(record = name, error = %e, "Stored record is not valid JSON, keeping raw text");
            let failure = RecordFailure::new(name, RecordFailureKind::Parse, e.to_string());
            (Value::String(raw), 0, Some(failure))
        }
    }
}

/// Snapshot every catalog record into a new archive.
///
/// Each record is read exactly once, in catalog order. Unreadable or
/// unparseable records never abort the backup; they are reported in
/// [`BackupOutput::failures`] with a zero count. Invalid options or a sealing
/// failure return an error and no archive.
pub fn encode<S>(store: &S, catalog: &RecordCatalog, options: &BackupOptions) -> Result<BackupOutput>
where
    S: KeyValueStore + ?Sized,
{
    options.validate()?;
    info!(
        records = catalog.len(),
        compression = options.compression,
        encrypted = options.encrypted,
        "Creating backup"
    );

    let mut sections = Map::with_capacity(catalog.len());
    let mut statistics = Statistics::new();
    let mut failures = Vec::new();

    for name in catalog.iter() {
        let (value, count, failure) = read_record(store, name);
        debug!(record = name, count, "Record captured");

        sections.insert(name.to_string(), value);
        statistics.record(name, count);
        failures.extend(failure);
    }

    let metadata = ArchiveMetadata::new(options.format, options.compression, options.encrypted)
        .with_note(options.note.clone())
        .with_catalog_version(catalog.version());
    let archive = Archive::build(metadata, sections, options.passphrase.as_ref(), &options.kdf)?;

    info!(
        entries = statistics.total(),
        failed = failures.len(),
        sealed = archive.is_sealed(),
        "Backup created"
    );

    Ok(BackupOutput {
        archive,
        statistics,
        failures,
    })
}
