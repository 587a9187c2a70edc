/*!
Backup engine that ties the store, the record catalog and the history log
together.

The free functions [`encode`](crate::encoder::encode) and
[`restore`](crate::restorer::restore) do the actual work; the engine adds the
bookkeeping around them: one history entry per operation that got past its
fatal checks, and metrics when the `metrics` feature is enabled.
*/

use tracing::warn;

use crate::archive::Archive;
use crate::catalog::RecordCatalog;
use crate::config::VaultConfig;
use crate::encoder::{self, BackupOptions, BackupOutput};
use crate::history::{HistoryEntry, HistoryLog, JsonLinesHistory, NoHistory, OperationKind};
use crate::restorer::{self, RestoreOptions, RestoreReport};
use crate::stats::Statistics;
use crate::store::{DirectoryStore, KeyValueStore};
use crate::Result;

#[cfg(feature = "metrics")]
use crate::observability::VaultMetrics;

/// Main entry point for backups and restores
///
/// # Example
/// ```rust
/// use coachvault_core::{BackupEngine, BackupOptions, MemoryStore, RestoreOptions};
///
/// let engine = BackupEngine::new(MemoryStore::from_entries([("students", "[1, 2]")]));
/// let backup = engine.create_backup(&BackupOptions::new().with_note("weekly"))?;
///
/// let target = BackupEngine::new(MemoryStore::new());
/// let report = target.restore_backup(&backup.archive, &RestoreOptions::new())?;
/// assert_eq!(report.statistics.get("students"), Some(2));
/// # Ok::<(), coachvault_core::VaultError>(())
/// ```
pub struct BackupEngine<S, H = NoHistory>
where
    S: KeyValueStore,
    H: HistoryLog,
{
    store: S,
    history: H,
    catalog: RecordCatalog,
}

impl<S: KeyValueStore> BackupEngine<S, NoHistory> {
    /// Create an engine over `store` with the standard catalog and no history
    pub fn new(store: S) -> Self {
        Self {
            store,
            history: NoHistory,
            catalog: RecordCatalog::standard(),
        }
    }
}

impl<S, H> BackupEngine<S, H>
where
    S: KeyValueStore,
    H: HistoryLog,
{
    /// Replace the history sink
    pub fn with_history<H2: HistoryLog>(self, history: H2) -> BackupEngine<S, H2> {
        BackupEngine {
            store: self.store,
            history,
            catalog: self.catalog,
        }
    }

    /// Replace the record catalog
    pub fn with_catalog(mut self, catalog: RecordCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn catalog(&self) -> &RecordCatalog {
        &self.catalog
    }

    /// Snapshot the store into a new archive
    ///
    /// # Errors
    /// * `VaultError::Validation` - If the options are invalid
    /// * `VaultError::Encryption` / `VaultError::Compression` - If sealing fails
    ///
    /// Per-record read problems are reported in [`BackupOutput::failures`].
    pub fn create_backup(&self, options: &BackupOptions) -> Result<BackupOutput> {
        self.create_backup_with(options, |_| Ok(()))
    }

    /// Snapshot the store and hand the archive to `persist` before it counts
    ///
    /// The history entry is only appended once `persist` returns `Ok`, so a
    /// backup that never reached its destination leaves no trace in history.
    ///
    /// # Errors
    /// Everything [`create_backup`](Self::create_backup) returns, plus any
    /// error from `persist`.
    pub fn create_backup_with<F>(
        &self,
        options: &BackupOptions,
        persist: F,
    ) -> Result<BackupOutput>
    where
        F: FnOnce(&BackupOutput) -> Result<()>,
    {
        let output = encoder::encode(&self.store, &self.catalog, options)
            .and_then(|output| persist(&output).map(|()| output))
            .map_err(|e| {
                #[cfg(feature = "metrics")]
                VaultMetrics::global().record_fatal_error();
                e
            })?;

        #[cfg(feature = "metrics")]
        {
            let metrics = VaultMetrics::global();
            metrics.record_backup();
            metrics.record_record_failures(output.failures.len());
            if let Ok(text) = output.archive.to_json_string() {
                metrics.record_archive_size(text.len());
            }
        }

        let metadata = output.archive.metadata();
        let mut entry = HistoryEntry::new(
            OperationKind::Backup,
            output.outcome(),
            output.statistics.clone(),
        );
        entry.archive_id = metadata.archive_id.clone();
        entry.note = metadata.note.clone();
        entry.encrypted = metadata.encrypted;
        entry.compression = metadata.compression;
        entry.failed_records = output.failures.iter().map(|f| f.record.clone()).collect();
        self.record_history(&entry);

        Ok(output)
    }

    /// Restore `archive` into the store
    ///
    /// # Errors
    /// * `VaultError::ArchiveMalformed` - If the sealed document is unusable
    /// * `VaultError::Decryption` - On a missing or wrong passphrase
    /// * `VaultError::IntegrityCheckFailed` - If the sealed payload was altered
    ///
    /// Any error means the store was not touched.
    pub fn restore_backup(
        &self,
        archive: &Archive,
        options: &RestoreOptions,
    ) -> Result<RestoreReport> {
        let report =
            restorer::restore(&self.store, archive, &self.catalog, options).map_err(|e| {
                #[cfg(feature = "metrics")]
                VaultMetrics::global().record_fatal_error();
                e
            })?;

        #[cfg(feature = "metrics")]
        {
            let metrics = VaultMetrics::global();
            metrics.record_restore();
            metrics.record_record_failures(report.failures.len());
        }

        let metadata = archive.metadata();
        let mut entry = HistoryEntry::new(
            OperationKind::Restore,
            report.outcome(),
            report.statistics.clone(),
        );
        entry.archive_id = metadata.archive_id.clone();
        entry.note = metadata.note.clone();
        entry.encrypted = metadata.encrypted;
        entry.compression = metadata.compression;
        entry.failed_records = report.failures.iter().map(|f| f.record.clone()).collect();
        self.record_history(&entry);

        Ok(report)
    }

    /// Parse a serialized archive and restore it
    pub fn restore_payload(&self, payload: &str, options: &RestoreOptions) -> Result<RestoreReport> {
        let archive = Archive::parse(payload).map_err(|e| {
            #[cfg(feature = "metrics")]
            VaultMetrics::global().record_fatal_error();
            e
        })?;
        self.restore_backup(&archive, options)
    }

    /// Count what a restore would write, leaving the store and history alone
    pub fn preview(&self, archive: &Archive, options: &RestoreOptions) -> Result<Statistics> {
        restorer::preview(archive, &self.catalog, options)
    }

    fn record_history(&self, entry: &HistoryEntry) {
        if let Err(e) = self.history.append(entry) {
            warn!(operation = ?entry.kind, error = %e, "Failed to append history entry");
        }
    }
}

/// Create an engine backed by the directories named in `config`
///
/// # Example
/// ```rust,no_run
/// use coachvault_core::{create_engine_from_config, VaultConfig};
///
/// let config = VaultConfig::rooted_at("/var/lib/coachvault");
/// let engine = create_engine_from_config(&config)?;
/// # Ok::<(), coachvault_core::VaultError>(())
/// ```
pub fn create_engine_from_config(
    config: &VaultConfig,
) -> Result<BackupEngine<DirectoryStore, Option<JsonLinesHistory>>> {
    config.validate()?;

    let store = DirectoryStore::new(&config.store_dir);
    let history = config.history_path.as_ref().map(JsonLinesHistory::new);

    Ok(BackupEngine::new(store)
        .with_catalog(config.catalog()?)
        .with_history(history))
}
