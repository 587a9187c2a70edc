/*!
Snapshot decoder and restorer: replays an archive's records into the store.

Fatal problems (malformed archive, failed decryption, integrity mismatch)
surface before the first write. After that, each record is written on its own;
a rejected write is reported and counted as zero while the remaining records
are still restored.
*/

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::catalog::RecordCatalog;
use crate::crypto::Passphrase;
use crate::error::{RecordFailure, RecordFailureKind};
use crate::stats::{entry_count, Outcome, Statistics};
use crate::store::KeyValueStore;
use crate::{Result, VaultError};

/// Options for a single restore
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Needed for encrypted archives
    pub passphrase: Option<Passphrase>,
    /// Refuse archives that are not encrypted
    pub require_encrypted: bool,
}

impl RestoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passphrase(mut self, passphrase: Passphrase) -> Self {
        self.passphrase = Some(passphrase);
        self
    }

    pub fn require_encrypted(mut self) -> Self {
        self.require_encrypted = true;
        self
    }
}

/// Result of a restore that got past validation and decryption
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub statistics: Statistics,
    /// Records whose write was rejected; each counts as zero
    pub failures: Vec<RecordFailure>,
    /// Archive keys outside the catalog, left untouched
    pub ignored: Vec<String>,
}

impl RestoreReport {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_failures(&self.failures)
    }

    /// Number of records that landed with at least one entry
    pub fn restored_records(&self) -> usize {
        self.statistics.populated()
    }
}

fn open_sections<'a>(
    archive: &'a Archive,
    options: &RestoreOptions,
) -> Result<std::borrow::Cow<'a, Map<String, Value>>> {
    if options.require_encrypted && !archive.metadata().encrypted {
        return Err(VaultError::validation(
            "archive is not encrypted but an encrypted archive was required",
        ));
    }
    archive.sections(options.passphrase.as_ref())
}

fn ignored_keys(sections: &Map<String, Value>, catalog: &RecordCatalog) -> Vec<String> {
    sections
        .keys()
        .filter(|key| !catalog.contains(key))
        .cloned()
        .collect()
}

/// Count what restoring `archive` would write, without touching any store.
pub fn preview(
    archive: &Archive,
    catalog: &RecordCatalog,
    options: &RestoreOptions,
) -> Result<Statistics> {
    let sections = open_sections(archive, options)?;
    let mut statistics = Statistics::new();
    for name in catalog.iter() {
        statistics.record(name, sections.get(name).map(entry_count).unwrap_or(0));
    }
    Ok(statistics)
}

/// Restore every catalog record present in `archive` into `store`.
///
/// Records that are `null` or missing in the archive are not written, so the
/// store keeps whatever it held for them. `notify_changed` is called once
/// after the last write.
pub fn restore<S>(
    store: &S,
    archive: &Archive,
    catalog: &RecordCatalog,
    options: &RestoreOptions,
) -> Result<RestoreReport>
where
    S: KeyValueStore + ?Sized,
{
    let sections = open_sections(archive, options)?;
    info!(
        records = catalog.len(),
        encrypted = archive.metadata().encrypted,
        "Restoring backup"
    );

    let mut statistics = Statistics::new();
    let mut failures = Vec::new();

    for name in catalog.iter() {
        let value = match sections.get(name) {
            None | Some(Value::Null) => {
                debug!(record = name, "Nothing to restore");
                statistics.record(name, 0);
                continue;
            }
            Some(value) => value,
        };

        let written = serde_json::to_string(value)
            .map_err(VaultError::from)
            .and_then(|text| store.set(name, &text));

        match written {
            Ok(()) => {
                let count = entry_count(value);
                debug!(record = name, count, "Record restored");
                statistics.record(name, count);
            }
            Err(e) => {
                warn!(record = name, error = %e, "Failed to restore record");
                failures.push(RecordFailure::new(name, RecordFailureKind::Write, e.to_string()));
                statistics.record(name, 0);
            }
        }
    }

    let ignored = ignored_keys(&sections, catalog);
    if !ignored.is_empty() {
        debug!(keys = ?ignored, "Ignoring archive keys outside the catalog");
    }

    store.notify_changed();

    info!(
        entries = statistics.total(),
        failed = failures.len(),
        "Restore finished"
    );

    Ok(RestoreReport {
        statistics,
        failures,
        ignored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::fast_kdf;
    use crate::encoder::{encode, BackupOptions};
    use crate::store::{MemoryStore, MockStore};
    use mockall::Sequence;

    fn archive(payload: &str) -> Archive {
        Archive::parse(payload).unwrap()
    }

    #[test]
    fn test_restores_present_records_only() {
        let store = MemoryStore::from_entries([("foods", r#"["rice"]"#)]);
        let archive = archive(
            r#"{"metadata": {}, "students": [{"name": "A"}], "foods": null, "trainerProfile": {"name": "X"}}"#,
        );

        let report = restore(&store, &archive, &RecordCatalog::standard(), &RestoreOptions::new()).unwrap();

        assert_eq!(report.statistics.get("students"), Some(1));
        assert_eq!(report.statistics.get("trainerProfile"), Some(1));
        assert_eq!(report.statistics.get("foods"), Some(0));
        assert_eq!(report.statistics.len(), RecordCatalog::standard().len());
        assert_eq!(report.outcome(), Outcome::Complete);

        // null sections leave the existing value alone
        assert_eq!(store.get("foods").unwrap().as_deref(), Some(r#"["rice"]"#));
        assert_eq!(store.notifications(), 1);
    }

    #[test]
    fn test_write_failure_is_partial_and_continues() {
        let mut store = MockStore::new();
        store
            .expect_set()
            .withf(|key, _| key == "students")
            .times(1)
            .returning(|_, _| Err(VaultError::store("quota exceeded")));
        store
            .expect_set()
            .withf(|key, _| key == "trainerProfile")
            .times(1)
            .returning(|_, _| Ok(()));
        store.expect_notify_changed().times(1).return_const(());

        let archive = archive(
            r#"{"metadata": {}, "students": [1, 2], "trainerProfile": {"name": "X"}}"#,
        );
        let report = restore(&store, &archive, &RecordCatalog::standard(), &RestoreOptions::new()).unwrap();

        assert_eq!(report.outcome(), Outcome::Partial);
        assert_eq!(report.statistics.get("students"), Some(0));
        assert_eq!(report.statistics.get("trainerProfile"), Some(1));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].record, "students");
        assert_eq!(report.failures[0].kind, RecordFailureKind::Write);
    }

    #[test]
    fn test_writes_each_record_once_in_catalog_order() {
        let catalog = RecordCatalog::standard();
        let names: Vec<String> = catalog.iter().map(str::to_string).collect();

        // Archive sections deliberately listed in reverse.
        let mut document = serde_json::Map::new();
        document.insert("metadata".to_string(), serde_json::json!({}));
        for name in names.iter().rev() {
            document.insert(name.clone(), serde_json::json!([1]));
        }
        let archive = archive(&serde_json::Value::Object(document).to_string());

        let mut store = MockStore::new();
        let mut seq = Sequence::new();
        for name in names.clone() {
            store
                .expect_set()
                .withf(move |key, value| key == name && value == "[1]")
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(()));
        }
        store
            .expect_notify_changed()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        store.expect_get().never();

        let report = restore(&store, &archive, &catalog, &RestoreOptions::new()).unwrap();
        assert_eq!(report.restored_records(), names.len());
    }

    #[test]
    fn test_notifies_once_even_when_nothing_written() {
        let mut store = MockStore::new();
        store.expect_set().never();
        store.expect_notify_changed().times(1).return_const(());

        let report = restore(
            &store,
            &archive(r#"{"metadata": {}}"#),
            &RecordCatalog::standard(),
            &RestoreOptions::new(),
        )
        .unwrap();
        assert_eq!(report.statistics.total(), 0);
    }

    #[test]
    fn test_wrong_passphrase_performs_no_writes() {
        let source = MemoryStore::from_entries([("students", "[1,2,3]")]);
        let options = BackupOptions::new()
            .encrypted_with(Passphrase::new("right").unwrap())
            .with_kdf(fast_kdf());
        let output = encode(&source, &RecordCatalog::standard(), &options).unwrap();

        let mut target = MockStore::new();
        target.expect_set().never();
        target.expect_notify_changed().never();

        let result = restore(
            &target,
            &output.archive,
            &RecordCatalog::standard(),
            &RestoreOptions::new().with_passphrase(Passphrase::new("wrong").unwrap()),
        );
        assert!(matches!(result, Err(VaultError::Decryption(_))));
    }

    #[test]
    fn test_require_encrypted_rejects_plain_archive() {
        let store = MemoryStore::new();
        let result = restore(
            &store,
            &archive(r#"{"metadata": {}, "students": [1]}"#),
            &RecordCatalog::standard(),
            &RestoreOptions::new().require_encrypted(),
        );

        assert!(matches!(result, Err(VaultError::Validation(_))));
        assert!(store.snapshot().unwrap().is_empty());
        assert_eq!(store.notifications(), 0);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let store = MemoryStore::new();
        let report = restore(
            &store,
            &archive(r#"{"metadata": {}, "students": [1], "clubLeaderboard": [1, 2]}"#),
            &RecordCatalog::standard(),
            &RestoreOptions::new(),
        )
        .unwrap();

        assert_eq!(report.ignored, vec!["clubLeaderboard".to_string()]);
        assert_eq!(store.get("clubLeaderboard").unwrap(), None);
        assert_eq!(report.statistics.get("clubLeaderboard"), None);
    }

    #[test]
    fn test_preview_counts_without_writing() {
        let archive = archive(r#"{"metadata": {}, "students": [1, 2], "reports": {"week": 1}}"#);
        let stats = preview(&archive, &RecordCatalog::standard(), &RestoreOptions::new()).unwrap();

        assert_eq!(stats.get("students"), Some(2));
        assert_eq!(stats.get("reports"), Some(1));
        assert_eq!(stats.get("foods"), Some(0));
    }
}
