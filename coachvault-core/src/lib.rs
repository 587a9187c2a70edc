/*!
# CoachVault Core

Backup and restore engine for a trainer dashboard's records.

A backup snapshots a fixed, versioned catalog of named records (students,
exercises, meal plans, the trainer profile and so on) from a key-value store
into a single self-describing JSON archive. A restore validates the archive,
decrypts it when needed, and writes each record back, reporting per-record
entry counts either way.

- Archives are plain JSON objects with a `metadata` object. When compression or
  encryption is requested, the record sections are gzip-compressed and sealed
  with AES-256-GCM under an Argon2id-derived key.
- Fatal problems (malformed archive, wrong passphrase, tampered payload) abort
  before the first write. Per-record problems are reported and counted as
  zero while the rest of the operation carries on.
- The store and the history log are ports ([`KeyValueStore`], [`HistoryLog`])
  with in-memory and filesystem adapters.

## Usage

```rust
use coachvault_core::{BackupEngine, BackupOptions, MemoryStore, Passphrase, RestoreOptions};

let source = BackupEngine::new(MemoryStore::from_entries([
    ("students", r#"[{"name": "A"}, {"name": "B"}, {"name": "C"}]"#),
    ("trainerProfile", r#"{"name": "X"}"#),
]));

let passphrase = Passphrase::new("correct horse")?;
let backup = source.create_backup(
    &BackupOptions::new()
        .with_note("end of season")
        .with_compression(60)
        .encrypted_with(passphrase.clone()),
)?;
assert_eq!(backup.statistics.get("students"), Some(3));

let target = BackupEngine::new(MemoryStore::new());
let report = target.restore_backup(
    &backup.archive,
    &RestoreOptions::new().with_passphrase(passphrase),
)?;
assert_eq!(report.statistics.get("trainerProfile"), Some(1));
# Ok::<(), coachvault_core::VaultError>(())
```
*/

pub mod archive;
pub mod catalog;
pub mod compression;
pub mod config;
pub mod crypto;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod history;
pub mod metadata;
pub mod observability;
pub mod restorer;
pub mod stats;
pub mod store;
pub mod transport;

pub use archive::{validate, Archive, ValidationReport};
pub use catalog::{RecordCatalog, CATALOG_VERSION};
pub use compression::{CompressionAdapter, GzipCompressor, NoCompression};
pub use config::{CatalogConfig, VaultConfig};
pub use crypto::{KdfParams, Passphrase};
pub use encoder::{encode, BackupOptions, BackupOutput};
pub use engine::{create_engine_from_config, BackupEngine};
pub use error::{RecordFailure, RecordFailureKind, Result, VaultError};
pub use history::{
    HistoryEntry, HistoryLog, JsonLinesHistory, MemoryHistory, NoHistory, OperationKind,
};
pub use metadata::{ArchiveFormat, ArchiveMetadata, ARCHIVE_FORMAT_VERSION};
pub use observability::{init_observability, init_observability_with};
#[cfg(feature = "metrics")]
pub use observability::VaultMetrics;
pub use restorer::{preview, restore, RestoreOptions, RestoreReport};
pub use stats::{Outcome, Statistics};
pub use store::{DirectoryStore, KeyValueStore, MemoryStore};
pub use transport::{list_archives, ArchiveFile, ArchiveListing};
