/*!
Error types for the CoachVault core engine.

Only fatal conditions are represented here. Per-record problems that the
encoder and restorer recover from are reported as [`RecordFailure`] values
alongside the statistics and never surface as an `Err`.
*/

use serde::Serialize;
use thiserror::Error;

/// Result type used throughout the CoachVault core.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that abort a backup or restore operation.
#[derive(Error, Debug)]
pub enum VaultError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is not structurally an archive
    #[error("Malformed archive: {0}")]
    ArchiveMalformed(String),

    /// Wrong passphrase, corrupted ciphertext or missing key material
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Sealing the archive payload failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Sealed payload does not hash to the recorded digest
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Key-value store or transport errors
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid record catalog
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Invalid configuration file or values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller-supplied options
    #[error("Validation error: {0}")]
    Validation(String),
}

impl VaultError {
    /// Create a new malformed archive error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::ArchiveMalformed(msg.into())
    }

    /// Create a new decryption error
    pub fn decryption<S: Into<String>>(msg: S) -> Self {
        Self::Decryption(msg.into())
    }

    /// Create a new encryption error
    pub fn encryption<S: Into<String>>(msg: S) -> Self {
        Self::Encryption(msg.into())
    }

    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new catalog error
    pub fn catalog<S: Into<String>>(msg: S) -> Self {
        Self::Catalog(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// True when the caller supplied something unusable (bad archive, wrong
    /// passphrase, bad options) as opposed to an environment failure.
    ///
    /// `Compression` counts as input: the codecs work on in-memory buffers,
    /// so a failure means a corrupt sealed payload.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::ArchiveMalformed(_)
                | Self::Decryption(_)
                | Self::Compression(_)
                | Self::IntegrityCheckFailed { .. }
                | Self::Validation(_)
        )
    }
}

/// Which step of a per-record operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFailureKind {
    /// The store could not be read for this record
    Read,
    /// The stored value was not valid JSON and was kept as a raw string
    Parse,
    /// The store rejected the restored value
    Write,
}

/// A recoverable, per-record failure folded into the operation's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub record: String,
    pub kind: RecordFailureKind,
    pub message: String,
}

impl RecordFailure {
    pub fn new<R: Into<String>, M: Into<String>>(
        record: R,
        kind: RecordFailureKind,
        message: M,
    ) -> Self {
        Self {
            record: record.into(),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let step = match self.kind {
            RecordFailureKind::Read => "read",
            RecordFailureKind::Parse => "parse",
            RecordFailureKind::Write => "write",
        };
        write!(f, "{} ({step}): {}", self.record, self.message)
    }
}
