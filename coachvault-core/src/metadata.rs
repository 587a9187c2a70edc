/*!
Archive metadata and the closed set of archive formats.
*/

use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Current archive layout version. Archives without a version are treated as
/// version 0 and remain readable.
pub const ARCHIVE_FORMAT_VERSION: u8 = 1;

/// Highest accepted `compression` value.
pub const MAX_COMPRESSION: u8 = 100;

/// Archive format identifier, doubling as the file extension.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Plain JSON document
    #[default]
    Json,
    /// Same document under the `.bak` extension
    Bak,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Bak => "bak",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "bak" => Some(Self::Bak),
            _ => None,
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s)
            .ok_or_else(|| VaultError::validation(format!("unknown archive format '{s}'")))
    }
}

/// How the record sections are carried inside the archive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// One top-level key per record
    #[default]
    Inline,
    /// Sections packed into a base64 `payload` string, compressed and/or encrypted
    Sealed,
}

/// Key derivation and cipher parameters of an encrypted archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CipherParams {
    /// AEAD cipher, currently always `aes-256-gcm`
    pub algorithm: String,
    /// Passphrase KDF, currently always `argon2id`
    pub kdf: String,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    /// Base64 KDF salt
    pub salt: String,
    /// Base64 AEAD nonce
    pub nonce: String,
}

/// Metadata carried by every archive under the `metadata` key.
///
/// Only the fields the dashboard has always written (`createdAt`, `note`,
/// `format`, `compression`, `encrypted`) are part of the original contract;
/// everything else is optional on input so older archives still parse.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    /// When the archive was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Optional human-readable note
    #[serde(default)]
    pub note: Option<String>,

    #[serde(default)]
    pub format: ArchiveFormat,

    /// Requested compression level, 0 to 100
    #[serde(default)]
    pub compression: u8,

    #[serde(default)]
    pub encrypted: bool,

    #[serde(default)]
    pub format_version: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,

    /// Version of the record catalog used by the encoder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_version: Option<u32>,

    #[serde(default)]
    pub encoding: PayloadEncoding,

    /// SHA-256 of the inner document of a sealed archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher: Option<CipherParams>,
}

impl ArchiveMetadata {
    /// Create metadata for a new archive stamped with the current time.
    pub fn new(format: ArchiveFormat, compression: u8, encrypted: bool) -> Self {
        Self {
            created_at: Some(Utc::now()),
            note: None,
            format,
            compression,
            encrypted,
            format_version: ARCHIVE_FORMAT_VERSION,
            archive_id: Some(Uuid::new_v4().to_string()),
            catalog_version: None,
            encoding: PayloadEncoding::Inline,
            content_hash: None,
            cipher: None,
        }
    }

    /// Set the optional note; blank notes are dropped.
    pub fn with_note<S: Into<String>>(mut self, note: Option<S>) -> Self {
        self.note = note.map(Into::into).filter(|n| !n.trim().is_empty());
        self
    }

    pub fn with_catalog_version(mut self, version: u32) -> Self {
        self.catalog_version = Some(version);
        self
    }

    /// Whether the sections travel in a sealed `payload`.
    pub fn is_sealed(&self) -> bool {
        self.encoding == PayloadEncoding::Sealed
    }

    /// Compute SHA-256 hash of the provided data as lowercase hex
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Verify unsealed inner bytes against `content_hash`, when one was recorded.
    pub fn verify_integrity(&self, inner: &[u8]) -> Result<()> {
        let Some(expected) = &self.content_hash else {
            return Ok(());
        };
        let actual = Self::compute_hash(inner);
        if &actual == expected {
            Ok(())
        } else {
            Err(VaultError::IntegrityCheckFailed {
                expected: expected.clone(),
                actual,
            })
        }
    }

    /// Fields an encrypted archive authenticates alongside its ciphertext.
    ///
    /// Covers everything fixed when the archive was written, but not the
    /// cipher parameters (authenticated separately), `encoding` or
    /// `contentHash`.
    pub fn authenticated_header(&self) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Header<'a> {
            archive_id: Option<&'a str>,
            created_at: Option<&'a DateTime<Utc>>,
            note: Option<&'a str>,
            format: ArchiveFormat,
            compression: u8,
            encrypted: bool,
            format_version: u8,
            catalog_version: Option<u32>,
        }

        Ok(serde_json::to_vec(&Header {
            archive_id: self.archive_id.as_deref(),
            created_at: self.created_at.as_ref(),
            note: self.note.as_deref(),
            format: self.format,
            compression: self.compression,
            encrypted: self.encrypted,
            format_version: self.format_version,
            catalog_version: self.catalog_version,
        })?)
    }

    /// Check if this metadata is compatible with the current format version
    pub fn is_compatible(&self) -> bool {
        self.format_version <= ARCHIVE_FORMAT_VERSION
    }

    /// Structural checks shared by the validator and the encoder.
    pub fn validate(&self) -> Result<()> {
        if self.compression > MAX_COMPRESSION {
            return Err(VaultError::malformed(format!(
                "compression level {} is outside 0-{MAX_COMPRESSION}",
                self.compression
            )));
        }
        if !self.is_compatible() {
            return Err(VaultError::malformed(format!(
                "unsupported archive format version: {} (current: {ARCHIVE_FORMAT_VERSION})",
                self.format_version
            )));
        }
        if self.encrypted && self.is_sealed() && self.cipher.is_none() {
            return Err(VaultError::malformed(
                "encrypted archive is missing its cipher parameters",
            ));
        }
        Ok(())
    }

    /// Suggested file name: `backup_<YYYYmmdd_HHMMSS>.<extension>`
    pub fn suggested_filename(&self) -> String {
        let timestamp = self.created_at.unwrap_or_else(Utc::now).format("%Y%m%d_%H%M%S");
        format!("backup_{timestamp}.{}", self.format.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_metadata_creation() {
        let metadata = ArchiveMetadata::new(ArchiveFormat::Json, 0, false);
        assert_eq!(metadata.format_version, ARCHIVE_FORMAT_VERSION);
        assert_eq!(metadata.encoding, PayloadEncoding::Inline);
        assert!(metadata.created_at.is_some());
        assert!(!metadata.archive_id.as_deref().unwrap_or_default().is_empty());
    }

    #[test]
    fn test_blank_note_is_dropped() {
        let metadata = ArchiveMetadata::new(ArchiveFormat::Json, 0, false).with_note(Some("  "));
        assert_eq!(metadata.note, None);

        let metadata =
            ArchiveMetadata::new(ArchiveFormat::Json, 0, false).with_note(Some("before season"));
        assert_eq!(metadata.note.as_deref(), Some("before season"));
    }

    #[test]
    fn test_content_hash() {
        let hash = ArchiveMetadata::compute_hash(b"test data");
        assert_eq!(
            hash,
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[test]
    fn test_integrity_verification() {
        let mut metadata = ArchiveMetadata::new(ArchiveFormat::Json, 50, false);
        assert!(metadata.verify_integrity(b"anything").is_ok());

        metadata.content_hash = Some(ArchiveMetadata::compute_hash(b"inner"));
        assert!(metadata.verify_integrity(b"inner").is_ok());
        assert!(matches!(
            metadata.verify_integrity(b"tampered"),
            Err(VaultError::IntegrityCheckFailed { .. })
        ));
    }

    #[test]
    fn test_dashboard_metadata_parses() {
        let metadata: ArchiveMetadata = serde_json::from_value(serde_json::json!({
            "createdAt": "2024-03-01T10:15:00.000Z",
            "note": "monthly",
            "format": "json",
            "compression": 6,
            "encrypted": false
        }))
        .unwrap();

        assert_eq!(metadata.format_version, 0);
        assert!(metadata.is_compatible());
        assert_eq!(metadata.encoding, PayloadEncoding::Inline);
        assert_eq!(metadata.compression, 6);
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn test_empty_metadata_parses_with_defaults() {
        let metadata: ArchiveMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(metadata.format, ArchiveFormat::Json);
        assert!(!metadata.encrypted);
        assert!(metadata.created_at.is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut metadata = ArchiveMetadata::new(ArchiveFormat::Json, 101, false);
        assert!(matches!(
            metadata.validate(),
            Err(VaultError::ArchiveMalformed(_))
        ));

        metadata.compression = 10;
        metadata.format_version = ARCHIVE_FORMAT_VERSION + 1;
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_suggested_filename() {
        let mut metadata = ArchiveMetadata::new(ArchiveFormat::Bak, 0, false);
        metadata.created_at = Some(Utc.with_ymd_and_hms(2026, 10, 15, 8, 30, 5).unwrap());

        assert_eq!(metadata.suggested_filename(), "backup_20261015_083005.bak");
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Json);
        assert_eq!("bak".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Bak);
        assert!("zip".parse::<ArchiveFormat>().is_err());
    }
}
