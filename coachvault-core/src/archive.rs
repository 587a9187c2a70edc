/*!
The archive document: structure, validation and sealing.

An archive is an open JSON object with a `metadata` object and the record
sections. Inline archives carry one top-level key per record. Sealed archives
carry the sections as a single inner JSON document, gzip-compressed when
`compression > 0` and AES-256-GCM encrypted when `encrypted`, base64-encoded
under `payload`.
*/

use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::compression::compressor_for_level;
use crate::crypto::{self, KdfParams, Passphrase};
use crate::metadata::{ArchiveMetadata, PayloadEncoding};
use crate::{Result, VaultError};

pub const METADATA_KEY: &str = "metadata";
pub const PAYLOAD_KEY: &str = "payload";

#[derive(Debug, Clone, PartialEq)]
enum ArchiveBody {
    Inline(Map<String, Value>),
    Sealed(String),
}

/// A parsed or freshly encoded archive. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Archive {
    metadata: ArchiveMetadata,
    body: ArchiveBody,
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ValidationReport {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn rejected(reason: String) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Check whether `payload` is structurally an archive, without decrypting it
/// or looking at individual record shapes.
///
/// Missing catalog entries are fine; a missing or non-object `metadata`, a
/// non-object payload, ill-typed metadata fields, and a sealed archive without
/// a `payload` string are not.
pub fn validate(payload: &str) -> ValidationReport {
    match Archive::parse(payload) {
        Ok(_) => ValidationReport::ok(),
        Err(VaultError::ArchiveMalformed(reason)) => ValidationReport::rejected(reason),
        Err(other) => ValidationReport::rejected(other.to_string()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Archive {
    /// Parse and validate a serialized archive.
    pub fn parse(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| VaultError::malformed(format!("payload is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON value as an archive.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(VaultError::malformed(format!(
                    "payload must be a JSON object, found {}",
                    kind_of(&other)
                )))
            }
        };

        let metadata_value = map
            .remove(METADATA_KEY)
            .ok_or_else(|| VaultError::malformed("missing metadata"))?;
        if !metadata_value.is_object() {
            return Err(VaultError::malformed(format!(
                "metadata must be an object, found {}",
                kind_of(&metadata_value)
            )));
        }
        let metadata: ArchiveMetadata = serde_json::from_value(metadata_value)
            .map_err(|e| VaultError::malformed(format!("invalid metadata: {e}")))?;
        metadata.validate()?;

        let body = match metadata.encoding {
            PayloadEncoding::Inline => ArchiveBody::Inline(map),
            PayloadEncoding::Sealed => match map.remove(PAYLOAD_KEY) {
                Some(Value::String(payload)) => ArchiveBody::Sealed(payload),
                Some(other) => {
                    return Err(VaultError::malformed(format!(
                        "sealed payload must be a string, found {}",
                        kind_of(&other)
                    )))
                }
                None => return Err(VaultError::malformed("sealed archive has no payload")),
            },
        };

        Ok(Self { metadata, body })
    }

    /// Build an archive from record sections, sealing them when the metadata
    /// asks for compression or encryption.
    pub(crate) fn build(
        mut metadata: ArchiveMetadata,
        sections: Map<String, Value>,
        passphrase: Option<&Passphrase>,
        kdf: &KdfParams,
    ) -> Result<Self> {
        if metadata.compression == 0 && !metadata.encrypted {
            metadata.encoding = PayloadEncoding::Inline;
            return Ok(Self {
                metadata,
                body: ArchiveBody::Inline(sections),
            });
        }

        let inner = serde_json::to_vec(&sections)?;
        let mut bytes = compressor_for_level(metadata.compression).compress(&inner)?;

        if metadata.encrypted {
            let passphrase = passphrase
                .ok_or_else(|| VaultError::validation("encryption requires a passphrase"))?;
            let header = metadata.authenticated_header()?;
            let (ciphertext, cipher) = crypto::seal(&bytes, &header, passphrase, kdf)?;
            bytes = ciphertext;
            metadata.cipher = Some(cipher);
            // Encrypted archives carry no plaintext digest.
            metadata.content_hash = None;
        } else {
            metadata.content_hash = Some(ArchiveMetadata::compute_hash(&inner));
        }

        metadata.encoding = PayloadEncoding::Sealed;
        Ok(Self {
            metadata,
            body: ArchiveBody::Sealed(STANDARD.encode(bytes)),
        })
    }

    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.body, ArchiveBody::Sealed(_))
    }

    /// Record sections of the archive, unsealing them if needed.
    ///
    /// Fails with [`VaultError::Decryption`] when the archive is encrypted and
    /// the passphrase is missing or wrong, and never yields partial sections.
    pub fn sections(&self, passphrase: Option<&Passphrase>) -> Result<Cow<'_, Map<String, Value>>> {
        let payload = match &self.body {
            ArchiveBody::Inline(sections) => {
                if self.metadata.encrypted {
                    return Err(VaultError::decryption(
                        "archive is flagged as encrypted but carries no ciphertext",
                    ));
                }
                return Ok(Cow::Borrowed(sections));
            }
            ArchiveBody::Sealed(payload) => payload,
        };

        let mut bytes = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| VaultError::malformed(format!("payload is not valid base64: {e}")))?;

        if self.metadata.encrypted {
            let passphrase = passphrase
                .ok_or_else(|| VaultError::decryption("archive is encrypted; a passphrase is required"))?;
            let cipher = self
                .metadata
                .cipher
                .as_ref()
                .ok_or_else(|| VaultError::decryption("archive has no cipher parameters"))?;
            let header = self
                .metadata
                .authenticated_header()
                .map_err(|e| VaultError::decryption(e.to_string()))?;
            bytes = crypto::open(&bytes, &header, passphrase, cipher)?;
        }

        let inner = compressor_for_level(self.metadata.compression).decompress(&bytes)?;
        self.metadata.verify_integrity(&inner)?;

        match serde_json::from_slice::<Value>(&inner) {
            Ok(Value::Object(sections)) => Ok(Cow::Owned(sections)),
            Ok(other) => Err(VaultError::malformed(format!(
                "sealed sections must be a JSON object, found {}",
                kind_of(&other)
            ))),
            Err(e) => Err(VaultError::malformed(format!(
                "sealed sections are not valid JSON: {e}"
            ))),
        }
    }

    /// The archive as a JSON value, `metadata` first.
    pub fn to_value(&self) -> Result<Value> {
        let mut map = Map::new();
        map.insert(METADATA_KEY.to_string(), serde_json::to_value(&self.metadata)?);
        match &self.body {
            ArchiveBody::Inline(sections) => {
                for (name, value) in sections {
                    map.insert(name.clone(), value.clone());
                }
            }
            ArchiveBody::Sealed(payload) => {
                map.insert(PAYLOAD_KEY.to_string(), Value::String(payload.clone()));
            }
        }
        Ok(Value::Object(map))
    }

    /// Pretty-printed JSON text of the archive.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::fast_kdf;
    use crate::metadata::ArchiveFormat;
    use serde_json::json;

    fn sections() -> Map<String, Value> {
        match json!({
            "students": [{"name": "A"}, {"name": "B"}],
            "trainerProfile": {"name": "X"},
            "foods": null
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn build(compression: u8, encrypted: bool, pw: Option<&Passphrase>) -> Archive {
        let metadata = ArchiveMetadata::new(ArchiveFormat::Json, compression, encrypted);
        Archive::build(metadata, sections(), pw, &fast_kdf()).unwrap()
    }

    #[test]
    fn test_validate_accepts_minimal_archive() {
        let report = validate(r#"{"metadata": {}}"#);
        assert!(report.valid);
        assert_eq!(report.reason, None);
    }

    #[test]
    fn test_validate_rejects_non_objects() {
        for payload in ["[1, 2]", r#""backup""#, "42", "null", "not json"] {
            let report = validate(payload);
            assert!(!report.valid, "{payload} should be rejected");
            assert!(report.reason.is_some());
        }
    }

    #[test]
    fn test_validate_rejects_bad_metadata() {
        let report = validate(r#"{"students": []}"#);
        assert_eq!(report.reason.as_deref(), Some("missing metadata"));

        let report = validate(r#"{"metadata": "yesterday"}"#);
        assert!(!report.valid);
        assert!(report.reason.unwrap().contains("metadata must be an object"));

        let report = validate(r#"{"metadata": {"compression": 400}}"#);
        assert!(!report.valid);

        let report = validate(r#"{"metadata": {"format": "zip"}}"#);
        assert!(!report.valid);
    }

    #[test]
    fn test_validate_rejects_sealed_without_payload() {
        let report = validate(r#"{"metadata": {"encoding": "sealed", "compression": 5}}"#);
        assert!(!report.valid);
    }

    #[test]
    fn test_inline_roundtrip_through_json() {
        let archive = build(0, false, None);
        assert!(!archive.is_sealed());

        let text = archive.to_json_string().unwrap();
        let parsed = Archive::parse(&text).unwrap();
        assert_eq!(parsed, archive);

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["students"][1]["name"], "B");
        assert!(value["foods"].is_null());
    }

    #[test]
    fn test_metadata_is_written_first() {
        let text = build(0, false, None).to_json_string().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        let first_key = value.as_object().unwrap().keys().next().cloned();
        assert_eq!(first_key.as_deref(), Some(METADATA_KEY));
    }

    #[test]
    fn test_compressed_archive_is_sealed_and_hashed() {
        let archive = build(80, false, None);
        assert!(archive.is_sealed());
        assert!(archive.metadata().content_hash.is_some());

        let parsed = Archive::parse(&archive.to_json_string().unwrap()).unwrap();
        let opened = parsed.sections(None).unwrap();
        assert_eq!(opened.as_ref(), &sections());
    }

    #[test]
    fn test_tampered_sealed_payload_fails_integrity() {
        let archive = build(0, false, None);
        let mut metadata = archive.metadata().clone();
        metadata.compression = 10;
        let sealed = Archive::build(metadata, sections(), None, &fast_kdf()).unwrap();

        let mut value = sealed.to_value().unwrap();
        value["metadata"]["contentHash"] = json!(ArchiveMetadata::compute_hash(b"other"));
        let tampered = Archive::from_value(value).unwrap();

        assert!(matches!(
            tampered.sections(None),
            Err(VaultError::IntegrityCheckFailed { .. })
        ));
    }

    #[test]
    fn test_corrupt_compressed_payload_is_input_error() {
        let mut value = build(80, false, None).to_value().unwrap();
        value["payload"] = json!(STANDARD.encode(b"definitely not gzip"));
        let corrupt = Archive::from_value(value).unwrap();

        let err = corrupt.sections(None).unwrap_err();
        assert!(matches!(err, VaultError::Compression(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_encrypted_archive_requires_passphrase() {
        let pw = Passphrase::new("s3cret").unwrap();
        let archive = build(0, true, Some(&pw));
        assert!(archive.is_sealed());
        assert!(archive.metadata().cipher.is_some());
        assert!(archive.metadata().content_hash.is_none());

        let text = archive.to_json_string().unwrap();
        assert!(!text.contains("trainerProfile"));

        let parsed = Archive::parse(&text).unwrap();
        assert!(matches!(parsed.sections(None), Err(VaultError::Decryption(_))));

        let wrong = Passphrase::new("guess").unwrap();
        assert!(matches!(
            parsed.sections(Some(&wrong)),
            Err(VaultError::Decryption(_))
        ));

        let opened = parsed.sections(Some(&pw)).unwrap();
        assert_eq!(opened["trainerProfile"]["name"], "X");
    }

    #[test]
    fn test_edited_metadata_of_encrypted_archive_is_rejected() {
        let pw = Passphrase::new("s3cret").unwrap();
        let archive = build(40, true, Some(&pw));

        for (field, forged) in [
            ("note", json!("forged note")),
            ("archiveId", json!("00000000-0000-0000-0000-000000000000")),
            ("createdAt", json!("2020-01-01T00:00:00Z")),
        ] {
            let mut value = archive.to_value().unwrap();
            value["metadata"][field] = forged;
            let edited = Archive::from_value(value).unwrap();
            assert!(
                matches!(edited.sections(Some(&pw)), Err(VaultError::Decryption(_))),
                "{field}"
            );
        }

        let untouched = Archive::from_value(archive.to_value().unwrap()).unwrap();
        assert!(untouched.sections(Some(&pw)).is_ok());
    }

    #[test]
    fn test_encrypted_and_compressed_roundtrip() {
        let pw = Passphrase::new("s3cret").unwrap();
        let archive = build(100, true, Some(&pw));
        let parsed = Archive::parse(&archive.to_json_string().unwrap()).unwrap();
        assert_eq!(parsed.sections(Some(&pw)).unwrap().as_ref(), &sections());
    }

    #[test]
    fn test_encrypted_flag_without_ciphertext_is_rejected() {
        let archive = Archive::parse(r#"{"metadata": {"encrypted": true}, "students": []}"#).unwrap();
        let pw = Passphrase::new("pw").unwrap();
        assert!(matches!(
            archive.sections(Some(&pw)),
            Err(VaultError::Decryption(_))
        ));
    }

    #[test]
    fn test_unknown_keys_are_kept_inline() {
        let archive =
            Archive::parse(r#"{"metadata": {}, "students": [1], "futureRecord": {"a": 1}}"#).unwrap();
        let sections = archive.sections(None).unwrap();
        assert!(sections.contains_key("futureRecord"));
    }
}
