/*!
Compression adapters for sealed archive payloads.

Archives record a requested compression level on a 0-100 scale. Level 0
leaves the payload untouched; anything above is mapped onto gzip levels 1-9.
*/

use crate::{Result, VaultError};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

/// Upper bound on an unsealed inner document
pub const MAX_INFLATED_BYTES: u64 = 512 * 1024 * 1024;

/// Codec applied to the inner document of a sealed archive
pub trait CompressionAdapter {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Fails with [`VaultError::Compression`] on corrupt input or when the
    /// output would exceed [`MAX_INFLATED_BYTES`]
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Short identifier, e.g. `gzip`
    fn algorithm_name(&self) -> &str;
}

/// Pick the adapter matching an archive's `compression` value.
pub fn compressor_for_level(level: u8) -> Box<dyn CompressionAdapter> {
    if level == 0 {
        Box::new(NoCompression::new())
    } else {
        Box::new(GzipCompressor::from_percent(level))
    }
}

/// Gzip codec (`flate2`)
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    /// Gzip at flate2's default level (6)
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Gzip at a native level, clamped to 9
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    /// Create a compressor from a 0-100 archive level.
    ///
    /// Rounds up so that every non-zero percentage compresses at least at level 1.
    pub fn from_percent(percent: u8) -> Self {
        let percent = u32::from(percent.min(100));
        Self::with_level((percent * 9 + 99) / 100)
    }

    pub fn level(&self) -> u32 {
        self.level.level()
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), self.level);
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| VaultError::compression(format!("gzip encoding failed: {e}")))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut inflated = Vec::new();
        GzDecoder::new(data)
            .take(MAX_INFLATED_BYTES + 1)
            .read_to_end(&mut inflated)
            .map_err(|e| VaultError::compression(format!("gzip decoding failed: {e}")))?;

        if inflated.len() as u64 > MAX_INFLATED_BYTES {
            return Err(VaultError::compression(format!(
                "inflated payload exceeds {MAX_INFLATED_BYTES} bytes"
            )));
        }
        Ok(inflated)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass-through adapter used for level 0
#[derive(Debug, Clone, Default)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_shrinks_repetitive_records() {
        let codec = GzipCompressor::from_percent(80);
        let program = br#"{"name":"squat","sets":5,"reps":5}"#.repeat(20);

        let packed = codec.compress(&program).unwrap();
        assert!(packed.len() < program.len());
        assert_eq!(codec.decompress(&packed).unwrap(), program);
    }

    #[test]
    fn test_percent_to_level_mapping() {
        assert_eq!(GzipCompressor::from_percent(1).level(), 1);
        assert_eq!(GzipCompressor::from_percent(50).level(), 5);
        assert_eq!(GzipCompressor::from_percent(100).level(), 9);
        assert_eq!(GzipCompressor::from_percent(250).level(), 9);
    }

    #[test]
    fn test_compressor_for_level() {
        assert_eq!(compressor_for_level(0).algorithm_name(), "none");
        assert_eq!(compressor_for_level(30).algorithm_name(), "gzip");
    }

    #[test]
    fn test_level_zero_is_identity() {
        let codec = compressor_for_level(0);
        let record = br#"[{"food":"oats","kcal":389}]"#;

        assert_eq!(codec.compress(record).unwrap(), record.to_vec());
        assert_eq!(codec.decompress(record).unwrap(), record.to_vec());
    }

    #[test]
    fn test_gzip_rejects_garbage() {
        let result = GzipCompressor::new().decompress(b"definitely not a gzip stream");
        assert!(matches!(result, Err(VaultError::Compression(_))));
    }
}
