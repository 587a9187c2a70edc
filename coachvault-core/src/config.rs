//! Configuration for the backup engine and the CLI
//!
//! A [`VaultConfig`] names where the records live, where history is appended,
//! the default archive attributes, and optionally a catalog override. It is
//! loaded once at startup and passed explicitly; nothing is read from ambient
//! state during a backup or restore.

use crate::catalog::RecordCatalog;
use crate::metadata::{ArchiveFormat, MAX_COMPRESSION};
use crate::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Catalog override supplied by configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub version: u32,
    pub records: Vec<String>,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding one file per record
    pub store_dir: PathBuf,
    /// Append-only history log (JSON lines); `None` disables history
    pub history_path: Option<PathBuf>,
    /// Directory new archives are written to
    pub backup_dir: PathBuf,
    /// Compression used when a backup does not ask for a level
    pub default_compression: u8,
    pub default_format: ArchiveFormat,
    /// Replaces the built-in record catalog when present
    pub catalog: Option<CatalogConfig>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            store_dir: PathBuf::from("./data"),
            history_path: Some(PathBuf::from("./backups/history.jsonl")),
            backup_dir: PathBuf::from("./backups"),
            default_compression: 0,
            default_format: ArchiveFormat::Json,
            catalog: None,
        }
    }
}

impl VaultConfig {
    /// Configuration rooted at a single directory: records in `<root>/data`,
    /// archives and history in `<root>/backups`
    pub fn rooted_at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        VaultConfig {
            store_dir: root.join("data"),
            history_path: Some(root.join("backups").join("history.jsonl")),
            backup_dir: root.join("backups"),
            ..VaultConfig::default()
        }
    }

    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            VaultError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: VaultConfig = serde_json::from_str(&text).map_err(|e| {
            VaultError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.store_dir.as_os_str().is_empty() {
            return Err(VaultError::config("store_dir cannot be empty"));
        }
        if self.default_compression > MAX_COMPRESSION {
            return Err(VaultError::config(format!(
                "default_compression must be within 0-{MAX_COMPRESSION}, got {}",
                self.default_compression
            )));
        }
        self.catalog()?;
        Ok(())
    }

    /// The record catalog to use: the override when configured, otherwise the
    /// built-in one
    pub fn catalog(&self) -> Result<RecordCatalog> {
        match &self.catalog {
            Some(custom) => RecordCatalog::new(custom.version, custom.records.iter().cloned())
                .map_err(|e| VaultError::config(e.to_string())),
            None => Ok(RecordCatalog::standard()),
        }
    }
}
