/*!
Moving archives to and from the filesystem.

The engine only deals in in-memory [`Archive`] values; this module is the
file-based transport the CLI uses to save and load them.
*/

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::archive::Archive;
use crate::metadata::{ArchiveFormat, ArchiveMetadata};
use crate::{Result, VaultError};

/// An archive file on disk
///
/// # Example
/// ```rust,no_run
/// use coachvault_core::{ArchiveFile, BackupEngine, BackupOptions, MemoryStore};
///
/// let engine = BackupEngine::new(MemoryStore::new());
/// let output = engine.create_backup(&BackupOptions::new())?;
/// // Lands in ./backups/backup_<timestamp>.json, creating ./backups if needed
/// let file = ArchiveFile::in_dir("./backups", output.archive.metadata());
/// file.save(&output.archive)?;
/// # Ok::<(), coachvault_core::VaultError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    path: PathBuf,
}

/// One entry of [`list_archives`]
#[derive(Debug, Clone)]
pub struct ArchiveListing {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// `None` when the file is not a readable archive
    pub metadata: Option<ArchiveMetadata>,
}

impl ArchiveFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// File inside `dir` named after the archive's suggested file name
    pub fn in_dir<P: AsRef<Path>>(dir: P, metadata: &ArchiveMetadata) -> Self {
        Self::new(dir.as_ref().join(metadata.suggested_filename()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    VaultError::store(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Write `archive` as pretty-printed JSON, replacing any existing file
    pub fn save(&self, archive: &Archive) -> Result<()> {
        self.ensure_parent_dir()?;
        let text = archive.to_json_string()?;
        fs::write(&self.path, text.as_bytes()).map_err(|e| {
            VaultError::store(format!(
                "Failed to write archive to {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!(path = %self.path.display(), bytes = text.len(), "Archive written");
        Ok(())
    }

    /// Read the raw file contents
    pub fn read_to_string(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|e| {
            VaultError::store(format!(
                "Failed to read archive from {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Read and validate the archive
    pub fn load(&self) -> Result<Archive> {
        Archive::parse(&self.read_to_string()?)
    }
}

/// Archive files (`.json` or `.bak`) directly inside `dir`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_archives<P: AsRef<Path>>(dir: P) -> Result<Vec<ArchiveListing>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut listings = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_archive = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ArchiveFormat::from_extension)
            .is_some();
        if !is_archive || !path.is_file() {
            continue;
        }

        let size_bytes = entry.metadata()?.len();
        let metadata = match ArchiveFile::new(&path).load() {
            Ok(archive) => Some(archive.metadata().clone()),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable archive metadata");
                None
            }
        };
        listings.push(ArchiveListing {
            path,
            size_bytes,
            metadata,
        });
    }

    listings.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(listings)
}
