/*!
Directory-backed key-value store: one `<key>.json` file per record.
*/

use super::KeyValueStore;
use crate::{Result, VaultError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const VALUE_EXTENSION: &str = "json";

/// Key-value store keeping each record in its own file under a base directory.
///
/// The directory is created on first write. Writes go to a temporary file that
/// is renamed into place, so readers never observe a half-written record.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    base_dir: PathBuf,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve the file for a key, refusing keys that could escape the directory
    fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(VaultError::store(format!(
                "key '{key}' cannot be used as a file name"
            )));
        }
        Ok(self.base_dir.join(format!("{key}.{VALUE_EXTENSION}")))
    }

    fn ensure_base_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir).map_err(|e| {
                VaultError::store(format!(
                    "Failed to create directory {}: {}",
                    self.base_dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

impl KeyValueStore for DirectoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.resolve_path(key)?;

        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::store(format!(
                "Failed to read record from {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.resolve_path(key)?;
        self.ensure_base_dir()?;

        let tmp_path = path.with_extension(format!("{VALUE_EXTENSION}.tmp"));
        fs::write(&tmp_path, value).map_err(|e| {
            VaultError::store(format!(
                "Failed to write record to {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            VaultError::store(format!(
                "Failed to move record into place at {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }

    fn notify_changed(&self) {
        debug!(dir = %self.base_dir.display(), "Record directory changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_store_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(temp_dir.path().join("records"));

        assert_eq!(store.get("students").unwrap(), None);

        store.set("students", r#"[{"name":"A"}]"#).unwrap();
        assert!(temp_dir.path().join("records/students.json").exists());
        assert_eq!(
            store.get("students").unwrap().as_deref(),
            Some(r#"[{"name":"A"}]"#)
        );
        assert!(!temp_dir.path().join("records/students.json.tmp").exists());
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(temp_dir.path());

        store.set("trainerProfile", r#"{"name":"X"}"#).unwrap();
        store.set("trainerProfile", r#"{"name":"Y"}"#).unwrap();
        assert_eq!(
            store.get("trainerProfile").unwrap().as_deref(),
            Some(r#"{"name":"Y"}"#)
        );
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(temp_dir.path());

        assert!(store.set("../escape", "1").is_err());
        assert!(store.get("a/b").is_err());
        assert!(store.get(".hidden").is_err());
        assert!(store.get("").is_err());
    }
}
