/*!
The record catalog: the ordered list of store keys a backup must account for.

Both the encoder and the restorer iterate a [`RecordCatalog`]; nothing else in
the crate dispatches on record names.
*/

use crate::{Result, VaultError};
use std::collections::HashSet;

/// Version of [`DEFAULT_RECORDS`]. Bump together with a migration note when
/// entries are added, renamed or removed.
pub const CATALOG_VERSION: u32 = 1;

/// Records covered by a backup, in the order they are written and restored.
pub const DEFAULT_RECORDS: &[&str] = &[
    "students",
    "exercises",
    "workoutPrograms",
    "mealPlans",
    "foods",
    "measurements",
    "reports",
    "trainerProfile",
    "appSettings",
];

/// Top-level archive keys that can never be record names.
pub const RESERVED_KEYS: &[&str] = &["metadata", "payload"];

/// Fixed, ordered list of record names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCatalog {
    version: u32,
    records: Vec<String>,
}

impl RecordCatalog {
    /// Build a catalog from explicit record names.
    ///
    /// Rejects empty names, duplicates and reserved archive keys.
    pub fn new<I, S>(version: u32, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records: Vec<String> = records.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(records.len());

        for name in &records {
            if name.trim().is_empty() {
                return Err(VaultError::catalog("record name cannot be empty"));
            }
            if RESERVED_KEYS.contains(&name.as_str()) {
                return Err(VaultError::catalog(format!(
                    "record name '{name}' is reserved by the archive format"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(VaultError::catalog(format!(
                    "record name '{name}' appears more than once"
                )));
            }
        }

        Ok(Self { version, records })
    }

    /// The catalog shipped with this release.
    pub fn standard() -> Self {
        Self {
            version: CATALOG_VERSION,
            records: DEFAULT_RECORDS.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.iter().any(|r| r == name)
    }

    /// Record names in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(String::as_str)
    }
}

impl Default for RecordCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_order() {
        let catalog = RecordCatalog::standard();
        let names: Vec<&str> = catalog.iter().collect();

        assert_eq!(names, DEFAULT_RECORDS);
        assert_eq!(catalog.version(), CATALOG_VERSION);
        assert!(catalog.contains("trainerProfile"));
        assert!(!catalog.contains("metadata"));
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = RecordCatalog::new(7, ["students", "notes"]).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.version(), 7);
        assert_eq!(catalog.iter().last(), Some("notes"));
    }

    #[test]
    fn test_rejects_duplicates() {
        let result = RecordCatalog::new(1, ["students", "students"]);
        assert!(matches!(result, Err(VaultError::Catalog(_))));
    }

    #[test]
    fn test_rejects_reserved_and_empty_names() {
        assert!(RecordCatalog::new(1, ["metadata"]).is_err());
        assert!(RecordCatalog::new(1, ["payload"]).is_err());
        assert!(RecordCatalog::new(1, [" "]).is_err());
    }

    #[test]
    fn test_empty_catalog_is_allowed() {
        let catalog = RecordCatalog::new(1, Vec::<String>::new()).unwrap();
        assert!(catalog.is_empty());
    }
}
