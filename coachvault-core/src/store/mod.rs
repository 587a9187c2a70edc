/*!
Key-value store port and adapters.

The encoder and restorer only need three operations from the store holding the
dashboard records: read a key, write a key, and announce that a batch of writes
has landed. Values are opaque strings, normally JSON text.
*/

pub mod directory;

pub use directory::DirectoryStore;

use crate::{Result, VaultError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(test)]
mockall::mock! {
    pub Store {}

    impl KeyValueStore for Store {
        fn get(&self, key: &str) -> Result<Option<String>>;
        fn set(&self, key: &str, value: &str) -> Result<()>;
        fn notify_changed(&self);
    }
}

/// Store abstraction for the records a backup covers
pub trait KeyValueStore {
    /// Read the raw value stored under `key`, or `None` when absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Tell dependent readers that the store changed
    fn notify_changed(&self) {}
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn notify_changed(&self) {
        (**self).notify_changed()
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn notify_changed(&self) {
        (**self).notify_changed()
    }
}

/// In-memory store.
///
/// An optional byte quota mimics browser storage limits: a write that would
/// push the total size of keys and values past the quota fails.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, String>>,
    quota: Option<usize>,
    notifications: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes once `bytes` would be exceeded
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    /// Create a store pre-populated with raw values
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: Mutex::new(data),
            ..Self::default()
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
        self.data
            .lock()
            .map_err(|_| VaultError::store("memory store lock poisoned"))
    }

    /// Copy of every stored key and value
    pub fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.lock()?.clone())
    }

    /// How many times `notify_changed` was called
    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.lock()?;

        if let Some(quota) = self.quota {
            let used: usize = data
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = used + key.len() + value.len();
            if needed > quota {
                return Err(VaultError::store(format!(
                    "quota exceeded writing '{key}': {needed} of {quota} bytes"
                )));
            }
        }

        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn notify_changed(&self) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
}
