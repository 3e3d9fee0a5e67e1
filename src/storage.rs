use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("StorageError: Storage is not available: {reason}"))]
    Unavailable { reason: String },

    #[snafu(display("StorageError: Could not encode value for '{key}'"))]
    Encode {
        key: String,
        source: serde_json::Error,
    },

    #[snafu(display("StorageError: Could not access '{}'", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("StorageError: Content of '{}' is not a JSON object", path.display()))]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// String key-value storage, modelled after the browser's `Storage` interface.
///
/// Two instances are used: a durable one (think `localStorage`) holding the token record and a
/// session-scoped one (think `sessionStorage`) holding the in-flight code verifier and state.
/// Browser hosts implement this on top of `window.localStorage` / `window.sessionStorage`.
pub trait KeyValueStore: Debug + Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage. Cloning shares the underlying entries.
///
/// Serves as session-scoped storage for non-browser hosts and as both storages in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Durable storage backed by a single JSON object on disk.
///
/// Every write rewrites the whole file. Meant for desktop and CLI hosts persisting a handful of
/// entries, not as a general purpose database.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, StorageError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HashMap::new());
            }
            Err(err) => {
                return Err(err).context(IoSnafu {
                    path: self.path.clone(),
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content).context(CorruptSnafu {
            path: self.path.clone(),
        })
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context(IoSnafu {
                path: parent.to_path_buf(),
            })?;
        }
        let json = serde_json::to_string_pretty(entries).context(EncodeSnafu {
            key: self.path.display().to_string(),
        })?;
        std::fs::write(&self.path, json).context(IoSnafu {
            path: self.path.clone(),
        })
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        // A corrupt file would otherwise block every future write.
        let mut entries = self.read_all().unwrap_or_else(|err| {
            tracing::warn!(?err, "Discarding unreadable storage file content.");
            HashMap::new()
        });
        entries.insert(key.to_owned(), value.to_owned());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = match self.read_all() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(?err, "Discarding unreadable storage file content.");
                HashMap::new()
            }
        };
        match entries.remove(key) {
            Some(_) => self.write_all(&entries),
            None => Ok(()),
        }
    }
}

/// Reads and decodes a JSON value stored under `key`.
///
/// Never fails: absent entries, storage errors and undecodable values all yield `None`.
/// An undecodable value is removed, so it does not get in the way of the next write.
pub(crate) fn read_json<T: DeserializeOwned>(storage: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            tracing::error!(?err, "Error reading '{key}' from storage.");
            return None;
        }
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            // Note: A decode error will always come up if we break the persisted type, e.g. by
            // adding a new required field.
            tracing::debug!(
                ?err,
                "Data format of '{key}' changed or is corrupt. Removing previously persisted value."
            );
            if let Err(err) = storage.remove(key) {
                tracing::error!(?err, "Error removing '{key}' from storage.");
            }
            None
        }
    }
}

pub(crate) fn write_json<T: Serialize>(
    storage: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).context(EncodeSnafu { key })?;
    storage.set(key, &json)
}

/// Removes `key`, logging instead of failing. Used when dropping transient data.
pub(crate) fn remove_logged(storage: &dyn KeyValueStore, key: &str) {
    if let Err(err) = storage.remove(key) {
        tracing::error!(?err, "Error removing '{key}' from storage.");
    }
}
