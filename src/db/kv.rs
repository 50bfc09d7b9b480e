//! Synchronous key-value string storage, the browser "local storage" equivalent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::errors::AppError;

/// String key-value storage with synchronous get/set.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Write several keys. Implementations that can should make this atomic.
    fn set_many(&self, entries: &[(String, String)]) -> Result<(), AppError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// Volatile storage, mainly for tests.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        lock(&self.entries)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_many(&self, entries: &[(String, String)]) -> Result<(), AppError> {
        let mut map = lock(&self.entries)?;
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Storage backed by a single JSON object file.
///
/// Every write rewrites the file through a temporary sibling and a rename, so readers never
/// observe a half-written file and `set_many` lands all of its keys or none.
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create on first write) the storage file at `path`.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let entries = match std::fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                AppError::Storage(format!(
                    "Corrupt storage file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened local storage");

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), AppError> {
        let contents = serde_json::to_string(entries)
            .map_err(|e| AppError::Storage(format!("Failed to encode storage: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.set_many(&[(key.to_string(), value.to_string())])
    }

    fn set_many(&self, entries: &[(String, String)]) -> Result<(), AppError> {
        let mut map = lock(&self.entries)?;
        let mut next = map.clone();
        for (key, value) in entries {
            next.insert(key.clone(), value.clone());
        }
        self.persist(&next)?;
        *map = next;
        Ok(())
    }
}

fn lock(entries: &Mutex<HashMap<String, String>>) -> Result<MutexGuard<'_, HashMap<String, String>>, AppError> {
    entries
        .lock()
        .map_err(|_| AppError::Internal("Storage lock poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("missing").unwrap(), None);
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let storage = FileStorage::open(&path).unwrap();
        storage
            .set_many(&[
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ])
            .unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get("b").unwrap().as_deref(), Some("2"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_storage_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(FileStorage::open(&path), Err(AppError::Storage(_))));
    }
}
