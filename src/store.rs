use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::Builder;

use crate::error::CatalogError;

pub const SCAN_HISTORY_KEY: &str = "thinslice_scans";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CatalogError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CatalogError>;
    fn remove(&self, key: &str) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: Utf8PathBuf,
}

impl FileStore {
    pub fn new() -> Result<Self, CatalogError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir().join(".cache").join("thinslice-catalog"),
                )
                .ok()
            })
            .ok_or_else(|| CatalogError::Storage("unable to resolve cache directory".to_string()))?;
        Ok(Self { root })
    }

    pub fn with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn key_path(&self, key: &str) -> Utf8PathBuf {
        let sanitized: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{sanitized}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CatalogError> {
        let path = self.key_path(key);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        fs::read_to_string(path.as_std_path())
            .map(Some)
            .map_err(|err| CatalogError::Storage(format!("read {path}: {err}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        write_atomic(&self.key_path(key), value.as_bytes())
    }

    fn remove(&self, key: &str) -> Result<(), CatalogError> {
        let path = self.key_path(key);
        if path.as_std_path().exists() {
            fs::remove_file(path.as_std_path())
                .map_err(|err| CatalogError::Storage(format!("remove {path}: {err}")))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CatalogError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CatalogError::Storage("memory store poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CatalogError::Storage("memory store poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CatalogError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CatalogError::Storage("memory store poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

pub fn read_list<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Vec<T>, CatalogError> {
    match store.get(key)? {
        Some(content) => serde_json::from_str(&content)
            .map_err(|err| CatalogError::Storage(format!("decode {key}: {err}"))),
        None => Ok(Vec::new()),
    }
}

/// Appends `item` to the list under `key`, keeping only the newest `limit`
/// entries (oldest first on disk).
pub fn append_list<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    item: &T,
    limit: usize,
) -> Result<(), CatalogError> {
    let mut existing: Vec<serde_json::Value> = read_list(store, key)?;
    let value = serde_json::to_value(item)
        .map_err(|err| CatalogError::Storage(format!("encode {key}: {err}")))?;
    existing.push(value);
    if existing.len() > limit {
        let excess = existing.len() - limit;
        existing.drain(..excess);
    }
    let content = serde_json::to_string(&existing)
        .map_err(|err| CatalogError::Storage(format!("encode {key}: {err}")))?;
    store.set(key, &content)
}

pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
    let parent = path
        .parent()
        .ok_or_else(|| CatalogError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".thinslice-write")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_paths_are_sanitized() {
        let store = FileStore::with_root(Utf8PathBuf::from("/tmp/thinslice"));
        assert!(store.key_path("thinslice_scans").ends_with("thinslice_scans.json"));
        assert!(store.key_path("../escape").ends_with("___escape.json"));
    }

    #[test]
    fn append_keeps_newest_entries() {
        let store = MemoryStore::new();
        for value in 0..15u32 {
            append_list(&store, "numbers", &value, 10).unwrap();
        }
        let stored: Vec<u32> = read_list(&store, "numbers").unwrap();
        assert_eq!(stored, (5..15).collect::<Vec<_>>());
    }

    #[test]
    fn corrupt_list_is_an_error() {
        let store = MemoryStore::new();
        store.set("numbers", "not json").unwrap();
        assert!(read_list::<u32>(&store, "numbers").is_err());
    }
}
