// ── Durable key-value layer ──
//
// A flat string → JSON map. `FileKv` keeps the whole map in one JSON
// document and rewrites it atomically (temp file + rename) on every
// mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::CoreError;

/// Storage backend for overrides and the saved-devices list.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, CoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), CoreError>;
    fn remove(&self, key: &str) -> Result<(), CoreError>;
    fn keys(&self) -> Result<Vec<String>, CoreError>;
}

// ── In-memory ───────────────────────────────────────────────────────

/// Non-durable store, for tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryKv {
    map: Mutex<BTreeMap<String, Value>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), CoreError> {
        self.map.lock().insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.map.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.map.lock().keys().cloned().collect())
    }
}

// ── File-backed ─────────────────────────────────────────────────────

/// Single JSON document on disk, cached in memory.
#[derive(Debug)]
pub struct FileKv {
    path: PathBuf,
    map: Mutex<BTreeMap<String, Value>>,
}

impl FileKv {
    /// Open (or lazily create) the document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let map = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                CoreError::storage(format!("{} is not a JSON object: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(CoreError::storage(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        tracing::debug!(path = %path.display(), keys = map.len(), "override store opened");
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, map: &BTreeMap<String, Value>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CoreError::storage(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let body = serde_json::to_string_pretty(map).map_err(CoreError::storage)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .map_err(|e| CoreError::storage(format!("cannot write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            CoreError::storage(format!("cannot replace {}: {e}", self.path.display()))
        })
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), CoreError> {
        let mut map = self.map.lock();
        let previous = map.insert(key.to_owned(), value);
        if let Err(e) = self.persist(&map) {
            // Keep the cache in step with what is on disk.
            match previous {
                Some(prev) => map.insert(key.to_owned(), prev),
                None => map.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        let mut map = self.map.lock();
        let Some(previous) = map.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&map) {
            map.insert(key.to_owned(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.map.lock().keys().cloned().collect())
    }
}
