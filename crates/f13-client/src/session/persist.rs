//! Session persistence abstraction.
//!
//! The store only needs to read and write one serialized blob per key. The
//! port is synchronous and is called on the mutating task after the session
//! lock is released, so implementations should return quickly. Writes reach
//! the port in mutation order; a write older than the last one is skipped.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::ClientError;

pub trait SessionPersistence: Send + Sync {
    /// Read the blob stored under `key`, `None` if nothing was stored.
    fn load(&self, key: &str) -> Result<Option<String>, ClientError>;

    /// Overwrite the blob stored under `key`.
    fn save(&self, key: &str, value: &str) -> Result<(), ClientError>;
}

/// Process-local persistence, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionPersistence for MemoryPersistence {
    fn load(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SessionPersistence for FilePersistence {
    fn load(&self, key: &str) -> Result<Option<String>, ClientError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Persistence(e.to_string())),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), ClientError> {
        fs::create_dir_all(&self.dir).map_err(|e| ClientError::Persistence(e.to_string()))?;

        // Write-then-rename: readers only ever see a complete file.
        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value).map_err(|e| ClientError::Persistence(e.to_string()))?;
        fs::rename(&tmp, &target).map_err(|e| ClientError::Persistence(e.to_string()))
    }
}
