//! Versioned key/value persistence for the transaction registry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::shared::errors::StorageError;

/// Blob store keyed by name. A blob written under one schema version is
/// invisible to readers asking for another.
pub trait Persistence: Send + Sync {
    fn load(&self, key: &str, version: &str) -> Result<Option<serde_json::Value>, StorageError>;

    fn save(&self, key: &str, value: &serde_json::Value, version: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionedBlob {
    version: String,
    data: serde_json::Value,
}

/// One JSON file per key under a data directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Persistence for JsonFileStore {
    fn load(&self, key: &str, version: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let blob: VersionedBlob = match serde_json::from_str(&content) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Discarding unreadable {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        if blob.version != version {
            warn!(
                "Discarding {} stored with schema {} (expected {})",
                key, blob.version, version
            );
            return Ok(None);
        }

        Ok(Some(blob.data))
    }

    fn save(&self, key: &str, value: &serde_json::Value, version: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let blob = VersionedBlob {
            version: version.to_string(),
            data: value.clone(),
        };
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&blob)?)?;
        std::fs::rename(&tmp, &path)?;
        debug!("Saved {} to {}", key, path.display());
        Ok(())
    }
}

/// In-process store, used by tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, (String, serde_json::Value)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored value regardless of version
    pub fn raw(&self, key: &str) -> Option<serde_json::Value> {
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.get(key).map(|(_, value)| value.clone()))
    }
}

impl Persistence for MemoryStore {
    fn load(&self, key: &str, version: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(blobs
            .get(key)
            .filter(|(stored, _)| stored == version)
            .map(|(_, value)| value.clone()))
    }

    fn save(&self, key: &str, value: &serde_json::Value, version: &str) -> Result<(), StorageError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        blobs.insert(key.to_string(), (version.to_string(), value.clone()));
        Ok(())
    }
}
