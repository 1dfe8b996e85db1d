//! File-backed state store
//!
//! One JSON document per node under the variant's state directory:
//! `<state_dir>/<variant>/<type>.<name>.json`. Writes go to a temporary file
//! that is renamed over the record, so a reader never sees a partial write.

use chrono::{DateTime, Utc};
use declarative::{NodeId, NodeRecord, StateError, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Record as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub node: NodeId,
    #[serde(flatten)]
    pub record: NodeRecord,
    /// Last time this record was written
    pub last_updated: DateTime<Utc>,
}

/// State store keeping one file per node
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
    locks: Mutex<HashMap<NodeId, Arc<Mutex<()>>>>,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &NodeId) -> PathBuf {
        self.dir.join(format!("{}.json", id.key()))
    }

    /// Per-node lock; writes to different nodes never contend
    fn lock(&self, id: &NodeId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    /// Read the full stored record, including its timestamp
    pub fn load(&self, id: &NodeId) -> Result<Option<StoredRecord>, StateError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| record_error(id, &path, &e))?;
        let stored: StoredRecord =
            serde_json::from_str(&content).map_err(|e| record_error(id, &path, &e))?;
        log::trace!("Loaded {} from {}", id, path.display());
        Ok(Some(stored))
    }
}

fn record_error(id: &NodeId, path: &Path, err: &dyn std::fmt::Display) -> StateError {
    StateError::Record {
        node: id.clone(),
        message: format!("{}: {err}", path.display()),
    }
}

impl StateStore for FileStateStore {
    fn get(&self, id: &NodeId) -> Result<Option<NodeRecord>, StateError> {
        let lock = self.lock(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load(id)?.map(|stored| stored.record))
    }

    fn put(&self, id: &NodeId, record: NodeRecord) -> Result<(), StateError> {
        let lock = self.lock(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        fs::create_dir_all(&self.dir).map_err(|e| StateError::Backend {
            message: format!("failed to create {}: {e}", self.dir.display()),
        })?;

        let stored = StoredRecord {
            node: id.clone(),
            record,
            last_updated: Utc::now(),
        };
        let path = self.record_path(id);
        let content =
            serde_json::to_string_pretty(&stored).map_err(|e| record_error(id, &path, &e))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| record_error(id, &tmp, &e))?;
        fs::rename(&tmp, &path).map_err(|e| record_error(id, &path, &e))?;

        log::debug!("Saved state for {} to {}", id, path.display());
        Ok(())
    }

    fn remove(&self, id: &NodeId) -> Result<(), StateError> {
        let lock = self.lock(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Removed state for {id}");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(record_error(id, &path, &e)),
        }
    }

    fn ids(&self) -> Result<Vec<NodeId>, StateError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| StateError::Backend {
            message: format!("failed to read {}: {e}", self.dir.display()),
        })?;

        let mut ids: Vec<NodeId> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    let stem = path.file_stem()?.to_str()?;
                    match stem.parse() {
                        Ok(id) => Some(id),
                        Err(e) => {
                            log::warn!("Ignoring {}: {e}", path.display());
                            None
                        }
                    }
                } else {
                    None
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}
