use crate::fs::write_atomic;
use postwatch_core::StorageError;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Older cache files stored identifiers as JSON numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum CachedId {
    Text(String),
    Number(u64),
}

impl From<CachedId> for String {
    fn from(id: CachedId) -> Self {
        match id {
            CachedId::Text(text) => text,
            CachedId::Number(number) => number.to_string(),
        }
    }
}

/// Every post identifier ever emitted in a batch. Entries are never evicted.
#[derive(Debug)]
pub struct DedupCache {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl DedupCache {
    /// Loads the cache file, or starts empty when there is none yet.
    pub async fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No dedup cache at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let ids: Vec<CachedId> =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::CorruptCache {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;
        let ids: BTreeSet<String> = ids.into_iter().map(String::from).collect();

        debug!("Loaded {} cached ids from {}", ids.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            ids,
        })
    }

    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ids: BTreeSet::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false when the id was already cached.
    pub fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Overwrites the cache file with the full id set.
    pub async fn persist(&self) -> Result<(), StorageError> {
        let ids: Vec<&String> = self.ids.iter().collect();
        let bytes = serde_json::to_vec(&ids).map_err(|e| StorageError::WriteFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        write_atomic(&self.path, &bytes).await?;
        debug!("Persisted {} cached ids to {}", ids.len(), self.path.display());
        Ok(())
    }
}
