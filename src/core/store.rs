use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::core::codec::{decode_vector, encode_vector};
use crate::error::{AppError, Result};
use crate::models::catalog::{CatalogLabelTable, CatalogVectorTable};

/// Prefix of every key written by [`CacheStore`].
pub const KEY_PREFIX: &str = "lookalike";

/// A text key-value store, the persistence primitive behind [`CacheStore`].
pub trait KeyValueBackend: Send + Sync {
    /// Reads a value, `None` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Deletes a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Stores each key as a JSON file in one directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileBackend {
    /// Creates a backend rooted at `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        crate::utils::ensure_dir_exists(&dir)?;
        Ok(Self {
            dir,
            quota_bytes: None,
        })
    }

    /// Caps the total size of all stored values.
    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(crate::utils::storage_file_name(key))
    }

    fn used_bytes_excluding(&self, excluded: &Path) -> Result<u64> {
        let mut total = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path == excluded || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            total += entry.metadata()?.len();
        }
        Ok(total)
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        if let Some(limit) = self.quota_bytes {
            let needed = self.used_bytes_excluding(&path)? + value.len() as u64;
            if needed > limit {
                return Err(AppError::StorageQuota { needed, limit });
            }
        }

        // Write to a sibling temp file and rename so readers never see a torn value.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process backend, mostly for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryBackend {
    /// Creates an empty, unbounded backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend that rejects writes beyond `quota_bytes`.
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("memory backend lock poisoned".to_string()))
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock()?;
        if let Some(limit) = self.quota_bytes {
            let others: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len() as u64)
                .sum();
            let needed = others + value.len() as u64;
            if needed > limit {
                return Err(AppError::StorageQuota { needed, limit });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Version-scoped persistence of the catalog vector and label tables.
///
/// Two entries exist per cache version: `lookalike:vectors:<version>` maps
/// item ids to encoded vectors, `lookalike:labels:<version>` maps item ids
/// to label arrays.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Wraps a backend.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    /// Key holding the encoded vectors of `version`.
    pub fn vectors_key(version: &str) -> String {
        format!("{}:vectors:{}", KEY_PREFIX, version)
    }

    /// Key holding the label sets of `version`.
    pub fn labels_key(version: &str) -> String {
        format!("{}:labels:{}", KEY_PREFIX, version)
    }

    /// Loads both tables. Missing or unreadable data yields empty tables.
    pub fn load(&self, version: &str) -> (CatalogVectorTable, CatalogLabelTable) {
        let vectors = match self.try_load_vectors(version) {
            Ok(vectors) => vectors,
            Err(e) => {
                log::warn!("Ignoring unreadable vector cache {}: {}", version, e);
                CatalogVectorTable::new()
            }
        };
        let labels = match self.try_load_labels(version) {
            Ok(labels) => labels,
            Err(e) => {
                log::warn!("Ignoring unreadable label cache {}: {}", version, e);
                CatalogLabelTable::new()
            }
        };
        log::debug!(
            "Loaded cache {}: {} vectors, {} label sets",
            version,
            vectors.len(),
            labels.len()
        );
        (vectors, labels)
    }

    fn try_load_vectors(&self, version: &str) -> Result<CatalogVectorTable> {
        let Some(raw) = self.backend.get(&Self::vectors_key(version))? else {
            return Ok(CatalogVectorTable::new());
        };
        let encoded: BTreeMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| AppError::CorruptData(format!("vector cache: {}", e)))?;
        encoded
            .into_iter()
            .map(|(id, value)| decode_vector(&value).map(|vector| (id, vector)))
            .collect()
    }

    fn try_load_labels(&self, version: &str) -> Result<CatalogLabelTable> {
        let Some(raw) = self.backend.get(&Self::labels_key(version))? else {
            return Ok(CatalogLabelTable::new());
        };
        serde_json::from_str(&raw).map_err(|e| AppError::CorruptData(format!("label cache: {}", e)))
    }

    /// Persists both tables, replacing what `version` held before.
    ///
    /// Best effort: returns `false` and logs when the backend refuses the
    /// write, leaving the in-memory tables as the only copy.
    pub fn save(
        &self,
        version: &str,
        vectors: &CatalogVectorTable,
        labels: &CatalogLabelTable,
    ) -> bool {
        match self.try_save(version, vectors, labels) {
            Ok(()) => {
                log::debug!("Saved cache {}: {} vectors", version, vectors.len());
                true
            }
            Err(e) => {
                log::warn!("Caching disabled for this save of {}: {}", version, e);
                false
            }
        }
    }

    fn try_save(
        &self,
        version: &str,
        vectors: &CatalogVectorTable,
        labels: &CatalogLabelTable,
    ) -> Result<()> {
        let encoded: BTreeMap<&str, String> = vectors
            .iter()
            .map(|(id, vector)| (id.as_str(), encode_vector(vector)))
            .collect();
        self.backend
            .set(&Self::vectors_key(version), &serde_json::to_string(&encoded)?)?;
        self.backend
            .set(&Self::labels_key(version), &serde_json::to_string(labels)?)?;
        Ok(())
    }

    /// Removes every entry of `version`.
    pub fn clear(&self, version: &str) -> Result<()> {
        self.backend.remove(&Self::vectors_key(version))?;
        self.backend.remove(&Self::labels_key(version))?;
        log::info!("Cleared cache {}", version);
        Ok(())
    }
}
