use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use depot_fs::AtomicFile;
use depot_resource::ResourceVersion;
use serde::{Deserialize, Serialize};

/// The version of a resource that was last installed, keyed by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRecord {
    pub identifier: String,
    pub version: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub installed_at: DateTime<Utc>,
}

impl InstalledRecord {
    pub fn new(resource: &ResourceVersion, path: impl Into<PathBuf>, bytes: u64) -> Self {
        Self {
            identifier: resource.identifier().to_string(),
            version: resource.version().to_string(),
            path: path.into(),
            bytes,
            installed_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &str {
        &self.identifier
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read version store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt version store {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode version store: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Fs(#[from] depot_fs::Error),

    #[error("version store lock poisoned")]
    Poisoned,
}

/// Keyed persistence for [`InstalledRecord`]s.
///
/// A later `put` for the same identifier replaces the earlier record.
pub trait VersionStore: Send + Sync {
    fn get(&self, identifier: &str) -> Result<Option<InstalledRecord>, StoreError>;

    fn put(&self, record: InstalledRecord) -> Result<(), StoreError>;

    /// File the store commits to, if it persists through the scratch dir.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Process-local store, forgotten on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, InstalledRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionStore for MemoryStore {
    fn get(&self, identifier: &str) -> Result<Option<InstalledRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(identifier).cloned())
    }

    fn put(&self, record: InstalledRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.insert(record.identifier.clone(), record);
        Ok(())
    }
}

/// All records in one JSON document, rewritten atomically on every `put`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    scratch_dir: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// `scratch_dir` must be on the same filesystem as `path`.
    pub fn new(path: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scratch_dir: scratch_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record, ordered by identifier.
    pub fn records(&self) -> Result<Vec<InstalledRecord>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.load()?.into_values().collect())
    }

    fn load(&self) -> Result<BTreeMap<String, InstalledRecord>, StoreError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, records: &BTreeMap<String, InstalledRecord>) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(records).map_err(StoreError::Encode)?;

        if let Some(parent) = self.path.parent() {
            depot_fs::ensure_dir(parent)?;
        }
        let mut file = AtomicFile::create(&self.scratch_dir, &self.path)?;
        file.write_all(&encoded).map_err(|source| depot_fs::Error::Write {
            path: file.path().to_path_buf(),
            source,
        })?;
        file.commit()?;
        Ok(())
    }
}

impl VersionStore for JsonFileStore {
    fn get(&self, identifier: &str) -> Result<Option<InstalledRecord>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.load()?.remove(identifier))
    }

    fn put(&self, record: InstalledRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut records = self.load()?;
        records.insert(record.identifier.clone(), record);
        self.save(&records)
    }

    fn location(&self) -> Option<&Path> {
        Some(self.path())
    }
}
