use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{MirrorList, ResourceError, ResourceVersion, Result};

/// Where committed resources live and where in-flight downloads are staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLayout")]
pub struct StorageLayout {
    storage_root: PathBuf,
    scratch_dir: PathBuf,
}

#[derive(Deserialize)]
struct RawLayout {
    storage_root: PathBuf,
    scratch_dir: PathBuf,
}

impl TryFrom<RawLayout> for StorageLayout {
    type Error = ResourceError;

    fn try_from(raw: RawLayout) -> Result<Self> {
        Self::new(raw.storage_root, raw.scratch_dir)
    }
}

impl StorageLayout {
    pub fn new(storage_root: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_root = storage_root.into();
        let scratch_dir = scratch_dir.into();

        for (role, path) in [("storage", &storage_root), ("scratch", &scratch_dir)] {
            if !path.is_absolute() {
                return Err(ResourceError::RelativeDirectory {
                    role,
                    path: path.clone(),
                });
            }
        }
        if storage_root == scratch_dir {
            return Err(ResourceError::SharedDirectory(storage_root));
        }
        // Scratch is purged at start-up, so neither tree may contain the other.
        if storage_root.starts_with(&scratch_dir) || scratch_dir.starts_with(&storage_root) {
            return Err(ResourceError::NestedDirectories {
                storage_root,
                scratch_dir,
            });
        }

        Ok(Self {
            storage_root,
            scratch_dir,
        })
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn storage_path(&self, resource: &ResourceVersion) -> PathBuf {
        resource.storage_path(&self.storage_root)
    }
}

/// Immutable description of one resource registry.
///
/// Built once at start-up and shared by reference with everything that
/// fetches on its behalf; several registries can live in one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct RegistryConfig {
    name: String,
    mirrors: MirrorList,
    #[serde(flatten)]
    layout: StorageLayout,
}

#[derive(Deserialize)]
struct RawConfig {
    name: String,
    mirrors: MirrorList,
    #[serde(flatten)]
    layout: StorageLayout,
}

impl TryFrom<RawConfig> for RegistryConfig {
    type Error = ResourceError;

    fn try_from(raw: RawConfig) -> Result<Self> {
        Self::new(raw.name, raw.mirrors, raw.layout)
    }
}

impl RegistryConfig {
    pub fn new(name: impl Into<String>, mirrors: MirrorList, layout: StorageLayout) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ResourceError::EmptyName);
        }
        Ok(Self {
            name,
            mirrors,
            layout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mirrors(&self) -> &MirrorList {
        &self.mirrors
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }
}
