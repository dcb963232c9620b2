use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ResourceError, Result};

/// Marker placed between a file stem and its version token.
const VERSION_MARKER: &str = "_v";

/// One version of one resource.
///
/// The identifier is a `/`-separated relative path (`bin/tool.exe`), the
/// version is an opaque token. Both paths derived from it are pure functions
/// of these two fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceVersion {
    identifier: String,
    version: String,
}

impl ResourceVersion {
    pub fn new(identifier: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let identifier = identifier.into();
        let version = version.into();

        if !is_valid_identifier(&identifier) {
            return Err(ResourceError::InvalidIdentifier(identifier));
        }
        if version.is_empty() || version.contains(['/', '\\']) || version.trim() != version {
            return Err(ResourceError::InvalidVersion(version));
        }

        Ok(Self {
            identifier,
            version,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Path requested from a mirror, e.g. `bin/tool_v1-2-3.exe`.
    pub fn versioned_path(&self) -> String {
        versioned_path(&self.identifier, &self.version)
    }

    /// Absolute location of the committed file below `storage_root`.
    pub fn storage_path(&self, storage_root: &Path) -> PathBuf {
        let mut path = storage_root.to_path_buf();
        path.extend(self.versioned_path().split('/'));
        path
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.version)
    }
}

fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && !identifier.starts_with('/')
        && !identifier.ends_with('/')
        && !identifier.contains('\\')
        && identifier
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

/// Insert `version` into the file name of `identifier`.
///
/// Dots in the version become dashes and the token goes between the stem and
/// the (possibly multi-part) extension:
/// `dist/app.tar.gz` @ `1.2.3` becomes `dist/app_v1-2-3.tar.gz`.
pub fn versioned_path(identifier: &str, version: &str) -> String {
    let (dir, file) = match identifier.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, identifier),
    };
    let token = version.replace('.', "-");

    let file = match file.split_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}{VERSION_MARKER}{token}.{ext}"),
        _ => format!("{file}{VERSION_MARKER}{token}"),
    };

    match dir {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    }
}

/// Inverse of [`versioned_path`]: split a versioned path back into
/// identifier and version.
///
/// Dashes in the recovered token are read back as dots, so version tokens
/// that contained dashes themselves do not survive the round trip.
pub fn unpack_versioned_path(path: &str) -> Option<(String, String)> {
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };
    let (stem, ext) = match file.split_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file, None),
    };

    let (name, token) = stem.rsplit_once(VERSION_MARKER)?;
    if name.is_empty() || token.is_empty() {
        return None;
    }

    let file = match ext {
        Some(ext) => format!("{name}.{ext}"),
        None => name.to_string(),
    };
    let identifier = match dir {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    };

    Some((identifier, token.replace('-', ".")))
}
