use std::io;
use std::path::Path;

use crate::atomic_file::is_staged_name;
use crate::{Error, Result};

/// Create `path` and any missing parents.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::create_dir_all(path).map_err(|source| Error::DirectoryProvision {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove temp files that [`AtomicFile`](crate::AtomicFile) left in `path`.
///
/// Used on scratch directories to drop what a crashed process staged but
/// never committed. Only regular files named `.depot-*.tmp` directly inside
/// `path` are removed; anything else is left alone. A missing directory
/// counts as already clean. Returns the number of removed files.
pub fn purge_dir(path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let purge_err = |source| Error::Purge {
        path: path.to_path_buf(),
        source,
    };

    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(purge_err(e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(purge_err)?;
        // `DirEntry::file_type` does not follow symlinks.
        if !entry.file_type().map_err(purge_err)?.is_file() {
            continue;
        }
        let staged = entry.file_name().to_str().is_some_and(is_staged_name);
        if !staged {
            tracing::debug!(path = %entry.path().display(), "not a staged file, keeping");
            continue;
        }

        let entry_path = entry.path();
        match std::fs::remove_file(&entry_path) {
            Ok(()) => removed += 1,
            // Raced with a concurrent cleanup or a commit renaming it away.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::Purge {
                    path: entry_path,
                    source,
                });
            }
        }
    }

    Ok(removed)
}
