use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::replace::{ReplaceOptions, replace_file};
use crate::{Error, Result};

const TEMP_PREFIX: &str = ".depot-";
const TEMP_SUFFIX: &str = ".tmp";

/// Whether `name` looks like a file staged by [`AtomicFile::create`].
pub(crate) fn is_staged_name(name: &str) -> bool {
    name.len() > TEMP_PREFIX.len() + TEMP_SUFFIX.len()
        && name.starts_with(TEMP_PREFIX)
        && name.ends_with(TEMP_SUFFIX)
}

/// A pending replacement of `destination`.
///
/// Bytes go to a temp file in the scratch directory, never next to the
/// destination, so listings of the target directory only ever see complete
/// files. [`commit`](Self::commit) swaps the temp file into place in one
/// rename; dropping the value without committing removes the temp file.
#[derive(Debug)]
pub struct AtomicFile {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl AtomicFile {
    pub fn create(scratch_dir: impl AsRef<Path>, destination: impl Into<PathBuf>) -> Result<Self> {
        let scratch_dir = scratch_dir.as_ref();

        if !scratch_dir.exists() {
            std::fs::create_dir_all(scratch_dir).map_err(|source| Error::TempFile {
                dir: scratch_dir.to_path_buf(),
                source,
            })?;
        }

        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(scratch_dir)
            .map_err(|source| Error::TempFile {
                dir: scratch_dir.to_path_buf(),
                source,
            })?;

        Ok(Self {
            temp,
            destination: destination.into(),
        })
    }

    /// Location of the staged bytes.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Open another handle onto the temp file, e.g. for an async writer.
    ///
    /// The handle must be closed before [`commit`](Self::commit) on platforms
    /// that refuse to rename open files.
    pub fn reopen(&self) -> Result<File> {
        self.temp.reopen().map_err(|source| Error::Write {
            path: self.temp.path().to_path_buf(),
            source,
        })
    }

    /// Flush to stable storage and atomically replace the destination.
    ///
    /// The destination's parent directory must already exist. On failure the
    /// temp file is removed and the destination is untouched.
    pub fn commit(mut self) -> Result<()> {
        let staged = self.temp.path().to_path_buf();
        let write_err = |source| Error::Write {
            path: staged.clone(),
            source,
        };

        self.temp.flush().map_err(write_err)?;
        self.temp.as_file().sync_all().map_err(write_err)?;

        let Self { temp, destination } = self;

        // Closes our handle; the path is still deleted if the replace fails.
        let temp = temp.into_temp_path();
        replace_file(&temp, &destination, ReplaceOptions::default())?;

        // Renamed away, nothing left to delete.
        let _ = temp.keep();

        tracing::trace!(from = %staged.display(), to = %destination.display(), "committed");
        Ok(())
    }

    /// Discard the staged bytes.
    pub fn abort(self) {
        drop(self);
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}
