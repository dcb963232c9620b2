use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create directory {path}: {source}")]
    DirectoryProvision { path: PathBuf, source: io::Error },

    #[error("failed to create temp file in {dir}: {source}")]
    TempFile { dir: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to replace {destination}: {source}")]
    Commit {
        destination: PathBuf,
        source: io::Error,
    },

    #[error("failed to set permissions on {path}: {source}")]
    Permissions { path: PathBuf, source: io::Error },

    #[error("failed to purge {path}: {source}")]
    Purge { path: PathBuf, source: io::Error },
}

impl Error {
    /// Path the failed operation was working on.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::DirectoryProvision { path, .. }
            | Self::Write { path, .. }
            | Self::Permissions { path, .. }
            | Self::Purge { path, .. } => path,
            Self::TempFile { dir, .. } => dir,
            Self::Commit { destination, .. } => destination,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
