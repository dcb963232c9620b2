//! Error types for depot-fetch.

use depot_resource::ResourceError;
use url::Url;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a single fetch attempt failed.
///
/// Everything except [`FetchError::Cancelled`] is worth another attempt:
/// the next one rotates to a different mirror and waits longer first.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("cannot build download URL from {mirror} and '{path}'")]
    MalformedUrl {
        mirror: Url,
        path: String,
        #[source]
        source: ResourceError,
    },

    #[error(transparent)]
    DirectoryProvision(depot_fs::Error),

    #[error(transparent)]
    TempFile(depot_fs::Error),

    #[error("request to {url} failed: {source}")]
    Network {
        url: Url,
        #[source]
        source: BoxError,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: Url, status: u16 },

    #[error(
        "incomplete download from {url}: received {written} of {} bytes",
        .expected.map_or_else(|| "unknown".to_string(), |n| n.to_string())
    )]
    IncompleteDownload {
        url: Url,
        written: u64,
        expected: Option<u64>,
        #[source]
        source: Option<BoxError>,
    },

    #[error(transparent)]
    Write(depot_fs::Error),

    #[error(transparent)]
    Commit(depot_fs::Error),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl From<depot_fs::Error> for FetchError {
    fn from(e: depot_fs::Error) -> Self {
        match e {
            depot_fs::Error::DirectoryProvision { .. } => Self::DirectoryProvision(e),
            depot_fs::Error::TempFile { .. } => Self::TempFile(e),
            depot_fs::Error::Commit { .. } => Self::Commit(e),
            _ => Self::Write(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
