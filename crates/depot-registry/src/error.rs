use std::path::PathBuf;

use depot_fetch::FetchError;
use depot_resource::ResourceError;
use url::Url;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("retry policy needs at least one attempt")]
    InvalidPolicy,

    #[error("{resource}: giving up after {attempts} attempts, last mirror {mirror}: {source}")]
    Exhausted {
        resource: String,
        mirror: Url,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("{resource}: {source}")]
    Aborted {
        resource: String,
        #[source]
        source: FetchError,
    },

    #[error("malformed resource index {path}: {source}")]
    Index {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fs(#[from] depot_fs::Error),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("failed to load configuration: {0}")]
    Config(#[source] Box<figment::Error>),
}

impl From<figment::Error> for RegistryError {
    fn from(e: figment::Error) -> Self {
        Self::Config(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
