use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("malformed URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("mirror list is empty")]
    NoMirrors,

    #[error("invalid resource identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("invalid version token '{0}'")]
    InvalidVersion(String),

    #[error("{role} directory must be absolute: {path}")]
    RelativeDirectory { role: &'static str, path: PathBuf },

    #[error("storage root and scratch directory must differ: {0}")]
    SharedDirectory(PathBuf),

    #[error("storage root {storage_root} and scratch directory {scratch_dir} must not contain each other")]
    NestedDirectories {
        storage_root: PathBuf,
        scratch_dir: PathBuf,
    },

    #[error("registry name must not be empty")]
    EmptyName,
}

impl ResourceError {
    pub(crate) fn malformed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ResourceError>;
