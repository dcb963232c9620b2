//! Results of a successful fetch attempt.

use std::path::PathBuf;

use url::Url;

/// Outcome of a committed `fetch_file` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Zero-based attempt index that succeeded.
    pub attempt: u32,
    pub mirror: Url,
    pub url: Url,
    /// Bytes written; always equal to the declared `Content-Length`.
    pub bytes: u64,
    pub destination: PathBuf,
}
