use std::path::Path;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use depot_fs::AtomicFile;
use depot_resource::{RegistryConfig, ResourceVersion, join_url};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::Backoff;
use crate::data::FetchReport;
use crate::effects::http::{HttpClient, HttpResponse};
use crate::effects::sleep::{Sleeper, TokioSleeper};
use crate::error::{FetchError, Result};

/// Upper bound on the buffer reserved up front for in-memory fetches; the
/// declared length comes from the network and is not trusted for allocation.
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// Post-commit fix-up of a downloaded file's permissions.
pub type SetPermissions = fn(&Path) -> depot_fs::Result<()>;

fn set_executable(path: &Path) -> depot_fs::Result<()> {
    depot_fs::set_executable(path)
}

/// Performs single fetch attempts on behalf of one registry.
///
/// The fetcher never loops: attempt `t` waits out its backoff, goes to
/// mirror `t % len` and either succeeds or reports why it did not.
pub struct Fetcher<C: HttpClient, S = TokioSleeper> {
    config: Arc<RegistryConfig>,
    client: C,
    sleeper: S,
    backoff: Backoff,
    cancel: CancellationToken,
    set_permissions: SetPermissions,
}

impl<C: HttpClient> Fetcher<C> {
    pub fn new(config: Arc<RegistryConfig>, client: C) -> Self {
        Self {
            config,
            client,
            sleeper: TokioSleeper,
            backoff: Backoff::default(),
            cancel: CancellationToken::new(),
            set_permissions: set_executable,
        }
    }
}

impl<C: HttpClient, S: Sleeper> Fetcher<C, S> {
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> Fetcher<C, S2> {
        Fetcher {
            config: self.config,
            client: self.client,
            sleeper,
            backoff: self.backoff,
            cancel: self.cancel,
            set_permissions: self.set_permissions,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Abort in-flight and future attempts once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Replace the `0755` fix-up applied after each commit. A failure is
    /// logged and does not fail the fetch.
    pub fn with_permissions(mut self, set_permissions: SetPermissions) -> Self {
        self.set_permissions = set_permissions;
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn mirror_for(&self, attempt: u32) -> &Url {
        self.config.mirrors().select(attempt)
    }

    /// Download `resource` into its storage path.
    ///
    /// The destination is only ever replaced by a complete file whose length
    /// matches the declared `Content-Length`; any failure leaves it as it was
    /// and removes the temp file.
    pub async fn fetch_file(&self, resource: &ResourceVersion, attempt: u32) -> Result<FetchReport> {
        let name = self.config.name();
        let (mirror, url) = self.prepare(&resource.versioned_path(), attempt).await?;

        let destination = self.config.layout().storage_path(resource);
        if let Some(parent) = destination.parent() {
            depot_fs::ensure_dir(parent)?;
        }
        let staged = AtomicFile::create(self.config.layout().scratch_dir(), &destination)?;

        let response = self.request(&url).await?;
        let expected = response.content_length;
        let written = self.stream_to_file(&url, response, &staged).await?;
        verify_length(&url, written, expected)?;

        tokio::task::spawn_blocking(move || staged.commit())
            .await
            .map_err(|e| {
                FetchError::Commit(depot_fs::Error::Commit {
                    destination: destination.clone(),
                    source: std::io::Error::other(e),
                })
            })??;

        // TODO: only executables need 0755, data files could stay 0644 once
        // resources carry a kind.
        if let Err(e) = (self.set_permissions)(&destination) {
            tracing::warn!(
                "{name}: failed to set permissions on downloaded file {}: {e}",
                destination.display()
            );
        }

        tracing::info!("{name}: fetched {url} (stored to {})", destination.display());

        Ok(FetchReport {
            attempt,
            mirror,
            url,
            bytes: written,
            destination,
        })
    }

    /// Download `path` into memory; nothing touches the filesystem.
    pub async fn fetch_data(&self, path: &str, attempt: u32) -> Result<Bytes> {
        let (_, url) = self.prepare(path, attempt).await?;
        let mut response = self.request(&url).await?;

        let expected = response.content_length;
        let capacity = expected.unwrap_or(0).min(MAX_PREALLOCATION) as usize;
        let mut buffer = BytesMut::with_capacity(capacity);

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                chunk = response.body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    return Err(FetchError::IncompleteDownload {
                        url,
                        written: buffer.len() as u64,
                        expected,
                        source: Some(Box::new(e)),
                    });
                }
                None => break,
            }
        }

        verify_length(&url, buffer.len() as u64, expected)?;
        tracing::debug!("{}: fetched {url} ({} bytes)", self.config.name(), buffer.len());
        Ok(buffer.freeze())
    }

    /// Backoff, mirror selection and URL construction shared by both fetches.
    async fn prepare(&self, path: &str, attempt: u32) -> Result<(Url, Url)> {
        let delay = self.backoff.delay(attempt);
        if !delay.is_zero() {
            tracing::debug!(attempt, ?delay, "{}: backing off", self.config.name());
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = self.sleeper.sleep(delay) => {}
            }
        }
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let mirror = self.mirror_for(attempt).clone();
        let url = join_url(&mirror, path).map_err(|source| FetchError::MalformedUrl {
            mirror: mirror.clone(),
            path: path.to_string(),
            source,
        })?;
        tracing::debug!(attempt, %mirror, "{}: requesting {url}", self.config.name());

        Ok((mirror, url))
    }

    async fn request(&self, url: &Url) -> Result<HttpResponse<C::Error>> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
            result = self.client.get(url) => result,
        };
        let response = result.map_err(|e| FetchError::Network {
            url: url.clone(),
            source: Box::new(e),
        })?;

        if !(200..300).contains(&response.status) {
            return Err(FetchError::Status {
                url: url.clone(),
                status: response.status,
            });
        }
        Ok(response)
    }

    async fn stream_to_file(
        &self,
        url: &Url,
        mut response: HttpResponse<C::Error>,
        staged: &AtomicFile,
    ) -> Result<u64> {
        let staged_path = staged.path();
        let write_err = |source| {
            FetchError::Write(depot_fs::Error::Write {
                path: staged_path.to_path_buf(),
                source,
            })
        };

        let mut file = tokio::fs::File::from_std(staged.reopen()?);
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                chunk = response.body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await.map_err(write_err)?;
                    written += bytes.len() as u64;
                }
                Some(Err(e)) => {
                    return Err(FetchError::IncompleteDownload {
                        url: url.clone(),
                        written,
                        expected: response.content_length,
                        source: Some(Box::new(e)),
                    });
                }
                None => break,
            }
        }

        file.flush().await.map_err(write_err)?;
        // Our handle must be closed before the rename on Windows.
        drop(file);

        Ok(written)
    }
}

fn verify_length(url: &Url, written: u64, expected: Option<u64>) -> Result<()> {
    if expected == Some(written) {
        return Ok(());
    }
    Err(FetchError::IncompleteDownload {
        url: url.clone(),
        written,
        expected,
        source: None,
    })
}
