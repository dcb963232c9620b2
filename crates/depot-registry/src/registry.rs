use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use depot_fetch::{Backoff, FetchError, FetchReport, Fetcher, HttpClient, Sleeper, TokioSleeper};
use depot_resource::{RegistryConfig, ResourceVersion, unpack_versioned_path};
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    InstalledRecord, MemoryStore, RegistryError, ResourceIndex, Result, RetryPolicy, VersionStore,
};

/// Parallel installs in [`ResourceRegistry::install_all`] unless configured.
pub const DEFAULT_CONCURRENCY: usize = 4;

pub struct RegistryBuilder<C: HttpClient, S: Sleeper = TokioSleeper> {
    fetcher: Fetcher<C, S>,
    policy: Option<RetryPolicy>,
    store: Arc<dyn VersionStore>,
    concurrency: usize,
}

impl<C: HttpClient> RegistryBuilder<C> {
    fn new(config: Arc<RegistryConfig>, client: C) -> Self {
        Self {
            fetcher: Fetcher::new(config, client),
            policy: None,
            store: Arc::new(MemoryStore::new()),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl<C: HttpClient, S: Sleeper> RegistryBuilder<C, S> {
    pub fn sleeper<S2: Sleeper>(self, sleeper: S2) -> RegistryBuilder<C, S2> {
        RegistryBuilder {
            fetcher: self.fetcher.with_sleeper(sleeper),
            policy: self.policy,
            store: self.store,
            concurrency: self.concurrency,
        }
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.fetcher = self.fetcher.with_backoff(backoff);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.fetcher = self.fetcher.with_cancellation(token);
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn store(mut self, store: impl VersionStore + 'static) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn build(self) -> ResourceRegistry<C, S> {
        let policy = self
            .policy
            .unwrap_or_else(|| RetryPolicy::default_for(self.fetcher.config().mirrors()));
        ResourceRegistry {
            fetcher: self.fetcher,
            policy,
            store: self.store,
            concurrency: self.concurrency,
        }
    }

    /// [`build`](Self::build), then provision the storage and scratch
    /// directories and purge whatever an earlier run left in scratch.
    pub fn open(self) -> Result<ResourceRegistry<C, S>> {
        let registry = self.build();
        registry.prepare_storage()?;
        Ok(registry)
    }
}

/// Fetches resources of one registry with retries across its mirrors and
/// records what got installed.
///
/// Cheap to share behind an `Arc`; every operation takes `&self` and runs
/// independently of the others.
pub struct ResourceRegistry<C: HttpClient, S: Sleeper = TokioSleeper> {
    fetcher: Fetcher<C, S>,
    policy: RetryPolicy,
    store: Arc<dyn VersionStore>,
    concurrency: usize,
}

impl<C: HttpClient> ResourceRegistry<C> {
    pub fn new(config: Arc<RegistryConfig>, client: C) -> Self {
        Self::builder(config, client).build()
    }

    pub fn builder(config: Arc<RegistryConfig>, client: C) -> RegistryBuilder<C> {
        RegistryBuilder::new(config, client)
    }
}

impl<C: HttpClient, S: Sleeper> ResourceRegistry<C, S> {
    pub fn config(&self) -> &RegistryConfig {
        self.fetcher.config()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn store(&self) -> &dyn VersionStore {
        self.store.as_ref()
    }

    /// Download `resource` into its versioned storage path.
    pub async fn fetch_file(&self, resource: &ResourceVersion) -> Result<FetchReport> {
        let label = resource.to_string();
        self.retry(&label, |attempt| self.fetcher.fetch_file(resource, attempt))
            .await
    }

    /// Download the resource at `path` into memory.
    pub async fn fetch_data(&self, path: &str) -> Result<Bytes> {
        self.retry(path, |attempt| self.fetcher.fetch_data(path, attempt))
            .await
    }

    pub async fn fetch_index(&self, path: &str) -> Result<ResourceIndex> {
        let raw = self.fetch_data(path).await?;
        ResourceIndex::from_slice(&raw).map_err(|source| RegistryError::Index {
            path: path.to_string(),
            source,
        })
    }

    /// Fetch `resource` and record it as the installed version of its
    /// identifier.
    pub async fn install(&self, resource: &ResourceVersion) -> Result<InstalledRecord> {
        let report = self.fetch_file(resource).await?;
        let record = InstalledRecord::new(resource, report.destination, report.bytes);
        self.store.put(record.clone())?;
        Ok(record)
    }

    pub fn installed(&self, identifier: &str) -> Result<Option<InstalledRecord>> {
        Ok(self.store.get(identifier)?)
    }

    /// Install every resource, at most `concurrency` at a time.
    ///
    /// Repeated `(identifier, version)` pairs are fetched once. Results come
    /// back in completion order; one failure does not stop the others.
    pub async fn install_all<I>(&self, resources: I) -> Vec<(ResourceVersion, Result<InstalledRecord>)>
    where
        I: IntoIterator<Item = ResourceVersion>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<_> = resources
            .into_iter()
            .filter(|resource| seen.insert(resource.clone()))
            .collect();

        stream::iter(unique)
            .map(|resource| async move {
                let result = self.install(&resource).await;
                (resource, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// Fetch the index at `path` and install every entry whose version differs
    /// from the recorded one.
    pub async fn update(&self, index_path: &str) -> Result<Vec<(ResourceVersion, Result<InstalledRecord>)>> {
        let index = self.fetch_index(index_path).await?;
        let mut pending = Vec::new();
        for resource in index.resources()? {
            match self.installed(resource.identifier())? {
                Some(record) if record.version == resource.version() => {
                    debug!("{}: {resource} is up to date", self.config().name());
                }
                _ => pending.push(resource),
            }
        }
        Ok(self.install_all(pending).await)
    }

    /// Remove temp files left in the scratch directory, returning how many.
    pub fn clean_scratch(&self) -> Result<usize> {
        let scratch = self.config().layout().scratch_dir();
        let removed = depot_fs::purge_dir(scratch)?;
        if removed > 0 {
            info!(
                "{}: removed {removed} leftover file(s) from {}",
                self.config().name(),
                scratch.display()
            );
        }
        Ok(removed)
    }

    /// Every versioned file below the storage root, sorted.
    pub fn scan_storage(&self) -> Result<Vec<ResourceVersion>> {
        let layout = self.config().layout();
        let root = layout.storage_root();

        let mut found = Vec::new();
        for entry in walkdir::WalkDir::new(root) {
            let entry = entry.map_err(|source| RegistryError::Scan {
                path: root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = relative_identifier(root, entry.path()) else {
                continue;
            };
            match unpack_versioned_path(&relative)
                .and_then(|(identifier, version)| ResourceVersion::new(identifier, version).ok())
            {
                Some(resource) => found.push(resource),
                None => debug!("ignoring unversioned file {}", entry.path().display()),
            }
        }

        found.sort();
        Ok(found)
    }

    fn prepare_storage(&self) -> Result<()> {
        let scratch = self.config().layout().scratch_dir();
        depot_fs::ensure_dir(scratch)?;
        for dir in self.commit_dirs() {
            depot_fs::ensure_dir(dir)?;
        }
        for dir in cross_device_dirs(scratch, &self.commit_dirs()) {
            warn!(
                "{}: scratch dir {} is on a different filesystem than {}, commits will fail",
                self.config().name(),
                scratch.display(),
                dir.display()
            );
        }
        self.clean_scratch()?;
        Ok(())
    }

    /// Directories that receive renames out of the scratch dir.
    fn commit_dirs(&self) -> Vec<&Path> {
        let mut dirs = vec![self.config().layout().storage_root()];
        if let Some(parent) = self.store.location().and_then(Path::parent)
            && !parent.as_os_str().is_empty()
        {
            dirs.push(parent);
        }
        dirs
    }

    async fn retry<T, F, Fut>(&self, resource: &str, mut attempt_once: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = depot_fetch::Result<T>>,
    {
        let name = self.config().name();
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            let source = match attempt_once(attempt).await {
                Ok(value) => return Ok(value),
                Err(source) => source,
            };

            if !source.is_retryable() {
                return Err(RegistryError::Aborted {
                    resource: resource.to_string(),
                    source,
                });
            }
            if self.policy.is_last(attempt) {
                return Err(exhausted(resource, self.fetcher.mirror_for(attempt), attempt + 1, source));
            }

            warn!(
                "{name}: failed to fetch {resource} (attempt {}/{max_attempts}): {source}",
                attempt + 1
            );
            attempt += 1;
        }
    }
}

fn exhausted(resource: &str, mirror: &url::Url, attempts: u32, source: FetchError) -> RegistryError {
    RegistryError::Exhausted {
        resource: resource.to_string(),
        mirror: mirror.clone(),
        attempts,
        source,
    }
}

/// Entries of `dirs` that live on another device than `scratch`.
#[cfg(unix)]
fn cross_device_dirs<'a>(scratch: &Path, dirs: &[&'a Path]) -> Vec<&'a Path> {
    use std::os::unix::fs::MetadataExt;

    let device = |path: &Path| std::fs::metadata(path).map(|m| m.dev()).ok();
    let Some(scratch) = device(scratch) else {
        return Vec::new();
    };
    dirs.iter()
        .copied()
        .filter(|dir| device(*dir).is_some_and(|dev| dev != scratch))
        .collect()
}

#[cfg(not(unix))]
fn cross_device_dirs<'a>(_scratch: &Path, _dirs: &[&'a Path]) -> Vec<&'a Path> {
    Vec::new()
}

/// `path` relative to `root`, with `/` separators.
fn relative_identifier(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use depot_fetch::mock::{MockClient, MockResponse, RecordingSleeper};
    use depot_resource::{MirrorList, StorageLayout};
    use tempfile::{TempDir, tempdir};

    use super::*;

    const MIRROR_A: &str = "https://a.example.com/";
    const MIRROR_B: &str = "https://b.example.com/";

    fn config(dir: &TempDir, mirrors: &[&str]) -> Arc<RegistryConfig> {
        let layout = StorageLayout::new(dir.path().join("store"), dir.path().join("scratch")).unwrap();
        let mirrors = MirrorList::parse(mirrors).unwrap();
        Arc::new(RegistryConfig::new("updates", mirrors, layout).unwrap())
    }

    fn registry(
        dir: &TempDir,
        mirrors: &[&str],
        client: MockClient,
        sleeper: RecordingSleeper,
    ) -> ResourceRegistry<MockClient, RecordingSleeper> {
        ResourceRegistry::builder(config(dir, mirrors), client)
            .sleeper(sleeper)
            .open()
            .unwrap()
    }

    fn tool() -> ResourceVersion {
        ResourceVersion::new("bin/tool", "1.2.3").unwrap()
    }

    #[tokio::test]
    async fn test_fails_over_to_second_mirror() {
        let dir = tempdir().unwrap();
        let client = MockClient::new()
            .route("https://a.example.com/bin/tool_v1-2-3", MockResponse::refused())
            .route("https://b.example.com/bin/tool_v1-2-3", MockResponse::ok(vec![7u8; 512]));
        let sleeper = RecordingSleeper::default();
        let registry = registry(&dir, &[MIRROR_A, MIRROR_B], client.clone(), sleeper.clone());

        let report = registry.fetch_file(&tool()).await.unwrap();

        assert_eq!(report.attempt, 1);
        assert_eq!(report.mirror.as_str(), MIRROR_B);
        assert_eq!(sleeper.delays(), [Duration::from_secs(1)]);
        assert_eq!(
            client.requests(),
            [
                "https://a.example.com/bin/tool_v1-2-3",
                "https://b.example.com/bin/tool_v1-2-3"
            ]
        );
        assert_eq!(std::fs::read(&report.destination).unwrap(), vec![7u8; 512]);
    }

    #[tokio::test]
    async fn test_exhaustion_names_last_mirror_and_cause() {
        let dir = tempdir().unwrap();
        let client = MockClient::new()
            .route("https://a.example.com/bin/tool_v1-2-3", MockResponse::status(503))
            .route("https://b.example.com/bin/tool_v1-2-3", MockResponse::status(404));
        let sleeper = RecordingSleeper::default();
        let registry = ResourceRegistry::builder(config(&dir, &[MIRROR_A, MIRROR_B]), client.clone())
            .sleeper(sleeper.clone())
            .policy(RetryPolicy::new(3).unwrap())
            .open()
            .unwrap();

        let err = registry.fetch_file(&tool()).await.unwrap_err();

        match err {
            RegistryError::Exhausted {
                resource,
                mirror,
                attempts,
                source,
            } => {
                assert_eq!(resource, "bin/tool@1.2.3");
                assert_eq!(attempts, 3);
                assert_eq!(mirror.as_str(), MIRROR_A);
                assert!(matches!(source, FetchError::Status { status: 503, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.requests().len(), 3);
        assert_eq!(
            sleeper.delays(),
            [Duration::from_secs(1), Duration::from_secs(4)]
        );
        assert!(!dir.path().join("store/bin/tool_v1-2-3").exists());
    }

    #[tokio::test]
    async fn test_default_budget_gives_every_mirror_a_turn() {
        let dir = tempdir().unwrap();
        let mirrors: Vec<String> = (0..7).map(|i| format!("https://m{i}.example.com/")).collect();
        let mirrors: Vec<&str> = mirrors.iter().map(String::as_str).collect();
        let client = MockClient::new().route(
            "https://m6.example.com/bin/tool_v1-2-3",
            MockResponse::ok(&b"payload"[..]),
        );
        let registry = ResourceRegistry::builder(config(&dir, &mirrors), client)
            .sleeper(RecordingSleeper::default())
            .backoff(Backoff::None)
            .open()
            .unwrap();

        assert_eq!(registry.policy().max_attempts(), 7);
        let report = registry.fetch_file(&tool()).await.unwrap();
        assert_eq!(report.attempt, 6);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retrying() {
        let dir = tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let client = MockClient::new();
        let registry = ResourceRegistry::builder(config(&dir, &[MIRROR_A]), client.clone())
            .sleeper(RecordingSleeper::default())
            .cancellation(token)
            .open()
            .unwrap();

        let err = registry.fetch_file(&tool()).await.unwrap_err();

        assert!(matches!(
            err,
            RegistryError::Aborted {
                source: FetchError::Cancelled,
                ..
            }
        ));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_index() {
        let dir = tempdir().unwrap();
        let client = MockClient::new()
            .route(
                "https://a.example.com/stable.json",
                MockResponse::ok(&br#"{"bin/tool": "1.2.3", "all/ui/base.zip": "0.9.0"}"#[..]),
            )
            .route("https://a.example.com/broken.json", MockResponse::ok(&b"<html>"[..]));
        let registry = registry(&dir, &[MIRROR_A], client, RecordingSleeper::default());

        let index = registry.fetch_index("stable.json").await.unwrap();
        assert_eq!(index.get("bin/tool"), Some("1.2.3"));
        assert_eq!(index.len(), 2);

        let err = registry.fetch_index("broken.json").await.unwrap_err();
        assert!(matches!(err, RegistryError::Index { ref path, .. } if path == "broken.json"));
    }

    #[tokio::test]
    async fn test_install_records_version() {
        let dir = tempdir().unwrap();
        let client = MockClient::new()
            .route("https://a.example.com/bin/tool_v1-2-3", MockResponse::ok(vec![1u8; 64]));
        let registry = registry(&dir, &[MIRROR_A], client, RecordingSleeper::default());

        assert_eq!(registry.installed("bin/tool").unwrap(), None);

        let record = registry.install(&tool()).await.unwrap();
        assert_eq!(record.version, "1.2.3");
        assert_eq!(record.bytes, 64);
        assert_eq!(record.path, dir.path().join("store/bin/tool_v1-2-3"));
        assert_eq!(registry.installed("bin/tool").unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_install_all_dedupes_and_reports_each() {
        let dir = tempdir().unwrap();
        let client = MockClient::new()
            .route("https://a.example.com/bin/tool_v1-2-3", MockResponse::ok(&b"tool"[..]))
            .route("https://a.example.com/lib/core_v2-0-0.so", MockResponse::ok(&b"core"[..]));
        let registry = ResourceRegistry::builder(config(&dir, &[MIRROR_A]), client.clone())
            .sleeper(RecordingSleeper::default())
            .policy(RetryPolicy::new(2).unwrap())
            .concurrency(2)
            .open()
            .unwrap();

        let batch = vec![
            tool(),
            ResourceVersion::new("lib/core.so", "2.0.0").unwrap(),
            tool(),
            ResourceVersion::new("bin/missing", "1.0.0").unwrap(),
        ];
        let mut results = registry.install_all(batch).await;
        results.sort_by(|a, b| a.0.identifier().cmp(b.0.identifier()));

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0].1, Err(RegistryError::Exhausted { attempts: 2, .. })));
        assert!(results[1].1.is_ok());
        assert!(results[2].1.is_ok());

        let tool_requests = client
            .requests()
            .iter()
            .filter(|url| url.ends_with("tool_v1-2-3"))
            .count();
        assert_eq!(tool_requests, 1);
        assert_eq!(registry.installed("lib/core.so").unwrap().unwrap().version, "2.0.0");
    }

    #[tokio::test]
    async fn test_update_skips_current_versions() {
        let dir = tempdir().unwrap();
        let client = MockClient::new()
            .route(
                "https://a.example.com/stable.json",
                MockResponse::ok(&br#"{"bin/tool": "1.2.3", "bin/other": "0.1.0"}"#[..]),
            )
            .route("https://a.example.com/bin/tool_v1-2-3", MockResponse::ok(&b"tool"[..]))
            .route("https://a.example.com/bin/other_v0-1-0", MockResponse::ok(&b"other"[..]));
        let registry = registry(&dir, &[MIRROR_A], client.clone(), RecordingSleeper::default());
        registry.install(&tool()).await.unwrap();

        let results = registry.update("stable.json").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.identifier(), "bin/other");
        assert!(results[0].1.is_ok());
        let tool_requests = client
            .requests()
            .iter()
            .filter(|url| url.ends_with("tool_v1-2-3"))
            .count();
        assert_eq!(tool_requests, 1);
    }

    #[test]
    fn test_open_purges_scratch_and_scan_finds_versions() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        let store = dir.path().join("store");
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::create_dir_all(store.join("bin")).unwrap();
        std::fs::write(scratch.join(".depot-leftover.tmp"), b"partial").unwrap();
        std::fs::write(scratch.join("notes.txt"), b"not ours").unwrap();
        std::fs::create_dir_all(scratch.join("keep/inner")).unwrap();
        std::fs::write(store.join("bin/tool_v1-2-3"), b"tool").unwrap();
        std::fs::write(store.join("bin/tool_v1-2-4"), b"tool").unwrap();
        std::fs::write(store.join("README"), b"not versioned").unwrap();

        let registry = registry(&dir, &[MIRROR_A], MockClient::new(), RecordingSleeper::default());

        assert!(!scratch.join(".depot-leftover.tmp").exists());
        assert_eq!(std::fs::read(scratch.join("notes.txt")).unwrap(), b"not ours");
        assert!(scratch.join("keep/inner").is_dir());
        assert_eq!(std::fs::read(store.join("bin/tool_v1-2-3")).unwrap(), b"tool");
        let found: Vec<String> = registry
            .scan_storage()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(found, ["bin/tool@1.2.3", "bin/tool@1.2.4"]);
        assert_eq!(registry.clean_scratch().unwrap(), 0);
    }

    #[test]
    fn test_open_provisions_state_dir_alongside_storage() {
        let dir = tempdir().unwrap();
        let state = dir.path().join("state/installed.json");
        let registry = ResourceRegistry::builder(config(&dir, &[MIRROR_A]), MockClient::new())
            .store(crate::JsonFileStore::new(&state, dir.path().join("scratch")))
            .open()
            .unwrap();

        let commit_dirs = registry.commit_dirs();
        assert_eq!(commit_dirs, [dir.path().join("store"), dir.path().join("state")]);
        assert!(dir.path().join("state").is_dir());
        assert!(cross_device_dirs(registry.config().layout().scratch_dir(), &commit_dirs).is_empty());
    }

    #[test]
    fn test_memory_store_adds_no_commit_dir() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir, &[MIRROR_A], MockClient::new(), RecordingSleeper::default());
        assert_eq!(registry.commit_dirs(), [dir.path().join("store")]);
    }
}
