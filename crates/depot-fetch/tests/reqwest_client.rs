use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use depot_fetch::{Backoff, ClientOptions, FetchError, Fetcher, ReqwestClient};
use depot_resource::{MirrorList, RegistryConfig, ResourceVersion, StorageLayout};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(dir: &TempDir, mirrors: &[&str]) -> Arc<RegistryConfig> {
    let layout = StorageLayout::new(dir.path().join("store"), dir.path().join("scratch")).unwrap();
    Arc::new(RegistryConfig::new("it", MirrorList::parse(mirrors).unwrap(), layout).unwrap())
}

fn client() -> ReqwestClient {
    ReqwestClient::with_options(&ClientOptions {
        connect_timeout: Duration::from_secs(2),
        timeout: Duration::from_secs(10),
        ..ClientOptions::default()
    })
    .unwrap()
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|mut it| it.next().is_none()).unwrap_or(true)
}

#[tokio::test]
async fn fetch_file_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dist/bin/tool_v1-2-3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![42u8; 1024]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let base = format!("{}/dist", server.uri());
    let config = config(&dir, &[base.as_str()]);
    let fetcher = Fetcher::new(config.clone(), client());
    let tool = ResourceVersion::new("bin/tool", "1.2.3").unwrap();

    let report = fetcher.fetch_file(&tool, 0).await.unwrap();

    assert_eq!(report.bytes, 1024);
    assert_eq!(std::fs::metadata(&report.destination).unwrap().len(), 1024);
    assert!(is_empty_dir(config.layout().scratch_dir()));
}

#[tokio::test]
async fn fetch_data_over_http() {
    let server = MockServer::start().await;
    let manifest = format!("{{\"bin/tool\":\"1.2.3\",\"pad\":\"{}\"}}", "x".repeat(227));
    assert_eq!(manifest.len(), 256);
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let base = server.uri();
    let config = config(&dir, &[base.as_str()]);
    let fetcher = Fetcher::new(config.clone(), client());

    let data = fetcher.fetch_data("manifest.json", 0).await.unwrap();

    assert_eq!(data.len(), 256);
    assert_eq!(&data[..], manifest.as_bytes());
    assert!(!config.layout().storage_root().exists());
}

#[tokio::test]
async fn not_found_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let base = server.uri();
    let config = config(&dir, &[base.as_str()]);
    let fetcher = Fetcher::new(config.clone(), client());
    let tool = ResourceVersion::new("bin/tool", "1.0").unwrap();

    let err = fetcher.fetch_file(&tool, 0).await.unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(!config.layout().storage_path(&tool).exists());
    assert!(is_empty_dir(config.layout().scratch_dir()));
}

#[tokio::test]
async fn second_attempt_uses_second_mirror() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bin/tool_v2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    // Nothing listens on port 1.
    let base = server.uri();
    let config = config(&dir, &["http://127.0.0.1:1/", base.as_str()]);
    let fetcher = Fetcher::new(config, client()).with_backoff(Backoff::Quadratic {
        unit: Duration::from_millis(10),
    });
    let tool = ResourceVersion::new("bin/tool", "2").unwrap();

    let err = fetcher.fetch_file(&tool, 0).await.unwrap_err();
    assert!(matches!(err, FetchError::Network { .. }));

    let report = fetcher.fetch_file(&tool, 1).await.unwrap();
    assert_eq!(report.attempt, 1);
    assert_eq!(report.bytes, 2);
}
