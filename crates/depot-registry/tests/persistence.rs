use std::sync::Arc;

use depot_fetch::Backoff;
use depot_fetch::mock::{MockClient, MockResponse, RecordingSleeper};
use depot_registry::{JsonFileStore, ResourceRegistry, VersionStore};
use depot_resource::{MirrorList, RegistryConfig, ResourceVersion, StorageLayout};
use tempfile::tempdir;

fn config(root: &std::path::Path) -> Arc<RegistryConfig> {
    let layout = StorageLayout::new(root.join("store"), root.join("scratch")).unwrap();
    let mirrors = MirrorList::parse(["https://updates.example.com/dist/"]).unwrap();
    Arc::new(RegistryConfig::new("updates", mirrors, layout).unwrap())
}

#[tokio::test]
async fn installed_versions_survive_restart() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state/installed.json");
    let scratch = dir.path().join("scratch");
    let client = MockClient::new()
        .route(
            "https://updates.example.com/dist/bin/tool_v1-2-3",
            MockResponse::ok(vec![0xAB; 2048]),
        )
        .route(
            "https://updates.example.com/dist/all/ui/base_v0-9-0.zip",
            MockResponse::ok(vec![0xCD; 100]),
        );

    {
        let registry = ResourceRegistry::builder(config(dir.path()), client.clone())
            .sleeper(RecordingSleeper::default())
            .backoff(Backoff::None)
            .store(JsonFileStore::new(&state, &scratch))
            .open()
            .unwrap();

        let results = registry
            .install_all([
                ResourceVersion::new("bin/tool", "1.2.3").unwrap(),
                ResourceVersion::new("all/ui/base.zip", "0.9.0").unwrap(),
            ])
            .await;
        assert!(results.iter().all(|(_, result)| result.is_ok()));
    }

    let store = JsonFileStore::new(&state, &scratch);
    let tool = store.get("bin/tool").unwrap().unwrap();
    assert_eq!(tool.version, "1.2.3");
    assert_eq!(tool.bytes, 2048);
    assert_eq!(std::fs::read(&tool.path).unwrap().len(), 2048);
    assert_eq!(store.records().unwrap().len(), 2);

    let reopened = ResourceRegistry::builder(config(dir.path()), client)
        .store(store)
        .open()
        .unwrap();
    assert_eq!(
        reopened.installed("all/ui/base.zip").unwrap().unwrap().version,
        "0.9.0"
    );
    assert_eq!(reopened.scan_storage().unwrap().len(), 2);
    assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
}
