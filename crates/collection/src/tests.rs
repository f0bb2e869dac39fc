//! End-to-end tests over mock provider servers

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::CheckConfig;
use crate::controller::CollectionController;
use crate::item::{Item, ItemId, ItemMetadata, ItemStore, Loader};
use crate::provider::{FlameClient, ModrinthClient, Provider, ProviderRegistry};
use crate::resolver::{CheckOutcome, PlanEntry};

fn config() -> CheckConfig {
    init_tracing();
    CheckConfig::default()
        .with_game_version("1.20.1")
        .with_loader(Loader::Fabric)
}

/// Route engine logs through the test harness; first caller wins
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn modrinth_registry(server: &MockServer) -> Arc<ProviderRegistry> {
    Arc::new(
        ProviderRegistry::new(&config())
            .unwrap()
            .register(ModrinthClient::new().with_base_url(server.uri())),
    )
}

fn modrinth_item(id: &str, project_id: &str, file_id: &str) -> Item {
    Item::new(id, id).with_metadata(ItemMetadata {
        provider: Provider::Modrinth,
        project_id: project_id.to_string(),
        file_id: file_id.to_string(),
        version: "1.0.0".to_string(),
        dependencies: Vec::new(),
    })
}

fn modrinth_version(
    project_id: &str,
    file_id: &str,
    date: &str,
    loaders: &[&str],
    required: &[&str],
) -> Value {
    json!({
        "id": file_id,
        "project_id": project_id,
        "name": format!("Version {file_id}"),
        "version_number": format!("vn-{file_id}"),
        "date_published": date,
        "version_type": "release",
        "loaders": loaders,
        "game_versions": ["1.20.1"],
        "files": [ { "url": format!("https://cdn.example/{file_id}.jar"), "primary": true } ],
        "dependencies": required
            .iter()
            .map(|p| json!({ "project_id": p, "dependency_type": "required" }))
            .collect::<Vec<_>>()
    })
}

async fn mount_versions(server: &MockServer, project_id: &str, versions: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/project/{project_id}/version")))
        .respond_with(ResponseTemplate::new(200).set_body_json(versions))
        .mount(server)
        .await;
}

#[tokio::test]
async fn newest_compatible_version_becomes_the_candidate() {
    let server = MockServer::start().await;
    // f2 is the newest overall but for the wrong loader; f3 must win
    mount_versions(
        &server,
        "AABBCC",
        json!([
            modrinth_version("AABBCC", "f2", "2024-05-01T00:00:00Z", &["forge"], &[]),
            modrinth_version("AABBCC", "f3", "2024-04-01T00:00:00Z", &["fabric"], &[]),
            modrinth_version("AABBCC", "f1", "2024-01-01T00:00:00Z", &["fabric"], &[]),
        ]),
    )
    .await;

    let controller = CollectionController::new(
        ItemStore::from_items([modrinth_item("alpha", "AABBCC", "f1")]),
        config(),
        modrinth_registry(&server),
    );

    let report = controller.check_updates(None).await.unwrap();
    assert_eq!(report.updates.len(), 1);
    assert_eq!(report.updates[0].version.file_id, "f3");
    assert_eq!(report.updates[0].old_file_id, "f1");
    assert_eq!(
        report.outcomes[&ItemId::from("alpha")],
        CheckOutcome::UpdateAvailable { new_file_id: "f3".to_string() }
    );
}

#[tokio::test]
async fn installed_latest_reports_up_to_date() {
    let server = MockServer::start().await;
    mount_versions(
        &server,
        "AABBCC",
        json!([modrinth_version("AABBCC", "f1", "2024-01-01T00:00:00Z", &["fabric"], &[])]),
    )
    .await;

    let controller = CollectionController::new(
        ItemStore::from_items([modrinth_item("alpha", "AABBCC", "f1")]),
        config(),
        modrinth_registry(&server),
    );

    let report = controller.check_updates(None).await.unwrap();
    assert!(report.updates.is_empty());
    assert_eq!(report.outcomes[&ItemId::from("alpha")], CheckOutcome::UpToDate);
}

#[tokio::test]
async fn malformed_version_entry_is_skipped_not_fatal() {
    let server = MockServer::start().await;
    // First entry lacks a publish date and files; only f2 must survive
    mount_versions(
        &server,
        "AABBCC",
        json!([
            { "id": "broken", "project_id": "AABBCC" },
            modrinth_version("AABBCC", "f2", "2024-04-01T00:00:00Z", &["fabric"], &[]),
        ]),
    )
    .await;

    let controller = CollectionController::new(
        ItemStore::from_items([modrinth_item("alpha", "AABBCC", "f1")]),
        config(),
        modrinth_registry(&server),
    );

    let report = controller.check_updates(None).await.unwrap();
    assert_eq!(report.updates.len(), 1);
    assert_eq!(report.updates[0].version.file_id, "f2");
    assert_eq!(
        report.outcomes[&ItemId::from("alpha")],
        CheckOutcome::UpdateAvailable { new_file_id: "f2".to_string() }
    );
}

#[tokio::test]
async fn unparseable_version_payload_fails_the_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/project/AABBCC/version"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<!doctype html>"))
        .mount(&server)
        .await;

    let controller = CollectionController::new(
        ItemStore::from_items([modrinth_item("alpha", "AABBCC", "f1")]),
        config(),
        modrinth_registry(&server),
    );

    let report = controller.check_updates(None).await.unwrap();
    assert!(report.updates.is_empty());
    match &report.outcomes[&ItemId::from("alpha")] {
        CheckOutcome::Failed { reason, status } => {
            assert!(reason.contains("malformed response"), "reason: {reason}");
            assert_eq!(*status, None);
        }
        other => panic!("expected a parse failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_required_dependency_is_resolved_and_named() {
    let server = MockServer::start().await;
    mount_versions(
        &server,
        "AABBCC",
        json!([modrinth_version("AABBCC", "f2", "2024-04-01T00:00:00Z", &["fabric"], &["DEPLIB"])]),
    )
    .await;
    mount_versions(
        &server,
        "DEPLIB",
        json!([modrinth_version("DEPLIB", "d1", "2024-03-01T00:00:00Z", &["fabric"], &[])]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "DEPLIB", "title": "Dep Library" }
        ])))
        .mount(&server)
        .await;

    let controller = CollectionController::new(
        ItemStore::from_items([modrinth_item("alpha", "AABBCC", "f1")]),
        config(),
        modrinth_registry(&server),
    );

    let report = controller.check_updates(None).await.unwrap();
    assert_eq!(report.dependencies.len(), 1);
    let dep = &report.dependencies[0];
    assert_eq!(dep.project_id, "DEPLIB");
    assert_eq!(dep.name.as_deref(), Some("Dep Library"));
    assert_eq!(dep.version.file_id, "d1");
    assert_eq!(dep.required_by, vec!["alpha".into()]);

    // Direct updates come before dependency installs in the plan
    let plan = report.into_plan();
    assert_eq!(plan.len(), 2);
    assert!(matches!(plan[0], PlanEntry::Direct(_)));
    assert!(matches!(plan[1], PlanEntry::Dependency(_)));
}

#[tokio::test]
async fn installed_dependency_is_not_reported_pending() {
    let server = MockServer::start().await;
    mount_versions(
        &server,
        "AABBCC",
        json!([modrinth_version("AABBCC", "f2", "2024-04-01T00:00:00Z", &["fabric"], &["DEPLIB"])]),
    )
    .await;
    mount_versions(
        &server,
        "DEPLIB",
        json!([modrinth_version("DEPLIB", "d1", "2024-03-01T00:00:00Z", &["fabric"], &[])]),
    )
    .await;

    let controller = CollectionController::new(
        ItemStore::from_items([
            modrinth_item("alpha", "AABBCC", "f1"),
            modrinth_item("dep", "DEPLIB", "d1"),
        ]),
        config(),
        modrinth_registry(&server),
    );

    let report = controller.check_updates(Some(&["alpha".into()])).await.unwrap();
    assert_eq!(report.updates.len(), 1);
    assert!(report.dependencies.is_empty());
}

#[tokio::test]
async fn provider_failure_does_not_poison_the_other_provider() {
    let modrinth = MockServer::start().await;
    let flame = MockServer::start().await;
    mount_versions(
        &modrinth,
        "AABBCC",
        json!([modrinth_version("AABBCC", "f2", "2024-04-01T00:00:00Z", &["fabric"], &[])]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/mods/999/files"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&flame)
        .await;

    let registry = Arc::new(
        ProviderRegistry::new(&config())
            .unwrap()
            .register(ModrinthClient::new().with_base_url(modrinth.uri()))
            .register(FlameClient::new().with_base_url(flame.uri())),
    );
    let flame_item = Item::new("beta", "beta").with_metadata(ItemMetadata {
        provider: Provider::Flame,
        project_id: "999".to_string(),
        file_id: "1".to_string(),
        version: "1.0.0".to_string(),
        dependencies: Vec::new(),
    });
    let controller = CollectionController::new(
        ItemStore::from_items([modrinth_item("alpha", "AABBCC", "f1"), flame_item]),
        config(),
        registry,
    );

    let report = controller.check_updates(None).await.unwrap();
    assert_eq!(report.updates.len(), 1);
    assert_eq!(report.updates[0].item, "alpha".into());
    match &report.outcomes[&ItemId::from("beta")] {
        CheckOutcome::Failed { status, .. } => assert_eq!(*status, Some(500)),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn item_without_identity_is_unresolvable_without_network() {
    let server = MockServer::start().await;
    let controller = CollectionController::new(
        ItemStore::from_items([Item::new("mystery", "Mystery")]),
        config(),
        modrinth_registry(&server),
    );

    let report = controller.check_updates(None).await.unwrap();
    assert!(matches!(
        report.outcomes[&ItemId::from("mystery")],
        CheckOutcome::Unresolvable { .. }
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn fingerprint_identifies_a_metadata_less_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version_file/cafe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(modrinth_version(
            "AABBCC",
            "f1",
            "2024-01-01T00:00:00Z",
            &["fabric"],
            &[],
        )))
        .mount(&server)
        .await;
    mount_versions(
        &server,
        "AABBCC",
        json!([
            modrinth_version("AABBCC", "f2", "2024-04-01T00:00:00Z", &["fabric"], &[]),
            modrinth_version("AABBCC", "f1", "2024-01-01T00:00:00Z", &["fabric"], &[]),
        ]),
    )
    .await;

    let controller = CollectionController::new(
        ItemStore::from_items([Item::new("sideload", "Sideload").with_fingerprint("cafe")]),
        config(),
        modrinth_registry(&server),
    );

    let report = controller.check_updates(None).await.unwrap();
    assert_eq!(report.updates.len(), 1);
    assert_eq!(report.updates[0].old_file_id, "f1");
    assert_eq!(report.updates[0].version.file_id, "f2");
}

#[tokio::test]
async fn unknown_fingerprint_is_unresolvable_not_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version_file/dead"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let controller = CollectionController::new(
        ItemStore::from_items([Item::new("sideload", "Sideload").with_fingerprint("dead")]),
        config(),
        modrinth_registry(&server),
    );

    let report = controller.check_updates(None).await.unwrap();
    assert!(matches!(
        report.outcomes[&ItemId::from("sideload")],
        CheckOutcome::Unresolvable { .. }
    ));
}

#[tokio::test]
async fn abort_discards_partial_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/project/AABBCC/version"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([modrinth_version(
                    "AABBCC",
                    "f2",
                    "2024-04-01T00:00:00Z",
                    &["fabric"],
                    &[]
                )]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let controller = CollectionController::new(
        ItemStore::from_items([modrinth_item("alpha", "AABBCC", "f1")]),
        config(),
        modrinth_registry(&server),
    );

    let check = controller.begin_update_check(None);
    let handle = check.handle();
    let running = tokio::spawn(check.run());

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();
    assert!(handle.is_aborted());

    let report = running.await.unwrap().unwrap();
    assert!(report.aborted);
    assert!(report.updates.is_empty());
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn later_check_supersedes_an_earlier_one_for_the_same_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/project/AABBCC/version"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([modrinth_version(
                    "AABBCC",
                    "f2",
                    "2024-04-01T00:00:00Z",
                    &["fabric"],
                    &[]
                )]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let controller = CollectionController::new(
        ItemStore::from_items([modrinth_item("alpha", "AABBCC", "f1")]),
        config(),
        modrinth_registry(&server),
    );

    let first = tokio::spawn(controller.begin_update_check(None).run());
    // Let the first check issue its ticket before the second one starts
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = controller.check_updates(None).await.unwrap();

    // The first check's result arrived under a superseded ticket
    let first = first.await.unwrap().unwrap();
    assert!(first.updates.is_empty());
    assert!(first.outcomes.is_empty());

    assert_eq!(second.updates.len(), 1);
    assert_eq!(second.updates[0].version.file_id, "f2");
}
