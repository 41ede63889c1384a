mod common;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use assert_matches::assert_matches;
use predicates::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use common::{configured, repo, RecordingVcs, StaticCatalog};
use repo_mirror::{CatalogResponse, ConfigStore, Orchestrator, RunOutcome, RunSettings, RunState};

fn settings(temp: &TempDir) -> RunSettings {
    RunSettings {
        mount_roots: vec![temp.path().join("media")],
        fallback_root: temp.path().join("backups"),
        mirror_dir_name: "github".to_string(),
        api_url: "http://127.0.0.1:9".to_string(),
        operation_timeout: Duration::from_secs(5),
    }
}

fn orchestrator(
    temp: &TempDir,
    catalog: &Arc<StaticCatalog>,
    vcs: &Arc<RecordingVcs>,
) -> Orchestrator<Arc<StaticCatalog>, Arc<RecordingVcs>> {
    Orchestrator::new(
        ConfigStore::new(temp.path().join("config.json")),
        settings(temp),
        Arc::clone(catalog),
        Arc::clone(vcs),
    )
}

#[tokio::test]
async fn test_first_run_requires_setup() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(StaticCatalog::with_repos(vec![repo("alpha")]));
    let vcs = Arc::new(RecordingVcs::new());
    let mut orchestrator = orchestrator(&temp, &catalog, &vcs);

    let outcome = orchestrator.run().await;

    assert_matches!(outcome, RunOutcome::SetupRequired { config_path } => {
        assert_eq!(config_path, temp.path().join("config.json"));
    });
    assert_eq!(orchestrator.state(), RunState::Done);
    temp.child("config.json")
        .assert(predicate::str::contains("\"github_name\": \"\""));
    assert!(catalog.calls().is_empty());
    assert!(vcs.calls().is_empty());
}

#[tokio::test]
async fn test_full_run_resolves_device_and_persists_tracked_set() {
    let temp = TempDir::new().unwrap();
    temp.child("media/usb0").create_dir_all().unwrap();
    let store = ConfigStore::new(temp.path().join("config.json"));
    let mut config = configured(temp.path(), &[]);
    config.save_path.clear();
    store.save(&config).unwrap();

    let catalog = Arc::new(StaticCatalog::with_repos(vec![repo("alpha"), repo("beta")]));
    let vcs = Arc::new(RecordingVcs::new());
    let mut orchestrator = orchestrator(&temp, &catalog, &vcs);

    let outcome = orchestrator.run().await;

    let expected_root = temp.path().join("media").join("usb0").join("github");
    assert_matches!(outcome, RunOutcome::Success(report) => {
        assert_eq!(report.storage_root, expected_root);
        assert_eq!(report.catalog_size, 2);
        assert_eq!(report.summary.cloned, 2);
    });
    assert_eq!(catalog.calls(), vec![("octocat".to_string(), true)]);

    let saved = store.load().unwrap().config;
    assert_eq!(saved.storage_path(), Some(expected_root.clone()));
    assert_eq!(
        saved.existing_files.iter().cloned().collect::<Vec<_>>(),
        vec!["alpha".to_string(), "beta".to_string()]
    );
    temp.child("media/usb0/github/alpha")
        .assert(predicate::path::is_dir());
}

#[tokio::test]
async fn test_second_run_updates_without_cloning() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("config.json"));
    store.save(&configured(&temp.path().join("mirror"), &[])).unwrap();

    let catalog = Arc::new(StaticCatalog::with_repos(vec![repo("alpha")]));
    let vcs = Arc::new(RecordingVcs::new());

    assert_matches!(orchestrator(&temp, &catalog, &vcs).run().await, RunOutcome::Success(_));
    assert_matches!(orchestrator(&temp, &catalog, &vcs).run().await, RunOutcome::Success(report) => {
        assert_eq!(report.summary.cloned, 0);
        assert_eq!(report.summary.updated, 1);
    });
    assert_eq!(vcs.clone_count(), 1);
    assert_eq!(vcs.update_count(), 1);
}

#[tokio::test]
async fn test_missing_configured_storage_is_created() {
    let temp = TempDir::new().unwrap();
    let storage = temp.path().join("gone").join("github");
    let store = ConfigStore::new(temp.path().join("config.json"));
    store.save(&configured(&storage, &["kept"])).unwrap();

    let catalog = Arc::new(StaticCatalog::with_repos(Vec::new()));
    let vcs = Arc::new(RecordingVcs::new());

    let outcome = orchestrator(&temp, &catalog, &vcs).run().await;

    assert_matches!(outcome, RunOutcome::Success(report) => {
        assert_eq!(report.storage_root, storage);
        assert_eq!(report.summary.operations(), 0);
    });
    assert!(storage.is_dir());
    assert!(store.load().unwrap().config.existing_files.contains("kept"));
}

#[tokio::test]
async fn test_rejected_token_falls_back_to_public_listing() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("config.json"));
    store.save(&configured(&temp.path().join("mirror"), &[])).unwrap();

    let catalog = Arc::new(StaticCatalog::scripted(vec![
        CatalogResponse::Unauthorized,
        CatalogResponse::Ok(vec![repo("public-one")]),
    ]));
    let vcs = Arc::new(RecordingVcs::new());

    let outcome = orchestrator(&temp, &catalog, &vcs).run().await;

    assert_matches!(outcome, RunOutcome::Success(_));
    assert_eq!(
        catalog.calls(),
        vec![("octocat".to_string(), true), ("octocat".to_string(), false)]
    );
    assert_eq!(vcs.clone_count(), 1);
}

#[tokio::test]
async fn test_invalid_config_is_reset_and_run_continues() {
    let temp = TempDir::new().unwrap();
    temp.child("config.json").write_str("{ not json").unwrap();

    let catalog = Arc::new(StaticCatalog::with_repos(Vec::new()));
    let vcs = Arc::new(RecordingVcs::new());

    let outcome = orchestrator(&temp, &catalog, &vcs).run().await;

    assert_matches!(outcome, RunOutcome::Success(report) => {
        assert_eq!(report.storage_root, temp.path().join("backups"));
    });
    let saved = ConfigStore::new(temp.path().join("config.json"))
        .load()
        .unwrap();
    assert!(!saved.reset);
    assert_eq!(saved.config.storage_path(), Some(temp.path().join("backups")));
}

#[tokio::test]
async fn test_final_save_failure_is_a_run_failure() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("config.json"));
    store.save(&configured(&temp.path().join("mirror"), &[])).unwrap();
    // The temporary file used for the atomic write cannot be created
    temp.child("config.json.tmp").create_dir_all().unwrap();

    let catalog = Arc::new(StaticCatalog::with_repos(vec![repo("alpha")]));
    let vcs = Arc::new(RecordingVcs::new());
    let mut orchestrator = orchestrator(&temp, &catalog, &vcs);

    let outcome = orchestrator.run().await;

    assert!(outcome.is_failure());
    assert_matches!(outcome, RunOutcome::Failure { reason, reached } => {
        assert_eq!(reached, RunState::Reconciled);
        assert!(reason.contains("persist"), "{}", reason);
    });
    assert_eq!(orchestrator.state(), RunState::Done);
    assert_eq!(vcs.clone_count(), 1);
}

#[tokio::test]
async fn test_intermediate_save_failure_does_not_stop_the_run() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("config.json"));
    let mut config = configured(temp.path(), &[]);
    config.save_path.clear();
    store.save(&config).unwrap();
    temp.child("config.json.tmp").create_dir_all().unwrap();

    let catalog = Arc::new(StaticCatalog::with_repos(vec![repo("alpha")]));
    let vcs = Arc::new(RecordingVcs::new());

    let outcome = orchestrator(&temp, &catalog, &vcs).run().await;

    assert_matches!(outcome, RunOutcome::Failure { reached, .. } => {
        assert_eq!(reached, RunState::Reconciled);
    });
    assert_eq!(vcs.clone_count(), 1);
    temp.child("backups/alpha").assert(predicate::path::is_dir());
}

#[tokio::test]
async fn test_unreadable_config_is_a_run_failure() {
    let temp = TempDir::new().unwrap();
    temp.child("config.json").create_dir_all().unwrap();

    let catalog = Arc::new(StaticCatalog::with_repos(vec![repo("alpha")]));
    let vcs = Arc::new(RecordingVcs::new());
    let mut orchestrator = orchestrator(&temp, &catalog, &vcs);

    let outcome = orchestrator.run().await;

    assert_matches!(outcome, RunOutcome::Failure { reason, reached } => {
        assert_eq!(reached, RunState::Start);
        assert!(reason.contains("Failed to load configuration"), "{}", reason);
    });
    assert_eq!(orchestrator.state(), RunState::Done);
    assert!(catalog.calls().is_empty());
    assert!(vcs.calls().is_empty());
}

#[tokio::test]
async fn test_preview_lists_catalog_without_touching_mirror() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("config.json"));
    store.save(&configured(&temp.path().join("mirror"), &[])).unwrap();

    let catalog = Arc::new(StaticCatalog::with_repos(vec![repo("alpha"), repo("alpha")]));
    let vcs = Arc::new(RecordingVcs::new());

    let repos = orchestrator(&temp, &catalog, &vcs)
        .preview_catalog()
        .await
        .unwrap();

    assert_eq!(repos.len(), 1);
    assert!(vcs.calls().is_empty());
    temp.child("mirror").assert(predicate::path::missing());
}

#[tokio::test]
async fn test_preview_refuses_fresh_config() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(StaticCatalog::with_repos(Vec::new()));
    let vcs = Arc::new(RecordingVcs::new());

    let result = orchestrator(&temp, &catalog, &vcs).preview_catalog().await;

    assert!(result.is_err());
    assert!(catalog.calls().is_empty());
}
