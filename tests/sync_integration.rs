//! Integration tests for the sync engine over libgit2.
//!
//! These tests use a real bare remote created with the git CLI and verify
//! cloning, committing, pushing, fast-forwarding and divergence handling.

mod common;

use std::fs;

use common::{engine_options, run_git, RemoteFixture};
use gitshelf::core::status::RemoteRelation;
use gitshelf::core::types::CommitId;
use gitshelf::sync::{InitOutcome, RemoteUrls, SyncEngine, SyncError};

fn open(fixture: &RemoteFixture, name: &str) -> SyncEngine<gitshelf::git::Git2Backend> {
    SyncEngine::open(engine_options(fixture.work_dir(name), &fixture.url()), None)
}

#[tokio::test]
async fn initialize_clones_then_reuses() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");

    assert!(!engine.is_initialized().await);
    assert_eq!(engine.initialize(false).await.unwrap(), InitOutcome::Cloned);
    assert!(engine.is_initialized().await);
    assert!(fixture.work_dir("device-a").join("items/seed.yaml").exists());
    assert!(engine
        .is_using_remote_urls(&RemoteUrls {
            origin: fixture.url(),
            upstream: None,
        })
        .await
        .unwrap());
    assert_eq!(
        engine.config_get("user.email").await.unwrap().as_deref(),
        Some("test@example.com")
    );
    engine.destroy().await;

    let again = open(&fixture, "device-a");
    assert_eq!(again.initialize(false).await.unwrap(), InitOutcome::Existing);
    again.destroy().await;
}

#[tokio::test]
async fn second_engine_cannot_own_the_same_directory() {
    let fixture = RemoteFixture::new();
    let first = open(&fixture, "device-a");
    first.initialize(false).await.unwrap();

    let second = open(&fixture, "device-a");
    let err = second.initialize(false).await.unwrap_err();
    assert!(matches!(err, SyncError::Initialization(_)));

    first.destroy().await;
    assert_eq!(second.initialize(false).await.unwrap(), InitOutcome::Existing);
    second.destroy().await;
}

#[tokio::test]
async fn non_repository_directory_is_not_overwritten() {
    let fixture = RemoteFixture::new();
    let work_dir = fixture.work_dir("occupied");
    fs::create_dir_all(&work_dir).unwrap();
    fs::write(work_dir.join("notes.txt"), "keep me").unwrap();

    let engine = open(&fixture, "occupied");
    let err = engine.initialize(false).await.unwrap_err();
    assert!(matches!(err, SyncError::Initialization(_)));
    assert!(work_dir.join("notes.txt").exists());

    assert_eq!(engine.initialize(true).await.unwrap(), InitOutcome::Cloned);
    assert!(!work_dir.join("notes.txt").exists());
    assert!(work_dir.join("items/seed.yaml").exists());
    engine.destroy().await;
}

#[tokio::test]
async fn commit_and_push_reach_the_remote() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();

    let work_dir = fixture.work_dir("device-a");
    fs::write(work_dir.join("items/a1.yaml"), "title: First\n").unwrap();
    assert!(engine.check_uncommitted().await.unwrap());
    assert_eq!(
        engine.list_changed_files(None).await.unwrap(),
        vec!["items/a1.yaml".to_string()]
    );

    let summary = engine
        .stage_and_commit(&["items/a1.yaml".to_string()], "add a1", false)
        .await
        .unwrap();
    let commit = summary.commit.clone().unwrap();
    assert_eq!(engine.list_local_commits().await.unwrap(), vec![commit.clone()]);
    assert!(!engine.check_uncommitted().await.unwrap());

    let report = engine.synchronize().await.unwrap();
    assert!(report.pushed);
    assert_eq!(fixture.remote_head(), commit.as_str());
    assert!(engine.list_local_commits().await.unwrap().is_empty());
    assert_eq!(
        engine.status().status_relative_to_local,
        Some(RemoteRelation::Updated)
    );
    engine.destroy().await;
}

#[tokio::test]
async fn pull_fast_forwards_remote_changes() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();

    fixture.push_from_elsewhere("items/b2.yaml", "title: Remote\n", "add b2");

    let outcome = engine.pull().await.unwrap();
    assert_eq!(outcome.fast_forwarded, 1);
    assert_eq!(outcome.changed_paths, vec!["items/b2.yaml".to_string()]);
    let content = fs::read_to_string(fixture.work_dir("device-a").join("items/b2.yaml")).unwrap();
    assert_eq!(content, "title: Remote\n");
    engine.destroy().await;
}

#[tokio::test]
async fn divergence_keeps_local_commits() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();

    let work_dir = fixture.work_dir("device-a");
    fs::write(work_dir.join("items/local.yaml"), "title: Local\n").unwrap();
    let local = engine
        .stage_and_commit(&["items/local.yaml".to_string()], "local edit", false)
        .await
        .unwrap()
        .commit
        .unwrap();
    fixture.push_from_elsewhere("items/remote.yaml", "title: Remote\n", "remote edit");
    let remote_before = fixture.remote_head();

    let err = engine.synchronize().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::DivergedHistory {
            ahead: 1,
            behind: 1
        }
    ));
    assert_eq!(
        engine.status().status_relative_to_local,
        Some(RemoteRelation::Diverged)
    );
    assert_eq!(engine.list_local_commits().await.unwrap(), vec![local]);
    assert!(work_dir.join("items/local.yaml").exists());
    assert!(!work_dir.join("items/remote.yaml").exists());
    assert_eq!(fixture.remote_head(), remote_before);
    engine.destroy().await;
}

#[tokio::test]
async fn history_reads() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();
    let work_dir = fixture.work_dir("device-a");

    fs::write(work_dir.join("items/a1.yaml"), "title: v1\n").unwrap();
    let v1 = engine
        .stage_and_commit(&["items/a1.yaml".to_string()], "v1", false)
        .await
        .unwrap()
        .commit
        .unwrap();
    fs::write(work_dir.join("items/a1.yaml"), "title: v2\n").unwrap();
    engine
        .stage_and_commit(&["items/a1.yaml".to_string()], "v2", false)
        .await
        .unwrap();

    let blob = engine.read_file_blob_at_commit("items/a1.yaml", &v1).await.unwrap();
    assert_eq!(blob, b"title: v1\n");
    assert_eq!(
        engine.list_files_at_commit("items", &v1).await.unwrap(),
        vec!["a1.yaml".to_string(), "seed.yaml".to_string()]
    );

    let head = CommitId::new(run_git(&work_dir, &["rev-parse", "HEAD"])).unwrap();
    let err = engine
        .read_file_blob_at_commit("items/missing.yaml", &head)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
    engine.destroy().await;
}

#[tokio::test]
async fn reset_discards_only_named_paths() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();
    let work_dir = fixture.work_dir("device-a");

    fs::write(work_dir.join("items/seed.yaml"), "title: Edited\n").unwrap();
    fs::write(work_dir.join("items/new.yaml"), "title: New\n").unwrap();

    engine
        .reset_files(Some(&["items/seed.yaml".to_string()]))
        .await
        .unwrap();
    assert_eq!(
        fs::read_to_string(work_dir.join("items/seed.yaml")).unwrap(),
        "title: Seed\n"
    );
    assert!(work_dir.join("items/new.yaml").exists());

    engine.reset_files(None).await.unwrap();
    assert!(!work_dir.join("items/new.yaml").exists());
    assert!(!engine.check_uncommitted().await.unwrap());
    engine.destroy().await;
}

#[tokio::test]
async fn removals_are_committed() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();
    let work_dir = fixture.work_dir("device-a");

    fs::remove_file(work_dir.join("items/seed.yaml")).unwrap();
    let summary = engine
        .stage_and_commit(&["items/seed.yaml".to_string()], "remove seed", true)
        .await
        .unwrap();
    assert!(summary.commit.is_some());
    engine.synchronize().await.unwrap();

    let tree = run_git(&fixture.bare_path(), &["ls-tree", "-r", "--name-only", "main"]);
    assert!(!tree.contains("items/seed.yaml"));
    engine.destroy().await;
}

#[tokio::test]
async fn reset_unstages_and_removes_new_files() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();
    let work_dir = fixture.work_dir("device-a");

    fs::write(work_dir.join("items/new.yaml"), "title: New\n").unwrap();
    engine.stage(&["items/new.yaml".to_string()], false).await.unwrap();
    engine
        .reset_files(Some(&["items/new.yaml".to_string()]))
        .await
        .unwrap();

    assert!(!work_dir.join("items/new.yaml").exists());
    assert_eq!(run_git(&work_dir, &["status", "--porcelain"]), "");
    engine.destroy().await;
}

// =============================================================================
// Staged sets
// =============================================================================

fn files_in_commit(work_dir: &std::path::Path, commit: &str) -> String {
    run_git(work_dir, &["show", "--name-only", "--format=", commit])
}

#[tokio::test]
async fn commit_only_includes_requested_paths() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();
    let work_dir = fixture.work_dir("device-a");

    fs::write(work_dir.join("items/x.yaml"), "title: X\n").unwrap();
    fs::write(work_dir.join("items/y.yaml"), "title: Y\n").unwrap();
    engine.stage(&["items/x.yaml".to_string()], false).await.unwrap();

    let summary = engine
        .stage_and_commit(&["items/y.yaml".to_string()], "add y only", false)
        .await
        .unwrap();
    assert_eq!(summary.paths_committed, 1);
    let commit = summary.commit.unwrap();
    assert_eq!(files_in_commit(&work_dir, commit.as_str()), "items/y.yaml");
    assert_eq!(
        engine.list_changed_files(None).await.unwrap(),
        vec!["items/x.yaml".to_string()]
    );
    engine.destroy().await;
}

#[tokio::test]
async fn additions_and_removals_share_one_commit() {
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();
    let work_dir = fixture.work_dir("device-a");

    fs::remove_file(work_dir.join("items/seed.yaml")).unwrap();
    fs::write(work_dir.join("items/a1.yaml"), "title: First\n").unwrap();
    let summary = engine
        .commit_paths(
            &["items/a1.yaml".to_string()],
            &["items/seed.yaml".to_string()],
            "replace seed",
        )
        .await
        .unwrap();

    assert_eq!(summary.paths_committed, 2);
    let commit = summary.commit.unwrap();
    assert_eq!(
        files_in_commit(&work_dir, commit.as_str()),
        "items/a1.yaml\nitems/seed.yaml"
    );
    assert!(!engine.check_uncommitted().await.unwrap());
    engine.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_keep_their_own_paths() {
    const N: usize = 6;
    let fixture = RemoteFixture::new();
    let engine = open(&fixture, "device-a");
    engine.initialize(false).await.unwrap();
    let work_dir = fixture.work_dir("device-a");

    let paths: Vec<String> = (0..N).map(|n| format!("items/a{n}.yaml")).collect();
    for path in &paths {
        fs::write(work_dir.join(path), format!("path: {path}\n")).unwrap();
    }

    let tasks: Vec<_> = paths
        .iter()
        .cloned()
        .map(|path| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let summary = engine
                    .stage_and_commit(&[path.clone()], &format!("add {path}"), false)
                    .await
                    .unwrap();
                (path, summary)
            })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    assert_eq!(engine.list_local_commits().await.unwrap().len(), N);
    for (path, summary) in results {
        assert_eq!(summary.paths_committed, 1, "{path}");
        let commit = summary.commit.unwrap();
        assert_eq!(files_in_commit(&work_dir, commit.as_str()), path);
    }
    assert!(!engine.check_uncommitted().await.unwrap());
    engine.destroy().await;
}
