//! Integration tests for the document store.
//!
//! Each test clones a fresh bare remote and exercises the store end to end:
//! object files on disk, change tracking, commits and history reads.

mod common;

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use common::{engine_options, run_git, RemoteFixture};
use gitshelf::core::types::ObjectId;
use gitshelf::git::Git2Backend;
use gitshelf::store::{
    DocumentStore, ManagerContext, ManagerError, ObjectType, Record, StoreError, StoreManager,
    StoreState,
};
use gitshelf::sync::{InitOutcome, SyncEngine, SyncReport};

// =============================================================================
// Fixtures
// =============================================================================

fn id(s: &str) -> ObjectId {
    ObjectId::new(s).unwrap()
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn record(name: &str, value: Value) -> Record {
    Record::new(id(name), fields(value))
}

fn store_for(fixture: &RemoteFixture, name: &str) -> DocumentStore<Git2Backend> {
    let engine = SyncEngine::open(engine_options(fixture.work_dir(name), &fixture.url()), None);
    DocumentStore::new(
        engine,
        vec![
            ObjectType {
                name: "item".into(),
                subdir: "items".into(),
            },
            ObjectType {
                name: "note".into(),
                subdir: "notes".into(),
            },
        ],
    )
}

async fn ready_store(fixture: &RemoteFixture) -> DocumentStore<Git2Backend> {
    let store = store_for(fixture, "device-a");
    store.initialize(false).await.unwrap();
    store
}

fn remote_files(fixture: &RemoteFixture) -> Vec<String> {
    run_git(&fixture.bare_path(), &["ls-tree", "-r", "--name-only", "main"])
        .lines()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn operations_require_initialization() {
    let fixture = RemoteFixture::new();
    let store = store_for(&fixture, "device-a");
    assert_eq!(store.state(), StoreState::Uninitialized);

    let err = store.read(&id("seed"), None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotReady(StoreState::Uninitialized)));
    let err = store
        .create(record("a1", json!({"title": "x"})), "items/a1.yaml", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotReady(StoreState::Uninitialized)));

    assert_eq!(store.initialize(false).await.unwrap(), InitOutcome::Cloned);
    assert_eq!(store.state(), StoreState::Ready);
    store.engine().destroy().await;
}

#[tokio::test]
async fn attached_store_reads_but_rejects_writes() {
    let fixture = RemoteFixture::new();
    let first = ready_store(&fixture).await;
    first.engine().destroy().await;

    let store = store_for(&fixture, "device-a");
    store.attach().await.unwrap();
    assert_eq!(store.state(), StoreState::ReadOnly);

    let seed = store.read(&id("seed"), None).await.unwrap();
    assert_eq!(seed.get("title"), Some(&json!("Seed")));
    let err = store
        .create(record("a1", json!({"title": "x"})), "items/a1.yaml", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotReady(StoreState::ReadOnly)));
}

#[tokio::test]
async fn attach_requires_a_repository() {
    let fixture = RemoteFixture::new();
    let store = store_for(&fixture, "never-cloned");
    let err = store.attach().await.unwrap_err();
    assert!(matches!(err, StoreError::NotReady(StoreState::Uninitialized)));
}

#[tokio::test]
async fn attach_refuses_changes_it_did_not_make() {
    let fixture = RemoteFixture::new();
    let first = ready_store(&fixture).await;
    first.engine().destroy().await;
    drop(first);
    let work_dir = fixture.work_dir("device-a");
    fs::write(work_dir.join("items/seed.yaml"), "title: Drift\n").unwrap();

    let store = store_for(&fixture, "device-a");
    match store.attach().await {
        Err(StoreError::UnownedChanges(paths)) => assert_eq!(paths, vec!["items/seed.yaml"]),
        other => panic!("expected unowned changes, got {other:?}"),
    }
    assert_eq!(store.state(), StoreState::Uninitialized);
    let err = store.read(&id("seed"), None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotReady(StoreState::Uninitialized)));
    assert_eq!(
        fs::read_to_string(work_dir.join("items/seed.yaml")).unwrap(),
        "title: Drift\n"
    );

    assert_eq!(store.initialize(false).await.unwrap(), InitOutcome::Existing);
    let seed = store.read(&id("seed"), None).await.unwrap();
    assert_eq!(seed.get("title"), Some(&json!("Seed")));
    store.engine().destroy().await;
}

// =============================================================================
// Objects
// =============================================================================

#[tokio::test]
async fn create_read_commit_push() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;

    store
        .create(
            record("a1", json!({"title": "First", "count": 1})),
            "items/a1.yaml",
            None,
        )
        .await
        .unwrap();
    let read = store.read(&id("a1"), None).await.unwrap();
    assert_eq!(read.id(), &id("a1"));
    assert_eq!(read.fields(), &fields(json!({"title": "First", "count": 1})));
    assert_eq!(store.list_uncommitted().await.unwrap(), vec![id("a1")]);

    let commit = store.commit(&[id("a1")], "add a1", false).await.unwrap();
    assert!(commit.is_some());
    assert!(store.list_uncommitted().await.unwrap().is_empty());

    let report = store.synchronize().await.unwrap();
    assert!(report.pushed);
    assert!(remote_files(&fixture).contains(&"items/a1.yaml".to_string()));
    store.engine().destroy().await;
}

#[tokio::test]
async fn create_refuses_occupied_paths() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;

    store
        .create(record("a1", json!({"title": "First"})), "items/a1.yaml", None)
        .await
        .unwrap();
    let err = store
        .create(record("a1", json!({"title": "Again"})), "items/a1.yaml", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let meta = vec!["title".to_string()];
    let err = store
        .create(record("a1", json!({"title": "Set"})), "items/a1", Some(&meta))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let err = store
        .create(record("x", json!({})), "items/x.txt", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let read = store.read(&id("a1"), None).await.unwrap();
    assert_eq!(read.get("title"), Some(&json!("First")));
    assert_eq!(store.state(), StoreState::Ready);
    store.engine().destroy().await;
}

#[tokio::test]
async fn update_merges_and_delete_commits_removal() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;

    store
        .update(&id("seed"), fields(json!({"count": 2})), None)
        .await
        .unwrap();
    let seed = store.read(&id("seed"), None).await.unwrap();
    assert_eq!(seed.fields(), &fields(json!({"title": "Seed", "count": 2})));

    store.delete(&id("seed")).await.unwrap();
    let err = store.read(&id("seed"), None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    store.commit(&[id("seed")], "remove seed", false).await.unwrap();
    store.synchronize().await.unwrap();
    assert!(!remote_files(&fixture).contains(&"items/seed.yaml".to_string()));
    store.engine().destroy().await;
}

#[tokio::test]
async fn partial_commit_reports_missing_ids() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;

    store
        .create(record("a1", json!({"title": "First"})), "items/a1.yaml", None)
        .await
        .unwrap();
    let err = store
        .commit(&[id("a1"), id("ghost")], "add a1", false)
        .await
        .unwrap_err();
    match err {
        StoreError::PartialCommit { committed, missing } => {
            assert!(committed.is_some());
            assert_eq!(missing, vec![id("ghost")]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.list_uncommitted().await.unwrap().is_empty());
    assert_eq!(store.engine().list_local_commits().await.unwrap().len(), 1);
    store.engine().destroy().await;
}

#[tokio::test]
async fn empty_commit_is_a_no_op() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;
    assert_eq!(store.commit(&[], "nothing", false).await.unwrap(), None);
    assert!(store.engine().list_local_commits().await.unwrap().is_empty());
    store.engine().destroy().await;
}

#[tokio::test]
async fn qualified_ids_select_the_directory() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;

    store
        .create(record("x", json!({"kind": "note"})), "notes/x.yaml", None)
        .await
        .unwrap();
    store
        .create(record("x", json!({"kind": "item"})), "items/x.yaml", None)
        .await
        .unwrap();

    let bare = store.read(&id("x"), None).await.unwrap();
    assert_eq!(bare.get("kind"), Some(&json!("item")));
    let qualified = store.read(&id("notes/x"), None).await.unwrap();
    assert_eq!(qualified.get("kind"), Some(&json!("note")));
    store.engine().destroy().await;
}

// =============================================================================
// File sets
// =============================================================================

#[tokio::test]
async fn file_sets_split_fields_across_files() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;
    let work_dir = fixture.work_dir("device-a");

    let meta = vec!["title".to_string()];
    store
        .create(
            record(
                "n1",
                json!({"title": "Note", "body": "Long text", "tags": ["a", "b"]}),
            ),
            "notes/n1",
            Some(&meta),
        )
        .await
        .unwrap();
    for file in ["meta.yaml", "body.yaml", "tags.yaml"] {
        assert!(work_dir.join("notes/n1").join(file).exists(), "{file} missing");
    }

    let full = store.read(&id("n1"), None).await.unwrap();
    assert_eq!(
        full.fields(),
        &fields(json!({"title": "Note", "body": "Long text", "tags": ["a", "b"]}))
    );
    let meta_only = store.read(&id("n1"), Some(&[] as &[String])).await.unwrap();
    assert_eq!(meta_only.fields(), &fields(json!({"title": "Note"})));

    store
        .update(&id("n1"), fields(json!({"body": "Edited"})), None)
        .await
        .unwrap();
    let meta_file = fs::read_to_string(work_dir.join("notes/n1/meta.yaml")).unwrap();
    assert!(meta_file.contains("title"));
    assert!(!meta_file.contains("Edited"));

    let commit = store.commit(&[id("n1")], "add n1", false).await.unwrap();
    assert!(commit.is_some());
    store.engine().destroy().await;
}

#[tokio::test]
async fn file_set_fields_must_be_file_names() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;

    let meta = vec!["title".to_string()];
    let err = store
        .create(
            record("n2", json!({"title": "Note", "a/b": 1})),
            "notes/n2",
            Some(&meta),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    store.engine().destroy().await;
}

// =============================================================================
// History and listing
// =============================================================================

#[tokio::test]
async fn read_version_returns_committed_content() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;

    store
        .create(record("a1", json!({"title": "v1"})), "items/a1.yaml", None)
        .await
        .unwrap();
    let v1 = store.commit(&[id("a1")], "v1", false).await.unwrap().unwrap();
    store
        .update(&id("a1"), fields(json!({"title": "v2"})), None)
        .await
        .unwrap();
    store.commit(&[id("a1")], "v2", false).await.unwrap();

    let old = store.read_version(&id("a1"), &v1).await.unwrap();
    assert_eq!(old.get("title"), Some(&json!("v1")));
    let current = store.read(&id("a1"), None).await.unwrap();
    assert_eq!(current.get("title"), Some(&json!("v2")));

    let err = store.read_version(&id("ghost"), &v1).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    store.engine().destroy().await;
}

#[tokio::test]
async fn index_keys_by_field_and_skips_unreadable_objects() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;

    for (name, value) in [
        ("a1", json!({"slug": "alpha"})),
        ("b2", json!({"slug": "beta"})),
        ("c3", json!({"title": "no slug"})),
    ] {
        store
            .create(record(name, value), &format!("items/{name}.yaml"), None)
            .await
            .unwrap();
    }
    fs::write(
        fixture.work_dir("device-a").join("items/bad.yaml"),
        "title: [unclosed\n",
    )
    .unwrap();

    let ids = store.list_ids("items").await.unwrap();
    assert_eq!(ids, vec![id("a1"), id("b2"), id("bad"), id("c3"), id("seed")]);

    let index = store.get_index("items", "slug", None, None).await.unwrap();
    let keys: Vec<&str> = index.entries.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["alpha", "beta", "c3", "seed"]);
    assert_eq!(index.skipped.len(), 1);
    assert_eq!(index.skipped[0].id, id("bad"));

    let only = store
        .get_index("items", "slug", Some(&[id("b2")]), None)
        .await
        .unwrap();
    assert_eq!(only.entries.len(), 1);
    assert!(only.entries.contains_key("beta"));
    store.engine().destroy().await;
}

// =============================================================================
// Change recovery
// =============================================================================

#[tokio::test]
async fn orphaned_changes_are_discarded_and_tracked_ones_kept() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;
    let work_dir = fixture.work_dir("device-a");

    store
        .create(record("a1", json!({"title": "Mine"})), "items/a1.yaml", None)
        .await
        .unwrap();
    fs::write(work_dir.join("items/hand.yaml"), "title: By hand\n").unwrap();
    fs::write(work_dir.join("items/seed.yaml"), "title: Edited by hand\n").unwrap();

    let mut discarded = store.reset_orphaned_file_changes().await.unwrap();
    discarded.sort();
    assert_eq!(discarded, vec!["items/hand.yaml", "items/seed.yaml"]);
    assert!(work_dir.join("items/a1.yaml").exists());
    assert!(!work_dir.join("items/hand.yaml").exists());
    assert_eq!(
        fs::read_to_string(work_dir.join("items/seed.yaml")).unwrap(),
        "title: Seed\n"
    );
    store.engine().destroy().await;
}

#[tokio::test]
async fn uncommitted_changes_of_a_crashed_session_are_discarded() {
    let fixture = RemoteFixture::new();
    let crashed = ready_store(&fixture).await;
    crashed
        .create(record("a1", json!({"title": "Lost"})), "items/a1.yaml", None)
        .await
        .unwrap();
    crashed.engine().destroy().await;
    drop(crashed);

    let store = store_for(&fixture, "device-a");
    assert_eq!(store.initialize(false).await.unwrap(), InitOutcome::Existing);
    assert!(!fixture.work_dir("device-a").join("items/a1.yaml").exists());
    assert!(!store.engine().check_uncommitted().await.unwrap());
    store.engine().destroy().await;
}

#[tokio::test]
async fn discard_restores_committed_content() {
    let fixture = RemoteFixture::new();
    let store = ready_store(&fixture).await;

    store
        .update(&id("seed"), fields(json!({"title": "Changed"})), None)
        .await
        .unwrap();
    store
        .create(record("a1", json!({"title": "New"})), "items/a1.yaml", None)
        .await
        .unwrap();

    store.discard(&[id("seed"), id("a1"), id("ghost")]).await.unwrap();
    let seed = store.read(&id("seed"), None).await.unwrap();
    assert_eq!(seed.get("title"), Some(&json!("Seed")));
    assert!(matches!(
        store.read(&id("a1"), None).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert!(store.list_uncommitted().await.unwrap().is_empty());
    store.engine().destroy().await;
}

// =============================================================================
// Managers
// =============================================================================

#[derive(Default)]
struct Recorder {
    initialized: AtomicUsize,
    synchronized: AtomicUsize,
    fail_initialize: bool,
    fail_synchronized: bool,
}

#[async_trait::async_trait]
impl StoreManager for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn on_initialize(&self, ctx: &ManagerContext) -> Result<(), ManagerError> {
        assert_eq!(ctx.object_types.len(), 2);
        self.initialized.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(ManagerError::new("index rebuild failed"));
        }
        Ok(())
    }

    async fn on_synchronized(
        &self,
        _ctx: &ManagerContext,
        _report: &SyncReport,
    ) -> Result<(), ManagerError> {
        self.synchronized.fetch_add(1, Ordering::SeqCst);
        if self.fail_synchronized {
            return Err(ManagerError::new("refresh failed"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn managers_follow_the_store_lifecycle() {
    let fixture = RemoteFixture::new();
    let store = store_for(&fixture, "device-a");
    let early = Arc::new(Recorder::default());
    store.register_manager(early.clone()).await.unwrap();
    assert_eq!(early.initialized.load(Ordering::SeqCst), 0);

    store.initialize(false).await.unwrap();
    assert_eq!(early.initialized.load(Ordering::SeqCst), 1);

    let late = Arc::new(Recorder {
        fail_synchronized: true,
        ..Default::default()
    });
    store.register_manager(late.clone()).await.unwrap();
    assert_eq!(late.initialized.load(Ordering::SeqCst), 1);
    assert_eq!(store.managers().len(), 2);

    store.synchronize().await.unwrap();
    assert_eq!(early.synchronized.load(Ordering::SeqCst), 1);
    assert_eq!(late.synchronized.load(Ordering::SeqCst), 1);
    store.engine().destroy().await;
}

#[tokio::test]
async fn failing_manager_aborts_initialization() {
    let fixture = RemoteFixture::new();
    let store = store_for(&fixture, "device-a");
    store
        .register_manager(Arc::new(Recorder {
            fail_initialize: true,
            ..Default::default()
        }))
        .await
        .unwrap();

    let err = store.initialize(false).await.unwrap_err();
    match err {
        StoreError::Manager { name, .. } => assert_eq!(name, "recorder"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.state(), StoreState::Uninitialized);
    store.engine().destroy().await;
}
