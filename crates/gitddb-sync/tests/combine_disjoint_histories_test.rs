//! Combining two databases that share no common ancestor: local keeps
//! `{_id:"1", name:"fromB"}` under a renamed path, remote's
//! `{_id:"1", name:"fromA"}` stays at `1.json`, and the combined database
//! adopts the remote's `dbId`.

use gitddb_core::canonical_json;
use gitddb_core::gateway::{branch_ref, TreeUpdate, DEFAULT_BRANCH};
use gitddb_core::test_utils::{test_signature, TestRepo};
use gitddb_sync::{CombineDbStrategy, RemoteEngine, RemoteOptions, SyncAction, SyncEngine};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn seed(db_id: &str, doc: serde_json::Value) -> TestRepo {
    let repo = TestRepo::with_db_id(db_id);
    let doc_bytes = canonical_json::serialize(&doc).unwrap();
    repo.gateway
        .commit(
            &branch_ref(DEFAULT_BRANCH),
            &[TreeUpdate::Upsert { path: "1.json".to_string(), content: doc_bytes }],
            "add 1.json",
            &test_signature(),
            &test_signature(),
        )
        .unwrap();
    repo
}

#[tokio::test]
async fn combine_renames_local_file_and_adopts_remote_db_id() {
    let remote_dir = TempDir::new().unwrap();
    git2::Repository::init_bare(remote_dir.path()).unwrap();

    // Remote: its own database with a different history, {_id:"1", name:"fromA"}.
    let remote_db_id = "01REMOTE0000000000000000AA";
    let remote_seed = seed(remote_db_id, json!({"_id": "1", "name": "fromA"}));
    let seed_engine = gitddb_sync::Git2RemoteEngine::new(
        remote_dir.path().to_string_lossy().to_string(),
        gitddb_sync::ConnectionConfig::None,
        0,
        std::time::Duration::from_millis(1),
    );
    seed_engine.push(remote_seed.path(), "origin", DEFAULT_BRANCH, DEFAULT_BRANCH).unwrap();

    // Local: a disjoint database, {_id:"1", name:"fromB"}.
    let local_db_id = "01LOCAL00000000000000000BB";
    let local = seed(local_db_id, json!({"_id": "1", "name": "fromB"}));

    let queue = Arc::new(gitddb_core::TaskQueue::new(16));
    let mut options = RemoteOptions::new(remote_dir.path().to_string_lossy().to_string());
    options.combine_db_strategy = CombineDbStrategy::CombineHeadWithTheirs;
    let sync_engine = SyncEngine::new(
        Arc::new(local.gateway),
        queue,
        local.dir.path(),
        local_db_id,
        options,
        test_signature(),
        test_signature(),
    )
    .unwrap();

    let result = sync_engine.try_sync().await.unwrap();

    assert_eq!(result.action, SyncAction::CombineDatabase);
    assert_eq!(result.adopted_db_id.as_deref(), Some(remote_db_id));
    assert_eq!(result.duplicates.len(), 1);
    assert_eq!(result.duplicates[0].original_name, "1.json");
    assert_eq!(result.duplicates[0].duplicated_name, format!("1-from-{}.json", local_db_id));

    let local_repo = git2::Repository::open(local.dir.path()).unwrap();
    let head = local_repo.head().unwrap().peel_to_commit().unwrap();
    let tree = head.tree().unwrap();
    assert!(tree.get_path(std::path::Path::new("1.json")).is_ok());
    assert!(tree
        .get_path(std::path::Path::new(&format!("1-from-{}.json", local_db_id)))
        .is_ok());
}
