//! End-to-end plaintext-OT merge driven through a real sync round: both
//! sides edit the same property of the same document in non-overlapping
//! ways, and the merged text carries both edits rather than picking a side.

use gitddb_core::canonical_json;
use gitddb_core::gateway::{branch_ref, Gateway, TreeUpdate, DEFAULT_BRANCH};
use gitddb_core::test_utils::{test_signature, TestRepo};
use gitddb_sync::{
    ConflictResolutionStrategy, MergeSchema, RemoteEngine, RemoteOptions, SyncAction, SyncEngine,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn non_overlapping_edits_compose_through_a_real_sync_round() {
    let remote_dir = TempDir::new().unwrap();
    git2::Repository::init_bare(remote_dir.path()).unwrap();

    // Base: one document shared by both sides before they diverge.
    let base = TestRepo::new();
    base.gateway
        .commit(
            &branch_ref(DEFAULT_BRANCH),
            &[TreeUpdate::Upsert {
                path: "place.json".to_string(),
                content: canonical_json::serialize(&json!({"_id": "place", "name": "Nara and Kyoto"})).unwrap(),
            }],
            "add place",
            &test_signature(),
            &test_signature(),
        )
        .unwrap();
    let seed_engine = gitddb_sync::Git2RemoteEngine::new(
        remote_dir.path().to_string_lossy().to_string(),
        gitddb_sync::ConnectionConfig::None,
        0,
        std::time::Duration::from_millis(1),
    );
    seed_engine.push(base.path(), "origin", DEFAULT_BRANCH, DEFAULT_BRANCH).unwrap();

    // B clones the base, then edits independently: "Nara and Kyoto and Osaka".
    let b_dir = TempDir::new().unwrap();
    let b_gw = Gateway::init(b_dir.path()).unwrap();
    seed_engine.clone_repo(b_dir.path(), "origin").unwrap();
    let remote_head = b_gw.read_ref_oid("refs/remotes/origin/main").unwrap().unwrap();
    b_gw.set_ref_oid(&branch_ref(DEFAULT_BRANCH), &remote_head, "checkout").unwrap();
    b_gw.commit(
        &branch_ref(DEFAULT_BRANCH),
        &[TreeUpdate::Upsert {
            path: "place.json".to_string(),
            content: canonical_json::serialize(&json!({"_id": "place", "name": "Nara and Kyoto and Osaka"})).unwrap(),
        }],
        "b edits place",
        &test_signature(),
        &test_signature(),
    )
    .unwrap();

    // A, from the same base, edits the front of the string and pushes first:
    // "Hello, Nara and Kyoto".
    base.gateway
        .commit(
            &branch_ref(DEFAULT_BRANCH),
            &[TreeUpdate::Upsert {
                path: "place.json".to_string(),
                content: canonical_json::serialize(&json!({"_id": "place", "name": "Hello, Nara and Kyoto"})).unwrap(),
            }],
            "a edits place",
            &test_signature(),
            &test_signature(),
        )
        .unwrap();
    seed_engine.push(base.path(), "origin", DEFAULT_BRANCH, DEFAULT_BRANCH).unwrap();

    // B now syncs: fetch sees A's push, diverges from B's own edit, and the
    // `name` property -- marked plaintext in the schema -- merges via OT
    // instead of one side clobbering the other.
    let queue = Arc::new(gitddb_core::TaskQueue::new(16));
    let mut options = RemoteOptions::new(remote_dir.path().to_string_lossy().to_string());
    options.conflict_resolution_strategy = ConflictResolutionStrategy::Ours;
    options.schema = MergeSchema::new(vec!["name".to_string()]);
    let sync_engine = SyncEngine::new(
        Arc::new(b_gw),
        queue,
        b_dir.path(),
        "b-db",
        options,
        test_signature(),
        test_signature(),
    )
    .unwrap();

    let result = sync_engine.try_sync().await.unwrap();

    assert_eq!(result.action, SyncAction::ResolveConflictsAndPush);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].fat_doc.doc["name"], "Hello, Nara and Kyoto and Osaka");

    let remote_repo = git2::Repository::open_bare(remote_dir.path()).unwrap();
    let head = remote_repo.find_reference(&branch_ref(DEFAULT_BRANCH)).unwrap().peel_to_commit().unwrap();
    let blob_oid = head.tree().unwrap().get_path(std::path::Path::new("place.json")).unwrap().id();
    let blob = remote_repo.find_blob(blob_oid).unwrap();
    let value = canonical_json::parse(blob.content(), "place").unwrap();
    assert_eq!(value["name"], "Hello, Nara and Kyoto and Osaka");
}
