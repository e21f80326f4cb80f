//! End-to-end coverage of the Facade/Collection public surface: the
//! duplicate-collapsing `getHistory` scenario, round-trip put/get/delete,
//! and precondition boundaries (`insert` on an existing path, `update` on a
//! missing one) all driven through the same API an application would use.

use gitddb_core::crud::Format;
use gitddb_core::error::GitDdbError;
use gitddb_core::facade::Facade;
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn history_collapses_consecutive_duplicates() {
    let dir = TempDir::new().unwrap();
    let facade = Facade::open(dir.path(), "notes", true, None, None).await.unwrap();
    let notes = facade.root();

    // Commit sequence on "x": v1, v1, v2, delete, v2, delete, then an
    // unrelated commit on "y" that leaves x's history untouched.
    notes.put(Some("x"), obj(json!({"v": 1})), Format::Json).await.unwrap();
    notes.put(Some("x"), obj(json!({"v": 1})), Format::Json).await.unwrap();
    notes.put(Some("x"), obj(json!({"v": 2})), Format::Json).await.unwrap();
    notes.delete("x", Format::Json).await.unwrap();
    notes.put(Some("x"), obj(json!({"v": 2})), Format::Json).await.unwrap();
    notes.delete("x", Format::Json).await.unwrap();
    notes.insert(Some("y"), obj(json!({})), Format::Json).await.unwrap();

    let history = notes.get_history("x", Format::Json, None).unwrap();
    let shape: Vec<Option<i64>> = history
        .iter()
        .map(|v| v.as_ref().and_then(|d| d.get("v")).and_then(|n| n.as_i64()))
        .collect();
    assert_eq!(shape, vec![None, Some(2), None, Some(2), Some(1)]);
}

#[tokio::test]
async fn put_then_get_then_delete_round_trips() {
    let dir = TempDir::new().unwrap();
    let facade = Facade::open(dir.path(), "notes", true, None, None).await.unwrap();
    let notes = facade.root();

    let put = notes.insert(Some("alpha"), obj(json!({"title": "hi"})), Format::Json).await.unwrap();
    let got = notes.get(&put.name, Format::Json).unwrap().unwrap();
    assert_eq!(got["title"], "hi");

    notes.delete(&put.name, Format::Json).await.unwrap();
    assert!(notes.get(&put.name, Format::Json).unwrap().is_none());
}

#[tokio::test]
async fn insert_on_existing_path_fails_and_update_on_missing_path_fails() {
    let dir = TempDir::new().unwrap();
    let facade = Facade::open(dir.path(), "notes", true, None, None).await.unwrap();
    let notes = facade.root();

    notes.insert(Some("alpha"), obj(json!({})), Format::Json).await.unwrap();
    let err = notes.insert(Some("alpha"), obj(json!({})), Format::Json).await.unwrap_err();
    assert!(matches!(err, GitDdbError::SameIdExists { .. }));

    let err = notes.update("missing", obj(json!({})), Format::Json).await.unwrap_err();
    assert!(matches!(err, GitDdbError::DocumentNotFound { .. }));
}

fn obj(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().unwrap().clone()
}
