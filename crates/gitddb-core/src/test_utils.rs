//! Fixture helpers shared across this crate's and `gitddb-sync`'s test
//! suites, gated behind the `test-utils` feature so downstream dev-deps can
//! pull them in without shipping them to release builds.

use crate::canonical_json;
use crate::gateway::{branch_ref, Gateway, TreeUpdate, DEFAULT_BRANCH};
use crate::model::{DatabaseInfo, Signature};

const INFO_PATH: &str = ".gitddb/info.json";

/// A stable, non-"now" signature for tests that assert on commit contents
/// rather than wall-clock time.
pub fn test_signature() -> Signature {
    Signature { name: "test".to_string(), email: "test@localhost".to_string(), timestamp: 1_700_000_000 }
}

/// An initialized repository in its own temporary directory, with the same
/// first commit `Facade::open` would write. Bypasses the facade/queue
/// machinery so tests can drive the `Gateway` directly — e.g. to build
/// divergent histories by hand before handing them to a `SyncEngine`.
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    pub gateway: Gateway,
    pub db_id: String,
}

impl TestRepo {
    /// Inits a repo with a freshly generated `dbId`.
    pub fn new() -> Self {
        Self::with_db_id(ulid::Ulid::new().to_string())
    }

    /// Inits a repo with a caller-chosen `dbId`, for tests asserting on a
    /// specific identity (e.g. combine-database adopting "the remote's" id).
    pub fn with_db_id(db_id: impl Into<String>) -> Self {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let db_id = db_id.into();
        let gateway = Gateway::init(dir.path()).expect("init test repository");
        let info = DatabaseInfo::new(db_id.clone());
        let bytes = canonical_json::serialize(&serde_json::to_value(&info).expect("serialize info"))
            .expect("canonicalize info");
        let sig = test_signature();
        gateway
            .commit(&branch_ref(DEFAULT_BRANCH), &[TreeUpdate::Upsert { path: INFO_PATH.to_string(), content: bytes }], "first commit", &sig, &sig)
            .expect("write first commit");
        Self { dir, gateway, db_id }
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
