//! gitddb-core — the offline-first, Git-backed document database engine.
//!
//! Layers from the bottom up: canonical JSON / front-matter serialization
//! (C1), id and path validation (C2), the Blob/Tree Gateway (C3) that is the
//! only component touching the Git object database, the CRUD worker (C4),
//! the single-writer Task Queue (C5), the Collection namespace view (C6),
//! and the Database Facade (C10) that wires them together. The sync engine
//! and remote transport (C7-C9) live in the companion `gitddb-sync` crate,
//! which depends on this one.

pub mod canonical_json;
pub mod collection;
pub mod crud;
pub mod error;
pub mod facade;
pub mod frontmatter;
pub mod gateway;
pub mod model;
pub mod queue;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod validator;

pub use collection::Collection;
pub use crud::Format;
pub use error::{GitDdbError, Result};
pub use facade::Facade;
pub use gateway::Gateway;
pub use model::{
    AppInfo, DatabaseInfo, DeleteResult, DocType, FatDoc, JsonDoc, NormalizedCommit, PutResult,
    Signature, TaskKind, TaskStatistics,
};
pub use queue::TaskQueue;
