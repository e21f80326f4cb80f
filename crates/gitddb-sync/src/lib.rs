//! gitddb-sync — the Remote Engine Interface (C7), Three-way Merge & OT
//! Resolver (C8), and Sync Engine (C9) that sit on top of `gitddb-core`.
//!
//! `gitddb-core` owns the Git object database exclusively through its
//! Gateway; this crate never touches `git2` objects directly except through
//! `Git2RemoteEngine`'s transport-only operations (fetch/push/clone) and the
//! handful of `Gateway` methods added for multi-parent merge commits.

pub mod engine;
pub mod merge;
pub mod model;
pub mod registry;
pub mod remote;

pub use engine::SyncEngine;
pub use merge::{classify_path, resolve_conflict, three_way_text_merge, PathOutcome};
pub use model::{
    ChangeOperation, ChangedFile, Changes, CombineDbStrategy, Commits, ConflictResolutionStrategy,
    Conflict, ConnectionConfig, DuplicatedFile, MergeSchema, RemoteOptions, Side, SyncAction,
    SyncDirection, SyncEvent, SyncResult,
};
pub use registry::SyncManager;
pub use remote::{Git2RemoteEngine, RemoteEngine};
