//! Sync-domain data model: the `SyncResult` family, `RemoteOptions`, and
//! the event payloads the Sync Engine (C9) emits. `FatDoc` and
//! `NormalizedCommit` themselves live in `gitddb-core::model` since CRUD
//! callers need them too; everything here is specific to a sync round.

use gitddb_core::model::{FatDoc, NormalizedCommit};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_REMOTE_NAME: &str = "origin";
pub const DEFAULT_RETRY: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;
pub const MIN_SYNC_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    Both,
    Push,
    Pull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolutionStrategy {
    Ours,
    Theirs,
    OursDiff,
    TheirsDiff,
}

impl ConflictResolutionStrategy {
    /// The side a strategy takes the whole document from before any
    /// plaintext-OT properties are merged in on top.
    pub fn base_side(&self) -> Side {
        match self {
            ConflictResolutionStrategy::Ours | ConflictResolutionStrategy::OursDiff => Side::Ours,
            ConflictResolutionStrategy::Theirs | ConflictResolutionStrategy::TheirsDiff => Side::Theirs,
        }
    }

    pub fn is_diff(&self) -> bool {
        matches!(self, ConflictResolutionStrategy::OursDiff | ConflictResolutionStrategy::TheirsDiff)
    }

    /// The token used in `resolve: <name>(<operation>,<short-oid>,<strategy>)`.
    pub fn token(&self) -> &'static str {
        match self {
            ConflictResolutionStrategy::Ours => "ours",
            ConflictResolutionStrategy::Theirs => "theirs",
            ConflictResolutionStrategy::OursDiff => "ours-diff",
            ConflictResolutionStrategy::TheirsDiff => "theirs-diff",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Ours,
    Theirs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombineDbStrategy {
    ThrowError,
    CombineHeadWithTheirs,
}

/// Schema of plaintext-OT properties, keyed by document type name: lists
/// of plaintext-OT properties per document type.
/// An empty/absent entry for a type means no property on that type is
/// merged with the text OT algorithm; the whole document is taken wholesale
/// from the chosen side instead.
#[derive(Debug, Clone, Default)]
pub struct MergeSchema {
    plaintext_properties: Vec<String>,
}

impl MergeSchema {
    pub fn new(plaintext_properties: Vec<String>) -> Self {
        Self { plaintext_properties }
    }

    pub fn is_plaintext(&self, property: &str) -> bool {
        self.plaintext_properties.iter().any(|p| p == property)
    }

    pub fn properties(&self) -> &[String] {
        &self.plaintext_properties
    }
}

#[derive(Debug, Clone)]
pub enum ConnectionConfig {
    Github {
        personal_access_token: Option<String>,
    },
    Ssh {
        public_key_path: std::path::PathBuf,
        private_key_path: std::path::PathBuf,
        pass_phrase: Option<String>,
    },
    None,
}

/// Connection, direction, and retry configuration for one remote.
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    pub remote_url: String,
    pub remote_name: String,
    pub sync_direction: SyncDirection,
    pub interval: Duration,
    pub retry: u32,
    pub retry_interval: Duration,
    pub conflict_resolution_strategy: ConflictResolutionStrategy,
    pub combine_db_strategy: CombineDbStrategy,
    pub include_commits: bool,
    pub connection: ConnectionConfig,
    pub schema: MergeSchema,
}

impl RemoteOptions {
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            remote_name: DEFAULT_REMOTE_NAME.to_string(),
            sync_direction: SyncDirection::Both,
            interval: Duration::ZERO,
            retry: DEFAULT_RETRY,
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            conflict_resolution_strategy: ConflictResolutionStrategy::Ours,
            combine_db_strategy: CombineDbStrategy::ThrowError,
            include_commits: false,
            connection: ConnectionConfig::None,
            schema: MergeSchema::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
    InsertMerge,
    UpdateMerge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub operation: ChangeOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<FatDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<FatDoc>,
    pub fat_doc: FatDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub fat_doc: FatDoc,
    pub strategy: ConflictResolutionStrategy,
    pub operation: ChangeOperation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatedFile {
    pub original_name: String,
    pub duplicated_name: String,
    pub fat_doc: FatDoc,
}

/// `SyncResult.action`. Serializes to fixed literal strings so downstream
/// consumers that pattern-match on the string keep working if this crate's
/// Rust variant names ever change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncAction {
    #[serde(rename = "nop")]
    Nop,
    #[serde(rename = "push")]
    Push,
    #[serde(rename = "fast-forward merge")]
    FastForwardMerge,
    #[serde(rename = "merge and push")]
    MergeAndPush,
    #[serde(rename = "resolve conflicts and push")]
    ResolveConflictsAndPush,
    #[serde(rename = "combine database")]
    CombineDatabase,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Changes {
    pub local: Vec<ChangedFile>,
    pub remote: Vec<ChangedFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commits {
    pub local: Vec<NormalizedCommit>,
    pub remote: Vec<NormalizedCommit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub action: SyncAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Changes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Conflict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commits: Option<Commits>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<DuplicatedFile>,
    /// Present only when `action == CombineDatabase`: the remote's `dbId`,
    /// which the combined database adopts. The facade (or whatever owns
    /// both the `Facade` and this `SyncEngine`) is responsible for calling
    /// `Facade::set_db_id` with this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adopted_db_id: Option<String>,
}

impl SyncResult {
    pub fn nop() -> Self {
        Self {
            action: SyncAction::Nop,
            changes: None,
            conflicts: Vec::new(),
            commits: None,
            duplicates: Vec::new(),
            adopted_db_id: None,
        }
    }
}

/// One event in a `trySync` round, delivered over a `tokio::sync::broadcast`
/// channel. Events within one round fire in the order
/// `Start, (Combine|Change), Complete` or `Start, Error`.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Start,
    Combine(Vec<DuplicatedFile>),
    Change(SyncResult),
    Complete,
    Error(String),
    Pause,
    Resume,
}
