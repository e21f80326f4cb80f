//! Core data model: documents, their storage metadata, and commit records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A structured document: a JSON object conventionally carrying `_id`.
pub type JsonDoc = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Json,
    Text,
    Binary,
}

/// A document together with its storage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatDoc {
    pub id: String,
    pub name: String,
    pub file_oid: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub doc: JsonDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedCommit {
    pub oid: String,
    pub message: String,
    pub parent: Vec<String>,
    pub author: Signature,
    pub committer: Signature,
    pub gpgsig: Option<String>,
}

impl NormalizedCommit {
    /// A commit is treated as a merge commit when it has more than one
    /// parent. Callers that need message-prefix based filtering instead can supply
    /// their own predicate to `getHistory`/`getBackNumber`.
    pub fn is_merge_commit(&self) -> bool {
        self.parent.len() > 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutResult {
    pub id: String,
    pub name: String,
    pub file_oid: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub commit: NormalizedCommit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResult {
    pub id: String,
    pub name: String,
    pub file_oid: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub commit: NormalizedCommit,
}

/// Stored at `.gitddb/info.json` in the first commit. `db_id` is immutable for
/// the lifetime of a database's history, except that combining with a remote's
/// disjoint history (see gitddb-sync's combine-database path) overwrites it
/// with the remote's `db_id` by design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub db_id: String,
    pub creator: String,
    pub version: String,
}

impl DatabaseInfo {
    pub const CREATOR: &'static str = "gitddb";
    pub const VERSION: &'static str = "1";

    pub fn new(db_id: String) -> Self {
        Self {
            db_id,
            creator: Self::CREATOR.to_string(),
            version: Self::VERSION.to_string(),
        }
    }

    pub fn is_created_by_gitddb(&self) -> bool {
        self.creator == Self::CREATOR
    }

    pub fn is_valid_version(&self) -> bool {
        self.version.chars().all(|c| c.is_ascii_digit())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Put,
    Insert,
    Update,
    Delete,
    Push,
    Sync,
}

/// Monotonically non-decreasing per-kind counters over a database's lifetime.
/// Internal writes (bootstrap, app-info save) bypass the queue and never
/// increment these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub put: u64,
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
    pub push: u64,
    pub sync: u64,
    pub cancel: u64,
}

impl TaskStatistics {
    pub fn increment(&mut self, kind: TaskKind) {
        match kind {
            TaskKind::Put => self.put += 1,
            TaskKind::Insert => self.insert += 1,
            TaskKind::Update => self.update += 1,
            TaskKind::Delete => self.delete += 1,
            TaskKind::Push => self.push += 1,
            TaskKind::Sync => self.sync += 1,
        }
    }

    pub fn increment_cancel(&mut self) {
        self.cancel += 1;
    }

    /// `stats(t+1) >= stats(t)` componentwise, used directly by the monotonicity
    /// property test.
    pub fn dominates(&self, other: &TaskStatistics) -> bool {
        self.put >= other.put
            && self.insert >= other.insert
            && self.update >= other.update
            && self.delete >= other.delete
            && self.push >= other.push
            && self.sync >= other.sync
            && self.cancel >= other.cancel
    }
}

/// Opaque per-database application metadata, stored at `.gitddb/app.json`.
pub type AppInfo = BTreeMap<String, serde_json::Value>;
