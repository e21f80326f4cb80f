//! Closed error taxonomy for the document database core.
//!
//! Library errors (`git2`, `serde_json`, `std::io`) are converted into one of
//! the named variants below before they cross a public API boundary; callers
//! never match on a raw `git2::Error`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GitDdbError>;

#[derive(Debug, Error)]
pub enum GitDdbError {
    // --- Validation ---
    #[error("database name is undefined or empty")]
    UndefinedDatabaseName,

    #[error("working directory path exceeds platform length limit: {path}")]
    InvalidWorkingDirectoryPathLength { path: String },

    #[error("invalid document id: {id}")]
    InvalidId { id: String },

    #[error("value is not a JSON object")]
    InvalidJsonObject,

    #[error("unsupported file extension: {ext}")]
    InvalidJsonFileExtension { ext: String },

    // --- Lifecycle / I/O ---
    #[error("database is closing")]
    DatabaseClosing,

    #[error("close timed out after {timeout_ms}ms")]
    DatabaseCloseTimeout { timeout_ms: u64 },

    #[error("repository not found at {path}")]
    RepositoryNotFound { path: String },

    #[error("repository is not open")]
    RepositoryNotOpen,

    #[error("cannot create repository at {path}: {reason}")]
    CannotCreateRepository { path: String, reason: String },

    #[error("cannot create directory {path}: {reason}")]
    CannotCreateDirectory { path: String, reason: String },

    #[error("cannot open repository at {path}: {reason}")]
    CannotOpenRepository { path: String, reason: String },

    #[error("cannot write data: {reason}")]
    CannotWriteData { reason: String },

    #[error("cannot delete data: {reason}")]
    CannotDeleteData { reason: String },

    #[error("removing working directory timed out after {timeout_ms}ms")]
    FileRemoveTimeout { timeout_ms: u64 },

    // --- CRUD preconditions ---
    #[error("document not found: {name}")]
    DocumentNotFound { name: String },

    #[error("document already exists: {name}")]
    SameIdExists { name: String },

    // --- Task queue ---
    #[error("task was cancelled: {label}")]
    TaskCancel { label: String },

    // --- Sync setup ---
    #[error("remote URL is undefined")]
    UndefinedRemoteURL,

    #[error("sync interval {interval_ms}ms is below the minimum floor of {floor_ms}ms")]
    IntervalTooSmall { interval_ms: u64, floor_ms: u64 },

    #[error("a remote named {name} is already registered")]
    RemoteAlreadyRegistered { name: String },

    #[error("invalid authentication type for connection: {reason}")]
    InvalidAuthenticationType { reason: String },

    #[error("invalid remote URL format: {url}")]
    InvalidURLFormat { url: String },

    #[error("invalid repository URL: {url}")]
    InvalidRepositoryURL { url: String },

    #[error("invalid git remote {name}: {reason}")]
    InvalidGitRemote { name: String, reason: String },

    // --- Transport ---
    #[error("network error contacting {url}: {reason}")]
    NetworkError { url: String, reason: String },

    #[error("401 unauthorized for {url}")]
    HTTPError401AuthorizationRequired { url: String },

    #[error("403 forbidden for {url}")]
    HTTPError403Forbidden { url: String },

    #[error("404 not found: {url}")]
    HTTPError404NotFound { url: String },

    #[error("cannot connect to {url}: {reason}")]
    CannotConnect { url: String, reason: String },

    // --- Sync race / merge ---
    #[error("push rejected, remote has commits not yet fetched")]
    UnfetchedCommitExists,

    #[error("push rejected after {retries} retries")]
    RetriesExhausted { retries: u32 },

    #[error("no merge base found between local and remote history")]
    NoMergeBaseFound,

    // --- Conversions, wrapped rather than leaked raw ---
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(String),

    #[error("toml decode error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("toml encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl GitDdbError {
    /// True for errors the Remote Engine's retry policy should treat as transient.
    pub fn is_transient_network_error(&self) -> bool {
        matches!(self, GitDdbError::NetworkError { .. } | GitDdbError::CannotConnect { .. })
    }
}
