//! Database Facade (C10): open/close/destroy lifecycle, `dbId` identity, and
//! wiring of the lower components. Exclusively owns the repository handle
//! (via the Gateway) and the task queue; collections hold a non-owning
//! back-reference obtained through `collection()`.

use crate::canonical_json;
use crate::collection::Collection;
use crate::crud::Format;
use crate::error::{GitDdbError, Result};
use crate::gateway::{branch_ref, Gateway, TreeUpdate, DEFAULT_BRANCH};
use crate::model::{AppInfo, DatabaseInfo, Signature};
use crate::queue::TaskQueue;
use crate::validator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FILE_REMOVE_TIMEOUT: Duration = Duration::from_secs(10);
const INFO_PATH: &str = ".gitddb/info.json";
const APP_INFO_PATH: &str = ".gitddb/app.json";

fn default_author() -> Signature {
    Signature {
        name: "GitDocumentDB".to_string(),
        email: "gitddb@localhost".to_string(),
        timestamp: 0,
    }
}

/// Opens, owns, and tears down one on-disk database at
/// `<local_dir>/<db_name>`. Each call site that needs a fresh commit
/// timestamp should construct its own `Signature` with `timestamp` set to
/// the current time; the facade's stored `author`/`committer` are the
/// defaults applied when callers don't override them per-call.
pub struct Facade {
    working_dir: PathBuf,
    gateway: Arc<Gateway>,
    queue: Arc<TaskQueue>,
    author: Signature,
    committer: Signature,
    db_id: String,
}

impl Facade {
    /// `open(create_if_not_exists)`: attempts to open an existing repository
    /// at `<local_dir>/<db_name>`; if absent and creation is allowed, inits a
    /// fresh repository on branch `main` and writes the first commit
    /// (`.gitddb/info.json`, message `"first commit"`).
    pub async fn open(
        local_dir: impl AsRef<Path>,
        db_name: &str,
        create_if_not_exists: bool,
        author: Option<Signature>,
        committer: Option<Signature>,
    ) -> Result<Self> {
        validator::validate_database_name(db_name)?;
        let working_dir = local_dir.as_ref().join(db_name);
        validator::validate_working_directory_path(&working_dir.display().to_string())?;

        let author = author.unwrap_or_else(default_author);
        let committer = committer.unwrap_or_else(default_author);

        let (gateway, db_id) = if working_dir.join(".git").is_dir() {
            let gateway = Gateway::open(&working_dir)?;
            let db_id = Self::read_db_id(&gateway)?;
            (gateway, db_id)
        } else if create_if_not_exists {
            let gateway = Gateway::init(&working_dir)?;
            let db_id = Ulid::new().to_string();
            let info = DatabaseInfo::new(db_id.clone());
            let bytes = canonical_json::serialize(&serde_json::to_value(&info)?)?;
            gateway.commit(
                &branch_ref(DEFAULT_BRANCH),
                &[TreeUpdate::Upsert { path: INFO_PATH.to_string(), content: bytes }],
                "first commit",
                &author,
                &committer,
            )?;
            (gateway, db_id)
        } else {
            return Err(GitDdbError::RepositoryNotFound { path: working_dir.display().to_string() });
        };

        Ok(Self {
            working_dir,
            gateway: Arc::new(gateway),
            queue: Arc::new(TaskQueue::new(256)),
            author,
            committer,
            db_id,
        })
    }

    fn read_db_id(gateway: &Gateway) -> Result<String> {
        let head = gateway
            .read_ref_oid(&branch_ref(DEFAULT_BRANCH))?
            .ok_or(GitDdbError::RepositoryNotOpen)?;
        let bytes = gateway
            .read_path_at_commit(&head, INFO_PATH)?
            .ok_or(GitDdbError::RepositoryNotOpen)?;
        let value = canonical_json::parse(&bytes, "info")?;
        let info: DatabaseInfo = serde_json::from_value(value)?;
        Ok(info.db_id)
    }

    fn info(&self) -> Result<DatabaseInfo> {
        let head = self
            .gateway
            .read_ref_oid(&branch_ref(DEFAULT_BRANCH))?
            .ok_or(GitDdbError::RepositoryNotOpen)?;
        let bytes = self
            .gateway
            .read_path_at_commit(&head, INFO_PATH)?
            .ok_or(GitDdbError::RepositoryNotOpen)?;
        let value = canonical_json::parse(&bytes, "info")?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn db_id(&self) -> &str {
        &self.db_id
    }

    /// Adopts a new `dbId`, used only by the combine-database path: when a
    /// disjoint remote history is merged in for the first time, the
    /// combined database takes the remote's identity. The sync crate calls
    /// this after a `"combine database"` `SyncResult`.
    pub fn set_db_id(&mut self, db_id: String) {
        self.db_id = db_id;
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn author(&self) -> &Signature {
        &self.author
    }

    pub fn committer(&self) -> &Signature {
        &self.committer
    }

    /// Mirrors the database's author/committer name and email to this
    /// repository's local `.git/config`, so external `git` tooling run
    /// against the same working directory picks up the same identity.
    pub fn save_author(&self) -> Result<()> {
        self.gateway.save_author(&self.author)
    }

    /// Reads `user.name`/`user.email` back from `.git/config`, independent
    /// of the in-memory `author`/`committer` this facade was opened with.
    pub fn load_author(&self) -> Result<Option<Signature>> {
        self.gateway.load_author()
    }

    pub fn is_created_by_gitddb(&self) -> Result<bool> {
        Ok(self.info()?.is_created_by_gitddb())
    }

    pub fn is_valid_version(&self) -> Result<bool> {
        Ok(self.info()?.is_valid_version())
    }

    pub fn collection(&self, path: impl Into<String>) -> Collection {
        Collection::new(self.gateway.clone(), self.queue.clone(), path, self.author.clone(), self.committer.clone())
    }

    pub fn root(&self) -> Collection {
        self.collection("")
    }

    /// Exposed so the sync crate can wire a Sync Engine against the same
    /// repository handle and queue without gitddb-core depending on it.
    pub fn gateway(&self) -> Arc<Gateway> {
        self.gateway.clone()
    }

    pub fn queue(&self) -> Arc<TaskQueue> {
        self.queue.clone()
    }

    /// Internal-write bypass: saves opaque application metadata without
    /// touching task statistics, canonicalized and committed the same way as
    /// `info.json`.
    pub fn save_app_info(&self, value: serde_json::Value) -> Result<()> {
        let bytes = canonical_json::serialize(&value)?;
        self.gateway.commit(
            &branch_ref(DEFAULT_BRANCH),
            &[TreeUpdate::Upsert { path: APP_INFO_PATH.to_string(), content: bytes }],
            "save app info",
            &self.author,
            &self.committer,
        )?;
        Ok(())
    }

    /// App metadata is opaque and not path-addressed, so unlike documents it
    /// has no `_id` to reattach on load — deserializing straight from the
    /// stored bytes is what keeps this symmetric with `save_app_info`
    /// (`canonical_json::parse` would otherwise inject a synthetic id the
    /// caller never stored).
    pub fn load_app_info(&self) -> Result<Option<AppInfo>> {
        let head = match self.gateway.read_ref_oid(&branch_ref(DEFAULT_BRANCH))? {
            Some(h) => h,
            None => return Ok(None),
        };
        match self.gateway.read_path_at_commit(&head, APP_INFO_PATH)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Waits for the queue to drain, then releases the repository handle.
    /// Callers holding a `Collection` clone keep the Gateway/Arc alive until
    /// they drop it too — `close` only guarantees no *new* tasks dispatch.
    pub async fn close(&mut self, timeout: Duration) -> Result<()> {
        let timed_out = self.queue.wait_completion(timeout).await;
        if timed_out {
            return Err(GitDdbError::DatabaseCloseTimeout { timeout_ms: timeout.as_millis() as u64 });
        }
        self.queue.close().await;
        Ok(())
    }

    /// `close` then remove the working directory, bounded by
    /// `FileRemoveTimeout` so a stuck filesystem cannot hang the caller.
    pub async fn destroy(mut self, close_timeout: Duration, remove_timeout: Duration) -> Result<()> {
        self.close(close_timeout).await?;
        let dir = self.working_dir.clone();
        let removal = tokio::task::spawn_blocking(move || std::fs::remove_dir_all(&dir));
        match tokio::time::timeout(remove_timeout, removal).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(GitDdbError::CannotDeleteData { reason: e.to_string() }),
            Ok(Err(join_err)) => Err(GitDdbError::CannotDeleteData { reason: join_err.to_string() }),
            Err(_) => Err(GitDdbError::FileRemoveTimeout { timeout_ms: remove_timeout.as_millis() as u64 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_database_with_stable_id() {
        let dir = TempDir::new().unwrap();
        let facade = Facade::open(dir.path(), "mydb", true, None, None).await.unwrap();
        assert!(!facade.db_id().is_empty());
        assert!(facade.is_created_by_gitddb().unwrap());
        assert!(facade.is_valid_version().unwrap());
    }

    #[tokio::test]
    async fn open_without_create_fails_on_missing_repo() {
        let dir = TempDir::new().unwrap();
        let err = Facade::open(dir.path(), "missing", false, None, None).await.unwrap_err();
        assert!(matches!(err, GitDdbError::RepositoryNotFound { .. }));
    }

    #[tokio::test]
    async fn reopen_preserves_db_id() {
        let dir = TempDir::new().unwrap();
        let first = Facade::open(dir.path(), "mydb", true, None, None).await.unwrap();
        let id = first.db_id().to_string();
        drop(first);
        let second = Facade::open(dir.path(), "mydb", false, None, None).await.unwrap();
        assert_eq!(second.db_id(), id);
    }

    #[tokio::test]
    async fn app_info_round_trips() {
        let dir = TempDir::new().unwrap();
        let facade = Facade::open(dir.path(), "mydb", true, None, None).await.unwrap();
        assert!(facade.load_app_info().unwrap().is_none());
        facade.save_app_info(json!({"theme": "dark"})).unwrap();
        let loaded = facade.load_app_info().unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("theme").unwrap(), "dark");
        assert!(loaded.get("_id").is_none());
    }

    #[tokio::test]
    async fn save_author_mirrors_into_git_config() {
        let dir = TempDir::new().unwrap();
        let facade = Facade::open(dir.path(), "mydb", true, None, None).await.unwrap();
        assert!(facade.load_author().unwrap().is_none());
        facade.save_author().unwrap();
        let loaded = facade.load_author().unwrap().unwrap();
        assert_eq!(loaded.name, facade.author().name);
        assert_eq!(loaded.email, facade.author().email);
    }

    #[tokio::test]
    async fn close_waits_for_pending_tasks() {
        let dir = TempDir::new().unwrap();
        let mut facade = Facade::open(dir.path(), "mydb", true, None, None).await.unwrap();
        let notes = facade.root();
        notes.put(Some("a"), json!({}).as_object().unwrap().clone(), Format::Json).await.unwrap();
        facade.close(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn destroy_removes_working_directory() {
        let dir = TempDir::new().unwrap();
        let facade = Facade::open(dir.path(), "mydb", true, None, None).await.unwrap();
        let working_dir = facade.working_dir().to_path_buf();
        facade
            .destroy(Duration::from_secs(2), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!working_dir.exists());
    }
}
