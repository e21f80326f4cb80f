//! Synchronizer registry: the `synchronizers` map the concurrency model
//! describes as "URL → Sync", owned by whatever composition root holds both
//! a `Facade` and its Sync Engines. `gitddb-core` cannot depend on this
//! crate (see `DESIGN.md`), so the map lives here instead of on `Facade`
//! itself; `SyncManager::new` takes a `&Facade` and reads the handles it
//! already exposes (`gateway()`, `queue()`, `db_id()`, `author()`,
//! `committer()`, `working_dir()`) rather than duplicating them.
//!
//! Mutated only by `sync()`/`remove_sync()`, each taking the registry's own
//! lock for the whole of their (synchronous, non-suspending) body so the
//! map never changes mid-task.

use crate::engine::SyncEngine;
use crate::model::RemoteOptions;
use gitddb_core::error::{GitDdbError, Result};
use gitddb_core::facade::Facade;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Lowercased, trailing-slash-trimmed remote URL — two options that name
/// the same remote with different casing or a trailing slash collide on
/// the same registry key, matching how most Git hosts treat URLs.
fn normalize_remote_url(url: &str) -> String {
    url.trim_end_matches('/').to_ascii_lowercase()
}

/// Owns one `SyncEngine` per distinct remote URL for a single open
/// database. `sync()` registers and starts a new remote; `remove_sync()`
/// pauses and drops it. Both key off the normalized remote URL, not the
/// caller-supplied remote name, so the same remote registered twice under
/// different names is still rejected with `RemoteAlreadyRegistered`.
pub struct SyncManager {
    gateway: Arc<gitddb_core::gateway::Gateway>,
    queue: Arc<gitddb_core::queue::TaskQueue>,
    working_dir: std::path::PathBuf,
    local_db_id: String,
    author: gitddb_core::model::Signature,
    committer: gitddb_core::model::Signature,
    synchronizers: Mutex<HashMap<String, Arc<SyncEngine>>>,
}

impl SyncManager {
    pub fn new(facade: &Facade) -> Self {
        Self {
            gateway: facade.gateway(),
            queue: facade.queue(),
            working_dir: facade.working_dir().to_path_buf(),
            local_db_id: facade.db_id().to_string(),
            author: facade.author().clone(),
            committer: facade.committer().clone(),
            synchronizers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers and starts periodic sync (if `options.interval > 0`) for a
    /// new remote. Fails with `RemoteAlreadyRegistered` if this URL is
    /// already registered; callers that want to change a remote's options
    /// must `remove_sync` it first.
    pub fn sync(&self, options: RemoteOptions) -> Result<Arc<SyncEngine>> {
        let key = normalize_remote_url(&options.remote_url);
        let mut map = self.synchronizers.lock().unwrap();
        if map.contains_key(&key) {
            return Err(GitDdbError::RemoteAlreadyRegistered { name: options.remote_url });
        }
        let engine = SyncEngine::new(
            self.gateway.clone(),
            self.queue.clone(),
            self.working_dir.clone(),
            self.local_db_id.clone(),
            options,
            self.author.clone(),
            self.committer.clone(),
        )?;
        engine.start_periodic();
        map.insert(key, engine.clone());
        Ok(engine)
    }

    /// Pauses periodic sync and drops a remote's `SyncEngine`. A no-op
    /// (returns `None`) if that URL was never registered.
    pub fn remove_sync(&self, remote_url: &str) -> Option<Arc<SyncEngine>> {
        let key = normalize_remote_url(remote_url);
        let removed = self.synchronizers.lock().unwrap().remove(&key);
        if let Some(engine) = &removed {
            engine.stop_periodic();
            engine.pause();
        }
        removed
    }

    pub fn get(&self, remote_url: &str) -> Option<Arc<SyncEngine>> {
        self.synchronizers.lock().unwrap().get(&normalize_remote_url(remote_url)).cloned()
    }

    pub fn len(&self) -> usize {
        self.synchronizers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pauses and drops every registered remote, used by `close`/`destroy`
    /// to stop all periodic sync loops before the repository handle goes
    /// away.
    pub fn pause_all(&self) {
        let map = self.synchronizers.lock().unwrap();
        for engine in map.values() {
            engine.stop_periodic();
            engine.pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RemoteOptions;
    use tempfile::TempDir;

    async fn open_facade(dir: &std::path::Path) -> Facade {
        Facade::open(dir, "db", true, None, None).await.unwrap()
    }

    #[tokio::test]
    async fn registering_same_url_twice_fails() {
        let dir = TempDir::new().unwrap();
        let facade = open_facade(dir.path()).await;
        let manager = SyncManager::new(&facade);

        manager.sync(RemoteOptions::new("https://example.com/remote.git")).unwrap();
        let err = manager.sync(RemoteOptions::new("https://example.com/remote.git")).unwrap_err();
        assert!(matches!(err, GitDdbError::RemoteAlreadyRegistered { .. }));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn url_normalization_ignores_case_and_trailing_slash() {
        let dir = TempDir::new().unwrap();
        let facade = open_facade(dir.path()).await;
        let manager = SyncManager::new(&facade);

        manager.sync(RemoteOptions::new("https://Example.com/remote.git/")).unwrap();
        let err = manager.sync(RemoteOptions::new("https://example.com/remote.git")).unwrap_err();
        assert!(matches!(err, GitDdbError::RemoteAlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn remove_sync_allows_re_registration() {
        let dir = TempDir::new().unwrap();
        let facade = open_facade(dir.path()).await;
        let manager = SyncManager::new(&facade);

        manager.sync(RemoteOptions::new("https://example.com/remote.git")).unwrap();
        assert!(manager.remove_sync("https://example.com/remote.git").is_some());
        assert!(manager.is_empty());
        manager.sync(RemoteOptions::new("https://example.com/remote.git")).unwrap();
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn remove_sync_on_unregistered_url_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let facade = open_facade(dir.path()).await;
        let manager = SyncManager::new(&facade);
        assert!(manager.remove_sync("https://never-registered.example.com").is_none());
    }
}
