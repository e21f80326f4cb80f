//! Sync Engine (C9): the `fetch → detect divergence → (fast-forward | merge
//! | resolve conflicts) → push` state machine, periodic scheduling, and
//! `SyncEvent` emission.
//!
//! `run_sync_round` is a plain, non-async function invoked from inside a
//! Task Queue (C5) job body — matching the CRUD worker's pattern of fully
//! synchronous git2 work dispatched through `spawn_blocking` rather than
//! awaited directly (see `queue.rs`'s doc comment). Routing `trySync`
//! through the same queue as CRUD operations is also what makes concurrent
//! calls serialize safely behind one single-writer dispatcher.

use crate::merge::{self, PathOutcome};
use crate::model::{
    ChangeOperation, ChangedFile, Changes, CombineDbStrategy, Commits, ConflictResolutionStrategy,
    DuplicatedFile, MergeSchema, RemoteOptions, SyncAction, SyncDirection, SyncEvent, SyncResult,
    MIN_SYNC_INTERVAL_MS,
};
use crate::remote::{Git2RemoteEngine, RemoteEngine, DEFAULT_BRANCH};
use gitddb_core::canonical_json;
use gitddb_core::crud::Format;
use gitddb_core::error::{GitDdbError, Result};
use gitddb_core::gateway::{branch_ref, Gateway, TreeUpdate};
use gitddb_core::model::{DatabaseInfo, FatDoc, JsonDoc, Signature, TaskKind};
use gitddb_core::queue::{TaskOutput, TaskQueue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const INFO_PATH: &str = ".gitddb/info.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Idle,
    Running,
    Paused,
}

/// Owns one remote's sync lifecycle. A database with several registered
/// remotes keeps one of these per remote, keyed by name, in a
/// `HashMap<String, Arc<SyncEngine>>` held by whatever composition root
/// owns both the `Facade` and its synchronizers — `gitddb-core` cannot
/// depend on this crate, so that map does not live on `Facade` itself.
pub struct SyncEngine {
    gateway: Arc<Gateway>,
    queue: Arc<TaskQueue>,
    remote_engine: Arc<dyn RemoteEngine>,
    working_dir: PathBuf,
    local_db_id: String,
    options: RemoteOptions,
    author: Signature,
    committer: Signature,
    state: Arc<Mutex<EngineState>>,
    events: broadcast::Sender<SyncEvent>,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(
        gateway: Arc<Gateway>,
        queue: Arc<TaskQueue>,
        working_dir: impl Into<PathBuf>,
        local_db_id: impl Into<String>,
        options: RemoteOptions,
        author: Signature,
        committer: Signature,
    ) -> Result<Arc<Self>> {
        if !options.interval.is_zero() && options.interval.as_millis() < MIN_SYNC_INTERVAL_MS as u128 {
            return Err(GitDdbError::IntervalTooSmall {
                interval_ms: options.interval.as_millis() as u64,
                floor_ms: MIN_SYNC_INTERVAL_MS,
            });
        }
        match &options.connection {
            crate::model::ConnectionConfig::Github { .. } => {
                gitddb_core::validator::validate_github_repository_url(&options.remote_url)?;
            }
            _ => {
                gitddb_core::validator::validate_remote_url(&options.remote_url, false)?;
            }
        }
        let remote_engine: Arc<dyn RemoteEngine> = Arc::new(Git2RemoteEngine::new(
            options.remote_url.clone(),
            options.connection.clone(),
            options.retry,
            options.retry_interval,
        ));
        let (tx, _rx) = broadcast::channel(64);
        Ok(Arc::new(Self {
            gateway,
            queue,
            remote_engine,
            working_dir: working_dir.into(),
            local_db_id: local_db_id.into(),
            options,
            author,
            committer,
            state: Arc::new(Mutex::new(EngineState::Idle)),
            events: tx,
            periodic: Mutex::new(None),
        }))
    }

    pub fn remote_url(&self) -> &str {
        &self.options.remote_url
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Pauses periodic scheduling. A sync already running is not
    /// interrupted — cooperative pause takes effect on the next tick; an
    /// in-progress round ignores this and runs to completion.
    pub fn pause(&self) {
        *self.state.lock().unwrap() = EngineState::Paused;
        let _ = self.events.send(SyncEvent::Pause);
    }

    pub fn resume(&self) {
        *self.state.lock().unwrap() = EngineState::Idle;
        let _ = self.events.send(SyncEvent::Resume);
    }

    pub fn is_paused(&self) -> bool {
        matches!(*self.state.lock().unwrap(), EngineState::Paused)
    }

    /// One round-trip: fetch, decide, act, push, retrying on
    /// `UnfetchedCommitExists` up to `options.retry` times.
    pub async fn try_sync(&self) -> Result<SyncResult> {
        *self.state.lock().unwrap() = EngineState::Running;
        let _ = self.events.send(SyncEvent::Start);

        let gateway = self.gateway.clone();
        let remote = self.remote_engine.clone();
        let working_dir = self.working_dir.clone();
        let remote_name = self.options.remote_name.clone();
        let direction = self.options.sync_direction;
        let strategy = self.options.conflict_resolution_strategy;
        let combine_strategy = self.options.combine_db_strategy;
        let schema = self.options.schema.clone();
        let include_commits = self.options.include_commits;
        let author = self.author.clone();
        let committer = self.committer.clone();
        let local_db_id = self.local_db_id.clone();
        let max_retries = self.options.retry;
        let label = format!("sync:{}", self.options.remote_url);

        let handle = self.queue.enqueue(
            TaskKind::Sync,
            label,
            Box::new(move || {
                let result = try_sync_with_retry(
                    &gateway,
                    remote.as_ref(),
                    &working_dir,
                    &remote_name,
                    direction,
                    strategy,
                    combine_strategy,
                    &schema,
                    include_commits,
                    &author,
                    &committer,
                    &local_db_id,
                    max_retries,
                )?;
                Ok(Box::new(result) as TaskOutput)
            }),
        );

        let outcome = handle.into_future().await;
        *self.state.lock().unwrap() = EngineState::Idle;

        match outcome {
            Ok(boxed) => {
                let result = *boxed
                    .downcast::<SyncResult>()
                    .expect("sync task result type matches what try_sync enqueued");
                if !result.duplicates.is_empty() {
                    let _ = self.events.send(SyncEvent::Combine(result.duplicates.clone()));
                }
                let _ = self.events.send(SyncEvent::Change(result.clone()));
                let _ = self.events.send(SyncEvent::Complete);
                Ok(result)
            }
            Err(e) => {
                let _ = self.events.send(SyncEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Starts a background tick loop when `options.interval > 0`. A no-op
    /// otherwise (manual-only sync).
    pub fn start_periodic(self: &Arc<Self>) {
        if self.options.interval.is_zero() {
            return;
        }
        let engine = self.clone();
        let interval = self.options.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if engine.is_paused() {
                    continue;
                }
                if let Err(e) = engine.try_sync().await {
                    warn!(error = %e, "periodic sync failed");
                }
            }
        });
        *self.periodic.lock().unwrap() = Some(handle);
    }

    pub fn stop_periodic(&self) {
        if let Some(handle) = self.periodic.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn try_sync_with_retry(
    gateway: &Gateway,
    remote: &dyn RemoteEngine,
    working_dir: &Path,
    remote_name: &str,
    direction: SyncDirection,
    strategy: ConflictResolutionStrategy,
    combine_strategy: CombineDbStrategy,
    schema: &MergeSchema,
    include_commits: bool,
    author: &Signature,
    committer: &Signature,
    local_db_id: &str,
    max_retries: u32,
) -> Result<SyncResult> {
    let mut attempt = 0;
    loop {
        let round = run_sync_round(
            gateway,
            remote,
            working_dir,
            remote_name,
            direction,
            strategy,
            combine_strategy,
            schema,
            include_commits,
            author,
            committer,
            local_db_id,
        );
        match round {
            Err(GitDdbError::UnfetchedCommitExists) if attempt < max_retries => {
                attempt += 1;
                warn!(attempt, max_retries, "push rejected as non-fast-forward, retrying full sync round");
                continue;
            }
            other => return other,
        }
    }
}

/// `sync_direction` gates which halves of the round actually touch state:
/// `Pull` never calls `remote.push`; `Push` never adopts remote content
/// into the local branch (fast-forward, three-way merge, combine). Both
/// still fetch in every direction, since detecting divergence needs it.
#[allow(clippy::too_many_arguments)]
fn run_sync_round(
    gateway: &Gateway,
    remote: &dyn RemoteEngine,
    working_dir: &Path,
    remote_name: &str,
    direction: SyncDirection,
    strategy: ConflictResolutionStrategy,
    combine_strategy: CombineDbStrategy,
    schema: &MergeSchema,
    include_commits: bool,
    author: &Signature,
    committer: &Signature,
    local_db_id: &str,
) -> Result<SyncResult> {
    remote.fetch(working_dir, remote_name)?;

    let local_ref = branch_ref(DEFAULT_BRANCH);
    let remote_ref = format!("refs/remotes/{}/{}", remote_name, DEFAULT_BRANCH);
    let local_head = gateway.read_ref_oid(&local_ref)?;
    let remote_head = gateway.read_ref_oid(&remote_ref)?;

    let (local_head, remote_head) = match (local_head, remote_head) {
        (None, None) => return Ok(SyncResult::nop()),
        (Some(l), None) => {
            if direction == SyncDirection::Pull {
                return Ok(SyncResult::nop());
            }
            // Nothing on the remote yet: push local history as-is.
            remote.push(working_dir, remote_name, DEFAULT_BRANCH, DEFAULT_BRANCH)?;
            let changes = diff_commits(gateway, None, &l)?;
            return Ok(SyncResult {
                action: SyncAction::Push,
                changes: Some(Changes { local: Vec::new(), remote: changes }),
                conflicts: Vec::new(),
                commits: commits_block(gateway, include_commits, Some(&l), None)?,
                duplicates: Vec::new(),
                adopted_db_id: None,
            });
        }
        (l, Some(r)) => (l, r),
    };

    let local_head = match local_head {
        Some(l) => l,
        None => {
            if direction == SyncDirection::Push {
                return Ok(SyncResult::nop());
            }
            // No local history at all: adopt the remote wholesale.
            gateway.set_ref_oid(&local_ref, &remote_head, "fast-forward merge")?;
            let changes = diff_commits(gateway, None, &remote_head)?;
            return Ok(SyncResult {
                action: SyncAction::FastForwardMerge,
                changes: Some(Changes { local: changes, remote: Vec::new() }),
                conflicts: Vec::new(),
                commits: commits_block(gateway, include_commits, None, Some(&remote_head))?,
                duplicates: Vec::new(),
                adopted_db_id: None,
            });
        }
    };

    if local_head == remote_head {
        return Ok(SyncResult::nop());
    }

    let base = gateway.merge_base(&local_head, &remote_head)?;
    match base {
        None => {
            if direction == SyncDirection::Push {
                return Ok(SyncResult::nop());
            }
            run_combine(
                gateway, working_dir, remote, remote_name, &local_head, &remote_head, combine_strategy,
                include_commits, local_db_id, author, committer, direction,
            )
        }
        Some(base) if base == local_head => {
            if direction == SyncDirection::Push {
                return Ok(SyncResult::nop());
            }
            gateway.set_ref_oid(&local_ref, &remote_head, "fast-forward merge")?;
            let changes = diff_commits(gateway, Some(&local_head), &remote_head)?;
            Ok(SyncResult {
                action: SyncAction::FastForwardMerge,
                changes: Some(Changes { local: changes, remote: Vec::new() }),
                conflicts: Vec::new(),
                commits: commits_block(gateway, include_commits, None, Some(&remote_head))?,
                duplicates: Vec::new(),
                adopted_db_id: None,
            })
        }
        Some(base) if base == remote_head => {
            if direction == SyncDirection::Pull {
                return Ok(SyncResult::nop());
            }
            remote.push(working_dir, remote_name, DEFAULT_BRANCH, DEFAULT_BRANCH)?;
            let changes = diff_commits(gateway, Some(&remote_head), &local_head)?;
            Ok(SyncResult {
                action: SyncAction::Push,
                changes: Some(Changes { local: Vec::new(), remote: changes }),
                conflicts: Vec::new(),
                commits: commits_block(gateway, include_commits, Some(&local_head), None)?,
                duplicates: Vec::new(),
                adopted_db_id: None,
            })
        }
        Some(base) => {
            if direction == SyncDirection::Push {
                return Ok(SyncResult::nop());
            }
            let result = run_three_way_merge(
                gateway, &local_head, &remote_head, &base, strategy, schema, include_commits, author, committer,
            )?;
            if direction != SyncDirection::Pull {
                remote.push(working_dir, remote_name, DEFAULT_BRANCH, DEFAULT_BRANCH)?;
            }
            Ok(result)
        }
    }
}

fn commits_block(
    gateway: &Gateway,
    include_commits: bool,
    local_oid: Option<&str>,
    remote_oid: Option<&str>,
) -> Result<Option<Commits>> {
    if !include_commits {
        return Ok(None);
    }
    let mut local = Vec::new();
    if let Some(oid) = local_oid {
        local.push(gateway.read_commit(oid)?);
    }
    let mut remote = Vec::new();
    if let Some(oid) = remote_oid {
        remote.push(gateway.read_commit(oid)?);
    }
    Ok(Some(Commits { local, remote }))
}

/// Extension-sniffed `(path -> (Format, short_name))`, shared by the diff
/// and merge paths below — a document's `_id`/format round-trips through
/// its file extension the same way `CrudWorker::path_for` derives it.
fn format_for_path(path: &str) -> Option<(Format, &str)> {
    let ext = Path::new(path).extension().and_then(|e| e.to_str())?;
    let format = Format::from_extension(ext)?;
    let short = path.strip_suffix(&format!(".{}", ext))?;
    Some((format, short))
}

fn fat_doc_from_blob(gateway: &Gateway, path: &str, oid: Option<&str>) -> Result<Option<FatDoc>> {
    let oid = match oid {
        Some(o) => o,
        None => return Ok(None),
    };
    let (format, short_name) = match format_for_path(path) {
        Some(v) => v,
        None => return Ok(None),
    };
    let bytes = gateway.read_blob(oid)?;
    let value = format.parse(&bytes, short_name)?;
    let doc = value.as_object().cloned().ok_or(GitDdbError::InvalidJsonObject)?;
    Ok(Some(FatDoc {
        id: short_name.to_string(),
        name: path.to_string(),
        file_oid: oid.to_string(),
        doc_type: format.doc_type(),
        doc,
    }))
}

fn path_blob_map(gateway: &Gateway, commit_oid: &str) -> Result<HashMap<String, String>> {
    Ok(gateway
        .walk_tree(commit_oid, "")?
        .into_iter()
        .filter(|e| !e.is_tree)
        .map(|e| (e.path, e.oid))
        .collect())
}

/// Every path whose blob OID differs between `old` (or nothing, for the
/// very first sync) and `new`, as `ChangedFile` records. This underlies the
/// `"fast-forward merge"` and `"push"` actions' `changes.*` arrays.
fn diff_commits(gateway: &Gateway, old: Option<&str>, new: &str) -> Result<Vec<ChangedFile>> {
    let new_map = path_blob_map(gateway, new)?;
    let old_map = match old {
        Some(o) => path_blob_map(gateway, o)?,
        None => HashMap::new(),
    };

    let mut changes = Vec::new();
    for (path, new_oid) in &new_map {
        match old_map.get(path) {
            None => changes.push(build_changed_file(gateway, path, None, Some(new_oid), ChangeOperation::Insert)?),
            Some(old_oid) if old_oid != new_oid => {
                changes.push(build_changed_file(gateway, path, Some(old_oid), Some(new_oid), ChangeOperation::Update)?)
            }
            _ => {}
        }
    }
    for (path, old_oid) in &old_map {
        if !new_map.contains_key(path) {
            changes.push(build_changed_file(gateway, path, Some(old_oid), None, ChangeOperation::Delete)?);
        }
    }
    Ok(changes)
}

fn build_changed_file(
    gateway: &Gateway,
    path: &str,
    old_oid: Option<&str>,
    new_oid: Option<&str>,
    operation: ChangeOperation,
) -> Result<ChangedFile> {
    let new_doc = fat_doc_from_blob(gateway, path, new_oid)?;
    let old_doc = fat_doc_from_blob(gateway, path, old_oid)?;
    let fat_doc = new_doc
        .clone()
        .or_else(|| old_doc.clone())
        .ok_or_else(|| GitDdbError::DocumentNotFound { name: path.to_string() })?;
    Ok(ChangedFile { operation, new: new_doc, old: old_doc, fat_doc })
}

#[allow(clippy::too_many_arguments)]
fn run_three_way_merge(
    gateway: &Gateway,
    local_head: &str,
    remote_head: &str,
    base: &str,
    strategy: ConflictResolutionStrategy,
    schema: &MergeSchema,
    include_commits: bool,
    author: &Signature,
    committer: &Signature,
) -> Result<SyncResult> {
    let local_map = path_blob_map(gateway, local_head)?;
    let remote_map = path_blob_map(gateway, remote_head)?;
    let base_map = path_blob_map(gateway, base)?;

    let mut all_paths: Vec<&String> = local_map.keys().chain(remote_map.keys()).chain(base_map.keys()).collect();
    all_paths.sort();
    all_paths.dedup();

    let mut updates = Vec::new();
    let mut changes_local = Vec::new();
    let mut conflicts = Vec::new();
    let mut resolutions: Vec<(String, ChangeOperation, String, ConflictResolutionStrategy)> = Vec::new();

    for path in all_paths {
        let base_oid = base_map.get(path).map(String::as_str);
        let local_oid = local_map.get(path).map(String::as_str);
        let remote_oid = remote_map.get(path).map(String::as_str);

        match merge::classify_path(base_oid, local_oid, remote_oid) {
            PathOutcome::NoOp | PathOutcome::KeepLocal => {}
            PathOutcome::AdoptRemote(operation) => {
                match remote_oid {
                    Some(oid) => {
                        let bytes = gateway.read_blob(oid)?;
                        updates.push(TreeUpdate::Upsert { path: path.clone(), content: bytes });
                    }
                    None => updates.push(TreeUpdate::Remove { path: path.clone() }),
                }
                changes_local.push(build_changed_file(gateway, path, local_oid, remote_oid, operation)?);
            }
            PathOutcome::Conflict(operation) => {
                let (format, short_name) = match format_for_path(path) {
                    Some(v) => v,
                    None => continue,
                };
                let base_doc = decode_doc(gateway, format, short_name, base_oid)?;
                let local_doc = decode_doc(gateway, format, short_name, local_oid)?;
                let remote_doc = decode_doc(gateway, format, short_name, remote_oid)?;

                match merge::resolve_conflict(base_doc.as_ref(), local_doc.as_ref(), remote_doc.as_ref(), strategy, schema) {
                    Some(merged_doc) => {
                        let bytes = format.serialize(&serde_json::Value::Object(merged_doc))?;
                        let oid = gateway.write_blob(&bytes)?;
                        updates.push(TreeUpdate::Upsert { path: path.clone(), content: bytes });
                        resolutions.push((short_name.to_string(), operation, oid.clone(), strategy));
                        let fat_doc = fat_doc_from_blob(gateway, path, Some(&oid))?
                            .expect("just wrote this blob, it must decode");
                        conflicts.push(crate::model::Conflict { fat_doc: fat_doc.clone(), strategy, operation });
                        changes_local.push(ChangedFile {
                            operation,
                            new: Some(fat_doc.clone()),
                            old: fat_doc_from_blob(gateway, path, local_oid)?,
                            fat_doc,
                        });
                    }
                    None => {
                        updates.push(TreeUpdate::Remove { path: path.clone() });
                        resolutions.push((short_name.to_string(), operation, base_oid.unwrap_or_default().to_string(), strategy));
                        if let Some(old_doc) = fat_doc_from_blob(gateway, path, local_oid)? {
                            conflicts.push(crate::model::Conflict { fat_doc: old_doc.clone(), strategy, operation });
                            changes_local.push(ChangedFile { operation, new: None, old: Some(old_doc.clone()), fat_doc: old_doc });
                        }
                    }
                }
            }
        }
    }

    let message = if resolutions.is_empty() {
        "merge".to_string()
    } else {
        merge::conflict_commit_message(&resolutions)
    };

    let commit = gateway.commit_with_parents(
        &branch_ref(DEFAULT_BRANCH),
        &[local_head, remote_head],
        None,
        &updates,
        &message,
        author,
        committer,
    )?;

    let action = if conflicts.is_empty() {
        SyncAction::MergeAndPush
    } else {
        SyncAction::ResolveConflictsAndPush
    };

    let commits = if include_commits {
        Some(Commits { local: vec![commit], remote: Vec::new() })
    } else {
        None
    };

    Ok(SyncResult {
        action,
        changes: Some(Changes { local: changes_local, remote: Vec::new() }),
        conflicts,
        commits,
        duplicates: Vec::new(),
        adopted_db_id: None,
    })
}

fn decode_doc(gateway: &Gateway, format: Format, short_name: &str, oid: Option<&str>) -> Result<Option<JsonDoc>> {
    let oid = match oid {
        Some(o) => o,
        None => return Ok(None),
    };
    let bytes = gateway.read_blob(oid)?;
    let value = format.parse(&bytes, short_name)?;
    Ok(value.as_object().cloned())
}

/// Combine database: local and remote share no common ancestor. The
/// remote's tree becomes the base; local-only paths are added, and paths
/// that exist (with different content) on both sides are kept from the
/// remote and re-homed locally under a `-from-<dbId>` suffix. The combined
/// database adopts the remote's `dbId`.
#[allow(clippy::too_many_arguments)]
fn run_combine(
    gateway: &Gateway,
    working_dir: &Path,
    remote: &dyn RemoteEngine,
    remote_name: &str,
    local_head: &str,
    remote_head: &str,
    combine_strategy: CombineDbStrategy,
    include_commits: bool,
    local_db_id: &str,
    author: &Signature,
    committer: &Signature,
    direction: SyncDirection,
) -> Result<SyncResult> {
    if combine_strategy == CombineDbStrategy::ThrowError {
        return Err(GitDdbError::NoMergeBaseFound);
    }

    let remote_info_bytes = gateway
        .read_path_at_commit(remote_head, INFO_PATH)?
        .ok_or(GitDdbError::NoMergeBaseFound)?;
    let remote_info_value = canonical_json::parse(&remote_info_bytes, "info")?;
    let remote_info: DatabaseInfo = serde_json::from_value(remote_info_value)?;

    let local_map = path_blob_map(gateway, local_head)?;
    let remote_map = path_blob_map(gateway, remote_head)?;
    let remote_tree_oid = gateway.tree_oid_at_commit(remote_head)?;

    let mut updates = Vec::new();
    let mut changes_local = Vec::new();
    let mut duplicates = Vec::new();

    for (path, local_oid) in &local_map {
        if path == INFO_PATH {
            continue;
        }
        match remote_map.get(path) {
            None => {
                let bytes = gateway.read_blob(local_oid)?;
                updates.push(TreeUpdate::Upsert { path: path.clone(), content: bytes });
                changes_local.push(build_changed_file(gateway, path, None, Some(local_oid), ChangeOperation::Insert)?);
            }
            Some(remote_oid) if remote_oid == local_oid => {
                // Identical content under the same name: nothing to rehome.
            }
            Some(_) => {
                let (format, short_name) = match format_for_path(path) {
                    Some(v) => v,
                    None => continue,
                };
                let renamed_short = format!("{}-from-{}", short_name, local_db_id);
                let renamed_path = path.replacen(short_name, &renamed_short, 1);
                let bytes = gateway.read_blob(local_oid)?;
                updates.push(TreeUpdate::Upsert { path: renamed_path.clone(), content: bytes });
                let fat_doc = fat_doc_from_blob(gateway, &renamed_path, Some(local_oid))?
                    .unwrap_or_else(|| FatDoc {
                        id: renamed_short.clone(),
                        name: renamed_path.clone(),
                        file_oid: local_oid.clone(),
                        doc_type: format.doc_type(),
                        doc: Default::default(),
                    });
                duplicates.push(DuplicatedFile { original_name: path.clone(), duplicated_name: renamed_path.clone(), fat_doc: fat_doc.clone() });
                changes_local.push(ChangedFile { operation: ChangeOperation::Insert, new: Some(fat_doc.clone()), old: None, fat_doc });
            }
        }
    }

    let message = "combine database head with theirs".to_string();
    let commit = gateway.commit_with_parents(
        &branch_ref(DEFAULT_BRANCH),
        &[local_head, remote_head],
        Some(remote_tree_oid.as_str()),
        &updates,
        &message,
        author,
        committer,
    )?;

    if direction != SyncDirection::Pull {
        remote.push(working_dir, remote_name, DEFAULT_BRANCH, DEFAULT_BRANCH)?;
    }

    debug!(remote_db_id = %remote_info.db_id, duplicates = duplicates.len(), "combined disjoint histories");

    let commits = if include_commits {
        Some(Commits { local: vec![commit], remote: Vec::new() })
    } else {
        None
    };

    Ok(SyncResult {
        action: SyncAction::CombineDatabase,
        changes: Some(Changes { local: changes_local, remote: Vec::new() }),
        conflicts: Vec::new(),
        commits,
        duplicates,
        adopted_db_id: Some(remote_info.db_id),
    })
}
