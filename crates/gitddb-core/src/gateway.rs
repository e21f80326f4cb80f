//! Blob/Tree Gateway (C3): the only component that mutates the Git object
//! database. Thin wrapper over `git2`, grounded on the sync crate's
//! `SyncContext` (`commit_update` via `TreeUpdateBuilder`, blob/tree reads) but
//! adapted from a transient temp-dir repo to the persistent working tree this
//! database owns at `<localDir>/<dbName>/.git`.

use crate::error::{GitDdbError, Result};
use crate::model::{NormalizedCommit, Signature as CommitSignature};
use git2::build::TreeUpdateBuilder;
use git2::{FileMode, ObjectType, Oid, Repository};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_BRANCH: &str = "main";

/// One file-level entry yielded by `walk_tree`.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub oid: String,
    pub is_tree: bool,
}

/// A single upsert or removal to apply in one commit.
pub enum TreeUpdate {
    Upsert { path: String, content: Vec<u8> },
    Remove { path: String },
}

pub struct Gateway {
    repo: Repository,
}

impl Gateway {
    pub fn open(working_dir: &Path) -> Result<Self> {
        let repo = Repository::open(working_dir).map_err(|e| GitDdbError::CannotOpenRepository {
            path: working_dir.display().to_string(),
            reason: e.message().to_string(),
        })?;
        Ok(Self { repo })
    }

    pub fn init(working_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(working_dir).map_err(|e| GitDdbError::CannotCreateDirectory {
            path: working_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head(DEFAULT_BRANCH);
        let repo = Repository::init_opts(working_dir, &opts).map_err(|e| {
            GitDdbError::CannotCreateRepository {
                path: working_dir.display().to_string(),
                reason: e.message().to_string(),
            }
        })?;
        Ok(Self { repo })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn write_blob(&self, bytes: &[u8]) -> Result<String> {
        let oid = self.repo.blob(bytes)?;
        Ok(oid.to_string())
    }

    pub fn read_blob(&self, oid: &str) -> Result<Vec<u8>> {
        let oid = Oid::from_str(oid).map_err(|_| GitDdbError::InvalidId { id: oid.to_string() })?;
        let blob = self.repo.find_blob(oid)?;
        Ok(blob.content().to_vec())
    }

    pub fn read_ref_oid(&self, refname: &str) -> Result<Option<String>> {
        match self.repo.find_reference(refname) {
            Ok(reference) => Ok(reference.target().map(|o| o.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_ref_oid(&self, refname: &str, oid: &str, message: &str) -> Result<()> {
        let oid = Oid::from_str(oid).map_err(|_| GitDdbError::InvalidId { id: oid.to_string() })?;
        self.repo.reference(refname, oid, true, message)?;
        Ok(())
    }

    /// Read a blob at a path from a given commit's tree, or `None` if the path
    /// does not exist at that commit.
    pub fn read_path_at_commit(&self, commit_oid: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let commit_oid = Oid::from_str(commit_oid)
            .map_err(|_| GitDdbError::InvalidId { id: commit_oid.to_string() })?;
        let commit = self.repo.find_commit(commit_oid)?;
        let tree = commit.tree()?;
        match tree.get_path(Path::new(path)) {
            Ok(entry) => {
                let blob = self.repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Blob OID at `path` on the given commit, or `None` if absent.
    pub fn file_oid_at_commit(&self, commit_oid: &str, path: &str) -> Result<Option<String>> {
        let commit_oid = Oid::from_str(commit_oid)
            .map_err(|_| GitDdbError::InvalidId { id: commit_oid.to_string() })?;
        let commit = self.repo.find_commit(commit_oid)?;
        let tree = commit.tree()?;
        match tree.get_path(Path::new(path)) {
            Ok(entry) => Ok(Some(entry.id().to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lazily enumerate every entry under `path` (or the whole tree if `path`
    /// is empty) at the given commit.
    pub fn walk_tree(&self, commit_oid: &str, path: &str) -> Result<Vec<TreeEntry>> {
        let commit_oid = Oid::from_str(commit_oid)
            .map_err(|_| GitDdbError::InvalidId { id: commit_oid.to_string() })?;
        let commit = self.repo.find_commit(commit_oid)?;
        let tree = commit.tree()?;

        let root = if path.is_empty() {
            tree
        } else {
            match tree.get_path(Path::new(path)) {
                Ok(entry) => self.repo.find_tree(entry.id())?,
                Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
        };

        let mut out = Vec::new();
        root.walk(git2::TreeWalkMode::PreOrder, |parent, entry| {
            let full_path = if parent.is_empty() {
                entry.name().unwrap_or_default().to_string()
            } else {
                format!("{}{}", parent, entry.name().unwrap_or_default())
            };
            let full_path = if path.is_empty() {
                full_path
            } else {
                format!("{}/{}", path, full_path)
            };
            out.push(TreeEntry {
                path: full_path,
                oid: entry.id().to_string(),
                is_tree: entry.kind() == Some(ObjectType::Tree),
            });
            git2::TreeWalkResult::Ok
        })?;
        Ok(out)
    }

    /// Apply a batch of upserts/removals to the current HEAD tree (or an
    /// empty tree, for the first commit) and create a commit on `refname`.
    /// Returns the normalized commit record.
    pub fn commit(
        &self,
        refname: &str,
        updates: &[TreeUpdate],
        message: &str,
        author: &CommitSignature,
        committer: &CommitSignature,
    ) -> Result<NormalizedCommit> {
        let parent_commit = match self.repo.find_reference(refname) {
            Ok(r) => r.target().and_then(|oid| self.repo.find_commit(oid).ok()),
            Err(_) => None,
        };

        let base_tree = match &parent_commit {
            Some(c) => c.tree()?,
            None => {
                let empty_oid = self.repo.treebuilder(None)?.write()?;
                self.repo.find_tree(empty_oid)?
            }
        };

        let mut builder = TreeUpdateBuilder::new();
        for update in updates {
            match update {
                TreeUpdate::Upsert { path, content } => {
                    let oid = self.repo.blob(content)?;
                    builder.upsert(path, oid, FileMode::Blob);
                }
                TreeUpdate::Remove { path } => {
                    builder.remove(path);
                }
            }
        }
        let new_tree_oid = builder.create_updated(&self.repo, &base_tree)?;
        let new_tree = self.repo.find_tree(new_tree_oid)?;

        let git_author = git2::Signature::new(
            &author.name,
            &author.email,
            &git2::Time::new(author.timestamp, 0),
        )?;
        let git_committer = git2::Signature::new(
            &committer.name,
            &committer.email,
            &git2::Time::new(committer.timestamp, 0),
        )?;

        let parents: Vec<&git2::Commit> = parent_commit.as_ref().into_iter().collect();
        let commit_oid = self.repo.commit(
            Some(refname),
            &git_author,
            &git_committer,
            message,
            &new_tree,
            &parents,
        )?;

        debug!(%commit_oid, refname, "commit created");

        Ok(NormalizedCommit {
            oid: commit_oid.to_string(),
            message: message.to_string(),
            parent: parents.iter().map(|c| c.id().to_string()).collect(),
            author: author.clone(),
            committer: committer.clone(),
            gpgsig: None,
        })
    }

    /// Like `commit`, but takes explicit parent OIDs instead of inferring a
    /// single parent from `refname`'s current target. Used by the sync
    /// crate to create merge commits with two parents (local head, remote
    /// head) and combine-database commits.
    pub fn commit_with_parents(
        &self,
        refname: &str,
        parent_oids: &[&str],
        base_tree_oid: Option<&str>,
        updates: &[TreeUpdate],
        message: &str,
        author: &CommitSignature,
        committer: &CommitSignature,
    ) -> Result<NormalizedCommit> {
        let parents: Vec<git2::Commit> = parent_oids
            .iter()
            .map(|oid| {
                let oid = Oid::from_str(oid).map_err(|_| GitDdbError::InvalidId { id: oid.to_string() })?;
                Ok(self.repo.find_commit(oid)?)
            })
            .collect::<Result<Vec<_>>>()?;

        let base_tree = match base_tree_oid {
            Some(oid) => {
                let oid = Oid::from_str(oid).map_err(|_| GitDdbError::InvalidId { id: oid.to_string() })?;
                self.repo.find_tree(oid)?
            }
            None => match parents.first() {
                Some(c) => c.tree()?,
                None => {
                    let empty_oid = self.repo.treebuilder(None)?.write()?;
                    self.repo.find_tree(empty_oid)?
                }
            },
        };

        let mut builder = TreeUpdateBuilder::new();
        for update in updates {
            match update {
                TreeUpdate::Upsert { path, content } => {
                    let oid = self.repo.blob(content)?;
                    builder.upsert(path, oid, FileMode::Blob);
                }
                TreeUpdate::Remove { path } => {
                    builder.remove(path);
                }
            }
        }
        let new_tree_oid = builder.create_updated(&self.repo, &base_tree)?;
        let new_tree = self.repo.find_tree(new_tree_oid)?;

        let git_author = git2::Signature::new(&author.name, &author.email, &git2::Time::new(author.timestamp, 0))?;
        let git_committer =
            git2::Signature::new(&committer.name, &committer.email, &git2::Time::new(committer.timestamp, 0))?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        let commit_oid = self.repo.commit(
            Some(refname),
            &git_author,
            &git_committer,
            message,
            &new_tree,
            &parent_refs,
        )?;

        debug!(%commit_oid, refname, parents = parent_oids.len(), "merge commit created");

        Ok(NormalizedCommit {
            oid: commit_oid.to_string(),
            message: message.to_string(),
            parent: parent_oids.iter().map(|s| s.to_string()).collect(),
            author: author.clone(),
            committer: committer.clone(),
            gpgsig: None,
        })
    }

    /// Most recent common ancestor of two commits, or `None` for disjoint
    /// histories (the combine-database trigger).
    pub fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>> {
        let a = Oid::from_str(a).map_err(|_| GitDdbError::InvalidId { id: a.to_string() })?;
        let b = Oid::from_str(b).map_err(|_| GitDdbError::InvalidId { id: b.to_string() })?;
        match self.repo.merge_base(a, b) {
            Ok(oid) => Ok(Some(oid.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The commit's tree OID, for passing as `base_tree_oid` to
    /// `commit_with_parents` when the base tree isn't the first parent's.
    pub fn tree_oid_at_commit(&self, commit_oid: &str) -> Result<String> {
        let oid = Oid::from_str(commit_oid).map_err(|_| GitDdbError::InvalidId { id: commit_oid.to_string() })?;
        let commit = self.repo.find_commit(oid)?;
        Ok(commit.tree()?.id().to_string())
    }

    /// Fetch one commit's `NormalizedCommit` record by OID.
    pub fn read_commit(&self, commit_oid: &str) -> Result<NormalizedCommit> {
        let oid = Oid::from_str(commit_oid).map_err(|_| GitDdbError::InvalidId { id: commit_oid.to_string() })?;
        let commit = self.repo.find_commit(oid)?;
        Ok(to_normalized_commit(&commit))
    }

    /// Mirrors a signature to this repository's local `.git/config`
    /// `user.name`/`user.email`, the same pair `git2::Signature::now` would
    /// fall back to if the caller omitted an explicit author/committer.
    pub fn save_author(&self, signature: &CommitSignature) -> Result<()> {
        let mut config = self.repo.config()?;
        config.set_str("user.name", &signature.name)?;
        config.set_str("user.email", &signature.email)?;
        Ok(())
    }

    /// Reads `user.name`/`user.email` back from `.git/config`, or `None` if
    /// neither has ever been set (a database that has never called
    /// `save_author`). The timestamp is always "now" since `.git/config`
    /// has no notion of one.
    pub fn load_author(&self) -> Result<Option<CommitSignature>> {
        let config = self.repo.config()?;
        let name = config.get_string("user.name").ok();
        let email = config.get_string("user.email").ok();
        match (name, email) {
            (None, None) => Ok(None),
            (name, email) => Ok(Some(CommitSignature {
                name: name.unwrap_or_default(),
                email: email.unwrap_or_default(),
                timestamp: now_unix_seconds(),
            })),
        }
    }

    /// First-parent commit walk starting at `refname`, newest first.
    pub fn first_parent_history(&self, refname: &str) -> Result<Vec<NormalizedCommit>> {
        let head_oid = match self.read_ref_oid(refname)? {
            Some(oid) => Oid::from_str(&oid).map_err(|_| GitDdbError::InvalidId { id: oid })?,
            None => return Ok(Vec::new()),
        };

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(head_oid)?;
        revwalk.simplify_first_parent()?;

        let mut out = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            out.push(to_normalized_commit(&commit));
        }
        Ok(out)
    }
}

pub fn to_normalized_commit(commit: &git2::Commit) -> NormalizedCommit {
    NormalizedCommit {
        oid: commit.id().to_string(),
        message: commit.message().unwrap_or_default().to_string(),
        parent: (0..commit.parent_count())
            .filter_map(|i| commit.parent_id(i).ok())
            .map(|oid| oid.to_string())
            .collect(),
        author: to_signature(&commit.author()),
        committer: to_signature(&commit.committer()),
        gpgsig: None,
    }
}

fn to_signature(sig: &git2::Signature) -> CommitSignature {
    CommitSignature {
        name: sig.name().unwrap_or_default().to_string(),
        email: sig.email().unwrap_or_default().to_string(),
        timestamp: sig.when().seconds(),
    }
}

pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

fn now_unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sig() -> CommitSignature {
        CommitSignature {
            name: "Test".to_string(),
            email: "test@localhost".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn first_commit_has_no_parent() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let commit = gw
            .commit(
                &branch_ref(DEFAULT_BRANCH),
                &[TreeUpdate::Upsert {
                    path: "a.json".to_string(),
                    content: b"{}\n".to_vec(),
                }],
                "first commit",
                &sig(),
                &sig(),
            )
            .unwrap();
        assert!(commit.parent.is_empty());
    }

    #[test]
    fn second_commit_parents_the_first() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let first = gw
            .commit(
                &branch_ref(DEFAULT_BRANCH),
                &[TreeUpdate::Upsert {
                    path: "a.json".to_string(),
                    content: b"{}\n".to_vec(),
                }],
                "first",
                &sig(),
                &sig(),
            )
            .unwrap();
        let second = gw
            .commit(
                &branch_ref(DEFAULT_BRANCH),
                &[TreeUpdate::Upsert {
                    path: "b.json".to_string(),
                    content: b"{}\n".to_vec(),
                }],
                "second",
                &sig(),
                &sig(),
            )
            .unwrap();
        assert_eq!(second.parent, vec![first.oid]);
    }

    #[test]
    fn removal_deletes_path() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let first = gw
            .commit(
                &branch_ref(DEFAULT_BRANCH),
                &[TreeUpdate::Upsert {
                    path: "a.json".to_string(),
                    content: b"{}\n".to_vec(),
                }],
                "first",
                &sig(),
                &sig(),
            )
            .unwrap();
        assert!(gw.file_oid_at_commit(&first.oid, "a.json").unwrap().is_some());

        let second = gw
            .commit(
                &branch_ref(DEFAULT_BRANCH),
                &[TreeUpdate::Remove { path: "a.json".to_string() }],
                "delete",
                &sig(),
                &sig(),
            )
            .unwrap();
        assert!(gw.file_oid_at_commit(&second.oid, "a.json").unwrap().is_none());
    }

    #[test]
    fn walk_tree_lists_all_blobs() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let commit = gw
            .commit(
                &branch_ref(DEFAULT_BRANCH),
                &[
                    TreeUpdate::Upsert { path: "a/x.json".to_string(), content: b"{}\n".to_vec() },
                    TreeUpdate::Upsert { path: "a/y.json".to_string(), content: b"{}\n".to_vec() },
                ],
                "two files",
                &sig(),
                &sig(),
            )
            .unwrap();
        let entries = gw.walk_tree(&commit.oid, "").unwrap();
        let blobs: Vec<_> = entries.iter().filter(|e| !e.is_tree).collect();
        assert_eq!(blobs.len(), 2);
    }

    #[test]
    fn load_author_is_none_before_any_save() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        assert!(gw.load_author().unwrap().is_none());
    }

    #[test]
    fn save_author_round_trips_through_local_config() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        gw.save_author(&sig()).unwrap();
        let loaded = gw.load_author().unwrap().unwrap();
        assert_eq!(loaded.name, sig().name);
        assert_eq!(loaded.email, sig().email);
    }

    #[test]
    fn first_parent_history_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        gw.commit(
            &branch_ref(DEFAULT_BRANCH),
            &[TreeUpdate::Upsert { path: "a.json".to_string(), content: b"{}\n".to_vec() }],
            "first",
            &sig(),
            &sig(),
        )
        .unwrap();
        let second = gw
            .commit(
                &branch_ref(DEFAULT_BRANCH),
                &[TreeUpdate::Upsert { path: "a.json".to_string(), content: b"{\"a\":1}\n".to_vec() }],
                "second",
                &sig(),
                &sig(),
            )
            .unwrap();
        let history = gw.first_parent_history(&branch_ref(DEFAULT_BRANCH)).unwrap();
        assert_eq!(history[0].oid, second.oid);
        assert_eq!(history.len(), 2);
    }
}
