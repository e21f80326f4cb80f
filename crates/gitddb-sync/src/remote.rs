//! Remote Engine Interface (C7): the minimal `clone`/`fetch`/`push`/
//! `checkFetch` surface the Sync Engine consumes, plus the in-tree
//! `Git2RemoteEngine` default implementation.
//!
//! `Git2RemoteEngine`'s credential chaining (SSH agent → SSH key files →
//! credential helper → default, capped retry attempts to avoid infinite
//! prompt loops) and push-rejection classification work against an
//! arbitrary named remote against the database's persistent working tree,
//! rather than a single hardcoded "origin" remote against a transient
//! temp-dir repo.

use crate::model::ConnectionConfig;
use gitddb_core::error::{GitDdbError, Result};
use git2::{Cred, CredentialType, FetchOptions, PushOptions, RemoteCallbacks, Repository};
use std::cell::Cell;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BRANCH: &str = "main";

/// Every call MUST apply the engine's retry policy: up to `retry`
/// additional attempts separated by `retry_interval`, retrying only
/// transient network errors. Non-retryable errors (auth, 404,
/// protocol-format) surface immediately.
pub trait RemoteEngine: Send + Sync {
    fn clone_repo(&self, dir: &Path, remote_name: &str) -> Result<()>;
    fn fetch(&self, dir: &Path, remote_name: &str) -> Result<()>;
    fn check_fetch(&self, dir: &Path, remote_name: &str) -> Result<bool>;
    fn push(
        &self,
        dir: &Path,
        remote_name: &str,
        local_branch: &str,
        remote_branch: &str,
    ) -> Result<()>;
}

pub struct Git2RemoteEngine {
    remote_url: String,
    connection: ConnectionConfig,
    retry: u32,
    retry_interval: Duration,
}

impl Git2RemoteEngine {
    pub fn new(remote_url: impl Into<String>, connection: ConnectionConfig, retry: u32, retry_interval: Duration) -> Self {
        Self {
            remote_url: remote_url.into(),
            connection,
            retry,
            retry_interval,
        }
    }

    /// SSH agent first, then explicit key files, then the credential
    /// helper, then git2's built-in default. Attempts beyond 10 fail
    /// outright so a misconfigured remote cannot loop forever re-prompting.
    fn make_callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let attempt = Cell::new(0u32);

        callbacks.credentials(move |url, username_from_url, allowed_types| {
            let current = attempt.get();
            attempt.set(current + 1);
            if current > 10 {
                return Err(git2::Error::from_str("authentication failed after multiple attempts"));
            }

            let username = username_from_url.unwrap_or("git");

            match &self.connection {
                ConnectionConfig::Ssh { public_key_path, private_key_path, pass_phrase } => {
                    if allowed_types.contains(CredentialType::SSH_KEY) {
                        debug!(key = %private_key_path.display(), "trying configured SSH key");
                        return Cred::ssh_key(username, Some(public_key_path), private_key_path, pass_phrase.as_deref());
                    }
                }
                ConnectionConfig::Github { personal_access_token: Some(token) } => {
                    if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                        debug!("trying GitHub personal access token");
                        return Cred::userpass_plaintext(username, token);
                    }
                }
                _ => {}
            }

            if allowed_types.contains(CredentialType::SSH_KEY) && current == 0 {
                debug!("trying SSH agent authentication");
                if let Ok(cred) = Cred::ssh_key_from_agent(username) {
                    return Ok(cred);
                }
            }

            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                debug!("trying credential helper");
                if let Ok(cfg) = git2::Config::open_default() {
                    if let Ok(cred) = Cred::credential_helper(&cfg, url, username_from_url) {
                        return Ok(cred);
                    }
                }
            }

            if allowed_types.contains(CredentialType::DEFAULT) {
                return Cred::default();
            }

            Err(git2::Error::from_str(&format!("no valid authentication method found for {}", url)))
        });

        callbacks
    }

    fn classify(&self, e: &git2::Error) -> GitDdbError {
        let msg = e.message().to_string();
        let lower = msg.to_lowercase();
        if lower.contains("401") {
            GitDdbError::HTTPError401AuthorizationRequired { url: self.remote_url.clone() }
        } else if lower.contains("403") {
            GitDdbError::HTTPError403Forbidden { url: self.remote_url.clone() }
        } else if lower.contains("404") {
            GitDdbError::HTTPError404NotFound { url: self.remote_url.clone() }
        } else if is_push_rejection(&lower) {
            GitDdbError::UnfetchedCommitExists
        } else if e.code() == git2::ErrorCode::Auth {
            GitDdbError::InvalidAuthenticationType { reason: msg }
        } else if e.class() == git2::ErrorClass::Net
            || lower.contains("enotfound")
            || lower.contains("econnrefused")
            || lower.contains("eacces")
        {
            GitDdbError::NetworkError { url: self.remote_url.clone(), reason: msg }
        } else {
            GitDdbError::CannotConnect { url: self.remote_url.clone(), reason: msg }
        }
    }

    /// Runs `op`, retrying only transient `NetworkError`s up to `self.retry`
    /// additional times, separated by `self.retry_interval`.
    fn with_retry<T>(&self, mut op: impl FnMut() -> std::result::Result<T, git2::Error>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let classified = self.classify(&e);
                    if classified.is_transient_network_error() && attempt < self.retry {
                        attempt += 1;
                        warn!(attempt, url = %self.remote_url, "transient network error, retrying");
                        std::thread::sleep(self.retry_interval);
                        continue;
                    }
                    return Err(classified);
                }
            }
        }
    }

    fn open_or_init(&self, dir: &Path) -> Result<Repository> {
        Repository::open(dir).or_else(|_| {
            Repository::init(dir).map_err(|e| GitDdbError::CannotCreateRepository {
                path: dir.display().to_string(),
                reason: e.message().to_string(),
            })
        })
    }

    fn find_or_add_remote<'r>(&self, repo: &'r Repository, remote_name: &str) -> Result<git2::Remote<'r>> {
        match repo.find_remote(remote_name) {
            Ok(r) => Ok(r),
            Err(_) => repo.remote(remote_name, &self.remote_url).map_err(|e| GitDdbError::InvalidGitRemote {
                name: remote_name.to_string(),
                reason: e.message().to_string(),
            }),
        }
    }
}

fn is_push_rejection(lower_msg: &str) -> bool {
    lower_msg.contains("non-fast-forward")
        || lower_msg.contains("fetch first")
        || lower_msg.contains("rejected")
        || lower_msg.contains("not present locally")
        || lower_msg.contains("stale info")
}

impl RemoteEngine for Git2RemoteEngine {
    fn clone_repo(&self, dir: &Path, remote_name: &str) -> Result<()> {
        let repo = self.open_or_init(dir)?;
        self.find_or_add_remote(&repo, remote_name)?;
        self.fetch(dir, remote_name)
    }

    fn fetch(&self, dir: &Path, remote_name: &str) -> Result<()> {
        let repo = Repository::open(dir).map_err(|e| GitDdbError::CannotOpenRepository {
            path: dir.display().to_string(),
            reason: e.message().to_string(),
        })?;
        let mut remote = self.find_or_add_remote(&repo, remote_name)?;
        let refspec = format!("+refs/heads/*:refs/remotes/{}/*", remote_name);

        self.with_retry(|| {
            let callbacks = self.make_callbacks();
            let mut opts = FetchOptions::new();
            opts.remote_callbacks(callbacks);
            remote.fetch(&[refspec.as_str()], Some(&mut opts), None)
        })
    }

    fn check_fetch(&self, dir: &Path, remote_name: &str) -> Result<bool> {
        self.fetch(dir, remote_name)?;
        Ok(true)
    }

    fn push(&self, dir: &Path, remote_name: &str, local_branch: &str, remote_branch: &str) -> Result<()> {
        let repo = Repository::open(dir).map_err(|e| GitDdbError::CannotOpenRepository {
            path: dir.display().to_string(),
            reason: e.message().to_string(),
        })?;
        let mut remote = self.find_or_add_remote(&repo, remote_name)?;
        let refspec = format!("refs/heads/{}:refs/heads/{}", local_branch, remote_branch);

        self.with_retry(|| {
            let mut rejected: Option<String> = None;
            {
                let rejected_ref = &mut rejected;
                let mut callbacks = self.make_callbacks();
                callbacks.push_update_reference(move |_refname, status| {
                    if let Some(msg) = status {
                        *rejected_ref = Some(msg.to_string());
                    }
                    Ok(())
                });
                let mut opts = PushOptions::new();
                opts.remote_callbacks(callbacks);
                remote.push(&[refspec.as_str()], Some(&mut opts))?;
            }
            if let Some(msg) = rejected {
                return Err(git2::Error::from_str(&msg));
            }
            Ok(())
        })
    }
}
