//! Path, id, and working-directory validation (C2). Deterministic and
//! side-effect-free: every rejection is derivable from the input alone.

use crate::error::{GitDdbError, Result};

/// Common floor for working-directory byte length, matched across platforms
/// rather than querying the real filesystem limit (which varies by OS and
/// mount).
pub const MAX_WORKING_DIR_PATH_BYTES: usize = 4096;

/// Segment names that would collide with database-internal bookkeeping
/// directories if allowed as a document id segment. Generalizes the flat
/// reserved-name list the sync crate uses for workspace folders to a
/// per-segment check, since `_id`s here may be slash-nested.
pub const RESERVED_SEGMENTS: &[&str] = &[".git", ".gitddb", ".", ".."];

pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(GitDdbError::UndefinedDatabaseName);
    }
    Ok(())
}

pub fn validate_working_directory_path(path: &str) -> Result<()> {
    if path.len() > MAX_WORKING_DIR_PATH_BYTES {
        return Err(GitDdbError::InvalidWorkingDirectoryPathLength {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Validates a document `_id`. Rejects empty ids, ids containing a NUL byte,
/// ids starting or ending with `/`, ids containing `..` as a path component,
/// and ids with a reserved segment anywhere in the path.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(GitDdbError::InvalidId { id: id.to_string() });
    }
    if id.contains('\0') {
        return Err(GitDdbError::InvalidId { id: id.to_string() });
    }
    if id.starts_with('/') || id.ends_with('/') {
        return Err(GitDdbError::InvalidId { id: id.to_string() });
    }
    for segment in id.split('/') {
        if segment == ".." || segment.is_empty() {
            return Err(GitDdbError::InvalidId { id: id.to_string() });
        }
        if RESERVED_SEGMENTS.contains(&segment) {
            return Err(GitDdbError::InvalidId { id: id.to_string() });
        }
    }
    Ok(())
}

pub fn validate_remote_url(url: &str, requires_https: bool) -> Result<()> {
    if url.is_empty() {
        return Err(GitDdbError::UndefinedRemoteURL);
    }
    if requires_https && !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(GitDdbError::InvalidURLFormat { url: url.to_string() });
    }
    Ok(())
}

/// `https?://host/user/repo(.git)?` — the GitHub-style repository URL shape.
pub fn validate_github_repository_url(url: &str) -> Result<()> {
    validate_remote_url(url, true)?;
    let rest = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let mut parts = rest.splitn(2, '/');
    let host = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");
    let path = path.strip_suffix(".git").unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if host.is_empty() || segments.len() != 2 {
        return Err(GitDdbError::InvalidRepositoryURL { url: url.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_database_name() {
        assert!(validate_database_name("").is_err());
    }

    #[test]
    fn rejects_overlong_working_directory_path() {
        let path = "a".repeat(MAX_WORKING_DIR_PATH_BYTES + 1);
        assert!(validate_working_directory_path(&path).is_err());
    }

    #[test]
    fn accepts_simple_ids() {
        assert!(validate_id("a/b/c").is_ok());
    }

    #[test]
    fn rejects_leading_and_trailing_slash() {
        assert!(validate_id("/a").is_err());
        assert!(validate_id("a/").is_err());
    }

    #[test]
    fn rejects_dot_dot_segment() {
        assert!(validate_id("a/../b").is_err());
    }

    #[test]
    fn rejects_reserved_segment_anywhere_in_path() {
        assert!(validate_id(".gitddb/x").is_err());
        assert!(validate_id("a/.git").is_err());
    }

    #[test]
    fn rejects_nul_byte() {
        assert!(validate_id("a\0b").is_err());
    }

    #[test]
    fn github_url_must_use_https() {
        assert!(validate_github_repository_url("ssh://host/user/repo").is_err());
    }

    #[test]
    fn github_url_must_have_user_and_repo() {
        assert!(validate_github_repository_url("https://github.com/user/repo").is_ok());
        assert!(validate_github_repository_url("https://github.com/user/repo.git").is_ok());
        assert!(validate_github_repository_url("https://github.com/user").is_err());
    }
}
