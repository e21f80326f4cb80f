//! CRUD Worker (C4): put/insert/update/delete/get/getFatDoc/getBackNumber/
//! getHistory/find, dispatched by the Task Queue against the Blob/Tree
//! Gateway. Operates synchronously — callers run it inside a queue task body
//! (see `queue.rs`): fully-synchronous git2 operations invoked from task
//! bodies rather than awaited directly.

use crate::canonical_json;
use crate::error::{GitDdbError, Result};
use crate::frontmatter;
use crate::gateway::{branch_ref, Gateway, TreeUpdate, DEFAULT_BRANCH};
use crate::model::{DeleteResult, DocType, FatDoc, JsonDoc, NormalizedCommit, PutResult, Signature};
use crate::validator;
use serde_json::Value;
use ulid::Ulid;

/// The two built-in document formats (C1), plus the binary passthrough named
/// in `FatDoc.type` but with no canonicalization step of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    FrontMatter,
    Binary,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::FrontMatter => "md",
            Format::Binary => "bin",
        }
    }

    pub fn doc_type(&self) -> DocType {
        match self {
            Format::Json => DocType::Json,
            Format::FrontMatter => DocType::Text,
            Format::Binary => DocType::Binary,
        }
    }

    /// Maps a stored file's extension back to the format that produced it —
    /// used by callers (e.g. the sync crate's diffing) that only have a
    /// bare path and need to parse its blob bytes.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext {
            "json" => Some(Format::Json),
            "md" | "yml" => Some(Format::FrontMatter),
            "bin" => Some(Format::Binary),
            _ => None,
        }
    }

    /// Binary documents carry their payload as a base64 string in `_bytes`
    /// (JSON has no native byte-string type); the blob written to Git is the
    /// *decoded* raw bytes, not the JSON wrapper, so the on-disk blob is an
    /// exact identity copy of the original bytes per the round-trip law.
    pub fn serialize(&self, doc: &Value) -> Result<Vec<u8>> {
        match self {
            Format::Json => canonical_json::serialize(doc),
            Format::FrontMatter => frontmatter::serialize(doc),
            Format::Binary => {
                let encoded = doc
                    .get("_bytes")
                    .and_then(|v| v.as_str())
                    .ok_or(GitDdbError::InvalidJsonObject)?;
                base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
                    .map_err(|_| GitDdbError::InvalidJsonObject)
            }
        }
    }

    pub fn parse(&self, bytes: &[u8], id: &str) -> Result<Value> {
        match self {
            Format::Json => canonical_json::parse(bytes, id),
            Format::FrontMatter => frontmatter::parse(bytes, id),
            Format::Binary => Ok(serde_json::json!({
                "_id": id,
                "_bytes": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes),
            })),
        }
    }
}

/// A predicate used to skip commits while reconstructing history — see the
/// merge-commit filter ambiguity this leaves intentionally swappable rather
/// than hardcoded to one reading of the source behavior.
pub type CommitFilter<'a> = &'a dyn Fn(&NormalizedCommit) -> bool;

pub fn default_skip_merge_commits(commit: &NormalizedCommit) -> bool {
    !commit.is_merge_commit()
}

pub struct CrudWorker<'a> {
    gateway: &'a Gateway,
    branch: String,
    collection_prefix: String,
    author: Signature,
    committer: Signature,
}

impl<'a> CrudWorker<'a> {
    pub fn new(gateway: &'a Gateway, collection_prefix: impl Into<String>, author: Signature, committer: Signature) -> Self {
        Self {
            gateway,
            branch: DEFAULT_BRANCH.to_string(),
            collection_prefix: collection_prefix.into(),
            author,
            committer,
        }
    }

    fn path_for(&self, short_name: &str, format: Format) -> String {
        if self.collection_prefix.is_empty() {
            format!("{}.{}", short_name, format.extension())
        } else {
            format!("{}/{}.{}", self.collection_prefix.trim_end_matches('/'), short_name, format.extension())
        }
    }

    fn head_oid(&self) -> Result<Option<String>> {
        self.gateway.read_ref_oid(&branch_ref(&self.branch))
    }

    /// `put`: writes or overwrites, auto-generating a ULID `_id` if absent.
    pub fn put(&self, name: Option<&str>, mut doc: JsonDoc, format: Format) -> Result<PutResult> {
        let short_name = match name {
            Some(n) => n.to_string(),
            None => Ulid::new().to_string(),
        };
        validator::validate_id(&short_name)?;
        doc.insert("_id".to_string(), Value::String(short_name.clone()));

        let path = self.path_for(&short_name, format);
        let bytes = format.serialize(&Value::Object(doc))?;
        let file_oid = self.gateway.write_blob(&bytes)?;

        let commit = self.gateway.commit(
            &branch_ref(&self.branch),
            &[TreeUpdate::Upsert { path, content: bytes }],
            &format!("put: {}", short_name),
            &self.author,
            &self.committer,
        )?;

        Ok(PutResult {
            name: format!("{}.{}", short_name, format.extension()),
            id: short_name,
            file_oid,
            doc_type: format.doc_type(),
            commit,
        })
    }

    /// `insert`: like `put` but fails if the path already exists.
    pub fn insert(&self, name: Option<&str>, doc: JsonDoc, format: Format) -> Result<PutResult> {
        if let Some(n) = name {
            validator::validate_id(n)?;
            let path = self.path_for(n, format);
            if let Some(head) = self.head_oid()? {
                if self.gateway.file_oid_at_commit(&head, &path)?.is_some() {
                    return Err(GitDdbError::SameIdExists { name: n.to_string() });
                }
            }
        }
        self.put(name, doc, format)
    }

    /// `update`: like `put` but fails if the path is absent.
    pub fn update(&self, name: &str, doc: JsonDoc, format: Format) -> Result<PutResult> {
        validator::validate_id(name)?;
        let path = self.path_for(name, format);
        match self.head_oid()? {
            Some(head) if self.gateway.file_oid_at_commit(&head, &path)?.is_some() => {
                self.put(Some(name), doc, format)
            }
            _ => Err(GitDdbError::DocumentNotFound { name: name.to_string() }),
        }
    }

    pub fn delete(&self, name: &str, format: Format) -> Result<DeleteResult> {
        validator::validate_id(name)?;
        let path = self.path_for(name, format);
        let head = self.head_oid()?.ok_or_else(|| GitDdbError::DocumentNotFound { name: name.to_string() })?;
        let existing_oid = self
            .gateway
            .file_oid_at_commit(&head, &path)?
            .ok_or_else(|| GitDdbError::DocumentNotFound { name: name.to_string() })?;

        let commit = self.gateway.commit(
            &branch_ref(&self.branch),
            &[TreeUpdate::Remove { path }],
            &format!("delete: {}", name),
            &self.author,
            &self.committer,
        )?;

        Ok(DeleteResult {
            name: format!("{}.{}", name, format.extension()),
            id: name.to_string(),
            file_oid: existing_oid,
            doc_type: format.doc_type(),
            commit,
        })
    }

    pub fn get(&self, name: &str, format: Format) -> Result<Option<Value>> {
        Ok(self.get_fat_doc(name, format)?.map(|fd| Value::Object(fd.doc)))
    }

    pub fn get_fat_doc(&self, name: &str, format: Format) -> Result<Option<FatDoc>> {
        let path = self.path_for(name, format);
        let head = match self.head_oid()? {
            Some(h) => h,
            None => return Ok(None),
        };
        let bytes = match self.gateway.read_path_at_commit(&head, &path)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let file_oid = self
            .gateway
            .file_oid_at_commit(&head, &path)?
            .expect("path just read must have an oid");
        let parsed = format.parse(&bytes, name)?;
        let doc = parsed.as_object().cloned().ok_or(GitDdbError::InvalidJsonObject)?;
        Ok(Some(FatDoc {
            id: name.to_string(),
            name: format!("{}.{}", name, format.extension()),
            file_oid,
            doc_type: format.doc_type(),
            doc,
        }))
    }

    /// Full first-parent history of distinct revisions for `name`, newest
    /// first, with consecutive duplicate values collapsed (`[v1,v1,v2,∅,v2,∅,∅]`
    /// → `[∅,v2,∅,v2,v1]`).
    pub fn get_history(&self, name: &str, format: Format, filter: Option<CommitFilter>) -> Result<Vec<Option<Value>>> {
        let path = self.path_for(name, format);
        let commits = self.gateway.first_parent_history(&branch_ref(&self.branch))?;
        let keep = filter.unwrap_or(&default_skip_merge_commits);

        let mut revisions = Vec::new();
        for commit in commits.iter().filter(|c| keep(c)) {
            let content = self.gateway.read_path_at_commit(&commit.oid, &path)?;
            let value = match content {
                Some(bytes) => Some(format.parse(&bytes, name)?),
                None => None,
            };
            revisions.push(value);
        }

        Ok(collapse_consecutive_duplicates(revisions))
    }

    /// `getBackNumber`: the n-th distinct revision from `get_history`, 0 = latest.
    pub fn get_back_number(
        &self,
        name: &str,
        n: usize,
        format: Format,
        filter: Option<CommitFilter>,
    ) -> Result<Option<Value>> {
        let history = self.get_history(name, format, filter)?;
        Ok(history.into_iter().nth(n).flatten())
    }

    /// Lazily enumerate all documents under the collection whose `_id` starts
    /// with `prefix`.
    pub fn find(&self, prefix: &str, format: Format) -> Result<Vec<FatDoc>> {
        let head = match self.head_oid()? {
            Some(h) => h,
            None => return Ok(Vec::new()),
        };
        let walk_root = if self.collection_prefix.is_empty() {
            String::new()
        } else {
            self.collection_prefix.trim_end_matches('/').to_string()
        };
        let entries = self.gateway.walk_tree(&head, &walk_root)?;
        let ext_suffix = format!(".{}", format.extension());

        let mut out = Vec::new();
        for entry in entries.into_iter().filter(|e| !e.is_tree && e.path.ends_with(&ext_suffix)) {
            let relative = entry
                .path
                .strip_prefix(&walk_root)
                .unwrap_or(&entry.path)
                .trim_start_matches('/');
            let short = relative.strip_suffix(&ext_suffix).unwrap_or(relative);
            if !short.starts_with(prefix) {
                continue;
            }
            if let Some(fat) = self.get_fat_doc(short, format)? {
                out.push(fat);
            }
        }
        Ok(out)
    }
}

fn collapse_consecutive_duplicates(revisions: Vec<Option<Value>>) -> Vec<Option<Value>> {
    let mut out: Vec<Option<Value>> = Vec::new();
    for rev in revisions {
        if out.last() != Some(&rev) {
            out.push(rev);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Gateway;
    use serde_json::json;
    use tempfile::TempDir;

    fn sig() -> Signature {
        Signature { name: "Test".into(), email: "test@localhost".into(), timestamp: 1_700_000_000 }
    }

    fn worker(gw: &Gateway) -> CrudWorker<'_> {
        CrudWorker::new(gw, "", sig(), sig())
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let w = worker(&gw);
        let result = w.put(Some("doc1"), json!({"a": 1}).as_object().unwrap().clone(), Format::Json).unwrap();
        assert_eq!(result.id, "doc1");
        let got = w.get("doc1", Format::Json).unwrap().unwrap();
        assert_eq!(got["a"], 1);
        assert_eq!(got["_id"], "doc1");
    }

    #[test]
    fn put_without_name_autogenerates_ulid() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let w = worker(&gw);
        let result = w.put(None, json!({"a": 1}).as_object().unwrap().clone(), Format::Json).unwrap();
        assert!(ulid::Ulid::from_string(&result.id).is_ok());
    }

    #[test]
    fn insert_fails_on_existing_path() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let w = worker(&gw);
        w.insert(Some("x"), json!({}).as_object().unwrap().clone(), Format::Json).unwrap();
        let err = w.insert(Some("x"), json!({}).as_object().unwrap().clone(), Format::Json).unwrap_err();
        assert!(matches!(err, GitDdbError::SameIdExists { .. }));
    }

    #[test]
    fn update_fails_on_missing_path() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let w = worker(&gw);
        let err = w.update("missing", json!({}).as_object().unwrap().clone(), Format::Json).unwrap_err();
        assert!(matches!(err, GitDdbError::DocumentNotFound { .. }));
    }

    #[test]
    fn delete_then_get_returns_none() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let w = worker(&gw);
        w.put(Some("x"), json!({}).as_object().unwrap().clone(), Format::Json).unwrap();
        w.delete("x", Format::Json).unwrap();
        assert!(w.get("x", Format::Json).unwrap().is_none());
    }

    #[test]
    fn delete_missing_fails() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let w = worker(&gw);
        let err = w.delete("nope", Format::Json).unwrap_err();
        assert!(matches!(err, GitDdbError::DocumentNotFound { .. }));
    }

    #[test]
    fn history_collapses_duplicate_consecutive_revisions() {
        // Commit sequence on "x": v1, v1, v2, delete, v2, delete, delete
        // getHistory("x") should yield [None, v2, None, v2, v1]
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let w = worker(&gw);

        w.put(Some("x"), json!({"v": 1}).as_object().unwrap().clone(), Format::Json).unwrap(); // v1
        w.put(Some("x"), json!({"v": 1}).as_object().unwrap().clone(), Format::Json).unwrap(); // v1 (dup)
        w.put(Some("x"), json!({"v": 2}).as_object().unwrap().clone(), Format::Json).unwrap(); // v2
        w.delete("x", Format::Json).unwrap(); // delete
        w.put(Some("x"), json!({"v": 2}).as_object().unwrap().clone(), Format::Json).unwrap(); // v2
        w.delete("x", Format::Json).unwrap(); // delete
        w.insert(Some("y"), json!({}).as_object().unwrap().clone(), Format::Json).unwrap(); // unrelated commit, still ∅ for x

        let history = w.get_history("x", Format::Json, None).unwrap();
        let shape: Vec<Option<i64>> = history
            .iter()
            .map(|v| v.as_ref().and_then(|d| d.get("v")).and_then(|n| n.as_i64()))
            .collect();
        assert_eq!(shape, vec![None, Some(2), None, Some(2), Some(1)]);
    }

    #[test]
    fn binary_format_round_trips_non_utf8_bytes() {
        let raw: &[u8] = &[0xff, 0x00, 0xfe, 0x10, 0x80];
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw);
        let doc = json!({"_bytes": encoded}).as_object().unwrap().clone();
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let w = worker(&gw);
        w.put(Some("blob"), doc, Format::Binary).unwrap();
        let fat = w.get_fat_doc("blob", Format::Binary).unwrap().unwrap();
        assert_eq!(fat.doc_type, DocType::Binary);
        let round_tripped = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            fat.doc["_bytes"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(round_tripped, raw);
    }

    #[test]
    fn find_returns_all_matching_prefix() {
        let dir = TempDir::new().unwrap();
        let gw = Gateway::init(dir.path()).unwrap();
        let w = worker(&gw);
        w.put(Some("notes/a"), json!({}).as_object().unwrap().clone(), Format::Json).unwrap();
        w.put(Some("notes/b"), json!({}).as_object().unwrap().clone(), Format::Json).unwrap();
        w.put(Some("other"), json!({}).as_object().unwrap().clone(), Format::Json).unwrap();
        let found = w.find("notes/", Format::Json).unwrap();
        assert_eq!(found.len(), 2);
    }
}
