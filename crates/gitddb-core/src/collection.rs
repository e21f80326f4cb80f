//! Collection (C6): a lightweight, non-owning namespace view over a path
//! prefix. Write operations forward through the Task Queue (C5) to the CRUD
//! Worker (C4); reads are documented as tolerating concurrent writers by
//! reading the ref once and walking from that snapshot, so they run directly
//! against the Gateway off the queue.

use crate::crud::{CommitFilter, CrudWorker, Format};
use crate::error::Result;
use crate::gateway::Gateway;
use crate::model::{DeleteResult, FatDoc, JsonDoc, PutResult, Signature, TaskKind};
use crate::queue::{TaskOutput, TaskQueue};
use serde_json::Value;
use std::sync::Arc;

/// A path-prefix view over the repository. Creating one does not create a
/// directory — it only scopes subsequent `_id`s under `collection_path`.
#[derive(Clone)]
pub struct Collection {
    gateway: Arc<Gateway>,
    queue: Arc<TaskQueue>,
    collection_path: String,
    author: Signature,
    committer: Signature,
}

impl Collection {
    pub fn new(
        gateway: Arc<Gateway>,
        queue: Arc<TaskQueue>,
        collection_path: impl Into<String>,
        author: Signature,
        committer: Signature,
    ) -> Self {
        Self {
            gateway,
            queue,
            collection_path: collection_path.into(),
            author,
            committer,
        }
    }

    pub fn path(&self) -> &str {
        &self.collection_path
    }

    fn worker(&self) -> CrudWorker<'_> {
        CrudWorker::new(&self.gateway, self.collection_path.clone(), self.author.clone(), self.committer.clone())
    }

    pub async fn put(&self, name: Option<&str>, doc: JsonDoc, format: Format) -> Result<PutResult> {
        let name = name.map(|s| s.to_string());
        self.dispatch(TaskKind::Put, "put", move |worker| worker.put(name.as_deref(), doc, format))
            .await
    }

    pub async fn insert(&self, name: Option<&str>, doc: JsonDoc, format: Format) -> Result<PutResult> {
        let name = name.map(|s| s.to_string());
        self.dispatch(TaskKind::Insert, "insert", move |worker| worker.insert(name.as_deref(), doc, format))
            .await
    }

    pub async fn update(&self, name: &str, doc: JsonDoc, format: Format) -> Result<PutResult> {
        let name = name.to_string();
        self.dispatch(TaskKind::Update, "update", move |worker| worker.update(&name, doc, format))
            .await
    }

    pub async fn delete(&self, name: &str, format: Format) -> Result<DeleteResult> {
        let name = name.to_string();
        self.dispatch(TaskKind::Delete, "delete", move |worker| worker.delete(&name, format))
            .await
    }

    /// Read-through: runs directly against the Gateway, not the queue, per
    /// the concurrency model's allowance for readers to observe a commit-atomic
    /// snapshot without serializing behind writers.
    pub fn get(&self, name: &str, format: Format) -> Result<Option<Value>> {
        self.worker().get(name, format)
    }

    pub fn get_fat_doc(&self, name: &str, format: Format) -> Result<Option<FatDoc>> {
        self.worker().get_fat_doc(name, format)
    }

    pub fn get_history(&self, name: &str, format: Format, filter: Option<CommitFilter>) -> Result<Vec<Option<Value>>> {
        self.worker().get_history(name, format, filter)
    }

    pub fn get_back_number(
        &self,
        name: &str,
        n: usize,
        format: Format,
        filter: Option<CommitFilter>,
    ) -> Result<Option<Value>> {
        self.worker().get_back_number(name, n, format, filter)
    }

    pub fn find(&self, prefix: &str, format: Format) -> Result<Vec<FatDoc>> {
        self.worker().find(prefix, format)
    }

    async fn dispatch<T, F>(&self, kind: TaskKind, label: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(CrudWorker<'_>) -> Result<T> + Send + 'static,
    {
        let gateway = self.gateway.clone();
        let prefix = self.collection_path.clone();
        let author = self.author.clone();
        let committer = self.committer.clone();
        let label = format!("{}:{}", label, prefix);
        let handle = self.queue.enqueue(
            kind,
            label,
            Box::new(move || {
                let worker = CrudWorker::new(&gateway, prefix, author, committer);
                let result = op(worker)?;
                Ok(Box::new(result) as TaskOutput)
            }),
        );
        let out = handle.into_future().await?;
        Ok(*out
            .downcast::<T>()
            .expect("task result type matches what dispatch() enqueued"))
    }
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

    #[tokio::test]
    async fn put_through_queue_then_read_direct() {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(Gateway::init(dir.path()).unwrap());
        let queue = Arc::new(TaskQueue::new(16));
        let notes = Collection::new(gateway, queue, "notes", sig(), sig());

        notes
            .put(Some("a"), json!({"title": "hi"}).as_object().unwrap().clone(), Format::Json)
            .await
            .unwrap();
        let got = notes.get("a", Format::Json).unwrap().unwrap();
        assert_eq!(got["title"], "hi");
    }

    #[tokio::test]
    async fn distinct_collections_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(Gateway::init(dir.path()).unwrap());
        let queue = Arc::new(TaskQueue::new(16));
        let notes = Collection::new(gateway.clone(), queue.clone(), "notes", sig(), sig());
        let tasks = Collection::new(gateway, queue, "tasks", sig(), sig());

        notes.put(Some("x"), json!({}).as_object().unwrap().clone(), Format::Json).await.unwrap();
        assert!(tasks.get("x", Format::Json).unwrap().is_none());
    }
}
