//! Task Queue (C5): single-writer FIFO serialization of CRUD and sync tasks.
//!
//! Concrete realization of the design note "model it as a bounded channel of
//! task records processed by one worker": one `tokio::sync::mpsc` channel
//! feeds a single dispatcher task. The dispatcher is the only thing that ever
//! calls into the Gateway, so commit ordering and statistics mutation are
//! trivially single-writer. Git operations are blocking, so each task body
//! runs inside `spawn_blocking`; the dispatcher awaits it before popping the
//! next entry, which is what makes FIFO order a commit-ancestor guarantee.

use crate::error::{GitDdbError, Result};
use crate::model::{TaskKind, TaskStatistics};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Anything a task's closure can return. Boxed to keep the channel item type
/// uniform across CRUD/push/sync tasks with otherwise unrelated result types.
pub type TaskOutput = Box<dyn std::any::Any + Send>;
pub type TaskBody = Box<dyn FnOnce() -> Result<TaskOutput> + Send>;

struct QueueEntry {
    id: u64,
    kind: TaskKind,
    label: String,
    cancelled: Arc<AtomicBool>,
    body: TaskBody,
    result_tx: oneshot::Sender<Result<TaskOutput>>,
}

/// A handle returned by `enqueue`: awaiting it yields the task's result, and
/// `cancel()` removes it from the queue if it has not started running yet.
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    result_rx: oneshot::Receiver<Result<TaskOutput>>,
    statistics: Arc<Mutex<TaskStatistics>>,
}

impl TaskHandle {
    /// Cancels a not-yet-started task synchronously, rejecting its future
    /// with `TaskCancel` once the dispatcher reaches it. A no-op on a task
    /// that has already begun running — cancellation here is cooperative,
    /// not preemptive — but the `cancel` statistic counts the call either
    /// way, since the counter tracks cancellation requests, not just the
    /// ones that landed before dispatch.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.statistics.lock().unwrap().increment_cancel();
    }

    pub fn into_future(self) -> Pin<Box<dyn Future<Output = Result<TaskOutput>> + Send>> {
        Box::pin(async move {
            match self.result_rx.await {
                Ok(r) => r,
                Err(_) => Err(GitDdbError::DatabaseClosing),
            }
        })
    }
}

pub struct TaskQueue {
    sender: Option<mpsc::Sender<QueueEntry>>,
    next_id: AtomicU64,
    statistics: Arc<Mutex<TaskStatistics>>,
    pending: Arc<AtomicU64>,
    dispatcher: Option<tokio::task::JoinHandle<()>>,
}

impl TaskQueue {
    /// `capacity` bounds only how many tasks may be buffered awaiting
    /// dispatch; under the single-writer model enqueue is never expected to
    /// legitimately block, so a generous default is appropriate.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let statistics = Arc::new(Mutex::new(TaskStatistics::default()));
        let pending = Arc::new(AtomicU64::new(0));
        let dispatcher = tokio::spawn(Self::dispatch_loop(rx, statistics.clone(), pending.clone()));
        Self {
            sender: Some(tx),
            next_id: AtomicU64::new(1),
            statistics,
            pending,
            dispatcher: Some(dispatcher),
        }
    }

    async fn dispatch_loop(
        mut rx: mpsc::Receiver<QueueEntry>,
        statistics: Arc<Mutex<TaskStatistics>>,
        pending: Arc<AtomicU64>,
    ) {
        while let Some(entry) = rx.recv().await {
            if entry.cancelled.load(Ordering::SeqCst) {
                // The `cancel` statistic was already incremented by
                // `TaskHandle::cancel` at request time, independent of
                // dispatch position — see its doc comment.
                let _ = entry
                    .result_tx
                    .send(Err(GitDdbError::TaskCancel { label: entry.label.clone() }));
                pending.fetch_sub(1, Ordering::SeqCst);
                continue;
            }

            debug!(task_id = entry.id, label = %entry.label, "dispatching task");
            let body = entry.body;
            let outcome = match tokio::task::spawn_blocking(body).await {
                Ok(result) => result,
                Err(join_err) => {
                    warn!(task_id = entry.id, error = %join_err, "task panicked");
                    Err(GitDdbError::CannotWriteData { reason: join_err.to_string() })
                }
            };

            // Failure isolation: a task that fails must not poison the
            // dispatcher loop. We always continue to the next `recv`.
            if outcome.is_ok() {
                statistics.lock().unwrap().increment(entry.kind);
            }
            let _ = entry.result_tx.send(outcome);
            pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Enqueue a task body. Returns immediately (O(1)); the body runs when
    /// its turn comes up in strict FIFO order.
    pub fn enqueue(&self, kind: TaskKind, label: impl Into<String>, body: TaskBody) -> TaskHandle {
        let label = label.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (result_tx, result_rx) = oneshot::channel();
        let entry = QueueEntry {
            id,
            kind,
            label: label.clone(),
            cancelled: cancelled.clone(),
            body,
            result_tx,
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        // Channel capacity is chosen generously; under true backpressure this
        // would need an async enqueue, but enqueue is documented as O(1) and
        // non-blocking under the expected task volume.
        if let Some(sender) = &self.sender {
            if sender.try_send(entry).is_err() {
                warn!(label = %label, "queue is full, task dropped");
                self.pending.fetch_sub(1, Ordering::SeqCst);
            }
        } else {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        TaskHandle { cancelled, result_rx, statistics: self.statistics.clone() }
    }

    pub fn statistics(&self) -> TaskStatistics {
        self.statistics.lock().unwrap().clone()
    }

    /// Returns `false` if the queue drained before `timeout` elapsed, `true`
    /// if the timeout fired first.
    pub async fn wait_completion(&self, timeout: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        false
    }

    /// Closes the inbound channel and waits for the dispatcher to drain.
    pub async fn close(&mut self) {
        self.sender.take();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.await;
        }
    }
}
