//! FIFO task queue for narrator invocations.
//!
//! The queue drains strictly in submission order, one task at a time.
//! Each task is an owned async closure over an opaque JSON payload; its
//! outcome is recorded exactly once. A task failure is captured in the
//! task's record and never aborts the drain, so one bad generation call
//! cannot block independent queued work.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Queue-unique task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of one task.
///
/// Transitions: `Pending -> Running -> {Completed | Failed}`, and
/// `Pending -> Cancelled`. Completed, Failed, and Cancelled are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => true,
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }
}

/// Recorded outcome of one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Whether the queue is currently draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    Idle,
    Draining,
}

/// Snapshot of queue state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub mode: QueueMode,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Cloneable handle that signals `run_all` to halt after the task
/// currently executing.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request a halt. Pending tasks stay queued for a later `run_all`.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

type TaskError = Box<dyn std::error::Error + Send + Sync>;
type TaskFn = Box<dyn FnOnce(Value) -> BoxFuture<'static, Result<Value, TaskError>> + Send>;

struct QueuedTask {
    id: TaskId,
    payload: Value,
    task_fn: TaskFn,
}

/// Single-consumer FIFO executor with per-task status tracking.
pub struct TaskQueue {
    pending: VecDeque<QueuedTask>,
    records: HashMap<TaskId, TaskRecord>,
    next_id: u64,
    halt: Arc<AtomicBool>,
    mode: QueueMode,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            records: HashMap::new(),
            next_id: 0,
            halt: Arc::new(AtomicBool::new(false)),
            mode: QueueMode::Idle,
        }
    }

    /// Add a task to the back of the queue. Non-blocking.
    pub fn enqueue<F, Fut>(&mut self, task_fn: F, payload: Value) -> TaskId
    where
        F: FnOnce(Value) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        let id = TaskId(format!("task_{}", self.next_id));
        self.next_id += 1;

        self.records.insert(
            id.clone(),
            TaskRecord {
                id: id.clone(),
                status: TaskStatus::Pending,
                result: None,
                error: None,
                started_at: None,
                ended_at: None,
            },
        );
        self.pending.push_back(QueuedTask {
            id: id.clone(),
            payload,
            task_fn: Box::new(move |payload| Box::pin(task_fn(payload))),
        });

        debug!(task_id = %id, "enqueued task");
        id
    }

    /// Drain the queue in FIFO order, one task at a time.
    ///
    /// Task failures are captured per record and never abort the drain.
    /// Honors the stop signal between tasks; a signal raised mid-task
    /// takes effect once that task finishes.
    pub async fn run_all(&mut self) {
        self.mode = QueueMode::Draining;

        while !self.halt.load(Ordering::SeqCst) {
            let Some(task) = self.pending.pop_front() else {
                break;
            };
            self.execute(task).await;
        }

        self.halt.store(false, Ordering::SeqCst);
        self.mode = QueueMode::Idle;
    }

    async fn execute(&mut self, task: QueuedTask) {
        if let Some(record) = self.records.get_mut(&task.id) {
            record.status = TaskStatus::Running;
            record.started_at = Some(Utc::now());
        }
        debug!(task_id = %task.id, "running task");

        let outcome = (task.task_fn)(task.payload).await;

        if let Some(record) = self.records.get_mut(&task.id) {
            match outcome {
                Ok(result) => {
                    record.result = Some(result);
                    record.status = TaskStatus::Completed;
                }
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "task failed");
                    record.error = Some(e.to_string());
                    record.status = TaskStatus::Failed;
                }
            }
            record.ended_at = Some(Utc::now());
        }
    }

    /// Cancel a task that has not started yet.
    ///
    /// Returns `true` when the task was pending and is now cancelled.
    /// For running, terminal, or unknown tasks this is a documented
    /// no-op returning `false`; in-flight work cannot be interrupted.
    pub fn cancel(&mut self, id: &TaskId) -> bool {
        let Some(position) = self.pending.iter().position(|t| &t.id == id) else {
            debug!(task_id = %id, "cancel was a no-op");
            return false;
        };

        self.pending.remove(position);
        if let Some(record) = self.records.get_mut(id) {
            record.status = TaskStatus::Cancelled;
        }
        info!(task_id = %id, "cancelled task");
        true
    }

    /// The recorded state of a task, if the id is known.
    pub fn result(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.records.get(id)
    }

    /// Drop all pending tasks without marking them.
    ///
    /// Hard reset: unlike `cancel`, records keep whatever status they
    /// had.
    pub fn clear(&mut self) {
        self.pending.clear();
        info!("task queue cleared");
    }

    /// Signal `run_all` to halt after the currently-running task.
    pub fn stop(&self) {
        self.halt.store(true, Ordering::SeqCst);
        info!("task queue stop requested");
    }

    /// A handle for signalling a halt from inside a task or elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.halt.clone())
    }

    /// Current mode plus pending/completed/failed counts.
    pub fn status(&self) -> QueueStatus {
        let mut completed = 0;
        let mut failed = 0;
        for record in self.records.values() {
            match record.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Failed => failed += 1,
                TaskStatus::Pending
                | TaskStatus::Running
                | TaskStatus::Cancelled => {}
            }
        }
        QueueStatus {
            mode: self.mode,
            pending: self.pending.len(),
            completed,
            failed,
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn ok_task(
        marker: &str,
        log: Arc<Mutex<Vec<String>>>,
    ) -> impl FnOnce(Value) -> BoxFuture<'static, Result<Value, TaskError>> {
        let marker = marker.to_string();
        move |payload| {
            Box::pin(async move {
                log.lock().unwrap().push(marker.clone());
                Ok(json!({ "marker": marker, "payload": payload }))
            })
        }
    }

    #[tokio::test]
    async fn test_enqueue_records_pending() {
        let mut queue = TaskQueue::new();
        let id = queue.enqueue(|_| async { Ok(json!(null)) }, json!({}));

        let record = queue.result(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.started_at.is_none());
        assert_eq!(queue.status().pending, 1);
    }

    #[tokio::test]
    async fn test_fifo_completion_order() {
        let mut queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for marker in ["a", "b", "c"] {
            queue.enqueue(ok_task(marker, log.clone()), json!(marker));
        }
        queue.run_all().await;

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(queue.status().completed, 3);
        assert_eq!(queue.status().pending, 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_drain() {
        let mut queue = TaskQueue::new();

        let failing = queue.enqueue(
            |_| async { Err::<Value, TaskError>("generation timed out".into()) },
            json!({}),
        );
        let succeeding = queue.enqueue(|_| async { Ok(json!("fine")) }, json!({}));

        queue.run_all().await;

        let failed = queue.result(&failing).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("generation timed out"));
        assert!(failed.result.is_none());
        assert!(failed.started_at.is_some());
        assert!(failed.ended_at.is_some());

        let succeeded = queue.result(&succeeding).unwrap();
        assert_eq!(succeeded.status, TaskStatus::Completed);
        assert_eq!(succeeded.result, Some(json!("fine")));
        assert!(succeeded.error.is_none());
    }

    #[tokio::test]
    async fn test_cancel_pending_never_executes() {
        let mut queue = TaskQueue::new();
        let ran = Arc::new(AtomicBool::new(false));

        let ran_clone = ran.clone();
        let id = queue.enqueue(
            move |_| async move {
                ran_clone.store(true, Ordering::SeqCst);
                Ok(json!(null))
            },
            json!({}),
        );

        assert!(queue.cancel(&id));
        queue.run_all().await;

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(queue.result(&id).unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_terminal_is_noop() {
        let mut queue = TaskQueue::new();
        let id = queue.enqueue(|_| async { Ok(json!(null)) }, json!({}));
        queue.run_all().await;

        assert!(!queue.cancel(&id));
        assert_eq!(queue.result(&id).unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_unknown_is_noop() {
        let mut queue = TaskQueue::new();
        let id = queue.enqueue(|_| async { Ok(json!(null)) }, json!({}));
        queue.run_all().await;

        let mut other = TaskQueue::new();
        let foreign = other.enqueue(|_| async { Ok(json!(null)) }, json!({}));
        assert!(!queue.cancel(&foreign));
        let _ = id;
    }

    #[tokio::test]
    async fn test_stop_leaves_pending_for_next_drain() {
        let mut queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        // The first task raises the stop signal mid-drain.
        let handle = queue.stop_handle();
        let log_first = log.clone();
        queue.enqueue(
            move |_| async move {
                log_first.lock().unwrap().push("first".to_string());
                handle.stop();
                Ok(json!(null))
            },
            json!({}),
        );
        let second = queue.enqueue(ok_task("second", log.clone()), json!({}));

        queue.run_all().await;

        assert_eq!(*log.lock().unwrap(), vec!["first"]);
        assert_eq!(queue.result(&second).unwrap().status, TaskStatus::Pending);
        assert_eq!(queue.status().mode, QueueMode::Idle);
        assert_eq!(queue.status().pending, 1);

        // The signal does not stick: a later drain finishes the rest.
        queue.run_all().await;
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(queue.result(&second).unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_clear_drops_pending_without_marking() {
        let mut queue = TaskQueue::new();
        let id = queue.enqueue(|_| async { Ok(json!(null)) }, json!({}));

        queue.clear();
        queue.run_all().await;

        // Distinct from cancel: the record still says Pending.
        assert_eq!(queue.result(&id).unwrap().status, TaskStatus::Pending);
        assert_eq!(queue.status().pending, 0);
    }

    #[tokio::test]
    async fn test_ids_stay_unique_across_drains() {
        let mut queue = TaskQueue::new();
        let first = queue.enqueue(|_| async { Ok(json!(1)) }, json!({}));
        queue.run_all().await;
        let second = queue.enqueue(|_| async { Ok(json!(2)) }, json!({}));
        queue.run_all().await;

        assert_ne!(first, second);
        assert_eq!(queue.result(&first).unwrap().result, Some(json!(1)));
        assert_eq!(queue.result(&second).unwrap().result, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_payload_reaches_task() {
        let mut queue = TaskQueue::new();
        let id = queue.enqueue(
            |payload| async move { Ok(json!({ "echo": payload })) },
            json!({ "chapter": 3 }),
        );
        queue.run_all().await;

        let record = queue.result(&id).unwrap();
        assert_eq!(record.result, Some(json!({ "echo": { "chapter": 3 } })));
    }

    #[test]
    fn test_status_terminality() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
