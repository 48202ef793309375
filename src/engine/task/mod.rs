//! A single bulk operation and its aggregated state.
//!
//! A [`Task`] owns the worker handles spawned for it, folds their messages into one running
//! total and fans the resulting events out to its subscribers. All mutation goes through
//! one lock per task, so worker messages, subscription calls and cancellation are
//! serialized:
//! - [`mailbox`] - the single consumer of worker messages and the teardown path

mod mailbox;

pub(crate) use mailbox::run_mailbox;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::mpsc;

use crate::config::CompletionPolicy;
use crate::types::{
    ConnectionId, OperationType, OwnerId, ProgressSnapshot, TaskEvent, TaskId, TaskStatus,
    TaskSummary,
};
use crate::worker::{WorkerHandle, WorkerId};

use super::registry::TaskRegistry;

/// One observer connection as seen by a task
#[derive(Clone, Debug)]
pub struct Subscriber {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl Subscriber {
    /// Wrap the event sender of a connection
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<TaskEvent>) -> Self {
        Self { id, tx }
    }

    /// Connection id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Push an event to the connection; `false` once it is gone
    pub fn send(&self, event: TaskEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Everything needed to assemble a task
pub(crate) struct TaskParts {
    pub(crate) id: TaskId,
    pub(crate) owner: OwnerId,
    pub(crate) screen_name: Option<String>,
    pub(crate) operation: OperationType,
    pub(crate) total: u64,
    pub(crate) policy: CompletionPolicy,
    pub(crate) registry: TaskRegistry,
    pub(crate) deleted_tweets: Arc<AtomicU64>,
    pub(crate) workers: Vec<WorkerHandle>,
}

/// Mutable part of a task, only touched under the task lock
struct TaskState {
    status: TaskStatus,
    done: u64,
    remaining: u64,
    failed: u64,
    provider_errors: BTreeMap<u32, u64>,
    last: ProgressSnapshot,
    subscribers: HashMap<ConnectionId, Subscriber>,
    workers: Vec<WorkerHandle>,
    finished_workers: HashSet<WorkerId>,
}

impl TaskState {
    /// Send one event to every attached connection
    fn broadcast(&self, event: &TaskEvent) {
        for subscriber in self.subscribers.values() {
            if !subscriber.send(event.clone()) {
                tracing::trace!(connection = %subscriber.id(), "Subscriber connection already closed");
            }
        }
    }
}

struct TaskInner {
    id: TaskId,
    owner: OwnerId,
    screen_name: Option<String>,
    operation: OperationType,
    total: u64,
    worker_count: usize,
    created_at: DateTime<Utc>,
    policy: CompletionPolicy,
    registry: TaskRegistry,
    deleted_tweets: Arc<AtomicU64>,
    state: Mutex<TaskState>,
}

/// Handle to a live (or finished) bulk operation
///
/// Cloning is cheap; every clone refers to the same task.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("owner", &self.inner.owner)
            .field("operation", &self.inner.operation)
            .field("total", &self.inner.total)
            .field("status", &self.status())
            .finish()
    }
}

impl Task {
    pub(crate) fn new(parts: TaskParts) -> Self {
        let initial =
            ProgressSnapshot::progress(parts.id, parts.operation, 0, parts.total, 0);
        let worker_count = parts.workers.len();

        Self {
            inner: Arc::new(TaskInner {
                id: parts.id,
                owner: parts.owner,
                screen_name: parts.screen_name,
                operation: parts.operation,
                total: parts.total,
                worker_count,
                created_at: Utc::now(),
                policy: parts.policy,
                registry: parts.registry,
                deleted_tweets: parts.deleted_tweets,
                state: Mutex::new(TaskState {
                    status: TaskStatus::Running,
                    done: 0,
                    remaining: parts.total,
                    failed: 0,
                    provider_errors: BTreeMap::new(),
                    last: initial,
                    subscribers: HashMap::new(),
                    workers: parts.workers,
                    finished_workers: HashSet::new(),
                }),
            }),
        }
    }

    /// Task id
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Owning user
    pub fn owner(&self) -> &OwnerId {
        &self.inner.owner
    }

    /// Operation performed on every item
    pub fn operation(&self) -> OperationType {
        self.inner.operation
    }

    /// Item count at creation
    pub fn total(&self) -> u64 {
        self.inner.total
    }

    /// Number of workers spawned at creation
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// When the task was accepted
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Current lifecycle state
    pub fn status(&self) -> TaskStatus {
        self.inner.state.lock().status
    }

    /// Whether the task is still processing items
    pub fn is_running(&self) -> bool {
        self.status() == TaskStatus::Running
    }

    /// Most recently emitted progress snapshot
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.state.lock().last.clone()
    }

    /// Whether `connection` is currently attached
    pub fn is_subscribed(&self, connection: ConnectionId) -> bool {
        self.inner.state.lock().subscribers.contains_key(&connection)
    }

    /// Number of attached connections
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Attach a connection and send it the latest snapshot
    ///
    /// Returns `false` when the task has already been torn down. Attaching a connection
    /// that is already attached changes nothing and sends nothing.
    pub fn subscribe(&self, subscriber: Subscriber) -> bool {
        let mut state = self.inner.state.lock();
        if state.status.is_finished() {
            return false;
        }
        if state.subscribers.contains_key(&subscriber.id()) {
            return true;
        }

        subscriber.send(TaskEvent::Progression(state.last.clone()));
        tracing::debug!(task_id = self.inner.id.0, connection = %subscriber.id(), "Subscriber attached");
        state.subscribers.insert(subscriber.id(), subscriber);
        true
    }

    /// Detach a connection; returns whether it was attached
    pub fn unsubscribe(&self, connection: ConnectionId) -> bool {
        let removed = self
            .inner
            .state
            .lock()
            .subscribers
            .remove(&connection)
            .is_some();
        if removed {
            tracing::debug!(task_id = self.inner.id.0, %connection, "Subscriber detached");
        }
        removed
    }

    /// Cancel the task on behalf of its owner
    ///
    /// Subscribers get a `task cancel` event and no `task end`. Returns `false` when the
    /// task had already finished.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.status.is_finished() {
            return false;
        }

        tracing::info!(task_id = self.inner.id.0, owner = %self.inner.owner, "Task cancelled");
        state.broadcast(&TaskEvent::TaskCancel {
            id: self.inner.id,
            operation: self.inner.operation,
        });
        self.teardown(&mut state, TaskStatus::Cancelled);
        true
    }

    /// Point-in-time view for the REST surface
    pub fn summary(&self) -> TaskSummary {
        let state = self.inner.state.lock();
        let progress = match state.status {
            // The terminal error snapshot zeroes counts, the summary keeps the real ones
            TaskStatus::Failed => ProgressSnapshot {
                error: state.last.error.clone(),
                ..ProgressSnapshot::progress(
                    self.inner.id,
                    self.inner.operation,
                    state.done,
                    state.remaining,
                    state.failed,
                )
            },
            _ => state.last.clone(),
        };

        TaskSummary {
            progress,
            status: state.status,
            owner: self.inner.owner.clone(),
            created_at: self.inner.created_at,
            workers: state.workers.len(),
            provider_errors: state.provider_errors.clone(),
        }
    }
}

#[cfg(test)]
impl Task {
    /// Worker handles still owned by the task
    pub(crate) fn live_workers(&self) -> usize {
        self.inner.state.lock().workers.len()
    }
}
