//! Shared test helpers for engine, gateway and API tests.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{CompletionPolicy, EngineConfig};
use crate::engine::task::TaskParts;
use crate::engine::{Subscriber, Task, TaskEngine, TaskRegistry};
use crate::error::{Error, Result};
use crate::types::{ConnectionId, OperationType, OwnerCredentials, OwnerId, TaskEvent};
use crate::worker::{
    WorkerCommand, WorkerControl, WorkerExecutor, WorkerHandle, WorkerReporter, WorkerSpec,
    worker_channel,
};

/// A worker spawned by [`ManualExecutor`]; the test plays the worker's part
pub(crate) struct StartedWorker {
    pub(crate) spec: WorkerSpec,
    pub(crate) reporter: WorkerReporter,
    pub(crate) control: WorkerControl,
}

/// Executor that runs nothing and hands the worker ends to the test
#[derive(Default)]
pub(crate) struct ManualExecutor {
    started: Mutex<Vec<StartedWorker>>,
    /// Fail the start call with this index (0-based)
    pub(crate) fail_at: Option<usize>,
    attempts: Mutex<usize>,
}

impl ManualExecutor {
    pub(crate) fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::default()
        }
    }

    /// Number of workers started so far
    pub(crate) fn started(&self) -> usize {
        self.started.lock().len()
    }

    /// Take every worker started so far
    pub(crate) fn take_workers(&self) -> Vec<StartedWorker> {
        std::mem::take(&mut *self.started.lock())
    }
}

impl WorkerExecutor for ManualExecutor {
    fn start(&self, spec: WorkerSpec, reporter: WorkerReporter) -> Result<WorkerHandle> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            *attempts - 1
        };
        if self.fail_at == Some(attempt) {
            return Err(Error::Worker(format!("refusing to start worker {}", spec.worker)));
        }

        let (handle, mut control) = worker_channel(spec.worker);
        control.signal_ready();
        self.started.lock().push(StartedWorker {
            spec,
            reporter,
            control,
        });
        Ok(handle)
    }
}

/// Engine over a [`ManualExecutor`] with default settings
pub(crate) fn manual_engine() -> (TaskEngine, Arc<ManualExecutor>) {
    manual_engine_with(EngineConfig::default())
}

/// Engine over a [`ManualExecutor`] with custom settings
pub(crate) fn manual_engine_with(config: EngineConfig) -> (TaskEngine, Arc<ManualExecutor>) {
    let executor = Arc::new(ManualExecutor::default());
    let engine = TaskEngine::new(config, executor.clone());
    (engine, executor)
}

pub(crate) fn credentials(owner: &str) -> OwnerCredentials {
    OwnerCredentials::new(owner, format!("{owner}-token"), format!("{owner}-secret"))
}

pub(crate) fn items(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{i}")).collect()
}

/// Task with ten items, no running workers, not registered
pub(crate) fn detached_task(registry: &TaskRegistry, owner: &str, operation: OperationType) -> Task {
    detached_task_with(registry, owner, operation, 10, CompletionPolicy::FirstWorker, Vec::new())
}

pub(crate) fn detached_task_with(
    registry: &TaskRegistry,
    owner: &str,
    operation: OperationType,
    total: u64,
    policy: CompletionPolicy,
    workers: Vec<WorkerHandle>,
) -> Task {
    Task::new(TaskParts {
        id: registry.allocate_id(),
        owner: OwnerId::from(owner),
        screen_name: None,
        operation,
        total,
        policy,
        registry: registry.clone(),
        deleted_tweets: Arc::new(AtomicU64::new(0)),
        workers,
    })
}

/// A connection end for subscribing to tasks directly
pub(crate) fn subscriber(id: u64) -> (Subscriber, mpsc::UnboundedReceiver<TaskEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Subscriber::new(ConnectionId(id), tx), rx)
}

/// Everything currently queued on a connection
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Next event on a connection, failing the test after one second
pub(crate) async fn next_event(rx: &mut mpsc::UnboundedReceiver<TaskEvent>) -> TaskEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for task event")
        .expect("event channel closed")
}

/// Poll `condition` until it holds, failing the test after one second
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Next command the task sent to a manually driven worker
pub(crate) async fn next_command(control: &mut WorkerControl) -> WorkerCommand {
    tokio::time::timeout(Duration::from_secs(1), control.commands.recv())
        .await
        .expect("timed out waiting for worker command")
        .expect("command channel closed")
}
