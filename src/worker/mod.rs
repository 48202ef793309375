//! Worker execution units and their message contract.
//!
//! A worker receives one slice of item identifiers, performs the operation on each
//! item against the third-party API, and streams [`WorkerMessage`]s back to its task.
//! Tasks only talk to workers through this contract:
//! - [`WorkerExecutor`] - spawns a worker and returns its [`WorkerHandle`]
//! - [`WorkerHandle`] - task-side ownership: send commands, stop, terminate
//! - [`WorkerControl`] - worker-side end: commands, readiness, cancellation
//! - [`ItemOperation`] - the opaque per-item call performed inside a worker
//!
//! [`TokioWorkerExecutor`] runs every worker as its own tokio task.

mod executor;


pub use executor::TokioWorkerExecutor;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{ItemId, OperationType, TaskId, WorkerCredentials};

/// Position of a worker within its task (1-based)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message sent from a task to one of its workers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkerCommand {
    /// The slice to process
    Work {
        /// Item identifiers assigned to this worker
        items: Vec<ItemId>,
        /// Owner's credential pair
        credentials: WorkerCredentials,
        /// Operation to perform on every item
        #[serde(rename = "operationType")]
        operation: OperationType,
    },
    /// Stop after the current item
    Stop,
}

/// Message sent from a worker back to its task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkerMessage {
    /// Counts processed since the previous progress message
    Progress {
        /// Items processed successfully
        done: u64,
        /// Items that failed
        failed: u64,
    },
    /// The worker exhausted its slice
    End,
    /// Unrecoverable failure, the whole task must stop
    Error {
        /// Failure description
        message: String,
    },
    /// Informational payload, logged only
    Diagnostic {
        /// Arbitrary diagnostic data
        payload: serde_json::Value,
    },
    /// A provider-specific error code was returned for one item
    ProviderError {
        /// Third-party API error code
        code: u32,
    },
}

/// A worker message tagged with its sender
#[derive(Clone, Debug)]
pub struct WorkerEnvelope {
    /// Worker that sent the message
    pub worker: WorkerId,
    /// The message itself
    pub message: WorkerMessage,
}

/// Lifecycle state of one worker
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Spawned, waiting for its slice
    #[default]
    Starting,
    /// Processing its slice
    Running,
    /// Asked to stop
    Stopping,
    /// Execution unit is gone
    Terminated,
}

/// What an executor needs to know about the worker it spawns
#[derive(Clone, Copy, Debug)]
pub struct WorkerSpec {
    /// Owning task
    pub task_id: TaskId,
    /// Position within the task
    pub worker: WorkerId,
    /// Number of items the worker will receive
    pub items: usize,
}

/// Sending side of a task's mailbox, bound to one worker id
#[derive(Clone, Debug)]
pub struct WorkerReporter {
    worker: WorkerId,
    tx: mpsc::UnboundedSender<WorkerEnvelope>,
}

impl WorkerReporter {
    pub(crate) fn new(worker: WorkerId, tx: mpsc::UnboundedSender<WorkerEnvelope>) -> Self {
        Self { worker, tx }
    }

    /// Worker this reporter speaks for
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Deliver a message to the task; `false` once the task stopped listening
    pub fn report(&self, message: WorkerMessage) -> bool {
        self.tx
            .send(WorkerEnvelope {
                worker: self.worker,
                message,
            })
            .is_ok()
    }

    /// Report counts processed since the last progress message
    pub fn progress(&self, done: u64, failed: u64) -> bool {
        self.report(WorkerMessage::Progress { done, failed })
    }

    /// Report that the slice is exhausted
    pub fn end(&self) -> bool {
        self.report(WorkerMessage::End)
    }

    /// Report an unrecoverable failure
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.report(WorkerMessage::Error {
            message: message.into(),
        })
    }

    /// Report informational data
    pub fn diagnostic(&self, payload: serde_json::Value) -> bool {
        self.report(WorkerMessage::Diagnostic { payload })
    }

    /// Report a provider-specific error code
    pub fn provider_error(&self, code: u32) -> bool {
        self.report(WorkerMessage::ProviderError { code })
    }
}

/// Create the two ends of a freshly spawned worker
pub fn worker_channel(id: WorkerId) -> (WorkerHandle, WorkerControl) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    let cancel = CancellationToken::new();
    let state = Arc::new(Mutex::new(WorkerState::Starting));

    let handle = WorkerHandle {
        id,
        commands: commands_tx,
        ready: Some(ready_rx),
        cancel: cancel.clone(),
        join: None,
        state: state.clone(),
    };
    let control = WorkerControl {
        id,
        commands: commands_rx,
        ready: Some(ready_tx),
        cancel,
        state,
    };
    (handle, control)
}

/// Task-side ownership of one worker
#[derive(Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    ready: Option<oneshot::Receiver<()>>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
    state: Arc<Mutex<WorkerState>>,
}

impl WorkerHandle {
    /// Worker id
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Bind the execution unit so `terminate` can abort it
    pub fn attach(&mut self, join: JoinHandle<()>) {
        self.join = Some(join);
    }

    /// Take the readiness signal; resolves once the worker can receive its slice
    pub fn take_ready(&mut self) -> Option<oneshot::Receiver<()>> {
        self.ready.take()
    }

    /// Sender for commands that must be delivered after the handle moved on
    pub fn command_sender(&self) -> mpsc::UnboundedSender<WorkerCommand> {
        self.commands.clone()
    }

    /// Send a command to the worker
    pub fn send(&self, command: WorkerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Worker(format!("worker {} is no longer receiving", self.id)))
    }

    /// Ask the worker to stop after its current item
    pub fn stop(&self) {
        // A worker that already exited has dropped its receiver, nothing left to stop
        let _ = self.commands.send(WorkerCommand::Stop);
        let mut state = self.state.lock();
        if *state != WorkerState::Terminated {
            *state = WorkerState::Stopping;
        }
    }

    /// Tear the execution unit down without waiting for it
    pub fn terminate(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            join.abort();
        }
        *self.state.lock() = WorkerState::Terminated;
    }
}

/// Worker-side end of a [`worker_channel`]
#[derive(Debug)]
pub struct WorkerControl {
    /// Worker id
    pub id: WorkerId,
    /// Commands from the task
    pub commands: mpsc::UnboundedReceiver<WorkerCommand>,
    ready: Option<oneshot::Sender<()>>,
    /// Fired when the task terminates the worker
    pub cancel: CancellationToken,
    state: Arc<Mutex<WorkerState>>,
}

impl WorkerControl {
    /// Tell the task the worker can receive its slice (only the first call counts)
    pub fn signal_ready(&mut self) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(());
        }
    }

    /// Record a lifecycle transition
    pub fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    /// Non-blocking check for a stop request, cancellation, or a vanished task
    pub fn should_stop(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        loop {
            match self.commands.try_recv() {
                Ok(WorkerCommand::Stop) => return true,
                Ok(WorkerCommand::Work { .. }) => {
                    tracing::warn!(worker = self.id.0, "Ignoring second work assignment");
                }
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }
}

/// Spawns workers (OS threads, process pool, async tasks, ...)
pub trait WorkerExecutor: Send + Sync {
    /// Spawn a worker; it must signal readiness before it expects its slice
    fn start(&self, spec: WorkerSpec, reporter: WorkerReporter) -> Result<WorkerHandle>;
}

/// Result of applying the operation to one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item was processed
    Done,
    /// The item could not be processed; the worker carries on
    Failed {
        /// Provider error code, when the API returned one
        provider_code: Option<u32>,
    },
    /// Unrecoverable condition (revoked credentials, ...); the task must stop
    Abort(String),
}

/// The per-item third-party API call performed inside a worker
///
/// Implementations own rate-limit handling and retries; whatever they return is final.
#[async_trait::async_trait]
pub trait ItemOperation: Send + Sync {
    /// Perform `operation` on a single item
    async fn apply(
        &self,
        operation: OperationType,
        item: &ItemId,
        credentials: &WorkerCredentials,
    ) -> ItemOutcome;
}
