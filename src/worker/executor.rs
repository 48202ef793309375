//! Tokio-backed worker executor, one async task per worker.

use std::sync::Arc;
use std::time::Instant;

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::types::{ItemId, OperationType, WorkerCredentials};

use super::{
    ItemOperation, ItemOutcome, WorkerCommand, WorkerControl, WorkerExecutor, WorkerHandle,
    WorkerReporter, WorkerSpec, WorkerState, worker_channel,
};

/// Runs each worker as an independent tokio task on the current runtime
#[derive(Clone)]
pub struct TokioWorkerExecutor {
    operation: Arc<dyn ItemOperation>,
    config: WorkerConfig,
}

impl TokioWorkerExecutor {
    /// Create an executor that applies `operation` to every item
    pub fn new(operation: Arc<dyn ItemOperation>, config: WorkerConfig) -> Self {
        Self { operation, config }
    }
}

impl WorkerExecutor for TokioWorkerExecutor {
    fn start(&self, spec: WorkerSpec, reporter: WorkerReporter) -> Result<WorkerHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Worker(format!("no tokio runtime to spawn worker on: {}", e)))?;

        let (mut handle, control) = worker_channel(spec.worker);
        let join = runtime.spawn(run_worker(
            spec,
            control,
            reporter,
            Arc::clone(&self.operation),
            self.config.clone(),
        ));
        handle.attach(join);

        Ok(handle)
    }
}

/// Counts accumulated since the last progress message
#[derive(Default)]
struct PendingProgress {
    done: u64,
    failed: u64,
}

impl PendingProgress {
    fn len(&self) -> u64 {
        self.done + self.failed
    }

    /// Send and reset; `false` when the task no longer listens
    fn flush(&mut self, reporter: &WorkerReporter) -> bool {
        if self.len() == 0 {
            return true;
        }
        let sent = reporter.progress(self.done, self.failed);
        *self = Self::default();
        sent
    }
}

async fn run_worker(
    spec: WorkerSpec,
    mut control: WorkerControl,
    reporter: WorkerReporter,
    operation: Arc<dyn ItemOperation>,
    config: WorkerConfig,
) {
    control.signal_ready();

    let command = tokio::select! {
        _ = control.cancel.cancelled() => None,
        command = control.commands.recv() => command,
    };

    let (items, credentials, op) = match command {
        Some(WorkerCommand::Work {
            items,
            credentials,
            operation,
        }) => (items, credentials, operation),
        Some(WorkerCommand::Stop) | None => {
            tracing::debug!(
                task_id = spec.task_id.0,
                worker = spec.worker.0,
                "Worker stopped before receiving work"
            );
            control.set_state(WorkerState::Terminated);
            return;
        }
    };

    control.set_state(WorkerState::Running);
    reporter.diagnostic(serde_json::json!({
        "worker": spec.worker.0,
        "items": items.len(),
    }));

    process_slice(&mut control, &reporter, operation.as_ref(), &config, &items, &credentials, op)
        .await;

    control.set_state(WorkerState::Terminated);
}

async fn process_slice(
    control: &mut WorkerControl,
    reporter: &WorkerReporter,
    operation: &dyn ItemOperation,
    config: &WorkerConfig,
    items: &[ItemId],
    credentials: &WorkerCredentials,
    op: OperationType,
) {
    let mut pending = PendingProgress::default();
    let mut last_flush = Instant::now();
    let progress_every = config.progress_every.max(1) as u64;

    for item in items {
        if control.should_stop() {
            tracing::debug!(worker = control.id.0, "Worker stopping mid-slice");
            return;
        }

        let outcome = tokio::select! {
            _ = control.cancel.cancelled() => return,
            outcome = operation.apply(op, item, credentials) => outcome,
        };

        match outcome {
            ItemOutcome::Done => pending.done += 1,
            ItemOutcome::Failed { provider_code } => {
                pending.failed += 1;
                if let Some(code) = provider_code {
                    reporter.provider_error(code);
                }
            }
            ItemOutcome::Abort(message) => {
                pending.flush(reporter);
                reporter.error(message);
                return;
            }
        }

        if pending.len() >= progress_every || last_flush.elapsed() >= config.progress_interval {
            if !pending.flush(reporter) {
                return;
            }
            last_flush = Instant::now();
        }
    }

    if pending.flush(reporter) {
        reporter.end();
    }
}
