//! Worker message handling and teardown.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::CompletionPolicy;
use crate::types::{OperationType, ProgressSnapshot, TaskEvent, TaskStatus};
use crate::worker::{WorkerEnvelope, WorkerHandle, WorkerMessage};

use super::{Task, TaskState};

/// Consume worker messages for `task` until it is torn down
///
/// With a `stall_timeout`, the task fails when no message arrives within that window.
/// The loop also fails the task when every worker went away without reporting an end.
pub(crate) async fn run_mailbox(
    task: Task,
    mut rx: mpsc::UnboundedReceiver<WorkerEnvelope>,
    stall_timeout: Option<Duration>,
) {
    loop {
        let envelope = match stall_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx.recv()).await {
                Ok(envelope) => envelope,
                Err(_) => {
                    tracing::warn!(
                        task_id = task.id().0,
                        timeout_secs = limit.as_secs(),
                        "No worker activity, failing task"
                    );
                    task.fail(format!(
                        "No worker activity for {} seconds",
                        limit.as_secs()
                    ));
                    break;
                }
            },
            None => rx.recv().await,
        };

        let Some(envelope) = envelope else {
            if task.is_running() {
                task.fail("All workers exited before finishing");
            }
            break;
        };

        if !task.handle_message(envelope) {
            break;
        }
    }

    tracing::trace!(task_id = task.id().0, "Mailbox closed");
}

impl Task {
    /// Fold one worker message into the task; returns whether the task is still running
    ///
    /// Messages arriving after teardown are dropped.
    pub(crate) fn handle_message(&self, envelope: WorkerEnvelope) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.status.is_finished() {
            tracing::trace!(
                task_id = inner.id.0,
                worker = envelope.worker.0,
                "Ignoring message for finished task"
            );
            return false;
        }

        match envelope.message {
            WorkerMessage::Progress { done, failed } => {
                let (reported_done, reported_failed) = (done, failed);
                let (done, failed) = clamp_progress(done, failed, state.remaining);
                if (done, failed) != (reported_done, reported_failed) {
                    tracing::warn!(
                        task_id = inner.id.0,
                        worker = envelope.worker.0,
                        reported_done,
                        reported_failed,
                        remaining = state.remaining,
                        "Progress reported past the item total"
                    );
                }
                state.done += done;
                state.failed += failed;
                state.remaining -= done + failed;

                if inner.operation == OperationType::TweetDelete && done > 0 {
                    inner.deleted_tweets.fetch_add(done, Ordering::Relaxed);
                }

                state.last = ProgressSnapshot::progress(
                    inner.id,
                    inner.operation,
                    state.done,
                    state.remaining,
                    state.failed,
                );
                let event = TaskEvent::Progression(state.last.clone());
                state.broadcast(&event);
                true
            }

            WorkerMessage::End => {
                state.finished_workers.insert(envelope.worker);
                let finished = match inner.policy {
                    CompletionPolicy::FirstWorker => true,
                    CompletionPolicy::AllWorkers => {
                        state.finished_workers.len() >= inner.worker_count
                    }
                };

                if finished {
                    state.broadcast(&TaskEvent::TaskEnd {
                        id: inner.id,
                        operation: inner.operation,
                    });
                    self.teardown(&mut state, TaskStatus::Completed);
                    false
                } else {
                    tracing::debug!(
                        task_id = inner.id.0,
                        worker = envelope.worker.0,
                        finished = state.finished_workers.len(),
                        workers = inner.worker_count,
                        "Worker finished its slice"
                    );
                    true
                }
            }

            WorkerMessage::Error { message } => {
                tracing::error!(
                    task_id = inner.id.0,
                    worker = envelope.worker.0,
                    error = %message,
                    "Worker failed"
                );
                self.fail_locked(&mut state, message);
                false
            }

            WorkerMessage::Diagnostic { payload } => {
                tracing::debug!(
                    task_id = inner.id.0,
                    worker = envelope.worker.0,
                    %payload,
                    "Worker diagnostic"
                );
                true
            }

            WorkerMessage::ProviderError { code } => {
                *state.provider_errors.entry(code).or_insert(0) += 1;
                tracing::debug!(
                    task_id = inner.id.0,
                    worker = envelope.worker.0,
                    code,
                    "Provider error"
                );
                true
            }
        }
    }

    /// Fail the task with a terminal error snapshot; returns `false` if it had already finished
    pub(crate) fn fail(&self, message: impl Into<String>) -> bool {
        let mut state = self.inner.state.lock();
        if state.status.is_finished() {
            return false;
        }
        self.fail_locked(&mut state, message.into());
        true
    }

    fn fail_locked(&self, state: &mut TaskState, message: String) {
        state.last = ProgressSnapshot::failure(
            self.inner.id,
            self.inner.operation,
            self.inner.total,
            message,
        );
        let event = TaskEvent::Progression(state.last.clone());
        state.broadcast(&event);
        self.teardown(state, TaskStatus::Failed);
    }

    /// Release workers and subscribers, then leave the registry
    ///
    /// Any terminal event must already have been broadcast. Calling this on a finished
    /// task does nothing.
    pub(super) fn teardown(&self, state: &mut TaskState, status: TaskStatus) {
        if state.status.is_finished() {
            return;
        }
        state.status = status;

        for handle in state.workers.drain(..) {
            retire(handle);
        }
        state.subscribers.clear();

        let inner = &self.inner;
        inner.registry.unregister(inner.id, &inner.owner);

        tracing::info!(
            task_id = inner.id.0,
            owner = %inner.owner,
            screen_name = inner.screen_name.as_deref().unwrap_or("-"),
            operation = %inner.operation,
            status = ?status,
            done = state.done,
            failed = state.failed,
            remaining = state.remaining,
            total = inner.total,
            "Task ended"
        );

        if !state.provider_errors.is_empty() {
            let codes = state
                .provider_errors
                .iter()
                .map(|(code, count)| format!("#{code} ({count})"))
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(task_id = inner.id.0, codes = %codes, "Provider errors during task");
        }
    }
}

/// Cap reported counts so `done + failed` never exceeds what is left
fn clamp_progress(done: u64, failed: u64, remaining: u64) -> (u64, u64) {
    let done = done.min(remaining);
    let failed = failed.min(remaining - done);
    (done, failed)
}

/// Ask a worker to stop, then terminate it once the stop had a chance to land
fn retire(handle: WorkerHandle) {
    handle.stop();
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                tokio::task::yield_now().await;
                handle.terminate();
            });
        }
        Err(_) => handle.terminate(),
    }
}
