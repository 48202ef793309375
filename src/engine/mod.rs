//! Task orchestration engine split into focused submodules.
//!
//! The [`TaskEngine`] accepts bulk-operation requests and turns each one into a [`Task`]:
//! - [`partition`] - splitting an item list across workers
//! - [`registry`] - the index of live tasks by id and owner
//! - [`task`] - aggregation, subscriptions and teardown of one task
//! - [`lifecycle`] - engine shutdown

mod lifecycle;
pub mod partition;
mod registry;
mod task;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use partition::partition_items;
pub use registry::TaskRegistry;
pub use task::{Subscriber, Task};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::types::{EngineStats, ItemId, OperationType, OwnerCredentials, OwnerId, TaskId};
use crate::worker::{WorkerCommand, WorkerExecutor, WorkerHandle, WorkerId, WorkerReporter, WorkerSpec};

use task::{TaskParts, run_mailbox};

/// Entry point for creating, querying and cancelling tasks (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct TaskEngine {
    /// Orchestration settings
    pub(crate) config: Arc<EngineConfig>,
    /// Live tasks by id and owner
    pub(crate) registry: TaskRegistry,
    /// Spawns the workers of every task
    pub(crate) executor: Arc<dyn WorkerExecutor>,
    /// Tweets deleted since the engine started, across all tasks
    pub(crate) deleted_tweets: Arc<AtomicU64>,
    /// Set to false during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl TaskEngine {
    /// Create an engine with its own empty registry
    pub fn new(config: EngineConfig, executor: Arc<dyn WorkerExecutor>) -> Self {
        Self::with_registry(config, executor, TaskRegistry::new())
    }

    /// Create an engine on top of an existing registry
    pub fn with_registry(
        config: EngineConfig,
        executor: Arc<dyn WorkerExecutor>,
        registry: TaskRegistry,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            executor,
            deleted_tweets: Arc::new(AtomicU64::new(0)),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Accept a bulk operation and start its workers
    ///
    /// The items are partitioned across at most `worker_hint` workers (the configured
    /// default when `None`). The returned task is already registered; its cached snapshot
    /// reports every item as remaining.
    ///
    /// Returns without waiting for any worker. Must be called from within a tokio
    /// runtime, which runs the task's mailbox and the hand-over of each slice.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`TaskEngine::shutdown`] was called
    /// - [`Error::EmptyItems`] for an empty item list
    /// - [`Error::Conflict`] when the owner already runs the configured maximum of tasks
    ///   for this operation
    /// - [`Error::Worker`] when the executor fails to start a worker
    pub fn create_task(
        &self,
        items: Vec<ItemId>,
        credentials: &OwnerCredentials,
        operation: OperationType,
        worker_hint: Option<usize>,
    ) -> Result<Task> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if items.is_empty() {
            return Err(Error::EmptyItems);
        }

        let owner = credentials.owner.clone();
        if let Some(limit) = self.config.max_active_per_operation {
            let active = self.registry.type_of(&owner, operation).len();
            if active >= limit {
                return Err(Error::Conflict(format!(
                    "{} already has {} running {} task(s)",
                    owner, active, operation
                )));
            }
        }

        let id = self.registry.allocate_id();
        let total = items.len() as u64;
        let hint = worker_hint.unwrap_or(self.config.default_worker_count);
        let slices = partition_items(&items, hint, self.config.min_batch_size);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut workers: Vec<WorkerHandle> = Vec::with_capacity(slices.len());
        for (index, slice) in slices.into_iter().enumerate() {
            let worker = WorkerId(index + 1);
            let spec = WorkerSpec {
                task_id: id,
                worker,
                items: slice.len(),
            };

            let mut handle = match self
                .executor
                .start(spec, WorkerReporter::new(worker, tx.clone()))
            {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!(task_id = id.0, worker = worker.0, error = %e, "Failed to start worker");
                    for started in workers {
                        started.terminate();
                    }
                    return Err(e);
                }
            };

            hand_over(
                &mut handle,
                id,
                WorkerCommand::Work {
                    items: slice,
                    credentials: credentials.worker_credentials(),
                    operation,
                },
            );
            workers.push(handle);
        }
        // Only workers keep the mailbox open from here on
        drop(tx);

        let worker_count = workers.len();
        let task = Task::new(TaskParts {
            id,
            owner,
            screen_name: credentials.screen_name.clone(),
            operation,
            total,
            policy: self.config.completion_policy,
            registry: self.registry.clone(),
            deleted_tweets: Arc::clone(&self.deleted_tweets),
            workers,
        });
        self.registry.register(task.clone());
        tokio::spawn(run_mailbox(task.clone(), rx, self.config.stall_timeout));

        tracing::info!(
            task_id = id.0,
            owner = %task.owner(),
            operation = %operation,
            items = total,
            workers = worker_count,
            "Task created"
        );
        Ok(task)
    }

    /// Cancel a task on behalf of `owner`
    ///
    /// # Errors
    ///
    /// [`Error::TaskNotFound`] when no live task has this id, [`Error::NotOwner`] when it
    /// belongs to someone else.
    pub fn cancel_task(&self, owner: &OwnerId, id: TaskId) -> Result<()> {
        let task = self.get_owned(owner, id)?;
        if task.cancel() {
            Ok(())
        } else {
            // Finished between lookup and cancel
            Err(Error::TaskNotFound(id))
        }
    }

    /// Look up a live task
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.registry.get(id)
    }

    /// Look up a live task that must belong to `owner`
    pub fn get_owned(&self, owner: &OwnerId, id: TaskId) -> Result<Task> {
        let task = self.registry.get(id).ok_or(Error::TaskNotFound(id))?;
        if task.owner() != owner {
            return Err(Error::NotOwner { id });
        }
        Ok(task)
    }

    /// Live tasks of one owner, oldest first
    pub fn tasks_of(&self, owner: &OwnerId) -> Vec<Task> {
        self.registry.tasks_of(owner)
    }

    /// Live tasks of one owner performing `operation`, oldest first
    pub fn tasks_of_type(&self, owner: &OwnerId, operation: OperationType) -> Vec<Task> {
        self.registry.type_of(owner, operation)
    }

    /// Every live task, oldest first
    pub fn active_tasks(&self) -> Vec<Task> {
        self.registry.all()
    }

    /// Tweets deleted since the engine started
    pub fn deleted_tweets(&self) -> u64 {
        self.deleted_tweets.load(Ordering::Relaxed)
    }

    /// Engine-wide counters
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_tasks: self.registry.len(),
            deleted_tweets: self.deleted_tweets(),
        }
    }

    /// Whether new tasks are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    /// The registry shared with the subscription gateway
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Current orchestration settings
    pub fn config(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.config)
    }
}

/// Deliver the work command once the worker signalled readiness
fn hand_over(handle: &mut WorkerHandle, task_id: TaskId, command: WorkerCommand) {
    let sender = handle.command_sender();
    let worker = handle.id();

    let Some(ready) = handle.take_ready() else {
        if sender.send(command).is_err() {
            tracing::debug!(task_id = task_id.0, worker = worker.0, "Worker gone before work hand-over");
        }
        return;
    };

    tokio::spawn(async move {
        if ready.await.is_err() {
            tracing::debug!(task_id = task_id.0, worker = worker.0, "Worker exited before becoming ready");
            return;
        }
        if sender.send(command).is_err() {
            tracing::debug!(task_id = task_id.0, worker = worker.0, "Worker gone before work hand-over");
        }
    });
}
