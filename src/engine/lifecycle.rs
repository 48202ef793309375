//! Shutdown coordination.

use std::sync::atomic::Ordering;

use crate::error::Result;

use super::TaskEngine;

impl TaskEngine {
    /// Stop accepting tasks and cancel every live one
    ///
    /// Subscribers of each live task receive `task cancel`. The registry is empty
    /// afterwards. Calling this twice is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating engine shutdown");

        // 1. Stop accepting new tasks
        self.accepting_new.store(false, Ordering::SeqCst);

        // 2. Cancel live tasks (each one tears its workers down and unregisters)
        let tasks = self.registry.all();
        tracing::info!(active_tasks = tasks.len(), "Cancelling live tasks");
        for task in &tasks {
            if !task.cancel() {
                tracing::debug!(task_id = task.id().0, "Task finished before shutdown reached it");
            }
        }

        // 3. Drop anything registered in the meantime
        let leftover = self.registry.clear();
        if !leftover.is_empty() {
            tracing::warn!(count = leftover.len(), "Tasks still registered after cancellation");
            for task in leftover {
                task.cancel();
            }
        }

        // Let deferred worker terminations run
        tokio::task::yield_now().await;

        tracing::info!(
            deleted_tweets = self.deleted_tweets(),
            "Engine shutdown complete"
        );
        Ok(())
    }
}
