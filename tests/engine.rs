//! Integration tests for the task engine running real tokio workers

mod common;

use bulk_ops::worker::TokioWorkerExecutor;
use bulk_ops::{CompletionPolicy, Error, OperationType, TaskEngine, TaskEvent, TaskStatus};
use common::{GatedOperation, NOT_FOUND_CODE, credentials, items, test_config};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn engine_with(operation: Arc<GatedOperation>, policy: CompletionPolicy) -> TaskEngine {
    let mut config = test_config();
    config.engine.completion_policy = policy;
    let executor = TokioWorkerExecutor::new(operation, config.worker.clone());
    TaskEngine::new(config.engine, Arc::new(executor))
}

async fn wait_for_end(engine: &TaskEngine, task: &bulk_ops::Task) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.get(task.id()).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task did not end");
}

#[tokio::test]
async fn test_all_workers_policy_processes_every_item() {
    let operation = GatedOperation::open();
    let engine = engine_with(operation.clone(), CompletionPolicy::AllWorkers);

    let task = engine
        .create_task(items(300), &credentials("u1"), OperationType::TweetDelete, Some(3))
        .unwrap();
    assert_eq!(task.worker_count(), 3);
    wait_for_end(&engine, &task).await;

    let summary = task.summary();
    assert_eq!(summary.status, TaskStatus::Completed);
    assert_eq!(summary.progress.done, 270);
    assert_eq!(summary.progress.failed, 30);
    assert_eq!(summary.provider_errors.get(&NOT_FOUND_CODE), Some(&30));
    assert_eq!(operation.calls.load(Ordering::SeqCst), 300);
    assert_eq!(engine.deleted_tweets(), 270);
}

#[tokio::test]
async fn test_owners_see_only_their_tasks() {
    let (operation, _gate) = GatedOperation::new();
    let engine = engine_with(operation, CompletionPolicy::FirstWorker);

    let a = engine
        .create_task(items(5), &credentials("u1"), OperationType::Mute, None)
        .unwrap();
    let b = engine
        .create_task(items(5), &credentials("u1"), OperationType::Block, None)
        .unwrap();
    let c = engine
        .create_task(items(5), &credentials("u2"), OperationType::Mute, None)
        .unwrap();

    let ids = |tasks: Vec<bulk_ops::Task>| tasks.iter().map(|t| t.id()).collect::<Vec<_>>();
    assert_eq!(ids(engine.tasks_of(&"u1".into())), vec![a.id(), b.id()]);
    assert_eq!(
        ids(engine.tasks_of_type(&"u1".into(), OperationType::Mute)),
        vec![a.id()]
    );
    assert_eq!(ids(engine.tasks_of(&"u2".into())), vec![c.id()]);
    assert!(matches!(
        engine.cancel_task(&"u2".into(), a.id()),
        Err(Error::NotOwner { .. })
    ));
    assert_eq!(engine.stats().active_tasks, 3);
}

#[tokio::test]
async fn test_revoked_credentials_fail_the_task() {
    let operation = GatedOperation::open();
    let engine = engine_with(operation, CompletionPolicy::FirstWorker);
    let mut list = items(4);
    list.insert(2, "revoked".to_string());

    let task = engine
        .create_task(list, &credentials("u1"), OperationType::Block, None)
        .unwrap();
    wait_for_end(&engine, &task).await;

    let summary = task.summary();
    assert_eq!(summary.status, TaskStatus::Failed);
    assert_eq!(
        summary.progress.error.as_deref(),
        Some("Invalid or expired token")
    );
}

#[tokio::test]
async fn test_shutdown_cancels_running_tasks_and_refuses_new_ones() {
    let (operation, _gate) = GatedOperation::new();
    let engine = engine_with(operation, CompletionPolicy::FirstWorker);
    let task = engine
        .create_task(items(5), &credentials("u1"), OperationType::DirectMessageDelete, None)
        .unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    assert!(task.subscribe(bulk_ops::engine::Subscriber::new(bulk_ops::ConnectionId(1), tx)));
    rx.recv().await.unwrap();

    engine.shutdown().await.unwrap();

    assert_eq!(
        rx.recv().await.unwrap(),
        TaskEvent::TaskCancel {
            id: task.id(),
            operation: OperationType::DirectMessageDelete,
        }
    );
    assert_eq!(task.status(), TaskStatus::Cancelled);
    assert!(engine.active_tasks().is_empty());
    assert!(matches!(
        engine.create_task(items(1), &credentials("u1"), OperationType::Mute, None),
        Err(Error::ShuttingDown)
    ));
}
