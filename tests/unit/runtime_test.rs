//! Tests for tokio spawner utilities and transport models

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use prometheus_posting_queue::core::{
    CompletionEngine, MediaItem, NullNotifier, OperationCoordinator, Outcome, PostingQueue,
    QueueStore, ReconciledOutcome, WorkItem,
};
use prometheus_posting_queue::infra::{
    InMemoryCatalog, InMemoryHistoryStore, InMemoryQueueStore, PoolLimits, SessionPool,
};
use prometheus_posting_queue::runtime::{
    handle_action, health, ActionRequest, ActionResult, Spawn, TokioSpawner,
};
use prometheus_posting_queue::util::{ChatRef, MediaId, SystemClock, WorkItemId};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

fn queue_with(store: Arc<InMemoryQueueStore>) -> PostingQueue {
    let engine = CompletionEngine::new(
        store,
        Arc::new(InMemoryHistoryStore::new()),
        Arc::new(InMemoryCatalog::new()),
        Arc::new(SessionPool::new(PoolLimits {
            max_sessions: 2,
            acquire_timeout: Duration::from_millis(100),
            idle_in_transaction_timeout: Duration::from_secs(30),
        })),
        Arc::new(NullNotifier),
        Arc::new(SystemClock),
        chrono::Duration::hours(1),
    );
    PostingQueue::new(
        Arc::new(OperationCoordinator::new(Duration::from_secs(60))),
        Arc::new(engine),
    )
}

#[tokio::test]
async fn test_handle_action_round_trip() {
    let store = Arc::new(InMemoryQueueStore::new());
    let item = WorkItem::pending(
        MediaItem::new(MediaId(1), "cats").media_ref(),
        ChatRef(1),
        Utc::now(),
        Utc::now(),
    );
    store.create(item.clone()).await.unwrap();
    let queue = queue_with(store);

    let raw = format!(
        r#"{{ "work_item_id": "{}", "outcome": "skipped", "actor": "alice" }}"#,
        item.id
    );
    let req: ActionRequest = serde_json::from_str(&raw).unwrap();
    let first = handle_action(&queue, req.clone()).await;
    assert_eq!(first.result, ActionResult::Completed { outcome: Outcome::Skipped });

    let second = handle_action(&queue, req).await;
    assert!(matches!(
        second.result,
        ActionResult::Reconciled { outcome: ReconciledOutcome::Skipped, .. }
    ));
    let json = serde_json::to_value(&second).unwrap();
    assert_eq!(json["status"], "reconciled");
    assert_eq!(json["message"], "already skipped");
}

#[tokio::test]
async fn test_handle_action_folds_errors() {
    let queue = queue_with(Arc::new(InMemoryQueueStore::new()));
    let resp = handle_action(
        &queue,
        ActionRequest {
            work_item_id: WorkItemId::new(),
            outcome: Outcome::Failed,
            actor: "bob".into(),
            preempt_ms: Some(10),
        },
    )
    .await;
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["kind"], "validation");
}

#[test]
fn test_health() {
    assert!(health().ok);
}
