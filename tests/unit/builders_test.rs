//! Tests for builder modules

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use prometheus_posting_queue::builders::{build_posting_queue, Collaborators};
use prometheus_posting_queue::config::EngineConfig;
use prometheus_posting_queue::core::{
    InMemoryAuditSink, MediaItem, Outcome, Resolution, AUDIT_SESSION_LABEL,
};
use prometheus_posting_queue::infra::InMemoryCatalog;
use prometheus_posting_queue::runtime::TokioSpawner;
use prometheus_posting_queue::util::{ChatRef, ManualClock, MediaId};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_build_schedule_resolve_shutdown() {
    let catalog = Arc::new(InMemoryCatalog::new());
    for id in 1..=4 {
        catalog.insert(MediaItem::new(MediaId(id), "cats"));
    }
    let collaborators = Collaborators {
        catalog: catalog.clone(),
        ..Collaborators::in_memory()
    };
    let cfg = EngineConfig {
        slots_per_day: 3,
        default_chat: Some(ChatRef(7)),
        ..EngineConfig::default()
    };
    let sink = InMemoryAuditSink::new(16);
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap(),
    ));

    let built = build_posting_queue(
        &cfg,
        collaborators,
        Some(Box::new(sink.clone())),
        clock,
        &TokioSpawner::current(),
    )
    .unwrap();
    assert!(built
        .pool
        .sessions()
        .iter()
        .any(|s| s.label == AUDIT_SESSION_LABEL));

    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let report = built.scheduler.schedule_day(date, None).await.unwrap();
    assert_eq!(report.created.len(), 3);

    let id = report.created[0].id;
    let outcome = built.service.resolve(id, Outcome::Posted, "alice").await.unwrap();
    assert_eq!(outcome, Resolution::Completed(Outcome::Posted));
    assert_eq!(catalog.get(report.created[0].media_ref.id).unwrap().post_count, 1);

    built.shutdown_async().await.unwrap();
    assert_eq!(sink.events().len(), 1);
}

#[tokio::test]
async fn test_shutdown_async_drains_audit_on_current_thread_runtime() {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.insert(MediaItem::new(MediaId(1), "cats"));
    let collaborators = Collaborators {
        catalog: catalog.clone(),
        ..Collaborators::in_memory()
    };
    let cfg = EngineConfig {
        slots_per_day: 1,
        default_chat: Some(ChatRef(7)),
        ..EngineConfig::default()
    };
    let sink = InMemoryAuditSink::new(4);
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap(),
    ));
    let built = build_posting_queue(
        &cfg,
        collaborators,
        Some(Box::new(sink.clone())),
        clock,
        &TokioSpawner::current(),
    )
    .unwrap();

    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let report = built.scheduler.schedule_day(date, None).await.unwrap();
    let id = report.created[0].id;
    built.service.resolve(id, Outcome::Skipped, "bob").await.unwrap();

    // The only runtime thread stays free while the writer is joined.
    tokio::time::timeout(std::time::Duration::from_secs(5), built.shutdown_async())
        .await
        .expect("shutdown stalled the runtime")
        .unwrap();
    assert_eq!(sink.events().len(), 1);
}

#[test]
fn test_build_rejects_invalid_config() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let cfg = EngineConfig {
        slots_per_day: 0,
        ..EngineConfig::default()
    };
    let result = build_posting_queue(
        &cfg,
        Collaborators::in_memory(),
        None,
        Arc::new(prometheus_posting_queue::util::SystemClock),
        &TokioSpawner::new(runtime.handle().clone()),
    );
    assert!(result.is_err());
}
