//! Tests for utility functions

use chrono::{Duration, TimeZone, Utc};
use prometheus_posting_queue::util::{
    init_tracing, now_ms, ChatRef, Clock, HistoryId, ManualClock, MediaId, SystemClock, WorkItemId,
};

#[test]
fn test_work_item_ids_are_unique() {
    let a = WorkItemId::new();
    let b = WorkItemId::new();
    assert_ne!(a, b);
    assert_ne!(HistoryId::new().to_string(), HistoryId::new().to_string());
}

#[test]
fn test_work_item_id_serializes_as_uuid() {
    let id = WorkItemId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let back: WorkItemId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn test_media_id_ordering() {
    assert!(MediaId(1) < MediaId(2));
    assert_eq!(serde_json::to_string(&ChatRef(-42)).unwrap(), "-42");
}

#[test]
fn test_manual_clock() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);
    clock.advance(Duration::minutes(90));
    assert_eq!(clock.now(), start + Duration::minutes(90));
    clock.set(start);
    assert_eq!(clock.now(), start);
}

#[test]
fn test_system_clock_and_now_ms() {
    let before = now_ms();
    let now = SystemClock.now();
    assert!(u128::try_from(now.timestamp_millis()).unwrap() + 1_000 >= before);
    assert!(now_ms() >= before);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!(target: "prometheus_posting_queue", "subscriber installed");
}
