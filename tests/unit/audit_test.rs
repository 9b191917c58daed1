//! Tests for audit sink

use prometheus_posting_queue::core::{build_audit_event, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event("w1", "completed", "alice", Some("skipped".to_string()));

    sink.record(event).unwrap();
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].work_item_id, "w1");
    assert_eq!(events[0].action, "completed");
    assert_eq!(events[0].payload.as_deref(), Some("skipped"));
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("w1", "completed", "alice", None)).unwrap();
    sink.record(build_audit_event("w2", "completed", "alice", None)).unwrap();
    sink.record(build_audit_event("w3", "reconciled", "bob", None)).unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].work_item_id, "w2"); // first one popped
    assert_eq!(events[1].work_item_id, "w3");
}

#[test]
fn test_clones_share_buffer() {
    let sink = InMemoryAuditSink::new(4);
    let mut writer = sink.clone();
    writer.record(build_audit_event("w1", "failed", "auto-poster", None)).unwrap();
    assert_eq!(sink.events().len(), 1);
}
