//! Tests for error types

use prometheus_posting_queue::core::{ErrorKind, QueueError};
use prometheus_posting_queue::util::WorkItemId;

#[test]
fn test_transient_store_error() {
    let err = QueueError::TransientStore("connection reset".to_string());
    assert_eq!(format!("{err}"), "transient store error: connection reset");
    assert!(err.is_transient());
    assert_eq!(err.kind(), ErrorKind::TransientStore);
}

#[test]
fn test_insufficient_inventory_error() {
    let err = QueueError::InsufficientInventory {
        category: "cats".to_string(),
    };
    assert_eq!(format!("{err}"), "insufficient inventory for category `cats`");
    assert!(!err.is_transient());
}

#[test]
fn test_busy_error_names_item() {
    let id = WorkItemId::new();
    let err = QueueError::Busy(id);
    assert_eq!(format!("{err}"), format!("work item {id} is busy"));
    assert_eq!(err.kind(), ErrorKind::Busy);
}

#[test]
fn test_pool_timeout_error() {
    let err = QueueError::PoolTimeout { waited_ms: 250 };
    assert_eq!(format!("{err}"), "session pool exhausted after waiting 250 ms");
    assert!(!err.is_transient());
}

#[test]
fn test_error_kind_serializes_snake_case() {
    let json = serde_json::to_string(&ErrorKind::InsufficientInventory).unwrap();
    assert_eq!(json, "\"insufficient_inventory\"");
}
