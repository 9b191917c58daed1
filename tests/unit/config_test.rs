//! Tests for configuration validation

use prometheus_posting_queue::config::{EngineConfig, PoolConfig};
use prometheus_posting_queue::core::PostingWindow;
use prometheus_posting_queue::util::ChatRef;

#[test]
fn test_default_config_is_valid() {
    assert!(EngineConfig::default().validate().is_ok());
    assert!(PoolConfig::default().validate().is_ok());
}

#[test]
fn test_pool_config_invalid_values() {
    let zero_sessions = PoolConfig {
        max_sessions: 0,
        ..PoolConfig::default()
    };
    assert!(zero_sessions.validate().is_err());

    let zero_timeout = PoolConfig {
        acquire_timeout_ms: 0,
        ..PoolConfig::default()
    };
    assert!(zero_timeout.validate().is_err());
}

#[test]
fn test_engine_config_invalid_values() {
    let no_slots = EngineConfig {
        slots_per_day: 0,
        ..EngineConfig::default()
    };
    assert!(no_slots.validate().is_err());

    let bad_window = EngineConfig {
        window: PostingWindow {
            start_hour: 25,
            end_hour: 3,
        },
        ..EngineConfig::default()
    };
    assert!(bad_window.validate().is_err());

    let no_audit = EngineConfig {
        audit_channel_capacity: 0,
        ..EngineConfig::default()
    };
    assert!(no_audit.validate().is_err());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "window": { "start_hour": 14, "end_hour": 2 },
        "slots_per_day": 12,
        "pool": { "max_sessions": 2 },
        "default_chat": -100123
    }"#;

    let cfg = EngineConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.window.span_minutes(), 12 * 60);
    assert_eq!(cfg.slots_per_day, 12);
    assert_eq!(cfg.pool.max_sessions, 2);
    // unspecified fields fall back to defaults
    assert_eq!(cfg.pool.acquire_timeout_ms, PoolConfig::default().acquire_timeout_ms);
    assert_eq!(cfg.default_chat, Some(ChatRef(-100_123)));
}

#[test]
fn test_config_from_json_rejects_invalid() {
    assert!(EngineConfig::from_json_str(r#"{ "cooldown_hours": 0 }"#).is_err());
    assert!(EngineConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_from_env() {
    std::env::set_var("POSTING_QUEUE_SLOTS_PER_DAY", "9");
    std::env::set_var("POSTING_QUEUE_POOL_MAX_SESSIONS", "3");
    std::env::set_var("POSTING_QUEUE_DEFAULT_CHAT", "-77");
    let cfg = EngineConfig::from_env().unwrap();
    assert_eq!(cfg.slots_per_day, 9);
    assert_eq!(cfg.pool.max_sessions, 3);
    assert_eq!(cfg.default_chat, Some(ChatRef(-77)));

    std::env::set_var("POSTING_QUEUE_SLOTS_PER_DAY", "many");
    assert!(EngineConfig::from_env().is_err());

    for key in [
        "POSTING_QUEUE_SLOTS_PER_DAY",
        "POSTING_QUEUE_POOL_MAX_SESSIONS",
        "POSTING_QUEUE_DEFAULT_CHAT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn test_limits_conversion() {
    let pool = PoolConfig {
        acquire_timeout_ms: 1_500,
        idle_in_transaction_timeout_secs: 45,
        ..PoolConfig::default()
    };
    let limits = pool.to_limits();
    assert_eq!(limits.acquire_timeout.as_millis(), 1_500);
    assert_eq!(limits.idle_in_transaction_timeout.as_secs(), 45);
}
