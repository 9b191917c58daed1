//! Engine configuration structures.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, PostingWindow};
use crate::infra::PoolLimits;
use crate::util::ids::ChatRef;

const ENV_PREFIX: &str = "POSTING_QUEUE_";

/// Session pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrently checked-out sessions.
    pub max_sessions: usize,
    /// Bounded wait for a free session, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// Open transactions idle longer than this are reclaimed.
    pub idle_in_transaction_timeout_secs: u64,
    /// Period of the hygiene sweep.
    pub hygiene_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 8,
            acquire_timeout_ms: 5_000,
            idle_in_transaction_timeout_secs: 60,
            hygiene_interval_secs: 30,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sessions == 0 {
            return Err("pool.max_sessions must be greater than 0".into());
        }
        if self.acquire_timeout_ms == 0 {
            return Err("pool.acquire_timeout_ms must be greater than 0".into());
        }
        if self.idle_in_transaction_timeout_secs == 0 {
            return Err("pool.idle_in_transaction_timeout_secs must be greater than 0".into());
        }
        if self.hygiene_interval_secs == 0 {
            return Err("pool.hygiene_interval_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Pool limits for [`crate::infra::SessionPool::new`].
    pub const fn to_limits(&self) -> PoolLimits {
        PoolLimits {
            max_sessions: self.max_sessions,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            idle_in_transaction_timeout: Duration::from_secs(self.idle_in_transaction_timeout_secs),
        }
    }

    /// Period of the hygiene task.
    pub const fn hygiene_interval(&self) -> Duration {
        Duration::from_secs(self.hygiene_interval_secs)
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Daily posting window.
    pub window: PostingWindow,
    /// Slots planned per day.
    pub slots_per_day: usize,
    /// Cooldown lock placed on media after a post.
    pub cooldown_hours: u32,
    /// Session pool.
    pub pool: PoolConfig,
    /// Lifetime of a cancellation flag on an idle item.
    pub cancel_flag_ttl_secs: u64,
    /// Bound of the audit side channel.
    pub audit_channel_capacity: usize,
    /// Chat the scheduler posts into when none is given.
    pub default_chat: Option<ChatRef>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: PostingWindow::default(),
            slots_per_day: 6,
            cooldown_hours: 72,
            pool: PoolConfig::default(),
            cancel_flag_ttl_secs: 300,
            audit_channel_capacity: 1_024,
            default_chat: None,
        }
    }
}

impl EngineConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), String> {
        self.window.validate()?;
        if self.slots_per_day == 0 {
            return Err("slots_per_day must be greater than 0".into());
        }
        if self.cooldown_hours == 0 {
            return Err("cooldown_hours must be greater than 0".into());
        }
        if self.cancel_flag_ttl_secs == 0 {
            return Err("cancel_flag_ttl_secs must be greater than 0".into());
        }
        if self.audit_channel_capacity == 0 {
            return Err("audit_channel_capacity must be greater than 0".into());
        }
        self.pool.validate()
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `POSTING_QUEUE_*` variables over the defaults, reading a
    /// `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or a result that fails validation.
    pub fn from_env() -> AppResult<Self> {
        // a missing .env is fine
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        override_from_env("WINDOW_START_HOUR", &mut cfg.window.start_hour)?;
        override_from_env("WINDOW_END_HOUR", &mut cfg.window.end_hour)?;
        override_from_env("SLOTS_PER_DAY", &mut cfg.slots_per_day)?;
        override_from_env("COOLDOWN_HOURS", &mut cfg.cooldown_hours)?;
        override_from_env("POOL_MAX_SESSIONS", &mut cfg.pool.max_sessions)?;
        override_from_env("POOL_ACQUIRE_TIMEOUT_MS", &mut cfg.pool.acquire_timeout_ms)?;
        override_from_env(
            "POOL_IDLE_IN_TRANSACTION_TIMEOUT_SECS",
            &mut cfg.pool.idle_in_transaction_timeout_secs,
        )?;
        override_from_env("POOL_HYGIENE_INTERVAL_SECS", &mut cfg.pool.hygiene_interval_secs)?;
        override_from_env("CANCEL_FLAG_TTL_SECS", &mut cfg.cancel_flag_ttl_secs)?;
        override_from_env("AUDIT_CHANNEL_CAPACITY", &mut cfg.audit_channel_capacity)?;
        if let Some(chat) = env_value::<i64>("DEFAULT_CHAT")? {
            cfg.default_chat = Some(ChatRef(chat));
        }
        cfg.validate().map_err(|e| anyhow!("config invalid: {e}"))?;
        Ok(cfg)
    }

    /// Cooldown as a chrono duration.
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.cooldown_hours))
    }

    /// Cancellation flag lifetime.
    pub const fn cancel_flag_ttl(&self) -> Duration {
        Duration::from_secs(self.cancel_flag_ttl_secs)
    }
}

fn env_value<T>(suffix: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let key = format!("{ENV_PREFIX}{suffix}");
    match env::var(&key) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

fn override_from_env<T>(suffix: &str, slot: &mut T) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(value) = env_value(suffix)? {
        *slot = value;
    }
    Ok(())
}
