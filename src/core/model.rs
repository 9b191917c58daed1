//! Persistent and in-flight records of the posting queue.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::QueueError;
use crate::util::ids::{ChatRef, HistoryId, MediaId, WorkItemId};

const MAX_ACTOR_LEN: usize = 64;

/// Lifecycle status of a work item while it sits in the queue store.
///
/// Terminal outcomes are never stored on the work item; reaching one deletes
/// the item and writes a [`HistoryRecord`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    /// Waiting for a human or the auto-poster to resolve it.
    Pending,
}

/// Terminal outcome of a work item. All four are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Published to the social network.
    Posted,
    /// Passed over for this slot; media stays available.
    Skipped,
    /// Rejected by a reviewer.
    Rejected,
    /// The automated attempt failed.
    Failed,
}

impl Outcome {
    /// Whether a history record with this outcome counts as a success.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Posted)
    }

    /// Lowercase name as written to history.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Posted => "posted",
            Self::Skipped => "skipped",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path through which an outcome was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostMethod {
    /// The auto-poster pipeline.
    Automation,
    /// A human pressing a chat button.
    Manual,
}

impl PostMethod {
    /// Lowercase name as written to history.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Automation => "automation",
            Self::Manual => "manual",
        }
    }
}

/// Who triggered an operation: a chat username or the automation's service name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Actor(String);

impl Actor {
    /// Name used by the auto-poster.
    pub const AUTOMATION: &'static str = "auto-poster";

    /// Validate and wrap an actor name.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Validation`] for empty, overlong, or
    /// control-character-bearing names.
    pub fn new(name: impl Into<String>) -> Result<Self, QueueError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(QueueError::Validation("actor must not be empty".into()));
        }
        if trimmed.chars().count() > MAX_ACTOR_LEN {
            return Err(QueueError::Validation(format!(
                "actor longer than {MAX_ACTOR_LEN} characters"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(QueueError::Validation(
                "actor contains control characters".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The auto-poster's identity.
    pub fn automation() -> Self {
        Self(Self::AUTOMATION.to_string())
    }

    /// Actor name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Actor {
    type Error = QueueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Actor> for String {
    fn from(actor: Actor) -> Self {
        actor.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pointer from a work item to the catalog entry it will publish.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef {
    /// Catalog identifier.
    pub id: MediaId,
    /// Category the item was scheduled under.
    pub category: String,
}

/// One scheduled posting task awaiting a terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Generated identifier.
    pub id: WorkItemId,
    /// Media to publish.
    pub media_ref: MediaRef,
    /// Chat that reviews the item.
    pub chat_ref: ChatRef,
    /// Slot time.
    pub scheduled_for: DateTime<Utc>,
    /// Always [`WorkItemStatus::Pending`] while stored.
    pub status: WorkItemStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    /// New pending work item with a fresh id.
    pub fn pending(
        media_ref: MediaRef,
        chat_ref: ChatRef,
        scheduled_for: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorkItemId::new(),
            media_ref,
            chat_ref,
            scheduled_for,
            status: WorkItemStatus::Pending,
            created_at,
        }
    }
}

/// Append-only audit record of a terminal transition. The durable source of
/// truth once the work item is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Record identifier.
    pub id: HistoryId,
    /// Work item that was resolved. Not unique: a retried mutation set may
    /// leave more than one record per item.
    pub work_item_id: WorkItemId,
    /// Media that was scheduled.
    pub media_id: MediaId,
    /// Terminal outcome.
    pub status: Outcome,
    /// How the outcome was reached.
    pub method: PostMethod,
    /// Who resolved it.
    pub actor: Actor,
    /// `true` only for [`Outcome::Posted`].
    pub success: bool,
    /// When the transition was written.
    pub posted_at: DateTime<Utc>,
}

/// Inventory entry in the media catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Catalog identifier.
    pub id: MediaId,
    /// Content category.
    pub category: String,
    /// Number of successful posts.
    pub post_count: u32,
    /// Last successful post, if any.
    pub last_posted_at: Option<DateTime<Utc>>,
    /// Active cooldown lock expiry, if any.
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl MediaItem {
    /// Fresh, never-posted item.
    pub fn new(id: MediaId, category: impl Into<String>) -> Self {
        Self {
            id,
            category: category.into(),
            post_count: 0,
            last_posted_at: None,
            cooldown_until: None,
        }
    }

    /// Whether a cooldown lock excludes this item at `now`.
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    /// Reference stored on a work item.
    pub fn media_ref(&self) -> MediaRef {
        MediaRef {
            id: self.id,
            category: self.category.clone(),
        }
    }
}

/// One versioned row of the category mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMix {
    /// Content category.
    pub category: String,
    /// Target share of slots, in `[0, 1]`.
    pub ratio: f64,
    /// Start of validity.
    pub effective_from: DateTime<Utc>,
    /// End of validity; `None` while current.
    pub effective_to: Option<DateTime<Utc>>,
    /// Exactly the rows of the live ratio set carry `true`.
    pub is_current: bool,
}

/// Validated instruction to move a work item into a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Target item.
    pub work_item_id: WorkItemId,
    /// Terminal outcome to apply.
    pub outcome: Outcome,
    /// Path that produced it.
    pub method: PostMethod,
    /// Who triggered it.
    pub actor: Actor,
}

impl CompletionRequest {
    /// Build a request, rejecting combinations that cannot occur.
    ///
    /// # Errors
    ///
    /// [`QueueError::Validation`] if a manual trigger asks for
    /// [`Outcome::Failed`], which only the auto-poster may record.
    pub fn new(
        work_item_id: WorkItemId,
        outcome: Outcome,
        method: PostMethod,
        actor: Actor,
    ) -> Result<Self, QueueError> {
        if outcome == Outcome::Failed && method == PostMethod::Manual {
            return Err(QueueError::Validation(
                "only automation may record a failed outcome".into(),
            ));
        }
        Ok(Self {
            work_item_id,
            outcome,
            method,
            actor,
        })
    }

    /// Manual request from a chat button.
    ///
    /// # Errors
    ///
    /// See [`CompletionRequest::new`].
    pub fn manual(
        work_item_id: WorkItemId,
        outcome: Outcome,
        actor: Actor,
    ) -> Result<Self, QueueError> {
        Self::new(work_item_id, outcome, PostMethod::Manual, actor)
    }

    /// History row this request writes.
    pub fn to_history(&self, item: &WorkItem, at: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            id: HistoryId::new(),
            work_item_id: self.work_item_id,
            media_id: item.media_ref.id,
            status: self.outcome,
            method: self.method,
            actor: self.actor.clone(),
            success: self.outcome.is_success(),
            posted_at: at,
        }
    }
}
