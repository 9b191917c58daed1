//! Builds a day's posting slots and fills each with a catalog item.
//!
//! Planning is pure: ratios → largest-remainder targets → interleaved
//! category order → evenly spaced slot times. Filling reads the catalog and
//! writes pending work items; a category that runs dry leaves its slot
//! unassigned and reported instead of failing the whole day.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::allocation::{interleave, largest_remainder};
use crate::core::coordinator::OperationCoordinator;
use crate::core::mix::{uniform_ratios, CategoryMixStore, Ratios};
use crate::core::model::{MediaItem, WorkItem};
use crate::core::store::{least_recent_key, MediaCatalog, QueueStore};
use crate::core::QueueError;
use crate::util::clock::Clock;
use crate::util::ids::{ChatRef, MediaId};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Daily posting window `[start_hour, end_hour)` in UTC.
///
/// `end_hour < start_hour` wraps past midnight; `start_hour == end_hour`
/// covers the full day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingWindow {
    /// First hour of the window, 0–23.
    pub start_hour: u32,
    /// Hour the window closes, 0–23.
    pub end_hour: u32,
}

impl Default for PostingWindow {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 21,
        }
    }
}

impl PostingWindow {
    /// Check hours are in range.
    ///
    /// # Errors
    ///
    /// Describes the offending hour.
    pub fn validate(&self) -> Result<(), String> {
        if self.start_hour > 23 {
            return Err(format!("window.start_hour must be 0-23, got {}", self.start_hour));
        }
        if self.end_hour > 23 {
            return Err(format!("window.end_hour must be 0-23, got {}", self.end_hour));
        }
        Ok(())
    }

    /// Length of the window in minutes.
    pub const fn span_minutes(&self) -> u32 {
        if self.start_hour == self.end_hour {
            MINUTES_PER_DAY
        } else if self.end_hour > self.start_hour {
            (self.end_hour - self.start_hour) * 60
        } else {
            (24 - self.start_hour + self.end_hour) * 60
        }
    }

    /// `slots` evenly spaced instants starting at the window opening on `date`.
    ///
    /// # Errors
    ///
    /// [`QueueError::Validation`] if the window is out of range.
    pub fn slot_times(&self, date: NaiveDate, slots: usize) -> Result<Vec<DateTime<Utc>>, QueueError> {
        self.validate().map_err(QueueError::Validation)?;
        let start = date
            .and_hms_opt(self.start_hour, 0, 0)
            .ok_or_else(|| QueueError::Validation(format!("invalid start hour {}", self.start_hour)))?
            .and_utc();
        if slots == 0 {
            return Ok(Vec::new());
        }
        let span_secs = i64::from(self.span_minutes()) * 60;
        #[allow(clippy::cast_possible_wrap)]
        let n = slots as i64;
        Ok((0..n)
            .map(|i| start + Duration::seconds(span_secs * i / n))
            .collect())
    }
}

/// One planned slot, not yet bound to media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSlot {
    /// Position in the day, from 0.
    pub index: usize,
    /// Slot time.
    pub scheduled_for: DateTime<Utc>,
    /// Category to draw from.
    pub category: String,
}

/// A slot left unassigned.
#[derive(Debug, Clone)]
pub struct SlotShortfall {
    /// Position in the day.
    pub index: usize,
    /// Slot time.
    pub scheduled_for: DateTime<Utc>,
    /// Category that had nothing to offer.
    pub category: String,
    /// Why the slot is empty.
    pub error: QueueError,
}

/// Result of a scheduling pass.
#[derive(Debug, Clone, Default)]
pub struct ScheduleReport {
    /// Per-category slot targets.
    pub targets: BTreeMap<String, usize>,
    /// Work items created, in slot order.
    pub created: Vec<WorkItem>,
    /// Slots that could not be filled.
    pub shortfalls: Vec<SlotShortfall>,
}

impl ScheduleReport {
    /// Whether every planned slot received a work item.
    pub fn is_complete(&self) -> bool {
        self.shortfalls.is_empty()
    }
}

/// Pure slot plan for `date`.
///
/// # Errors
///
/// [`QueueError::Validation`] if the window is out of range.
pub fn plan_slots(
    ratios: &Ratios,
    window: PostingWindow,
    slots: usize,
    date: NaiveDate,
) -> Result<Vec<PlannedSlot>, QueueError> {
    let targets = largest_remainder(ratios, slots);
    let order = interleave(&targets);
    let times = window.slot_times(date, order.len())?;
    Ok(order
        .into_iter()
        .zip(times)
        .enumerate()
        .map(|(index, (category, scheduled_for))| PlannedSlot {
            index,
            scheduled_for,
            category,
        })
        .collect())
}

/// Populates a day's slots.
pub struct Scheduler {
    mix: Arc<dyn CategoryMixStore>,
    catalog: Arc<dyn MediaCatalog>,
    queue: Arc<dyn QueueStore>,
    coordinator: Arc<OperationCoordinator>,
    clock: Arc<dyn Clock>,
    window: PostingWindow,
    slots_per_day: usize,
    default_chat: Option<ChatRef>,
}

impl Scheduler {
    /// Create a scheduler.
    pub fn new(
        mix: Arc<dyn CategoryMixStore>,
        catalog: Arc<dyn MediaCatalog>,
        queue: Arc<dyn QueueStore>,
        coordinator: Arc<OperationCoordinator>,
        clock: Arc<dyn Clock>,
        window: PostingWindow,
        slots_per_day: usize,
    ) -> Self {
        Self {
            mix,
            catalog,
            queue,
            coordinator,
            clock,
            window,
            slots_per_day,
            default_chat: None,
        }
    }

    /// Chat used when a pass is not given one.
    #[must_use]
    pub const fn with_default_chat(mut self, chat: Option<ChatRef>) -> Self {
        self.default_chat = chat;
        self
    }

    /// Ratios in effect: the current mix, or uniform over catalog categories.
    ///
    /// # Errors
    ///
    /// [`QueueError::Validation`] if neither a mix nor any category exists.
    pub async fn ratios(&self) -> Result<Ratios, QueueError> {
        let current = self.mix.current_ratios().await?;
        if !current.is_empty() {
            return Ok(current);
        }
        let categories = self.catalog.categories().await?;
        if categories.is_empty() {
            return Err(QueueError::Validation(
                "no category mix and no catalog categories".into(),
            ));
        }
        debug!(categories = categories.len(), "no category mix; weighting uniformly");
        Ok(uniform_ratios(categories))
    }

    /// Slot plan for `date` under the ratios in effect.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::ratios`].
    pub async fn plan_day(&self, date: NaiveDate) -> Result<Vec<PlannedSlot>, QueueError> {
        let ratios = self.ratios().await?;
        plan_slots(&ratios, self.window, self.slots_per_day, date)
    }

    /// Plan `date` and create one pending work item per fillable slot.
    ///
    /// Media already pending, cooling down, or picked earlier in this pass is
    /// skipped. Empty categories are reported in
    /// [`ScheduleReport::shortfalls`].
    ///
    /// # Errors
    ///
    /// [`QueueError::Validation`] without a chat or categories; store errors
    /// propagate.
    pub async fn schedule_day(
        &self,
        date: NaiveDate,
        chat: Option<ChatRef>,
    ) -> Result<ScheduleReport, QueueError> {
        let chat = chat
            .or(self.default_chat)
            .ok_or_else(|| QueueError::Validation("no chat to schedule into".into()))?;
        let ratios = self.ratios().await?;
        let plan = plan_slots(&ratios, self.window, self.slots_per_day, date)?;
        let now = self.clock.now();

        let mut taken = self.pending_media().await?;
        let mut eligible: HashMap<String, Vec<MediaItem>> = HashMap::new();
        let mut report = ScheduleReport {
            targets: largest_remainder(&ratios, self.slots_per_day),
            ..ScheduleReport::default()
        };

        for slot in plan {
            if !eligible.contains_key(&slot.category) {
                let items = self.catalog.list_eligible(&slot.category, now).await?;
                eligible.insert(slot.category.clone(), items);
            }
            let pick = eligible
                .get(&slot.category)
                .and_then(|items| {
                    items
                        .iter()
                        .filter(|item| !taken.contains(&item.id))
                        .min_by_key(|item| least_recent_key(item))
                })
                .cloned();

            let Some(media) = pick else {
                warn!(
                    category = %slot.category,
                    slot = slot.index,
                    scheduled_for = %slot.scheduled_for,
                    "no eligible media; slot left unassigned"
                );
                report.shortfalls.push(SlotShortfall {
                    index: slot.index,
                    scheduled_for: slot.scheduled_for,
                    error: QueueError::InsufficientInventory {
                        category: slot.category.clone(),
                    },
                    category: slot.category,
                });
                continue;
            };

            taken.insert(media.id);
            let item = WorkItem::pending(media.media_ref(), chat, slot.scheduled_for, now);
            self.create(item.clone()).await?;
            report.created.push(item);
        }

        info!(
            %date,
            created = report.created.len(),
            shortfalls = report.shortfalls.len(),
            "day scheduled"
        );
        Ok(report)
    }

    /// Create a single work item for `category` at `at`, e.g. to back-fill a
    /// rejected slot. Media already referenced by a pending item is skipped.
    ///
    /// # Errors
    ///
    /// [`QueueError::InsufficientInventory`] if the category has no eligible
    /// media; store errors propagate.
    pub async fn fill_slot(
        &self,
        category: &str,
        at: DateTime<Utc>,
        chat: ChatRef,
    ) -> Result<WorkItem, QueueError> {
        let now = self.clock.now();
        let taken = self.pending_media().await?;
        let media = self
            .catalog
            .list_eligible(category, now)
            .await?
            .into_iter()
            .filter(|item| !taken.contains(&item.id))
            .min_by_key(least_recent_key)
            .ok_or_else(|| QueueError::InsufficientInventory {
                category: category.to_string(),
            })?;
        let item = WorkItem::pending(media.media_ref(), chat, at, now);
        self.create(item.clone()).await?;
        info!(work_item_id = %item.id, category, media_id = media.id.0, "slot filled");
        Ok(item)
    }

    async fn pending_media(&self) -> Result<HashSet<MediaId>, QueueError> {
        Ok(self
            .queue
            .list_pending()
            .await?
            .into_iter()
            .map(|item| item.media_ref.id)
            .collect())
    }

    async fn create(&self, item: WorkItem) -> Result<(), QueueError> {
        let guard = self.coordinator.acquire(item.id).await;
        let result = self.queue.create(item).await;
        self.coordinator.release(guard);
        result
    }
}
