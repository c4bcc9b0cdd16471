//! Deterministic daily schedule construction
//!
//! Pure and clock-free: the same triggers, new-item supply, and budget
//! always produce the same schedule. Triggered reviews are packed greedily
//! by priority into the minute budget, then leftover capacity fills with
//! daily practice drawn from unseen items.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::catalog::Item;
use crate::config::ScheduleConfig;
use crate::progress::{CompletedReview, DailyGoalProgress};
use crate::types::{Pillar, ReviewPriority, ReviewReason};

use super::triggers::TriggeredItem;

/// Scheduling order: priority descending, then earliest due date, then
/// catalog position.
pub(crate) fn trigger_order(a: &TriggeredItem, b: &TriggeredItem) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.next_review.cmp(&b.next_review))
        .then_with(|| a.catalog_index.cmp(&b.catalog_index))
}

/// One slot on today's schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledReview {
    /// Deterministic per-build id
    pub id: String,
    pub item_id: String,
    pub pillar: Pillar,
    pub reason: ReviewReason,
    pub priority: ReviewPriority,
    pub estimated_minutes: u32,
}

/// A learner's day: what to do, what is already done, and goal progress.
/// Built fresh on every query, never persisted as authoritative state.
#[derive(Debug, Clone, Serialize)]
pub struct DailySchedule {
    pub learner_id: String,
    pub date: NaiveDate,
    pub scheduled_reviews: Vec<ScheduledReview>,
    pub completed_reviews: Vec<CompletedReview>,
    pub daily_goal_progress: DailyGoalProgress,
}

pub struct ScheduleBuilder {
    config: ScheduleConfig,
}

impl ScheduleBuilder {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    /// Pack triggers into the minute budget, then fill with daily practice.
    ///
    /// Triggers are sorted by priority, then earliest due date, then catalog
    /// position. Each is accepted while the cumulative cost fits the budget;
    /// a non-fitting item is deferred, not dropped, except that the first
    /// trigger is always accepted so an oversized item can never starve.
    /// A zero budget produces an empty schedule.
    pub fn build(
        &self,
        triggers: &[TriggeredItem],
        new_items: &[Item],
        goal_minutes: u32,
    ) -> Vec<ScheduledReview> {
        if goal_minutes == 0 {
            return Vec::new();
        }

        let mut sorted: Vec<&TriggeredItem> = triggers.iter().collect();
        sorted.sort_by(|a, b| trigger_order(a, b));

        let mut scheduled = Vec::new();
        let mut used = 0u32;
        for trigger in sorted {
            let cost = self.config.minutes_for(trigger.pillar);
            if scheduled.is_empty() || used + cost <= goal_minutes {
                scheduled.push(ScheduledReview {
                    id: format!("review-{}", scheduled.len()),
                    item_id: trigger.item_id.clone(),
                    pillar: trigger.pillar,
                    reason: trigger.reason,
                    priority: trigger.priority,
                    estimated_minutes: cost,
                });
                used += cost;
            }
        }

        for item in new_items {
            if used >= goal_minutes {
                break;
            }
            let cost = self.config.minutes_for(item.pillar);
            if used + cost <= goal_minutes {
                scheduled.push(ScheduledReview {
                    id: format!("review-{}", scheduled.len()),
                    item_id: item.id.clone(),
                    pillar: item.pillar,
                    reason: ReviewReason::DailyPractice,
                    priority: ReviewPriority::Low,
                    estimated_minutes: cost,
                });
                used += cost;
            }
        }

        scheduled
    }
}
