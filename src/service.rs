//! Learning service facade
//!
//! Composes the spaced repetition tracker, trigger aggregator, schedule
//! builder, and error integration engine behind one API. Writes for a
//! learner are serialized through a per-learner async lock held in a shared
//! registry; reads assemble their answer from store snapshots without
//! taking it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::catalog::{ContentCatalog, Item};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::integration::activities::{ActivityStats, ActivityStore, CorrectiveActivity};
use crate::integration::{DetectedError, ErrorIntegrationEngine, FinalizeOutcome};
use crate::progress::store::ProgressStore;
use crate::progress::{AttemptOutcome, ProgressTracker, ProgressUpdate};
use crate::schedule::builder::trigger_order;
use crate::schedule::{DailySchedule, ScheduleBuilder, TriggerAggregator, TriggeredItem};
use crate::types::{Difficulty, MasteryState, Pillar};

/// What the learner should do next.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextActivity {
    /// Corrective practice filed from conversation errors
    Corrective(CorrectiveActivity),
    /// A triggered review
    Review(TriggeredItem),
    /// Fresh material the learner has not seen yet
    NewItem(Item),
}

/// Review-state aggregates for one pillar.
#[derive(Debug, Clone, Serialize)]
pub struct PillarSummary {
    pub pillar: Pillar,
    pub total: usize,
    pub mastered: usize,
    pub learning: usize,
    pub due_now: usize,
    pub low_accuracy: usize,
    /// Mean of per-item mean accuracies, when any item has history
    pub mean_accuracy: Option<f64>,
}

/// Cross-pillar progress snapshot for one learner.
#[derive(Debug, Clone, Serialize)]
pub struct OverallProgress {
    pub learner_id: String,
    pub pillars: Vec<PillarSummary>,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    pub total_study_minutes: u64,
    /// Item pillar with the lowest mean accuracy, when any has history
    pub weakest_pillar: Option<Pillar>,
}

/// The facade every caller goes through.
pub struct LearningService {
    catalog: Arc<dyn ContentCatalog>,
    progress: Arc<dyn ProgressStore>,
    activities: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
    tracker: ProgressTracker,
    aggregator: TriggerAggregator,
    builder: ScheduleBuilder,
    integration: ErrorIntegrationEngine,
    learner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LearningService {
    pub fn new(
        catalog: Arc<dyn ContentCatalog>,
        progress: Arc<dyn ProgressStore>,
        activities: Arc<dyn ActivityStore>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        let config = Arc::new(config);
        let tracker = ProgressTracker::new(
            catalog.clone(),
            progress.clone(),
            clock.clone(),
            config.clone(),
        );
        let aggregator = TriggerAggregator::new(catalog.clone(), progress.clone(), config.clone());
        let builder = ScheduleBuilder::new(config.schedule.clone());
        let integration = ErrorIntegrationEngine::new(
            catalog.clone(),
            activities.clone(),
            clock.clone(),
            config.clone(),
        );
        Self {
            catalog,
            progress,
            activities,
            clock,
            config,
            tracker,
            aggregator,
            builder,
            integration,
            learner_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Acquire this learner's write lock within the configured budget.
    ///
    /// Each attempt waits `lock_timeout_ms`; failed attempts back off with
    /// doubling plus jitter before retrying. Exhausting the budget surfaces
    /// `ConcurrentModification` with the attempt count.
    async fn acquire_learner(&self, learner_id: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.learner_locks.lock().await;
            locks.entry(learner_id.to_string()).or_default().clone()
        };

        let budget = &self.config.service;
        let timeout = Duration::from_millis(budget.lock_timeout_ms);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match tokio::time::timeout(timeout, lock.clone().lock_owned()).await {
                Ok(guard) => return Ok(guard),
                Err(_) if attempts <= budget.lock_retries => {
                    let backoff = budget.lock_retry_base_ms << (attempts - 1);
                    let jitter = rand::rng().random_range(0..=backoff / 2);
                    warn!(
                        "Write lock for learner {} busy, retry {}/{} in {}ms",
                        learner_id,
                        attempts,
                        budget.lock_retries,
                        backoff + jitter
                    );
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                }
                Err(_) => {
                    return Err(Error::ConcurrentModification {
                        learner_id: learner_id.to_string(),
                        attempts,
                    })
                }
            }
        }
    }

    /// Items the learner has never attempted, level filtered, catalog order.
    /// A pillar listing that fails is skipped with a warning.
    async fn new_item_supply(&self, learner_id: &str, level: Difficulty) -> Result<Vec<Item>> {
        let seen: HashSet<String> = self
            .progress
            .list_for_learner(learner_id)
            .await?
            .into_iter()
            .map(|r| r.item_id)
            .collect();

        let mut supply = Vec::new();
        for pillar in Pillar::ITEM_PILLARS {
            match self.catalog.list_items(pillar, Some(level)).await {
                Ok(items) => supply.extend(items.into_iter().filter(|i| !seen.contains(&i.id))),
                Err(e) => warn!("Skipping {} items in new item supply: {}", pillar, e),
            }
        }
        Ok(supply)
    }

    /// Build today's schedule for the learner. Read-only.
    ///
    /// Triggers are computed live, items already completed today are
    /// excluded, and leftover budget fills with unseen material at the
    /// learner's level.
    pub async fn today_schedule(&self, learner_id: &str) -> Result<DailySchedule> {
        let now = self.clock.now();
        let profile = self.tracker.load_or_create_profile(learner_id).await?;
        let today = profile.local_date(now);

        let mut triggers = self.aggregator.collect(learner_id, now).await?;
        let done_today: HashSet<&str> = profile
            .completed_on(today)
            .iter()
            .map(|r| r.item_id.as_str())
            .collect();
        triggers.retain(|t| !done_today.contains(t.item_id.as_str()));

        let supply = self.new_item_supply(learner_id, profile.level).await?;
        let scheduled = self
            .builder
            .build(&triggers, &supply, profile.daily_goal_minutes);

        debug!(
            "Built schedule for {}: {} triggers -> {} scheduled",
            learner_id,
            triggers.len(),
            scheduled.len()
        );

        Ok(DailySchedule {
            learner_id: learner_id.to_string(),
            date: today,
            scheduled_reviews: scheduled,
            completed_reviews: profile.completed_on(today).to_vec(),
            daily_goal_progress: profile.goal_progress(now),
        })
    }

    /// Record one practice attempt, advancing review state, daily goal, and
    /// streak. Serialized per learner.
    pub async fn record_progress(
        &self,
        learner_id: &str,
        item_id: &str,
        outcome: &AttemptOutcome,
    ) -> Result<ProgressUpdate> {
        let _guard = self.acquire_learner(learner_id).await?;
        self.tracker.record_attempt(learner_id, item_id, outcome).await
    }

    /// Buffer one conversation error into its session.
    pub async fn report_error(&self, learner_id: &str, error: DetectedError) -> Result<()> {
        self.integration.report_error(learner_id, error).await
    }

    /// Close a conversation session and file corrective activities.
    /// Serialized per learner.
    pub async fn finalize_conversation(
        &self,
        learner_id: &str,
        session_id: &str,
        trailing: Vec<DetectedError>,
    ) -> Result<FinalizeOutcome> {
        let _guard = self.acquire_learner(learner_id).await?;
        self.integration
            .finalize(learner_id, session_id, trailing)
            .await
    }

    /// The single next thing to work on: pending corrective practice first,
    /// then the highest priority trigger, then fresh material.
    pub async fn next_activity(&self, learner_id: &str) -> Result<Option<NextActivity>> {
        if let Some(activity) = self
            .activities
            .list_pending(learner_id, None)
            .await?
            .into_iter()
            .next()
        {
            return Ok(Some(NextActivity::Corrective(activity)));
        }

        let now = self.clock.now();
        let profile = self.tracker.load_or_create_profile(learner_id).await?;
        let today = profile.local_date(now);
        let mut triggers = self.aggregator.collect(learner_id, now).await?;
        let done_today: HashSet<&str> = profile
            .completed_on(today)
            .iter()
            .map(|r| r.item_id.as_str())
            .collect();
        triggers.retain(|t| !done_today.contains(t.item_id.as_str()));
        triggers.sort_by(trigger_order);
        if let Some(trigger) = triggers.into_iter().next() {
            return Ok(Some(NextActivity::Review(trigger)));
        }

        let supply = self.new_item_supply(learner_id, profile.level).await?;
        Ok(supply.into_iter().next().map(NextActivity::NewItem))
    }

    /// Per-pillar aggregates plus streaks and the weakest pillar.
    pub async fn overall_progress(&self, learner_id: &str) -> Result<OverallProgress> {
        let now = self.clock.now();
        let profile = self.tracker.load_or_create_profile(learner_id).await?;
        let records = self.progress.list_for_learner(learner_id).await?;
        let cfg = &self.config.srs;

        let mut pillars = Vec::new();
        for pillar in Pillar::ITEM_PILLARS {
            let mut summary = PillarSummary {
                pillar,
                total: 0,
                mastered: 0,
                learning: 0,
                due_now: 0,
                low_accuracy: 0,
                mean_accuracy: None,
            };
            let mut accuracy_sum = 0.0;
            let mut accuracy_count = 0usize;
            for record in records.iter().filter(|r| r.pillar == pillar) {
                summary.total += 1;
                match record.mastery {
                    MasteryState::Mastered => summary.mastered += 1,
                    MasteryState::Learning => summary.learning += 1,
                    MasteryState::New => {}
                }
                if record.is_due(now) {
                    summary.due_now += 1;
                }
                if record.is_low_accuracy(cfg) {
                    summary.low_accuracy += 1;
                }
                if let Some(mean) = record.mean_accuracy() {
                    accuracy_sum += mean;
                    accuracy_count += 1;
                }
            }
            if accuracy_count > 0 {
                summary.mean_accuracy = Some(accuracy_sum / accuracy_count as f64);
            }
            pillars.push(summary);
        }

        let weakest_pillar = pillars
            .iter()
            .filter_map(|s| s.mean_accuracy.map(|mean| (s.pillar, mean)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(pillar, _)| pillar);

        Ok(OverallProgress {
            learner_id: learner_id.to_string(),
            pillars,
            current_streak_days: profile.current_streak_days,
            longest_streak_days: profile.longest_streak_days,
            total_study_minutes: profile.total_study_minutes,
            weakest_pillar,
        })
    }

    /// Pending corrective activities, highest priority first.
    pub async fn pending_activities(
        &self,
        learner_id: &str,
        pillar: Option<Pillar>,
    ) -> Result<Vec<CorrectiveActivity>> {
        self.activities.list_pending(learner_id, pillar).await
    }

    /// Mark a corrective activity completed. Completing one that is already
    /// completed is a no-op. Serialized per learner.
    pub async fn complete_activity(
        &self,
        learner_id: &str,
        activity_id: &str,
    ) -> Result<CorrectiveActivity> {
        let _guard = self.acquire_learner(learner_id).await?;
        match self.activities.get(activity_id).await? {
            Some(activity) if activity.learner_id == learner_id => {
                self.activities.complete(activity_id, self.clock.now()).await
            }
            _ => Err(Error::not_found(format!(
                "activity {} for learner {}",
                activity_id, learner_id
            ))),
        }
    }

    /// Corrective-activity counts for the learner.
    pub async fn activity_statistics(&self, learner_id: &str) -> Result<ActivityStats> {
        self.activities.statistics(learner_id).await
    }

    /// Every learner the progress store knows about.
    pub async fn learner_ids(&self) -> Result<Vec<String>> {
        self.progress.list_learners().await
    }
}
