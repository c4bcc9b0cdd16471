//! Learner progress tracking
//!
//! Provides:
//! - `ProgressRecord`, the per learner x item review state
//! - `LearnerProfile` with streak and daily goal bookkeeping
//! - `AttemptOutcome` validation and quality derivation
//! - `ProgressTracker`, the write path that applies the spaced repetition
//!   engine and persists the result

pub mod store;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::ContentCatalog;
use crate::clock::Clock;
use crate::config::{Config, SrsConfig};
use crate::error::{Error, Result};
use crate::srs::{self, SrsState, PASSING_QUALITY};
use crate::types::{Difficulty, MasteryState, Pillar};

use store::ProgressStore;

/// One attempt inside the bounded per-item history ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSample {
    pub at: DateTime<Utc>,
    pub accuracy: f64,
    pub correct: bool,
    pub quality: u8,
}

/// What a caller reports about one practice attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub correct: bool,
    /// Accuracy percentage 0..=100, when the caller can measure one
    pub accuracy: Option<f64>,
    /// Response latency in milliseconds, used when accuracy is absent
    pub response_time_ms: Option<u32>,
}

impl AttemptOutcome {
    /// Derive the 0..=5 review quality for this outcome.
    ///
    /// Accuracy wins when present; an attempt flagged incorrect is capped at
    /// quality 2 so failure always means quality below 3. Without accuracy
    /// the response latency decides, and with neither the bare correctness
    /// flag maps to 5 or 0.
    pub fn quality(&self, cfg: &SrsConfig) -> Result<u8> {
        if let Some(accuracy) = self.accuracy {
            if !accuracy.is_finite() || !(0.0..=100.0).contains(&accuracy) {
                return Err(Error::invalid(format!(
                    "accuracy {} outside 0..=100",
                    accuracy
                )));
            }
            let quality = srs::quality_from_accuracy(accuracy);
            return Ok(if self.correct {
                quality
            } else {
                quality.min(PASSING_QUALITY - 1)
            });
        }
        if let Some(ms) = self.response_time_ms {
            return Ok(srs::quality_from_response_time(
                self.correct,
                ms,
                cfg.expected_response_ms,
            ));
        }
        Ok(if self.correct { 5 } else { 0 })
    }

    /// Accuracy recorded into the history ring: the measured value, or
    /// 100/0 from the correctness flag.
    fn effective_accuracy(&self) -> f64 {
        self.accuracy
            .unwrap_or(if self.correct { 100.0 } else { 0.0 })
    }
}

/// Per learner x item review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub learner_id: String,
    pub item_id: String,
    pub pillar: Pillar,
    pub srs: SrsState,
    pub mastery: MasteryState,
    pub last_practiced: Option<DateTime<Utc>>,
    /// Use timestamps inside the trailing low-frequency window, pruned on
    /// every write
    pub recent_uses: Vec<DateTime<Utc>>,
    /// Bounded ring of the latest attempts, oldest first
    pub accuracy_history: Vec<AttemptSample>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(
        learner_id: &str,
        item_id: &str,
        pillar: Pillar,
        now: DateTime<Utc>,
        cfg: &SrsConfig,
    ) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            pillar,
            srs: SrsState::new(now, cfg),
            mastery: MasteryState::New,
            last_practiced: None,
            recent_uses: Vec::new(),
            accuracy_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mean_accuracy(&self) -> Option<f64> {
        if self.accuracy_history.is_empty() {
            return None;
        }
        let sum: f64 = self.accuracy_history.iter().map(|s| s.accuracy).sum();
        Some(sum / self.accuracy_history.len() as f64)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.srs.is_due(now)
    }

    /// Mean accuracy over the history ring is below the threshold. An empty
    /// ring is never low accuracy.
    pub fn is_low_accuracy(&self, cfg: &SrsConfig) -> bool {
        self.mean_accuracy()
            .map(|mean| mean < cfg.low_accuracy_threshold)
            .unwrap_or(false)
    }

    /// Seen at least once, but not inside the trailing window.
    pub fn is_low_frequency(&self, now: DateTime<Utc>, cfg: &SrsConfig) -> bool {
        if self.last_practiced.is_none() {
            return false;
        }
        let cutoff = now - Duration::days(cfg.low_frequency_window_days);
        !self.recent_uses.iter().any(|t| *t > cutoff)
    }

    /// Fold one attempt into the record. The SRS state must already be
    /// advanced so mastery sees the new interval.
    fn apply_attempt(&mut self, sample: AttemptSample, now: DateTime<Utc>, cfg: &SrsConfig) {
        self.accuracy_history.push(sample);
        while self.accuracy_history.len() > cfg.accuracy_history_len {
            self.accuracy_history.remove(0);
        }

        let cutoff = now - Duration::days(cfg.low_frequency_window_days);
        self.recent_uses.retain(|t| *t > cutoff);
        self.recent_uses.push(now);

        self.last_practiced = Some(now);
        self.updated_at = now;
        self.recompute_mastery(cfg);
    }

    fn recompute_mastery(&mut self, cfg: &SrsConfig) {
        if self.accuracy_history.is_empty() {
            self.mastery = MasteryState::New;
            return;
        }
        let streak_ok = self.accuracy_history.len() >= cfg.mastery_streak
            && self
                .accuracy_history
                .iter()
                .rev()
                .take(cfg.mastery_streak)
                .all(|s| s.correct);
        self.mastery = if self.srs.interval_days >= cfg.mastery_min_interval_days && streak_ok {
            MasteryState::Mastered
        } else {
            MasteryState::Learning
        };
    }
}

/// A review finished earlier today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedReview {
    pub item_id: String,
    pub pillar: Pillar,
    pub minutes: u32,
    pub completed_at: DateTime<Utc>,
}

/// Progress against the daily study goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyGoalProgress {
    pub minutes_studied: u32,
    pub activities_completed: u32,
    pub goal_minutes: u32,
}

/// Per-learner document: level, streaks, and the current day's goal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub learner_id: String,
    pub level: Difficulty,
    pub daily_goal_minutes: u32,
    /// Offset from UTC defining this learner's day boundary
    pub timezone_offset_minutes: i32,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    /// Local date of the most recent recorded attempt
    pub last_activity_date: Option<NaiveDate>,
    /// Local date the daily counters below belong to
    pub goal_date: Option<NaiveDate>,
    pub minutes_studied_today: u32,
    pub activities_completed_today: u32,
    pub completed_today: Vec<CompletedReview>,
    pub total_study_minutes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LearnerProfile {
    pub fn new(learner_id: &str, now: DateTime<Utc>, default_goal_minutes: u32) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            level: Difficulty::Beginner,
            daily_goal_minutes: default_goal_minutes,
            timezone_offset_minutes: 0,
            current_streak_days: 0,
            longest_streak_days: 0,
            last_activity_date: None,
            goal_date: None,
            minutes_studied_today: 0,
            activities_completed_today: 0,
            completed_today: Vec::new(),
            total_study_minutes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The learner's local calendar date at the given instant.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        (now + Duration::minutes(self.timezone_offset_minutes as i64)).date_naive()
    }

    /// Reset the daily counters when the local date has rolled over.
    fn roll_day(&mut self, today: NaiveDate) {
        if self.goal_date != Some(today) {
            self.goal_date = Some(today);
            self.minutes_studied_today = 0;
            self.activities_completed_today = 0;
            self.completed_today.clear();
        }
    }

    /// Fold one finished activity into the daily goal and streak state.
    pub(crate) fn record_activity(&mut self, review: CompletedReview, now: DateTime<Utc>) {
        let today = self.local_date(now);
        self.roll_day(today);
        self.minutes_studied_today += review.minutes;
        self.activities_completed_today += 1;
        self.total_study_minutes += review.minutes as u64;
        self.completed_today.push(review);
        self.bump_streak(today);
        self.updated_at = now;
    }

    /// Same day keeps the streak, the next day extends it, a gap restarts
    /// at one.
    fn bump_streak(&mut self, today: NaiveDate) {
        match self.last_activity_date {
            Some(last) if last == today => {}
            Some(last) if today.signed_duration_since(last).num_days() == 1 => {
                self.current_streak_days += 1;
            }
            _ => self.current_streak_days = 1,
        }
        self.last_activity_date = Some(today);
        self.longest_streak_days = self.longest_streak_days.max(self.current_streak_days);
    }

    /// Goal progress for the current local day. Counters from an earlier
    /// date read as zero.
    pub fn goal_progress(&self, now: DateTime<Utc>) -> DailyGoalProgress {
        let today = self.local_date(now);
        if self.goal_date == Some(today) {
            DailyGoalProgress {
                minutes_studied: self.minutes_studied_today,
                activities_completed: self.activities_completed_today,
                goal_minutes: self.daily_goal_minutes,
            }
        } else {
            DailyGoalProgress {
                minutes_studied: 0,
                activities_completed: 0,
                goal_minutes: self.daily_goal_minutes,
            }
        }
    }

    /// Reviews completed on the given local date. Empty once the day rolls.
    pub fn completed_on(&self, date: NaiveDate) -> &[CompletedReview] {
        if self.goal_date == Some(date) {
            &self.completed_today
        } else {
            &[]
        }
    }
}

/// Result of recording one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub item_id: String,
    pub quality: u8,
    pub interval_days: u32,
    pub next_review: DateTime<Utc>,
    pub mastery: MasteryState,
    pub updated_streak: u32,
}

/// Write path for learner progress: validates the outcome, applies the SRS
/// engine, and persists record and profile.
pub struct ProgressTracker {
    catalog: Arc<dyn ContentCatalog>,
    store: Arc<dyn ProgressStore>,
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
}

impl ProgressTracker {
    pub fn new(
        catalog: Arc<dyn ContentCatalog>,
        store: Arc<dyn ProgressStore>,
        clock: Arc<dyn Clock>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            catalog,
            store,
            clock,
            config,
        }
    }

    /// Record one attempt. Callers serialize writes per learner; see
    /// `LearningService`.
    pub async fn record_attempt(
        &self,
        learner_id: &str,
        item_id: &str,
        outcome: &AttemptOutcome,
    ) -> Result<ProgressUpdate> {
        let quality = outcome.quality(&self.config.srs)?;
        let item = self.catalog.get_item(item_id).await?;
        let now = self.clock.now();

        let mut record = match self.store.load(learner_id, item_id).await? {
            Some(record) => record,
            None => ProgressRecord::new(learner_id, item_id, item.pillar, now, &self.config.srs),
        };

        record.srs = srs::next_state(&record.srs, quality, now, &self.config.srs);
        record.apply_attempt(
            AttemptSample {
                at: now,
                accuracy: outcome.effective_accuracy(),
                correct: quality >= PASSING_QUALITY,
                quality,
            },
            now,
            &self.config.srs,
        );
        let mut profile = self.load_or_create_profile(learner_id).await?;
        let minutes = self.config.schedule.minutes_for(item.pillar);
        profile.record_activity(
            CompletedReview {
                item_id: item.id.clone(),
                pillar: item.pillar,
                minutes,
                completed_at: now,
            },
            now,
        );
        self.store.save_attempt(&record, &profile).await?;

        debug!(
            "Recorded attempt: learner={} item={} quality={} interval={}d streak={}",
            learner_id, item_id, quality, record.srs.interval_days, profile.current_streak_days
        );

        Ok(ProgressUpdate {
            item_id: item.id,
            quality,
            interval_days: record.srs.interval_days,
            next_review: record.srs.next_review,
            mastery: record.mastery,
            updated_streak: profile.current_streak_days,
        })
    }

    /// Load the learner's profile, or a default one that has not been
    /// persisted yet.
    pub async fn load_or_create_profile(&self, learner_id: &str) -> Result<LearnerProfile> {
        match self.store.load_profile(learner_id).await? {
            Some(profile) => Ok(profile),
            None => Ok(LearnerProfile::new(
                learner_id,
                self.clock.now(),
                self.config.schedule.default_daily_goal_minutes,
            )),
        }
    }
}
