//! Spaced repetition engine
//!
//! A compact SM-2 variant. State advances through [`next_state`], a pure
//! function of the previous state, the review quality, and the clock
//! instant. Quality sits on the classic 0..=5 scale; below 3 counts as a
//! failed review.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SrsConfig;

/// Highest review quality.
pub const MAX_QUALITY: u8 = 5;
/// Qualities at or above this count as a successful review.
pub const PASSING_QUALITY: u8 = 3;

/// Per-item spaced repetition state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrsState {
    /// Growth multiplier for review intervals, never below the configured floor
    pub ease_factor: f64,
    /// Current review interval in whole days
    pub interval_days: u32,
    /// Consecutive successful reviews, reset on failure
    pub repetitions: u32,
    /// When the item is next due
    pub next_review: DateTime<Utc>,
    /// When the item was last reviewed
    pub last_review: Option<DateTime<Utc>>,
}

impl SrsState {
    /// State for an item the learner has never reviewed: due immediately.
    pub fn new(now: DateTime<Utc>, cfg: &SrsConfig) -> Self {
        Self {
            ease_factor: cfg.initial_ease_factor,
            interval_days: 0,
            repetitions: 0,
            next_review: now,
            last_review: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }
}

/// Advance SRS state after a review of the given quality.
///
/// Failure (quality < 3) resets the repetition ladder to a one day interval
/// and dents the ease factor, harder failures denting more. Success walks
/// the ladder: 1 day, 6 days, then round(interval * ease), where the
/// interval uses the ease factor from before this review's adjustment.
/// Intervals are clamped to `max_interval_days` so long success runs stay
/// within the calendar range.
pub fn next_state(state: &SrsState, quality: u8, now: DateTime<Utc>, cfg: &SrsConfig) -> SrsState {
    let quality = quality.min(MAX_QUALITY);
    let mut next = state.clone();

    if quality < PASSING_QUALITY {
        next.repetitions = 0;
        next.interval_days = cfg.initial_interval_days;
        next.ease_factor = (state.ease_factor - failure_penalty(quality)).max(cfg.min_ease_factor);
    } else {
        next.interval_days = match state.repetitions {
            0 => cfg.initial_interval_days,
            1 => cfg.second_interval_days,
            _ => (state.interval_days as f64 * state.ease_factor).round() as u32,
        }
        .min(cfg.max_interval_days);
        next.repetitions = state.repetitions + 1;
        next.ease_factor = (state.ease_factor + success_bonus(quality)).max(cfg.min_ease_factor);
    }

    next.last_review = Some(now);
    next.next_review = now + Duration::days(next.interval_days as i64);
    next
}

/// Ease penalty for a failed review: 0.30 at quality 0 down to 0.15 at
/// quality 2.
fn failure_penalty(quality: u8) -> f64 {
    0.30 - 0.075 * quality as f64
}

fn success_bonus(quality: u8) -> f64 {
    match quality {
        5 => 0.10,
        4 => 0.05,
        _ => 0.0,
    }
}

/// Map an accuracy percentage onto the 0..=5 quality scale.
pub fn quality_from_accuracy(accuracy: f64) -> u8 {
    if accuracy >= 95.0 {
        5
    } else if accuracy >= 85.0 {
        4
    } else if accuracy >= 70.0 {
        3
    } else if accuracy >= 50.0 {
        2
    } else if accuracy >= 25.0 {
        1
    } else {
        0
    }
}

/// Map correctness plus response latency onto the quality scale. Thresholds
/// sit at 1x and 2x the expected response time.
pub fn quality_from_response_time(correct: bool, response_ms: u32, expected_ms: u32) -> u8 {
    if correct {
        if response_ms < expected_ms {
            5
        } else if response_ms < expected_ms * 2 {
            4
        } else {
            3
        }
    } else if response_ms < expected_ms {
        2
    } else {
        1
    }
}
