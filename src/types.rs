//! Shared types used across modules
//!
//! The four learning pillars, review trigger reasons, schedule priorities,
//! mastery states, and difficulty bands. Enums serialize to their lowercase
//! wire names and `Display` matches serde output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four learning pillars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    Vocabulary,
    Grammar,
    Pronunciation,
    Speaking,
}

impl Pillar {
    /// Pillars that carry reviewable catalog items. Speaking is scheduled
    /// as free practice time, not as items.
    pub const ITEM_PILLARS: [Pillar; 3] =
        [Pillar::Vocabulary, Pillar::Grammar, Pillar::Pronunciation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pillar::Vocabulary => "vocabulary",
            Pillar::Grammar => "grammar",
            Pillar::Pronunciation => "pronunciation",
            Pillar::Speaking => "speaking",
        }
    }
}

impl fmt::Display for Pillar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Pillar {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vocabulary" => Ok(Pillar::Vocabulary),
            "grammar" => Ok(Pillar::Grammar),
            "pronunciation" => Ok(Pillar::Pronunciation),
            "speaking" => Ok(Pillar::Speaking),
            other => Err(format!("unknown pillar: {}", other)),
        }
    }
}

/// Why an item landed on today's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    SrsDue,
    LowFrequency,
    LowAccuracy,
    DailyPractice,
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewReason::SrsDue => "srs_due",
            ReviewReason::LowFrequency => "low_frequency",
            ReviewReason::LowAccuracy => "low_accuracy",
            ReviewReason::DailyPractice => "daily_practice",
        };
        write!(f, "{}", s)
    }
}

/// Schedule priority. Derived ordering is ascending, so `High > Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewPriority {
    Low,
    Normal,
    High,
}

impl fmt::Display for ReviewPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewPriority::Low => "low",
            ReviewPriority::Normal => "normal",
            ReviewPriority::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// Mastery classification of a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryState {
    #[default]
    New,
    Learning,
    Mastered,
}

impl fmt::Display for MasteryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MasteryState::New => "new",
            MasteryState::Learning => "learning",
            MasteryState::Mastered => "mastered",
        };
        write!(f, "{}", s)
    }
}

/// Item difficulty band, also used as a learner's working level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}
