//! Fluenta - Language Practice Scheduling Library
//!
//! A review scheduling engine for four-pillar language learning:
//! - SM-2 style spaced repetition over vocabulary, grammar, and
//!   pronunciation items
//! - Review triggers from due dates, disuse, and low accuracy
//! - Deterministic time-budgeted daily schedules
//! - Conversation error integration that files corrective activities
//! - Per-learner streaks and daily goal tracking
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fluenta::clock::SystemClock;
//! use fluenta::integration::activities::MemoryActivityStore;
//! use fluenta::progress::store::MemoryProgressStore;
//! use fluenta::progress::AttemptOutcome;
//! use fluenta::{Config, LearningService, MemoryCatalog};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = MemoryCatalog::from_json_str(&std::fs::read_to_string("catalog.json")?)?;
//!     let service = LearningService::new(
//!         Arc::new(catalog),
//!         Arc::new(MemoryProgressStore::new()),
//!         Arc::new(MemoryActivityStore::new()),
//!         Arc::new(SystemClock),
//!         Config::load()?,
//!     );
//!
//!     let outcome = AttemptOutcome { correct: true, accuracy: Some(92.0), response_time_ms: None };
//!     let update = service.record_progress("alice", "v-1", &outcome).await?;
//!     println!("next review {}", update.next_review);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod catalog;

// Engine modules
pub mod srs;
pub mod progress;
pub mod schedule;
pub mod integration;
pub mod service;

// Storage and interface modules
pub mod storage;
pub mod cli;

// Re-export commonly used types for convenience
pub use catalog::{ContentCatalog, Item, ItemContent, MemoryCatalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use integration::{DetectedError, ErrorIntegrationEngine, ErrorKind, FinalizeOutcome};
pub use progress::{AttemptOutcome, LearnerProfile, ProgressTracker, ProgressUpdate};
pub use schedule::{
    DailySchedule, ScheduleBuilder, ScheduledReview, SweepReport, TriggerAggregator,
    TriggeredItem,
};
pub use service::{LearningService, NextActivity, OverallProgress, PillarSummary};
pub use storage::SqliteStore;
pub use types::{Difficulty, MasteryState, Pillar, ReviewPriority, ReviewReason};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
