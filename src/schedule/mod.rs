//! Daily schedule assembly
//!
//! Provides:
//! - Trigger aggregation: classifying each progress record into at most one
//!   review trigger
//! - The deterministic budgeted schedule builder
//! - The nightly sweep that precomputes schedules across all learners

pub mod builder;
pub mod sweep;
pub mod triggers;

pub use builder::{DailySchedule, ScheduleBuilder, ScheduledReview};
pub use sweep::{run_sweep, run_sweep_daemon, SweepReport};
pub use triggers::{priority_for, TriggerAggregator, TriggeredItem};
