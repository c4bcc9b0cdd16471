//! Nightly schedule sweep
//!
//! Precomputes every learner's daily schedule through a bounded worker
//! pool. Schedules stay query-derived; the sweep exists to warm caches,
//! surface catalog problems before learners wake up, and emit the
//! morning-readiness log line.

use cron::Schedule;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::service::LearningService;

/// What one sweep pass covered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Learners visited
    pub learners: usize,
    /// Schedules built without error
    pub schedules_built: usize,
    /// Total reviews across all built schedules
    pub reviews_scheduled: usize,
    /// Learners whose schedule build failed
    pub failed: usize,
}

/// Build every learner's schedule, at most `concurrency` learners at a time.
///
/// A failing learner is counted and logged, never fatal to the pass. Writes
/// within one learner stay serialized because schedule building is
/// read-only.
pub async fn run_sweep(service: &LearningService, concurrency: usize) -> Result<SweepReport> {
    let learners = service.learner_ids().await?;
    info!("Sweep starting over {} learners", learners.len());

    let mut outcomes = stream::iter(learners.into_iter().map(|learner| async move {
        let outcome = service.today_schedule(&learner).await;
        (learner, outcome)
    }))
    .buffer_unordered(concurrency.max(1));

    let mut report = SweepReport::default();
    while let Some((learner, outcome)) = outcomes.next().await {
        report.learners += 1;
        match outcome {
            Ok(schedule) => {
                report.schedules_built += 1;
                report.reviews_scheduled += schedule.scheduled_reviews.len();
                debug!(
                    "Sweep built schedule for {}: {} reviews",
                    learner,
                    schedule.scheduled_reviews.len()
                );
            }
            Err(e) => {
                report.failed += 1;
                warn!("Sweep failed for learner {}: {}", learner, e);
            }
        }
    }

    info!(
        "Sweep finished: {}/{} schedules built, {} reviews queued, {} failures",
        report.schedules_built, report.learners, report.reviews_scheduled, report.failed
    );
    Ok(report)
}

/// Run sweeps forever on the given cron schedule. Returns only when the
/// schedule has no future fire times.
pub async fn run_sweep_daemon(service: &LearningService, schedule: &Schedule, concurrency: usize) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("Sweep schedule has no upcoming fire times, daemon stopping");
            return;
        };
        debug!("Next sweep at {}", next);
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if let Err(e) = run_sweep(service, concurrency).await {
            warn!("Sweep run failed: {}", e);
        }
    }
}
