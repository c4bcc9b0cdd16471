//! Review trigger aggregation
//!
//! Walks the catalog in stable order, joins each item with the learner's
//! progress record, and classifies it into at most one trigger by strict
//! precedence: srs_due beats low_frequency beats low_accuracy. Items the
//! learner has never touched are not triggered; they are new-item supply.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::catalog::ContentCatalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::store::ProgressStore;
use crate::progress::ProgressRecord;
use crate::types::{Pillar, ReviewPriority, ReviewReason};

/// One item that needs review today, tagged with why.
#[derive(Debug, Clone, Serialize)]
pub struct TriggeredItem {
    pub item_id: String,
    pub pillar: Pillar,
    pub reason: ReviewReason,
    pub priority: ReviewPriority,
    /// When the item is next due; schedule tie-break
    pub next_review: DateTime<Utc>,
    /// Position in the catalog walk; final tie-break
    pub catalog_index: usize,
}

/// Priority a trigger reason schedules at.
pub fn priority_for(reason: ReviewReason) -> ReviewPriority {
    match reason {
        ReviewReason::SrsDue | ReviewReason::LowAccuracy => ReviewPriority::High,
        ReviewReason::LowFrequency => ReviewPriority::Normal,
        ReviewReason::DailyPractice => ReviewPriority::Low,
    }
}

pub struct TriggerAggregator {
    catalog: Arc<dyn ContentCatalog>,
    store: Arc<dyn ProgressStore>,
    config: Arc<Config>,
}

impl TriggerAggregator {
    pub fn new(
        catalog: Arc<dyn ContentCatalog>,
        store: Arc<dyn ProgressStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            catalog,
            store,
            config,
        }
    }

    /// Collect this learner's triggers as of `now`.
    ///
    /// A pillar listing that fails is skipped with a warning so one bad
    /// catalog shard cannot sink the whole query; if every pillar fails the
    /// catalog is treated as down.
    pub async fn collect(&self, learner_id: &str, now: DateTime<Utc>) -> Result<Vec<TriggeredItem>> {
        let records: HashMap<String, ProgressRecord> = self
            .store
            .list_for_learner(learner_id)
            .await?
            .into_iter()
            .map(|r| (r.item_id.clone(), r))
            .collect();

        let mut triggers = Vec::new();
        let mut catalog_index = 0usize;
        let mut failed_pillars = 0usize;
        for pillar in Pillar::ITEM_PILLARS {
            let items = match self.catalog.list_items(pillar, None).await {
                Ok(items) => items,
                Err(e) => {
                    warn!("Skipping {} items in trigger scan: {}", pillar, e);
                    failed_pillars += 1;
                    continue;
                }
            };
            for item in items {
                let index = catalog_index;
                catalog_index += 1;
                let Some(record) = records.get(&item.id) else {
                    continue;
                };
                let Some(reason) = self.classify(record, now) else {
                    continue;
                };
                triggers.push(TriggeredItem {
                    item_id: item.id,
                    pillar,
                    reason,
                    priority: priority_for(reason),
                    next_review: record.srs.next_review,
                    catalog_index: index,
                });
            }
        }

        if failed_pillars == Pillar::ITEM_PILLARS.len() {
            return Err(Error::DependencyUnavailable(
                "catalog unreachable during trigger scan".to_string(),
            ));
        }
        Ok(triggers)
    }

    /// At most one reason per record, by precedence.
    fn classify(&self, record: &ProgressRecord, now: DateTime<Utc>) -> Option<ReviewReason> {
        let cfg = &self.config.srs;
        if record.is_due(now) {
            Some(ReviewReason::SrsDue)
        } else if record.is_low_frequency(now, cfg) {
            Some(ReviewReason::LowFrequency)
        } else if record.is_low_accuracy(cfg) {
            Some(ReviewReason::LowAccuracy)
        } else {
            None
        }
    }
}
