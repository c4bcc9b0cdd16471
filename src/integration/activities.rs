//! Corrective activity records and their store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::types::Pillar;

/// Lifecycle of a corrective activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Pending,
    Completed,
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityStatus::Pending => "pending",
            ActivityStatus::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

/// The practice material behind an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemRef {
    /// Matched an existing catalog item
    Catalog { item_id: String },
    /// No catalog match; carries the surface form for later authoring
    AdHoc { surface_form: String },
}

impl ItemRef {
    /// Dedup key within (learner, pillar).
    pub fn key(&self) -> &str {
        match self {
            ItemRef::Catalog { item_id } => item_id,
            ItemRef::AdHoc { surface_form } => surface_form,
        }
    }
}

/// Practice filed from conversation errors, waiting to be scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveActivity {
    pub id: String,
    pub learner_id: String,
    pub target_pillar: Pillar,
    pub item: ItemRef,
    /// Short human-readable label, e.g. "Practice /th/"
    pub title: String,
    pub origin_session_id: String,
    pub occurrence_count: u32,
    pub status: ActivityStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CorrectiveActivity {
    /// Scheduling priority: pronunciation outranks grammar, and repeated
    /// errors outrank one-offs (occurrence boost capped at 5).
    pub fn priority_score(&self) -> u32 {
        let base = match self.target_pillar {
            Pillar::Pronunciation => 3,
            _ => 2,
        };
        base + self.occurrence_count.min(5)
    }
}

/// Per-learner corrective activity counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityStats {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub by_pillar: HashMap<Pillar, usize>,
    /// Most frequent error keys with their occurrence totals, highest first
    pub top_keys: Vec<(String, u32)>,
}

#[async_trait::async_trait]
pub trait ActivityStore: Send + Sync {
    async fn insert(&self, activity: &CorrectiveActivity) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<CorrectiveActivity>>;

    /// The pending activity for (learner, pillar, item key), if any.
    async fn find_pending(
        &self,
        learner_id: &str,
        pillar: Pillar,
        item_key: &str,
    ) -> Result<Option<CorrectiveActivity>>;

    /// Pending activities, highest priority first, ties broken oldest first.
    async fn list_pending(
        &self,
        learner_id: &str,
        pillar: Option<Pillar>,
    ) -> Result<Vec<CorrectiveActivity>>;

    /// Add occurrences to an existing activity.
    async fn add_occurrences(&self, id: &str, count: u32) -> Result<()>;

    /// Mark an activity completed. Completing twice is a no-op.
    async fn complete(&self, id: &str, at: DateTime<Utc>) -> Result<CorrectiveActivity>;

    async fn statistics(&self, learner_id: &str) -> Result<ActivityStats>;
}

/// Sort pending activities for presentation: priority desc, then oldest.
pub(crate) fn sort_pending(activities: &mut [CorrectiveActivity]) {
    activities.sort_by(|a, b| {
        b.priority_score()
            .cmp(&a.priority_score())
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

/// In-memory activity store for tests and embedded use.
#[derive(Default)]
pub struct MemoryActivityStore {
    activities: RwLock<Vec<CorrectiveActivity>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn insert(&self, activity: &CorrectiveActivity) -> Result<()> {
        let mut activities = self.activities.write().await;
        activities.push(activity.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CorrectiveActivity>> {
        let activities = self.activities.read().await;
        Ok(activities.iter().find(|a| a.id == id).cloned())
    }

    async fn find_pending(
        &self,
        learner_id: &str,
        pillar: Pillar,
        item_key: &str,
    ) -> Result<Option<CorrectiveActivity>> {
        let activities = self.activities.read().await;
        Ok(activities
            .iter()
            .find(|a| {
                a.learner_id == learner_id
                    && a.target_pillar == pillar
                    && a.status == ActivityStatus::Pending
                    && a.item.key() == item_key
            })
            .cloned())
    }

    async fn list_pending(
        &self,
        learner_id: &str,
        pillar: Option<Pillar>,
    ) -> Result<Vec<CorrectiveActivity>> {
        let activities = self.activities.read().await;
        let mut pending: Vec<CorrectiveActivity> = activities
            .iter()
            .filter(|a| {
                a.learner_id == learner_id
                    && a.status == ActivityStatus::Pending
                    && pillar.map_or(true, |p| a.target_pillar == p)
            })
            .cloned()
            .collect();
        sort_pending(&mut pending);
        Ok(pending)
    }

    async fn add_occurrences(&self, id: &str, count: u32) -> Result<()> {
        let mut activities = self.activities.write().await;
        let activity = activities
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found(format!("activity {}", id)))?;
        activity.occurrence_count += count;
        Ok(())
    }

    async fn complete(&self, id: &str, at: DateTime<Utc>) -> Result<CorrectiveActivity> {
        let mut activities = self.activities.write().await;
        let activity = activities
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found(format!("activity {}", id)))?;
        if activity.status == ActivityStatus::Pending {
            activity.status = ActivityStatus::Completed;
            activity.completed_at = Some(at);
        }
        Ok(activity.clone())
    }

    async fn statistics(&self, learner_id: &str) -> Result<ActivityStats> {
        let activities = self.activities.read().await;
        let mut stats = ActivityStats::default();
        let mut keys: HashMap<String, u32> = HashMap::new();

        for activity in activities.iter().filter(|a| a.learner_id == learner_id) {
            stats.total += 1;
            match activity.status {
                ActivityStatus::Pending => stats.pending += 1,
                ActivityStatus::Completed => stats.completed += 1,
            }
            *stats.by_pillar.entry(activity.target_pillar).or_insert(0) += 1;
            *keys.entry(activity.item.key().to_string()).or_insert(0) +=
                activity.occurrence_count;
        }

        let mut top: Vec<(String, u32)> = keys.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(5);
        stats.top_keys = top;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn activity(id: &str, pillar: Pillar, occurrences: u32, at: DateTime<Utc>) -> CorrectiveActivity {
        CorrectiveActivity {
            id: id.to_string(),
            learner_id: "alice".to_string(),
            target_pillar: pillar,
            item: ItemRef::AdHoc {
                surface_form: format!("form-{}", id),
            },
            title: format!("Practice form-{}", id),
            origin_session_id: "s-1".to_string(),
            occurrence_count: occurrences,
            status: ActivityStatus::Pending,
            created_at: at,
            completed_at: None,
        }
    }

    #[test]
    fn test_priority_score() {
        let now = Utc::now();
        assert_eq!(activity("a", Pillar::Pronunciation, 1, now).priority_score(), 4);
        assert_eq!(activity("b", Pillar::Grammar, 1, now).priority_score(), 3);
        // Occurrence boost caps at five
        assert_eq!(activity("c", Pillar::Grammar, 12, now).priority_score(), 7);
    }

    #[tokio::test]
    async fn test_list_pending_ordering() {
        let store = MemoryActivityStore::new();
        let now = Utc::now();
        // Same score: grammar with 2 occurrences vs pronunciation with 1
        store
            .insert(&activity("old-grammar", Pillar::Grammar, 2, now))
            .await
            .unwrap();
        store
            .insert(&activity("pron", Pillar::Pronunciation, 1, now + Duration::minutes(5)))
            .await
            .unwrap();
        store
            .insert(&activity("hot", Pillar::Pronunciation, 4, now + Duration::minutes(9)))
            .await
            .unwrap();

        let pending = store.list_pending("alice", None).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|a| a.id.as_str()).collect();
        // hot scores 7; the tied pair falls back to creation order
        assert_eq!(ids, vec!["hot", "old-grammar", "pron"]);
    }

    #[tokio::test]
    async fn test_find_pending_ignores_completed() {
        let store = MemoryActivityStore::new();
        let now = Utc::now();
        store
            .insert(&activity("a-1", Pillar::Grammar, 1, now))
            .await
            .unwrap();

        let found = store
            .find_pending("alice", Pillar::Grammar, "form-a-1")
            .await
            .unwrap();
        assert!(found.is_some());

        store.complete("a-1", now).await.unwrap();
        let found = store
            .find_pending("alice", Pillar::Grammar, "form-a-1")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_complete_twice_is_noop() {
        let store = MemoryActivityStore::new();
        let now = Utc::now();
        store
            .insert(&activity("a-1", Pillar::Grammar, 1, now))
            .await
            .unwrap();

        let first = store.complete("a-1", now).await.unwrap();
        assert_eq!(first.status, ActivityStatus::Completed);
        assert_eq!(first.completed_at, Some(now));

        let later = now + Duration::hours(1);
        let second = store.complete("a-1", later).await.unwrap();
        // Timestamp from the first completion is preserved
        assert_eq!(second.completed_at, Some(now));

        assert!(matches!(
            store.complete("ghost", now).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = MemoryActivityStore::new();
        let now = Utc::now();
        store
            .insert(&activity("a-1", Pillar::Grammar, 3, now))
            .await
            .unwrap();
        store
            .insert(&activity("a-2", Pillar::Pronunciation, 1, now))
            .await
            .unwrap();
        store.complete("a-2", now).await.unwrap();

        let stats = store.statistics("alice").await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.by_pillar.get(&Pillar::Grammar), Some(&1));
        assert_eq!(stats.top_keys[0], ("form-a-1".to_string(), 3));
    }
}
