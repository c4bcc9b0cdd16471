//! Progress persistence
//!
//! The `ProgressStore` trait is the seam between the engine and its
//! backing storage. Saving a record or profile replaces the whole document
//! atomically; readers always see complete documents.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::progress::{LearnerProfile, ProgressRecord};

#[async_trait::async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load(&self, learner_id: &str, item_id: &str) -> Result<Option<ProgressRecord>>;

    /// Atomically replace the record for (learner, item).
    async fn save(&self, record: &ProgressRecord) -> Result<()>;

    /// Persist an attempt's record and profile updates as one write.
    /// Either both land or neither does; a failure must not leave the
    /// record advanced with the profile behind.
    async fn save_attempt(&self, record: &ProgressRecord, profile: &LearnerProfile) -> Result<()>;

    /// All records for one learner, ordered by item id.
    async fn list_for_learner(&self, learner_id: &str) -> Result<Vec<ProgressRecord>>;

    async fn load_profile(&self, learner_id: &str) -> Result<Option<LearnerProfile>>;

    async fn save_profile(&self, profile: &LearnerProfile) -> Result<()>;

    /// Every learner with a record or profile, sorted.
    async fn list_learners(&self) -> Result<Vec<String>>;
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryProgressStore {
    records: RwLock<HashMap<String, BTreeMap<String, ProgressRecord>>>,
    profiles: RwLock<HashMap<String, LearnerProfile>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self, learner_id: &str, item_id: &str) -> Result<Option<ProgressRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(learner_id)
            .and_then(|items| items.get(item_id))
            .cloned())
    }

    async fn save(&self, record: &ProgressRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records
            .entry(record.learner_id.clone())
            .or_default()
            .insert(record.item_id.clone(), record.clone());
        Ok(())
    }

    async fn save_attempt(&self, record: &ProgressRecord, profile: &LearnerProfile) -> Result<()> {
        let mut records = self.records.write().await;
        let mut profiles = self.profiles.write().await;
        records
            .entry(record.learner_id.clone())
            .or_default()
            .insert(record.item_id.clone(), record.clone());
        profiles.insert(profile.learner_id.clone(), profile.clone());
        Ok(())
    }

    async fn list_for_learner(&self, learner_id: &str) -> Result<Vec<ProgressRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(learner_id)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn load_profile(&self, learner_id: &str) -> Result<Option<LearnerProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(learner_id).cloned())
    }

    async fn save_profile(&self, profile: &LearnerProfile) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.learner_id.clone(), profile.clone());
        Ok(())
    }

    async fn list_learners(&self) -> Result<Vec<String>> {
        let records = self.records.read().await;
        let profiles = self.profiles.read().await;
        let mut learners: BTreeSet<String> = records.keys().cloned().collect();
        learners.extend(profiles.keys().cloned());
        Ok(learners.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SrsConfig;
    use crate::types::Pillar;
    use chrono::Utc;

    fn record(learner: &str, item: &str) -> ProgressRecord {
        ProgressRecord::new(
            learner,
            item,
            Pillar::Vocabulary,
            Utc::now(),
            &SrsConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = MemoryProgressStore::new();
        let rec = record("alice", "v-1");
        store.save(&rec).await.unwrap();

        let loaded = store.load("alice", "v-1").await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert!(store.load("alice", "v-2").await.unwrap().is_none());
        assert!(store.load("bob", "v-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_for_learner_ordered_by_item() {
        let store = MemoryProgressStore::new();
        store.save(&record("alice", "v-2")).await.unwrap();
        store.save(&record("alice", "v-1")).await.unwrap();
        store.save(&record("bob", "v-9")).await.unwrap();

        let records = store.list_for_learner("alice").await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["v-1", "v-2"]);
    }

    #[tokio::test]
    async fn test_list_learners_covers_profiles() {
        let store = MemoryProgressStore::new();
        store.save(&record("bob", "v-1")).await.unwrap();
        store
            .save_profile(&LearnerProfile::new("alice", Utc::now(), 30))
            .await
            .unwrap();

        let learners = store.list_learners().await.unwrap();
        assert_eq!(learners, vec!["alice".to_string(), "bob".to_string()]);
    }
}
