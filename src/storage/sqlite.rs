//! SQLite-backed progress and activity storage
//!
//! One connection serves both stores. Rows carry the full record as a JSON
//! document plus the key columns queries filter on; the document is the
//! source of truth.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::integration::activities::{
    sort_pending, ActivityStats, ActivityStatus, ActivityStore, CorrectiveActivity,
};
use crate::progress::store::ProgressStore;
use crate::progress::{LearnerProfile, ProgressRecord};
use crate::types::Pillar;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Per learner x item review state
            CREATE TABLE IF NOT EXISTS progress (
                learner_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                pillar TEXT NOT NULL,
                next_review TEXT NOT NULL,
                doc TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (learner_id, item_id)
            );

            -- Learner profiles: streaks, level, daily goal state
            CREATE TABLE IF NOT EXISTS profiles (
                learner_id TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Corrective activities filed from conversation sessions
            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                learner_id TEXT NOT NULL,
                pillar TEXT NOT NULL,
                item_key TEXT NOT NULL,
                status TEXT NOT NULL,
                occurrence_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                doc TEXT NOT NULL
            );

            -- Indexes for the hot query paths
            CREATE INDEX IF NOT EXISTS idx_progress_due ON progress(learner_id, next_review);
            CREATE INDEX IF NOT EXISTS idx_activities_pending
                ON activities(learner_id, status, pillar, item_key);
            "#,
        )?;

        Ok(())
    }

    fn upsert_record(conn: &Connection, record: &ProgressRecord) -> Result<()> {
        let doc = serde_json::to_string(record)?;
        conn.execute(
            r#"INSERT OR REPLACE INTO progress
               (learner_id, item_id, pillar, next_review, doc, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                record.learner_id,
                record.item_id,
                record.pillar.as_str(),
                record.srs.next_review.to_rfc3339(),
                doc,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn upsert_profile(conn: &Connection, profile: &LearnerProfile) -> Result<()> {
        let doc = serde_json::to_string(profile)?;
        conn.execute(
            r#"INSERT OR REPLACE INTO profiles (learner_id, doc, updated_at)
               VALUES (?1, ?2, ?3)"#,
            params![profile.learner_id, doc, profile.updated_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProgressStore for SqliteStore {
    async fn load(&self, learner_id: &str, item_id: &str) -> Result<Option<ProgressRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached("SELECT doc FROM progress WHERE learner_id = ?1 AND item_id = ?2")?;
        let doc: Option<String> = stmt
            .query_row(params![learner_id, item_id], |row| row.get(0))
            .optional()?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &ProgressRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        Self::upsert_record(&conn, record)
    }

    async fn save_attempt(&self, record: &ProgressRecord, profile: &LearnerProfile) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        Self::upsert_record(&tx, record)?;
        Self::upsert_profile(&tx, profile)?;
        tx.commit()?;
        Ok(())
    }

    async fn list_for_learner(&self, learner_id: &str) -> Result<Vec<ProgressRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT doc FROM progress WHERE learner_id = ?1 ORDER BY item_id",
        )?;
        let docs = stmt
            .query_map(params![learner_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            records.push(serde_json::from_str(&doc)?);
        }
        Ok(records)
    }

    async fn load_profile(&self, learner_id: &str) -> Result<Option<LearnerProfile>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare_cached("SELECT doc FROM profiles WHERE learner_id = ?1")?;
        let doc: Option<String> = stmt
            .query_row(params![learner_id], |row| row.get(0))
            .optional()?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn save_profile(&self, profile: &LearnerProfile) -> Result<()> {
        let conn = self.conn.lock().await;
        Self::upsert_profile(&conn, profile)
    }

    async fn list_learners(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            r#"SELECT learner_id FROM progress
               UNION
               SELECT learner_id FROM profiles
               ORDER BY learner_id"#,
        )?;
        let learners = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(learners)
    }
}

#[async_trait::async_trait]
impl ActivityStore for SqliteStore {
    async fn insert(&self, activity: &CorrectiveActivity) -> Result<()> {
        let conn = self.conn.lock().await;
        let doc = serde_json::to_string(activity)?;
        conn.execute(
            r#"INSERT OR REPLACE INTO activities
               (id, learner_id, pillar, item_key, status, occurrence_count, created_at, doc)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                activity.id,
                activity.learner_id,
                activity.target_pillar.as_str(),
                activity.item.key(),
                activity.status.to_string(),
                activity.occurrence_count,
                activity.created_at.to_rfc3339(),
                doc,
            ],
        )?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CorrectiveActivity>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT doc FROM activities WHERE id = ?1")?;
        let doc: Option<String> = stmt
            .query_row(params![id], |row| row.get(0))
            .optional()?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn find_pending(
        &self,
        learner_id: &str,
        pillar: Pillar,
        item_key: &str,
    ) -> Result<Option<CorrectiveActivity>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            r#"SELECT doc FROM activities
               WHERE learner_id = ?1 AND status = 'pending'
                 AND pillar = ?2 AND item_key = ?3
               LIMIT 1"#,
        )?;
        let doc: Option<String> = stmt
            .query_row(params![learner_id, pillar.as_str(), item_key], |row| {
                row.get(0)
            })
            .optional()?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn list_pending(
        &self,
        learner_id: &str,
        pillar: Option<Pillar>,
    ) -> Result<Vec<CorrectiveActivity>> {
        let conn = self.conn.lock().await;
        let docs = match pillar {
            Some(pillar) => {
                let mut stmt = conn.prepare_cached(
                    r#"SELECT doc FROM activities
                       WHERE learner_id = ?1 AND status = 'pending' AND pillar = ?2"#,
                )?;
                let docs = stmt
                    .query_map(params![learner_id, pillar.as_str()], |row| {
                        row.get::<_, String>(0)
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                docs
            }
            None => {
                let mut stmt = conn.prepare_cached(
                    "SELECT doc FROM activities WHERE learner_id = ?1 AND status = 'pending'",
                )?;
                let docs = stmt
                    .query_map(params![learner_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                docs
            }
        };

        let mut activities = Vec::with_capacity(docs.len());
        for doc in docs {
            activities.push(serde_json::from_str(&doc)?);
        }
        sort_pending(&mut activities);
        Ok(activities)
    }

    async fn add_occurrences(&self, id: &str, count: u32) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT doc FROM activities WHERE id = ?1")?;
        let doc: Option<String> = stmt
            .query_row(params![id], |row| row.get(0))
            .optional()?;
        let mut activity: CorrectiveActivity = match doc {
            Some(doc) => serde_json::from_str(&doc)?,
            None => return Err(Error::not_found(format!("activity {}", id))),
        };

        activity.occurrence_count += count;
        conn.execute(
            "UPDATE activities SET occurrence_count = ?2, doc = ?3 WHERE id = ?1",
            params![id, activity.occurrence_count, serde_json::to_string(&activity)?],
        )?;
        Ok(())
    }

    async fn complete(&self, id: &str, at: DateTime<Utc>) -> Result<CorrectiveActivity> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT doc FROM activities WHERE id = ?1")?;
        let doc: Option<String> = stmt
            .query_row(params![id], |row| row.get(0))
            .optional()?;
        let mut activity: CorrectiveActivity = match doc {
            Some(doc) => serde_json::from_str(&doc)?,
            None => return Err(Error::not_found(format!("activity {}", id))),
        };

        if activity.status == ActivityStatus::Pending {
            activity.status = ActivityStatus::Completed;
            activity.completed_at = Some(at);
            conn.execute(
                "UPDATE activities SET status = ?2, doc = ?3 WHERE id = ?1",
                params![id, activity.status.to_string(), serde_json::to_string(&activity)?],
            )?;
        }
        Ok(activity)
    }

    async fn statistics(&self, learner_id: &str) -> Result<ActivityStats> {
        let conn = self.conn.lock().await;
        let mut stats = ActivityStats::default();

        stats.total = conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE learner_id = ?1",
            params![learner_id],
            |row| row.get::<_, i64>(0),
        )? as usize;
        stats.pending = conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE learner_id = ?1 AND status = 'pending'",
            params![learner_id],
            |row| row.get::<_, i64>(0),
        )? as usize;
        stats.completed = stats.total - stats.pending;

        let mut stmt = conn.prepare_cached(
            r#"SELECT pillar, COUNT(*) FROM activities
               WHERE learner_id = ?1 GROUP BY pillar"#,
        )?;
        let by_pillar = stmt
            .query_map(params![learner_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (pillar, count) in by_pillar {
            if let Ok(pillar) = pillar.parse::<Pillar>() {
                stats.by_pillar.insert(pillar, count as usize);
            }
        }

        let mut stmt = conn.prepare_cached(
            r#"SELECT item_key, SUM(occurrence_count) FROM activities
               WHERE learner_id = ?1
               GROUP BY item_key
               ORDER BY SUM(occurrence_count) DESC, item_key
               LIMIT 5"#,
        )?;
        stats.top_keys = stmt
            .query_map(params![learner_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u32))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SrsConfig;
    use crate::integration::activities::ItemRef;
    use crate::progress::AttemptSample;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn record(learner: &str, item: &str) -> ProgressRecord {
        let mut record =
            ProgressRecord::new(learner, item, Pillar::Vocabulary, t0(), &SrsConfig::default());
        record.accuracy_history.push(AttemptSample {
            at: t0(),
            accuracy: 92.5,
            correct: true,
            quality: 4,
        });
        record
    }

    fn activity(id: &str, learner: &str, key: &str) -> CorrectiveActivity {
        CorrectiveActivity {
            id: id.to_string(),
            learner_id: learner.to_string(),
            target_pillar: Pillar::Pronunciation,
            item: ItemRef::AdHoc {
                surface_form: key.to_string(),
            },
            title: format!("Practice {}", key),
            origin_session_id: "s-1".to_string(),
            occurrence_count: 1,
            status: ActivityStatus::Pending,
            created_at: t0(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_progress_round_trip() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();

        let record = record("alice", "v-1");
        store.save(&record).await.unwrap();

        let loaded = store.load("alice", "v-1").await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store.load("alice", "v-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_existing_row() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();

        let mut record = record("alice", "v-1");
        store.save(&record).await.unwrap();
        record.srs.interval_days = 6;
        store.save(&record).await.unwrap();

        let loaded = store.load("alice", "v-1").await.unwrap().unwrap();
        assert_eq!(loaded.srs.interval_days, 6);
        assert_eq!(store.list_for_learner("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_attempt_writes_record_and_profile_together() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();

        let record = record("alice", "v-1");
        let mut profile = LearnerProfile::new("alice", t0(), 30);
        profile.activities_completed_today = 1;
        store.save_attempt(&record, &profile).await.unwrap();

        let loaded = store.load("alice", "v-1").await.unwrap().unwrap();
        assert_eq!(loaded, record);
        let loaded = store.load_profile("alice").await.unwrap().unwrap();
        assert_eq!(loaded.activities_completed_today, 1);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.save(&record("alice", "v-1")).await.unwrap();
            store.insert(&activity("a-1", "alice", "/th/")).await.unwrap();
            let profile = LearnerProfile::new("alice", t0(), 30);
            store.save_profile(&profile).await.unwrap();
        }

        let store = SqliteStore::new(&path).await.unwrap();
        assert!(store.load("alice", "v-1").await.unwrap().is_some());
        assert!(store.load_profile("alice").await.unwrap().is_some());
        assert!(store.get("a-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_learners_union() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();

        store.save(&record("carol", "v-1")).await.unwrap();
        store.save(&record("alice", "v-1")).await.unwrap();
        store
            .save_profile(&LearnerProfile::new("bob", t0(), 30))
            .await
            .unwrap();
        // Alice appears in both tables, once in the union
        store
            .save_profile(&LearnerProfile::new("alice", t0(), 30))
            .await
            .unwrap();

        assert_eq!(
            store.list_learners().await.unwrap(),
            vec!["alice", "bob", "carol"]
        );
    }

    #[tokio::test]
    async fn test_find_pending_scopes_by_key_and_status() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();

        store.insert(&activity("a-1", "alice", "/th/")).await.unwrap();

        let found = store
            .find_pending("alice", Pillar::Pronunciation, "/th/")
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, "a-1");

        assert!(store
            .find_pending("alice", Pillar::Pronunciation, "/d/")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_pending("bob", Pillar::Pronunciation, "/th/")
            .await
            .unwrap()
            .is_none());

        store.complete("a-1", t0()).await.unwrap();
        assert!(store
            .find_pending("alice", Pillar::Pronunciation, "/th/")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_pending_filters_by_pillar() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();

        store.insert(&activity("a-1", "alice", "/th/")).await.unwrap();
        let mut grammar = activity("a-2", "alice", "past tense");
        grammar.target_pillar = Pillar::Grammar;
        grammar.occurrence_count = 3;
        store.insert(&grammar).await.unwrap();
        store.insert(&activity("a-3", "alice", "/d/")).await.unwrap();
        store.complete("a-3", t0()).await.unwrap();
        store.insert(&activity("b-1", "bob", "/r/")).await.unwrap();

        let all = store.list_pending("alice", None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        // Grammar with three occurrences outscores the single pronunciation slip
        assert_eq!(ids, vec!["a-2", "a-1"]);

        let pron = store
            .list_pending("alice", Some(Pillar::Pronunciation))
            .await
            .unwrap();
        assert_eq!(pron.len(), 1);
        assert_eq!(pron[0].id, "a-1");
    }

    #[tokio::test]
    async fn test_add_occurrences_updates_row_and_doc() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();

        store.insert(&activity("a-1", "alice", "/th/")).await.unwrap();
        store.add_occurrences("a-1", 2).await.unwrap();

        let loaded = store.get("a-1").await.unwrap().unwrap();
        assert_eq!(loaded.occurrence_count, 3);

        let err = store.add_occurrences("missing", 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_complete_twice_is_noop() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();

        store.insert(&activity("a-1", "alice", "/th/")).await.unwrap();
        let first = store.complete("a-1", t0()).await.unwrap();
        assert_eq!(first.status, ActivityStatus::Completed);
        assert_eq!(first.completed_at, Some(t0()));

        let later = t0() + chrono::Duration::hours(1);
        let second = store.complete("a-1", later).await.unwrap();
        // Original completion time is preserved
        assert_eq!(second.completed_at, Some(t0()));
    }

    #[tokio::test]
    async fn test_statistics_counts_and_top_keys() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();

        let mut hot = activity("a-1", "alice", "/th/");
        hot.occurrence_count = 4;
        store.insert(&hot).await.unwrap();
        store.insert(&activity("a-2", "alice", "/d/")).await.unwrap();
        let mut grammar = activity("a-3", "alice", "past tense");
        grammar.target_pillar = Pillar::Grammar;
        store.insert(&grammar).await.unwrap();
        store.insert(&activity("b-1", "bob", "/r/")).await.unwrap();
        store.complete("a-2", t0()).await.unwrap();

        let stats = store.statistics("alice").await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.by_pillar.get(&Pillar::Pronunciation), Some(&2));
        assert_eq!(stats.by_pillar.get(&Pillar::Grammar), Some(&1));
        assert_eq!(stats.top_keys[0], ("/th/".to_string(), 4));
    }
}
