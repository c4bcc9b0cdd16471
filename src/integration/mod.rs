//! Cross-pillar error integration
//!
//! Conversation sessions buffer detected grammar and pronunciation errors.
//! Finalizing a session dedups the buffer, matches each error group against
//! the catalog, and files corrective activities for future scheduling.
//!
//! Session lifecycle: collecting -> finalizing -> dispatched. A dispatched
//! session finalizes to an empty creation list, so retries are harmless.

pub mod activities;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::ContentCatalog;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::Pillar;

use activities::{ActivityStatus, ActivityStore, CorrectiveActivity, ItemRef};

/// The kind of error a conversation analyzer detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Grammar,
    Pronunciation,
}

impl ErrorKind {
    /// The pillar corrective practice lands in.
    pub fn pillar(&self) -> Pillar {
        match self {
            ErrorKind::Grammar => Pillar::Grammar,
            ErrorKind::Pronunciation => Pillar::Pronunciation,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Grammar => "grammar",
            ErrorKind::Pronunciation => "pronunciation",
        };
        write!(f, "{}", s)
    }
}

/// One error observed during a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedError {
    pub session_id: String,
    pub kind: ErrorKind,
    /// What the learner said
    pub source_text: String,
    /// The canonical correction: rule name, correct form, or target phoneme
    pub expected: String,
    pub observed: String,
    /// Catalog item the analyzer already identified, if any
    pub related_item_id: Option<String>,
}

impl DetectedError {
    /// An error must carry something to practice against.
    pub fn validate(&self) -> Result<()> {
        if self.expected.trim().is_empty() && self.related_item_id.is_none() {
            return Err(Error::invalid(
                "detected error has neither an expected form nor a related item",
            ));
        }
        Ok(())
    }
}

/// Where a conversation session sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Collecting,
    Finalizing,
    Dispatched,
}

struct ConversationSession {
    learner_id: String,
    phase: SessionPhase,
    buffer: Vec<DetectedError>,
    started_at: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
}

impl ConversationSession {
    fn new(learner_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            phase: SessionPhase::Collecting,
            buffer: Vec::new(),
            started_at,
            dispatched_at: None,
        }
    }
}

/// What finalizing a session produced.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeOutcome {
    pub corrective_activities: Vec<CorrectiveActivity>,
    /// Human-readable recap grouped by pillar
    pub summary: String,
}

/// Turns buffered conversation errors into corrective activities.
pub struct ErrorIntegrationEngine {
    catalog: Arc<dyn ContentCatalog>,
    activities: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
    sessions: Mutex<HashMap<String, ConversationSession>>,
}

impl ErrorIntegrationEngine {
    pub fn new(
        catalog: Arc<dyn ContentCatalog>,
        activities: Arc<dyn ActivityStore>,
        clock: Arc<dyn Clock>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            catalog,
            activities,
            clock,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Buffer one error into its session, opening the session on first use.
    /// Rejected once the session has left the collecting phase.
    pub async fn report_error(&self, learner_id: &str, error: DetectedError) -> Result<()> {
        error.validate()?;
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        self.prune_dispatched(&mut sessions, now);
        let session = sessions
            .entry(error.session_id.clone())
            .or_insert_with(|| ConversationSession::new(learner_id, now));
        if session.learner_id != learner_id {
            return Err(Error::invalid(format!(
                "session {} belongs to another learner",
                error.session_id
            )));
        }
        if session.phase != SessionPhase::Collecting {
            return Err(Error::invalid(format!(
                "session {} is no longer collecting",
                error.session_id
            )));
        }
        session.buffer.push(error);
        Ok(())
    }

    /// Current phase of a session, if the engine has seen it.
    pub async fn session_phase(&self, session_id: &str) -> Option<SessionPhase> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).map(|s| s.phase)
    }

    /// Close a session: dedup its buffer plus any trailing errors, file
    /// corrective activities, and move it to dispatched.
    ///
    /// On a storage or catalog failure the session drops back to collecting,
    /// keeping only the errors whose groups were not yet filed. A retry then
    /// replays the remainder without double-counting what already landed.
    pub async fn finalize(
        &self,
        learner_id: &str,
        session_id: &str,
        trailing: Vec<DetectedError>,
    ) -> Result<FinalizeOutcome> {
        for error in &trailing {
            error.validate()?;
        }

        let now = self.clock.now();
        let mut remaining = {
            let mut sessions = self.sessions.lock().await;
            self.prune_dispatched(&mut sessions, now);
            let session = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| ConversationSession::new(learner_id, now));
            if session.learner_id != learner_id {
                return Err(Error::invalid(format!(
                    "session {} belongs to another learner",
                    session_id
                )));
            }
            match session.phase {
                SessionPhase::Dispatched => {
                    return Ok(FinalizeOutcome {
                        corrective_activities: Vec::new(),
                        summary: "Session already dispatched; no new corrective activities."
                            .to_string(),
                    });
                }
                SessionPhase::Finalizing => {
                    return Err(Error::invalid(format!(
                        "session {} is already finalizing",
                        session_id
                    )));
                }
                SessionPhase::Collecting => {}
            }
            session.buffer.extend(trailing);
            session.phase = SessionPhase::Finalizing;
            std::mem::take(&mut session.buffer)
        };

        let reported = remaining.len();
        match self.dispatch(learner_id, session_id, &mut remaining).await {
            Ok(outcome) => {
                let mut sessions = self.sessions.lock().await;
                if let Some(session) = sessions.get_mut(session_id) {
                    let now = self.clock.now();
                    session.phase = SessionPhase::Dispatched;
                    session.dispatched_at = Some(now);
                    let elapsed = (now - session.started_at).num_seconds();
                    info!(
                        "Finalized session {} after {}s: {} errors -> {} new activities",
                        session_id,
                        elapsed,
                        reported,
                        outcome.corrective_activities.len()
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                // Reopen with the unfiled errors; the filed groups stay out
                // of the buffer so a retry cannot replay them
                let mut sessions = self.sessions.lock().await;
                if let Some(session) = sessions.get_mut(session_id) {
                    session.phase = SessionPhase::Collecting;
                    session.buffer = remaining;
                }
                Err(e)
            }
        }
    }

    /// File one activity (or occurrence merge) per capped group, removing
    /// each group's errors from `remaining` as it lands. After a mid-run
    /// failure `remaining` holds exactly the errors still unfiled.
    async fn dispatch(
        &self,
        learner_id: &str,
        session_id: &str,
        remaining: &mut Vec<DetectedError>,
    ) -> Result<FinalizeOutcome> {
        let now = self.clock.now();
        let groups = cap_groups(
            group_errors(remaining),
            self.config.integration.max_activities_per_session,
        );

        let mut created = Vec::new();
        let mut merged = 0u32;
        for group in &groups {
            let pillar = group.kind.pillar();
            let (item, label) = self.resolve_item(pillar, group).await?;

            match self
                .activities
                .find_pending(learner_id, pillar, item.key())
                .await?
            {
                Some(existing) => {
                    self.activities
                        .add_occurrences(&existing.id, group.count)
                        .await?;
                    merged += group.count;
                    debug!(
                        "Merged {} occurrence(s) of '{}' into activity {}",
                        group.count, label, existing.id
                    );
                }
                None => {
                    let activity = CorrectiveActivity {
                        id: Uuid::new_v4().to_string(),
                        learner_id: learner_id.to_string(),
                        target_pillar: pillar,
                        item,
                        title: title_for(group.kind, &label),
                        origin_session_id: session_id.to_string(),
                        occurrence_count: group.count,
                        status: ActivityStatus::Pending,
                        created_at: now,
                        completed_at: None,
                    };
                    self.activities.insert(&activity).await?;
                    created.push(activity);
                }
            }
            remaining.retain(|e| e.kind != group.kind || error_key(e) != group.key);
        }

        let summary = build_summary(&created, merged);
        Ok(FinalizeOutcome {
            corrective_activities: created,
            summary,
        })
    }

    /// Resolve a group to a catalog item, falling back to an ad-hoc
    /// descriptor when nothing matches.
    async fn resolve_item(&self, pillar: Pillar, group: &ErrorGroup) -> Result<(ItemRef, String)> {
        if let Some(item_id) = &group.representative.related_item_id {
            match self.catalog.get_item(item_id).await {
                Ok(item) => {
                    return Ok((
                        ItemRef::Catalog {
                            item_id: item.id.clone(),
                        },
                        item.surface_form().to_string(),
                    ))
                }
                Err(Error::NotFound(_)) => {
                    warn!(
                        "Related item {} missing from catalog; matching by surface form",
                        item_id
                    );
                }
                Err(e) => return Err(e),
            }
        }

        match self
            .catalog
            .find_by_surface_form(pillar, &group.representative.expected)
            .await?
        {
            Some(item) => Ok((
                ItemRef::Catalog {
                    item_id: item.id.clone(),
                },
                item.surface_form().to_string(),
            )),
            None => Ok((
                ItemRef::AdHoc {
                    surface_form: normalize(&group.representative.expected),
                },
                group.representative.expected.trim().to_string(),
            )),
        }
    }

    /// Drop dispatched sessions once their retention window passes. The
    /// window bounds how long a duplicate finalize replays as a no-op.
    fn prune_dispatched(
        &self,
        sessions: &mut HashMap<String, ConversationSession>,
        now: DateTime<Utc>,
    ) {
        let horizon = Duration::hours(i64::from(self.config.integration.session_retention_hours));
        sessions.retain(|_, session| {
            session.phase != SessionPhase::Dispatched
                || session.dispatched_at.map_or(true, |at| now - at < horizon)
        });
    }
}

#[derive(Debug, Clone)]
struct ErrorGroup {
    kind: ErrorKind,
    key: String,
    representative: DetectedError,
    count: u32,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn title_for(kind: ErrorKind, label: &str) -> String {
    match kind {
        ErrorKind::Grammar => format!("Review {}", label),
        ErrorKind::Pronunciation => format!("Practice {}", label),
    }
}

/// Grouping key for one error: the related item id when present, otherwise
/// the normalized expected form.
fn error_key(error: &DetectedError) -> String {
    error
        .related_item_id
        .clone()
        .unwrap_or_else(|| normalize(&error.expected))
}

/// Collapse raw errors into one group per (kind, key), preserving first-seen
/// order.
fn group_errors(errors: &[DetectedError]) -> Vec<ErrorGroup> {
    let mut groups: Vec<ErrorGroup> = Vec::new();
    for error in errors {
        let key = error_key(error);
        match groups
            .iter_mut()
            .find(|g| g.kind == error.kind && g.key == key)
        {
            Some(group) => group.count += 1,
            None => groups.push(ErrorGroup {
                kind: error.kind,
                key,
                representative: error.clone(),
                count: 1,
            }),
        }
    }
    groups
}

/// Cap the groups filed from one session. Pronunciation gets a majority
/// quota when both kinds contend, then grammar, then leftover pronunciation
/// fills the remainder. Within a kind, higher occurrence counts win.
fn cap_groups(groups: Vec<ErrorGroup>, max: usize) -> Vec<ErrorGroup> {
    if groups.len() <= max {
        return groups;
    }
    let (mut pron, mut grammar): (Vec<ErrorGroup>, Vec<ErrorGroup>) = groups
        .into_iter()
        .partition(|g| g.kind == ErrorKind::Pronunciation);
    pron.sort_by(|a, b| b.count.cmp(&a.count));
    grammar.sort_by(|a, b| b.count.cmp(&a.count));

    let pron_quota = max / 2 + 1;
    let mut kept: Vec<ErrorGroup> = pron.iter().take(pron_quota).cloned().collect();
    let grammar_take = max - kept.len();
    kept.extend(grammar.into_iter().take(grammar_take));
    if kept.len() < max && pron.len() > pron_quota {
        let fill = max - kept.len();
        kept.extend(pron.into_iter().skip(pron_quota).take(fill));
    }
    kept
}

/// Recap grouped by pillar, e.g.
/// "Filed 2 corrective activities (grammar: Review past tense; pronunciation: Practice /th/)".
fn build_summary(created: &[CorrectiveActivity], merged: u32) -> String {
    let mut summary = if created.is_empty() {
        "No new corrective activities.".to_string()
    } else {
        let mut parts = Vec::new();
        for pillar in Pillar::ITEM_PILLARS {
            let titles: Vec<&str> = created
                .iter()
                .filter(|a| a.target_pillar == pillar)
                .map(|a| a.title.as_str())
                .collect();
            if !titles.is_empty() {
                parts.push(format!("{}: {}", pillar, titles.join(", ")));
            }
        }
        format!(
            "Filed {} corrective activities ({})",
            created.len(),
            parts.join("; ")
        )
    };
    if merged > 0 {
        summary.push_str(&format!(
            "; {} occurrence(s) merged into existing practice",
            merged
        ));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Item, ItemContent, MemoryCatalog, MockContentCatalog};
    use crate::clock::ManualClock;
    use crate::integration::activities::MemoryActivityStore;
    use crate::types::Difficulty;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn pron_error(session: &str, phoneme: &str) -> DetectedError {
        DetectedError {
            session_id: session.to_string(),
            kind: ErrorKind::Pronunciation,
            source_text: "I think so".to_string(),
            expected: phoneme.to_string(),
            observed: "/t/".to_string(),
            related_item_id: None,
        }
    }

    fn grammar_error(session: &str, rule: &str) -> DetectedError {
        DetectedError {
            session_id: session.to_string(),
            kind: ErrorKind::Grammar,
            source_text: "I goed home".to_string(),
            expected: rule.to_string(),
            observed: "goed".to_string(),
            related_item_id: None,
        }
    }

    fn engine_with(
        catalog: Arc<dyn ContentCatalog>,
    ) -> (ErrorIntegrationEngine, Arc<MemoryActivityStore>) {
        let store = Arc::new(MemoryActivityStore::new());
        let engine = ErrorIntegrationEngine::new(
            catalog,
            store.clone(),
            Arc::new(ManualClock::new(t0())),
            Arc::new(Config::default()),
        );
        (engine, store)
    }

    fn engine() -> (ErrorIntegrationEngine, Arc<MemoryActivityStore>) {
        engine_with(Arc::new(MemoryCatalog::new()))
    }

    #[tokio::test]
    async fn test_same_phoneme_twice_yields_one_activity() {
        let (engine, _) = engine();
        let outcome = engine
            .finalize(
                "alice",
                "s-1",
                vec![pron_error("s-1", "/th/"), pron_error("s-1", "/th/")],
            )
            .await
            .unwrap();

        assert_eq!(outcome.corrective_activities.len(), 1);
        let activity = &outcome.corrective_activities[0];
        assert_eq!(activity.target_pillar, Pillar::Pronunciation);
        assert_eq!(activity.occurrence_count, 2);
        assert_eq!(activity.item.key(), "/th/");
        assert_eq!(activity.title, "Practice /th/");
    }

    #[tokio::test]
    async fn test_reported_errors_and_trailing_combine() {
        let (engine, _) = engine();
        engine
            .report_error("alice", pron_error("s-1", "/th/"))
            .await
            .unwrap();
        engine
            .report_error("alice", grammar_error("s-1", "past tense"))
            .await
            .unwrap();

        let outcome = engine
            .finalize("alice", "s-1", vec![pron_error("s-1", "/TH/ ")])
            .await
            .unwrap();

        // The trailing /TH/ normalizes onto the buffered /th/ group
        assert_eq!(outcome.corrective_activities.len(), 2);
        let pron = outcome
            .corrective_activities
            .iter()
            .find(|a| a.target_pillar == Pillar::Pronunciation)
            .unwrap();
        assert_eq!(pron.occurrence_count, 2);
        assert!(outcome.summary.contains("grammar: Review past tense"));
        assert!(outcome.summary.contains("pronunciation: Practice /th/"));
    }

    #[tokio::test]
    async fn test_catalog_match_links_item() {
        let catalog = MemoryCatalog::from_items(vec![Item {
            id: "g-past".to_string(),
            pillar: Pillar::Grammar,
            difficulty: Difficulty::Beginner,
            content: ItemContent::Rule {
                name: "Past Tense".to_string(),
                summary: "ed endings".to_string(),
            },
        }]);
        let (engine, _) = engine_with(Arc::new(catalog));

        let outcome = engine
            .finalize("alice", "s-1", vec![grammar_error("s-1", "past tense")])
            .await
            .unwrap();

        assert_eq!(
            outcome.corrective_activities[0].item,
            ItemRef::Catalog {
                item_id: "g-past".to_string()
            }
        );
        assert_eq!(outcome.corrective_activities[0].title, "Review Past Tense");
    }

    #[tokio::test]
    async fn test_pending_duplicate_absorbs_across_sessions() {
        let (engine, store) = engine();
        let first = engine
            .finalize("alice", "s-1", vec![pron_error("s-1", "/th/")])
            .await
            .unwrap();
        assert_eq!(first.corrective_activities.len(), 1);
        let id = first.corrective_activities[0].id.clone();

        let second = engine
            .finalize(
                "alice",
                "s-2",
                vec![pron_error("s-2", "/th/"), pron_error("s-2", "/th/")],
            )
            .await
            .unwrap();
        assert!(second.corrective_activities.is_empty());
        assert!(second.summary.contains("merged into existing practice"));

        let activity = store.get(&id).await.unwrap().unwrap();
        assert_eq!(activity.occurrence_count, 3);
    }

    #[tokio::test]
    async fn test_double_finalize_is_idempotent() {
        let (engine, _) = engine();
        let first = engine
            .finalize("alice", "s-1", vec![pron_error("s-1", "/th/")])
            .await
            .unwrap();
        assert_eq!(first.corrective_activities.len(), 1);

        let second = engine.finalize("alice", "s-1", vec![]).await.unwrap();
        assert!(second.corrective_activities.is_empty());
        assert!(second.summary.contains("already dispatched"));
        assert_eq!(
            engine.session_phase("s-1").await,
            Some(SessionPhase::Dispatched)
        );
    }

    #[tokio::test]
    async fn test_report_after_finalize_rejected() {
        let (engine, _) = engine();
        engine.finalize("alice", "s-1", vec![]).await.unwrap();

        let err = engine
            .report_error("alice", pron_error("s-1", "/th/"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOutcome(_)));
    }

    #[tokio::test]
    async fn test_session_belongs_to_one_learner() {
        let (engine, _) = engine();
        engine
            .report_error("alice", pron_error("s-1", "/th/"))
            .await
            .unwrap();

        let err = engine
            .report_error("bob", pron_error("s-1", "/d/"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOutcome(_)));

        let err = engine.finalize("bob", "s-1", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOutcome(_)));
    }

    #[tokio::test]
    async fn test_session_cap_favors_pronunciation() {
        let (engine, _) = engine();
        let mut errors = Vec::new();
        for i in 0..8 {
            errors.push(pron_error("s-1", &format!("/p{}/", i)));
        }
        for i in 0..4 {
            errors.push(grammar_error("s-1", &format!("rule {}", i)));
        }

        let outcome = engine.finalize("alice", "s-1", errors).await.unwrap();
        assert_eq!(outcome.corrective_activities.len(), 10);
        let pron = outcome
            .corrective_activities
            .iter()
            .filter(|a| a.target_pillar == Pillar::Pronunciation)
            .count();
        // Quota is 10/2 + 1 = 6 when grammar can fill the rest
        assert_eq!(pron, 6);
    }

    #[tokio::test]
    async fn test_session_cap_backfills_pronunciation() {
        let (engine, _) = engine();
        let errors: Vec<DetectedError> = (0..14)
            .map(|i| pron_error("s-1", &format!("/p{}/", i)))
            .collect();

        let outcome = engine.finalize("alice", "s-1", errors).await.unwrap();
        // No grammar contention, so pronunciation fills the whole cap
        assert_eq!(outcome.corrective_activities.len(), 10);
    }

    #[tokio::test]
    async fn test_failed_dispatch_reopens_session() {
        let mut catalog = MockContentCatalog::new();
        catalog.expect_find_by_surface_form().returning(|_, _| {
            Err(Error::DependencyUnavailable("catalog offline".to_string()))
        });
        let (engine, _) = engine_with(Arc::new(catalog));

        let err = engine
            .finalize("alice", "s-1", vec![pron_error("s-1", "/th/")])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            engine.session_phase("s-1").await,
            Some(SessionPhase::Collecting)
        );

        // Still collecting, so new errors are accepted
        engine
            .report_error("alice", pron_error("s-1", "/d/"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retry_after_partial_dispatch_files_remainder_once() {
        // The grammar lookup fails once, after the pronunciation group
        // has already been filed
        let mut catalog = MockContentCatalog::new();
        let failed_once = AtomicBool::new(false);
        catalog
            .expect_find_by_surface_form()
            .returning(move |pillar, _| {
                if pillar == Pillar::Grammar && !failed_once.swap(true, Ordering::SeqCst) {
                    Err(Error::DependencyUnavailable("catalog offline".to_string()))
                } else {
                    Ok(None)
                }
            });
        let (engine, store) = engine_with(Arc::new(catalog));

        let errors = vec![
            pron_error("s-1", "/th/"),
            pron_error("s-1", "/th/"),
            grammar_error("s-1", "past tense"),
        ];
        let err = engine.finalize("alice", "s-1", errors).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            engine.session_phase("s-1").await,
            Some(SessionPhase::Collecting)
        );

        let outcome = engine.finalize("alice", "s-1", vec![]).await.unwrap();
        assert_eq!(outcome.corrective_activities.len(), 1);
        assert_eq!(
            outcome.corrective_activities[0].target_pillar,
            Pillar::Grammar
        );

        // The group filed before the failure is not counted again
        let th = store
            .find_pending("alice", Pillar::Pronunciation, "/th/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(th.occurrence_count, 2);
        let past = store
            .find_pending("alice", Pillar::Grammar, "past tense")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(past.occurrence_count, 1);
        assert_eq!(
            engine.session_phase("s-1").await,
            Some(SessionPhase::Dispatched)
        );
    }

    #[tokio::test]
    async fn test_dispatched_sessions_pruned_after_retention() {
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = ErrorIntegrationEngine::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(MemoryActivityStore::new()),
            clock.clone(),
            Arc::new(Config::default()),
        );
        engine
            .finalize("alice", "s-1", vec![pron_error("s-1", "/th/")])
            .await
            .unwrap();

        // Inside the window the record survives unrelated traffic
        clock.advance(Duration::hours(23));
        engine
            .report_error("alice", pron_error("s-2", "/d/"))
            .await
            .unwrap();
        assert_eq!(
            engine.session_phase("s-1").await,
            Some(SessionPhase::Dispatched)
        );

        // Past the window the next pass drops it
        clock.advance(Duration::hours(2));
        engine
            .report_error("alice", pron_error("s-3", "/v/"))
            .await
            .unwrap();
        assert_eq!(engine.session_phase("s-1").await, None);
    }

    #[tokio::test]
    async fn test_rejects_empty_error() {
        let (engine, _) = engine();
        let mut error = pron_error("s-1", "  ");
        error.related_item_id = None;
        assert!(engine.report_error("alice", error).await.is_err());
    }

    #[test]
    fn test_group_errors_key_by_related_item() {
        let mut a = grammar_error("s-1", "past tense");
        a.related_item_id = Some("g-1".to_string());
        let mut b = grammar_error("s-1", "simple past");
        b.related_item_id = Some("g-1".to_string());

        let groups = group_errors(&[a, b]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].key, "g-1");
    }
}
