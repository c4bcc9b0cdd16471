//! Configuration management
//!
//! All tunable engine knobs live here: SM-2 constants, trigger thresholds,
//! per-pillar time costs, session caps, lock budgets, and storage paths.
//! Loaded from `config.toml` under the platform config directory, with
//! every field defaulting to the documented production value.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::Pillar;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Spaced repetition constants and trigger thresholds
    #[serde(default)]
    pub srs: SrsConfig,
    /// Daily schedule construction settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Conversation error integration settings
    #[serde(default)]
    pub integration: IntegrationConfig,
    /// Per-learner locking budget
    #[serde(default)]
    pub service: ServiceConfig,
    /// Storage locations
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Spaced repetition constants and the thresholds feeding review triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsConfig {
    /// Interval after the first successful review, in days
    #[serde(default = "default_initial_interval_days")]
    pub initial_interval_days: u32,
    /// Interval after the second successful review, in days
    #[serde(default = "default_second_interval_days")]
    pub second_interval_days: u32,
    /// Ceiling any review interval is clamped to, in days
    #[serde(default = "default_max_interval_days")]
    pub max_interval_days: u32,
    /// Ease factor assigned to brand new items
    #[serde(default = "default_initial_ease_factor")]
    pub initial_ease_factor: f64,
    /// Floor the ease factor can never drop below
    #[serde(default = "default_min_ease_factor")]
    pub min_ease_factor: f64,
    /// Mean accuracy below this percentage marks an item low accuracy
    #[serde(default = "default_low_accuracy_threshold")]
    pub low_accuracy_threshold: f64,
    /// Days without use before an item counts as low frequency
    #[serde(default = "default_low_frequency_window_days")]
    pub low_frequency_window_days: i64,
    /// Attempts kept in the per-item accuracy ring
    #[serde(default = "default_accuracy_history_len")]
    pub accuracy_history_len: usize,
    /// Minimum interval for mastery, in days
    #[serde(default = "default_mastery_min_interval_days")]
    pub mastery_min_interval_days: u32,
    /// Consecutive correct attempts required for mastery
    #[serde(default = "default_mastery_streak")]
    pub mastery_streak: usize,
    /// Expected response latency used by the quality fallback, in ms
    #[serde(default = "default_expected_response_ms")]
    pub expected_response_ms: u32,
}

fn default_initial_interval_days() -> u32 {
    1
}

fn default_second_interval_days() -> u32 {
    6
}

fn default_max_interval_days() -> u32 {
    // A century of days, the customary SRS ceiling
    36500
}

fn default_initial_ease_factor() -> f64 {
    2.5
}

fn default_min_ease_factor() -> f64 {
    1.3
}

fn default_low_accuracy_threshold() -> f64 {
    80.0
}

fn default_low_frequency_window_days() -> i64 {
    7
}

fn default_accuracy_history_len() -> usize {
    10
}

fn default_mastery_min_interval_days() -> u32 {
    21
}

fn default_mastery_streak() -> usize {
    3
}

fn default_expected_response_ms() -> u32 {
    5000
}

impl Default for SrsConfig {
    fn default() -> Self {
        Self {
            initial_interval_days: default_initial_interval_days(),
            second_interval_days: default_second_interval_days(),
            max_interval_days: default_max_interval_days(),
            initial_ease_factor: default_initial_ease_factor(),
            min_ease_factor: default_min_ease_factor(),
            low_accuracy_threshold: default_low_accuracy_threshold(),
            low_frequency_window_days: default_low_frequency_window_days(),
            accuracy_history_len: default_accuracy_history_len(),
            mastery_min_interval_days: default_mastery_min_interval_days(),
            mastery_streak: default_mastery_streak(),
            expected_response_ms: default_expected_response_ms(),
        }
    }
}

/// Daily schedule construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Estimated minutes for one vocabulary review
    #[serde(default = "default_vocabulary_minutes")]
    pub vocabulary_minutes: u32,
    /// Estimated minutes for one grammar review
    #[serde(default = "default_grammar_minutes")]
    pub grammar_minutes: u32,
    /// Estimated minutes for one pronunciation review
    #[serde(default = "default_pronunciation_minutes")]
    pub pronunciation_minutes: u32,
    /// Estimated minutes for one speaking session
    #[serde(default = "default_speaking_minutes")]
    pub speaking_minutes: u32,
    /// Goal minutes assigned to learners without an explicit goal
    #[serde(default = "default_daily_goal_minutes")]
    pub default_daily_goal_minutes: u32,
    /// Cron expression for the nightly schedule sweep
    #[serde(default = "default_sweep_cron")]
    pub sweep_cron: String,
    /// Learners processed concurrently during the sweep
    #[serde(default = "default_sweep_concurrency")]
    pub sweep_concurrency: usize,
}

fn default_vocabulary_minutes() -> u32 {
    2
}

fn default_grammar_minutes() -> u32 {
    4
}

fn default_pronunciation_minutes() -> u32 {
    3
}

fn default_speaking_minutes() -> u32 {
    10
}

fn default_daily_goal_minutes() -> u32 {
    30
}

fn default_sweep_cron() -> String {
    // Every day at 03:00 UTC
    "0 0 3 * * *".to_string()
}

fn default_sweep_concurrency() -> usize {
    8
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            vocabulary_minutes: default_vocabulary_minutes(),
            grammar_minutes: default_grammar_minutes(),
            pronunciation_minutes: default_pronunciation_minutes(),
            speaking_minutes: default_speaking_minutes(),
            default_daily_goal_minutes: default_daily_goal_minutes(),
            sweep_cron: default_sweep_cron(),
            sweep_concurrency: default_sweep_concurrency(),
        }
    }
}

impl ScheduleConfig {
    /// Estimated minutes for one activity in the given pillar.
    pub fn minutes_for(&self, pillar: Pillar) -> u32 {
        match pillar {
            Pillar::Vocabulary => self.vocabulary_minutes,
            Pillar::Grammar => self.grammar_minutes,
            Pillar::Pronunciation => self.pronunciation_minutes,
            Pillar::Speaking => self.speaking_minutes,
        }
    }
}

/// Conversation error integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Cap on corrective activities filed from one session
    #[serde(default = "default_max_activities_per_session")]
    pub max_activities_per_session: usize,
    /// Hours a dispatched session is remembered for idempotent replays
    #[serde(default = "default_session_retention_hours")]
    pub session_retention_hours: u32,
}

fn default_max_activities_per_session() -> usize {
    10
}

fn default_session_retention_hours() -> u32 {
    24
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            max_activities_per_session: default_max_activities_per_session(),
            session_retention_hours: default_session_retention_hours(),
        }
    }
}

/// Per-learner write lock budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Milliseconds to wait for the learner lock on each attempt
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Retries after the first failed lock attempt
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    /// Base delay between lock retries, doubled each attempt plus jitter
    #[serde(default = "default_lock_retry_base_ms")]
    pub lock_retry_base_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    2000
}

fn default_lock_retries() -> u32 {
    3
}

fn default_lock_retry_base_ms() -> u64 {
    50
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_retries: default_lock_retries(),
            lock_retry_base_ms: default_lock_retry_base_ms(),
        }
    }
}

/// Storage locations. Paths default to the platform data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path. Defaults to `<data dir>/fluenta.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Catalog JSON file loaded by the CLI
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the database path, falling back to the platform data dir.
    pub fn resolve_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("fluenta.db")),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "fluenta", "fluenta")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "fluenta", "fluenta")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
