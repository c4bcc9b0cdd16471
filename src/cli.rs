//! CLI interface for fluenta

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::catalog::{Item, ItemContent, MemoryCatalog};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::integration::{DetectedError, ErrorKind};
use crate::progress::AttemptOutcome;
use crate::schedule::{run_sweep, run_sweep_daemon, DailySchedule};
use crate::service::{LearningService, NextActivity, OverallProgress};
use crate::storage::SqliteStore;
use crate::types::Pillar;

#[derive(Parser)]
#[command(name = "fluenta")]
#[command(about = "Review scheduler and error integration for four-pillar language practice", long_about = None)]
#[command(version)]
struct Cli {
    /// Catalog JSON file (defaults to storage.catalog_path in config)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// SQLite database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's schedule for a learner
    Today {
        /// Learner identifier
        learner: String,
    },
    /// Record one practice attempt
    Record {
        /// Learner identifier
        learner: String,
        /// Catalog item id
        item: String,
        /// Mark the attempt as failed
        #[arg(long)]
        incorrect: bool,
        /// Accuracy percentage 0-100
        #[arg(short, long)]
        accuracy: Option<f64>,
        /// Response latency in milliseconds
        #[arg(long)]
        response_ms: Option<u32>,
    },
    /// Close a conversation session and file corrective activities
    Finalize {
        /// Learner identifier
        learner: String,
        /// Conversation session id
        session: String,
        /// JSON file with the session's detected errors
        #[arg(short, long)]
        errors: Option<PathBuf>,
    },
    /// Show the next thing to work on
    Next {
        /// Learner identifier
        learner: String,
    },
    /// Show cross-pillar progress and streaks
    Progress {
        /// Learner identifier
        learner: String,
    },
    /// List pending corrective activities
    Activities {
        /// Learner identifier
        learner: String,
        /// Filter by pillar
        #[arg(short, long)]
        pillar: Option<Pillar>,
        /// Show counts instead of the pending list
        #[arg(long)]
        stats: bool,
    },
    /// Mark a corrective activity completed
    CompleteActivity {
        /// Learner identifier
        learner: String,
        /// Activity id
        id: String,
    },
    /// Rebuild schedules for every known learner
    Sweep {
        /// Keep running, firing on the configured cron schedule
        #[arg(short, long)]
        daemon: bool,
    },
    /// Show the active configuration
    Config {
        /// Write the current configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    if let Commands::Config { init } = &cli.command {
        return show_config(&config, *init);
    }

    let service = build_service(&cli, config).await?;

    match cli.command {
        Commands::Today { learner } => {
            let schedule = service.today_schedule(&learner).await?;
            print_schedule(&schedule);
        }
        Commands::Record {
            learner,
            item,
            incorrect,
            accuracy,
            response_ms,
        } => {
            let outcome = AttemptOutcome {
                correct: !incorrect,
                accuracy,
                response_time_ms: response_ms,
            };
            let update = service.record_progress(&learner, &item, &outcome).await?;
            println!(
                "Recorded {} for {} (quality {})",
                update.item_id, learner, update.quality
            );
            println!(
                "  Interval: {} day(s), next review {}",
                update.interval_days,
                update.next_review.format("%Y-%m-%d %H:%M")
            );
            println!(
                "  Mastery: {}  Streak: {} day(s)",
                update.mastery, update.updated_streak
            );
        }
        Commands::Finalize {
            learner,
            session,
            errors,
        } => {
            let trailing = match errors {
                Some(path) => read_errors_file(&path, &session)?,
                None => Vec::new(),
            };
            let outcome = service
                .finalize_conversation(&learner, &session, trailing)
                .await?;
            println!("{}", outcome.summary);
            if !outcome.corrective_activities.is_empty() {
                println!();
                for activity in &outcome.corrective_activities {
                    println!(
                        "  {} [{}] {} (seen {}x)",
                        activity.id,
                        activity.target_pillar,
                        activity.title,
                        activity.occurrence_count
                    );
                }
            }
        }
        Commands::Next { learner } => match service.next_activity(&learner).await? {
            Some(NextActivity::Corrective(activity)) => {
                println!("Corrective practice: {}", activity.title);
                println!(
                    "  {} ({}, seen {}x, from session {})",
                    activity.id,
                    activity.target_pillar,
                    activity.occurrence_count,
                    activity.origin_session_id
                );
            }
            Some(NextActivity::Review(trigger)) => {
                println!("Review {} ({})", trigger.item_id, trigger.pillar);
                println!(
                    "  reason: {}  priority: {}",
                    trigger.reason, trigger.priority
                );
            }
            Some(NextActivity::NewItem(item)) => {
                println!("New item {} ({})", item.id, item.pillar);
                println!("  {}", describe_item(&item));
            }
            None => {
                println!("Nothing to practice. Add catalog content or wait for reviews to come due.");
            }
        },
        Commands::Progress { learner } => {
            let progress = service.overall_progress(&learner).await?;
            print_progress(&progress);
        }
        Commands::Activities {
            learner,
            pillar,
            stats,
        } => {
            if stats {
                print_activity_stats(&service, &learner).await?;
            } else {
                let pending = service.pending_activities(&learner, pillar).await?;
                if pending.is_empty() {
                    println!("No pending corrective activities.");
                } else {
                    println!("{} pending corrective activities:", pending.len());
                    for activity in &pending {
                        println!(
                            "  {} [{}] {} (seen {}x, from session {})",
                            activity.id,
                            activity.target_pillar,
                            activity.title,
                            activity.occurrence_count,
                            activity.origin_session_id
                        );
                    }
                }
            }
        }
        Commands::CompleteActivity { learner, id } => {
            let activity = service.complete_activity(&learner, &id).await?;
            println!("Completed: {}", activity.title);
        }
        Commands::Sweep { daemon } => {
            let concurrency = service.config().schedule.sweep_concurrency;
            if daemon {
                let expr = service.config().schedule.sweep_cron.clone();
                let schedule = cron::Schedule::from_str(&expr)
                    .with_context(|| format!("Invalid sweep cron expression '{}'", expr))?;
                println!("Sweep daemon running on '{}'. Ctrl+C to stop.", expr);
                run_sweep_daemon(&service, &schedule, concurrency).await;
            } else {
                let report = run_sweep(&service, concurrency).await?;
                println!(
                    "Swept {} learner(s): {} schedules built, {} reviews scheduled, {} failed",
                    report.learners, report.schedules_built, report.reviews_scheduled, report.failed
                );
            }
        }
        Commands::Config { .. } => unreachable!("handled before service construction"),
    }

    Ok(())
}

/// Assemble the service from the catalog file and SQLite store.
async fn build_service(cli: &Cli, config: Config) -> Result<LearningService> {
    let catalog_path = cli
        .catalog
        .clone()
        .or_else(|| config.storage.catalog_path.clone());
    let catalog = match catalog_path {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
            MemoryCatalog::from_json_str(&json)
                .with_context(|| format!("Failed to parse catalog file {}", path.display()))?
        }
        None => {
            eprintln!("No catalog configured; starting empty.");
            eprintln!("Pass --catalog <file.json> or set storage.catalog_path in config.");
            MemoryCatalog::new()
        }
    };

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => config.storage.resolve_database_path()?,
    };
    let store = Arc::new(
        SqliteStore::new(&db_path)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );

    Ok(LearningService::new(
        Arc::new(catalog),
        store.clone(),
        store,
        Arc::new(SystemClock),
        config,
    ))
}

/// One entry in a `--errors` file. The session id may be omitted; the
/// subcommand's session argument fills it in.
#[derive(Deserialize)]
struct ErrorFileEntry {
    #[serde(default)]
    session_id: String,
    kind: ErrorKind,
    #[serde(default)]
    source_text: String,
    #[serde(default)]
    expected: String,
    #[serde(default)]
    observed: String,
    #[serde(default)]
    related_item_id: Option<String>,
}

/// Load detected errors from a JSON array file.
fn read_errors_file(path: &Path, session_id: &str) -> Result<Vec<DetectedError>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read errors file {}", path.display()))?;
    let entries: Vec<ErrorFileEntry> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse errors file {}", path.display()))?;
    Ok(entries
        .into_iter()
        .map(|entry| DetectedError {
            session_id: if entry.session_id.is_empty() {
                session_id.to_string()
            } else {
                entry.session_id
            },
            kind: entry.kind,
            source_text: entry.source_text,
            expected: entry.expected,
            observed: entry.observed,
            related_item_id: entry.related_item_id,
        })
        .collect())
}

/// Print a daily schedule
fn print_schedule(schedule: &DailySchedule) {
    println!(
        "Schedule for {} on {}",
        schedule.learner_id, schedule.date
    );
    println!("========================================");
    let goal = &schedule.daily_goal_progress;
    println!(
        "Goal: {}/{} min studied, {} activities completed",
        goal.minutes_studied, goal.goal_minutes, goal.activities_completed
    );

    if schedule.scheduled_reviews.is_empty() {
        println!();
        println!("Nothing scheduled.");
    } else {
        println!();
        for review in &schedule.scheduled_reviews {
            println!(
                "  {:>2} min  [{}] {} ({}, {})",
                review.estimated_minutes, review.priority, review.item_id, review.pillar,
                review.reason
            );
        }
    }

    if !schedule.completed_reviews.is_empty() {
        println!();
        println!("Completed today:");
        for done in &schedule.completed_reviews {
            println!("  {} ({}, {} min)", done.item_id, done.pillar, done.minutes);
        }
    }
}

/// Print the cross-pillar progress snapshot
fn print_progress(progress: &OverallProgress) {
    println!("Progress for {}", progress.learner_id);
    println!("========================================");
    println!(
        "Streak: {} day(s), best {}  Total study: {} min",
        progress.current_streak_days, progress.longest_streak_days, progress.total_study_minutes
    );
    println!();
    for summary in &progress.pillars {
        let accuracy = summary
            .mean_accuracy
            .map(|a| format!("{:.0}%", a))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<13} {:>3} items: {} mastered, {} learning, {} due, {} low accuracy, mean {}",
            summary.pillar.as_str(),
            summary.total,
            summary.mastered,
            summary.learning,
            summary.due_now,
            summary.low_accuracy,
            accuracy
        );
    }
    if let Some(pillar) = progress.weakest_pillar {
        println!();
        println!("Weakest pillar: {}", pillar);
    }
}

/// Print corrective activity counts
async fn print_activity_stats(service: &LearningService, learner: &str) -> Result<()> {
    let stats = service.activity_statistics(learner).await?;
    println!("Corrective activities for {}", learner);
    println!("========================================");
    println!(
        "Total: {}  Pending: {}  Completed: {}",
        stats.total, stats.pending, stats.completed
    );

    let mut by_pillar: Vec<_> = stats.by_pillar.iter().collect();
    by_pillar.sort_by_key(|(pillar, _)| pillar.as_str());
    for (pillar, count) in by_pillar {
        println!("  {}: {}", pillar, count);
    }

    if !stats.top_keys.is_empty() {
        println!();
        println!("Most frequent errors:");
        for (key, count) in &stats.top_keys {
            println!("  {}x {}", count, key);
        }
    }
    Ok(())
}

/// One-line description of a catalog item
fn describe_item(item: &Item) -> String {
    match &item.content {
        ItemContent::Word { text, definition } => format!("{}: {}", text, definition),
        ItemContent::Rule { name, summary } => format!("{}: {}", name, summary),
        ItemContent::Phoneme { symbol, example } => format!("{} as in \"{}\"", symbol, example),
    }
}

/// Show or initialize the configuration file
fn show_config(config: &Config, init: bool) -> Result<()> {
    if init {
        config.save()?;
        println!(
            "Configuration written to {}",
            crate::config::config_path()?.display()
        );
    } else {
        println!("Config file: {}", crate::config::config_path()?.display());
        println!();
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}
