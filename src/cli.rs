//! Command-line surface.
//!
//! Flags shared by every command override `settings.json` and the `CARTCHECK_*`
//! environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use tokio::time::{self, Duration, Instant};

use crate::{
    db::{Database, EmergencyEvent},
    protocols::PROTOCOLS,
    session::{Collaborators, SessionController, SessionSnapshot, SessionStatus},
    settings::{DetectionMode, MergePolicy, Settings, SettingsStore},
};

const DB_FILE_NAME: &str = "cartcheck.sqlite3";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Crash-cart equipment verification.
#[derive(Debug, Parser)]
#[command(name = "cartcheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the event log and settings.json
    #[arg(long, global = true, env = "CARTCHECK_DATA_DIR", default_value = "cartcheck-data")]
    pub data_dir: PathBuf,

    /// Use the HTTP detection backend instead of the simulator
    #[arg(long, global = true)]
    pub live: bool,

    /// Detection backend base URL
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Polling interval in milliseconds
    #[arg(long, global = true)]
    pub interval_ms: Option<u64>,

    /// Image file sent as the camera frame on every round
    #[arg(long, global = true)]
    pub frame: Option<PathBuf>,

    /// Keep detections until they go stale instead of replacing them each round
    #[arg(long, global = true)]
    pub sticky: bool,

    /// Seed for the detection simulator
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify the equipment for one procedure until stopped
    Watch(WatchArgs),

    /// List the built-in emergency protocols
    Protocols,

    /// Show recent sessions
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Summarise the event log
    Stats,

    /// Print events in a time range as JSON
    Export {
        /// RFC 3339 start of the range
        #[arg(long)]
        since: DateTime<Utc>,
        /// RFC 3339 end of the range
        #[arg(long)]
        until: DateTime<Utc>,
    },

    /// Delete finished events older than the retention window
    Prune {
        #[arg(long)]
        days: Option<u32>,
    },

    /// Print the effective settings as JSON
    Config {
        /// Write the settings file with this invocation's flags applied
        #[arg(long)]
        save: bool,
    },
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Procedure name, e.g. "Code Blue"
    #[arg(long, short)]
    pub procedure: String,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// Stop as soon as every required item is seen
    #[arg(long)]
    pub until_complete: bool,
}

impl Cli {
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if self.live {
            settings.mode = DetectionMode::Live;
        }
        if let Some(url) = &self.backend_url {
            settings.backend_url = url.clone();
        }
        if let Some(interval) = self.interval_ms {
            settings.poll_interval_ms = Some(interval);
        }
        if let Some(frame) = &self.frame {
            settings.frame_path = Some(frame.clone());
        }
        if self.sticky {
            settings.merge_policy = MergePolicy::Sticky;
        }
        if let Some(seed) = self.seed {
            settings.simulation_seed = Some(seed);
        }
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let store = SettingsStore::new(cli.data_dir.join(SETTINGS_FILE_NAME))?;
    let mut stored = store.settings();
    cli.apply_overrides(&mut stored);
    let mut settings = stored.clone();
    settings.apply_env();
    cli.apply_overrides(&mut settings);

    let db = Database::new(cli.data_dir.join(DB_FILE_NAME))?;
    recover_interrupted_events(&db).await?;

    match cli.command {
        Commands::Watch(args) => watch(db, &settings, args).await,
        Commands::Protocols => {
            print_protocols();
            Ok(())
        }
        Commands::History { limit } => {
            for event in db.list_events(limit).await? {
                println!("{}", format_event(&event));
            }
            Ok(())
        }
        Commands::Stats => {
            let analytics = db.get_analytics().await?;
            println!("events:        {}", analytics.total_events);
            println!("successful:    {}", analytics.successful_events);
            println!("success rate:  {:.1}%", analytics.success_rate);
            println!("avg duration:  {}s", analytics.avg_duration_secs);
            for entry in analytics.events_by_type {
                println!("  {:<12} {}", entry.event_type, entry.count);
            }
            Ok(())
        }
        Commands::Export { since, until } => {
            let events = db.export_events(since, until).await?;
            println!("{}", serde_json::to_string_pretty(&events)?);
            Ok(())
        }
        Commands::Prune { days } => {
            let days = days.unwrap_or(settings.retention_days);
            let removed = db.clear_old_events(days).await?;
            println!("removed {removed} events older than {days} days");
            Ok(())
        }
        Commands::Config { save } => {
            if save {
                store.update(stored)?;
                info!("Saved settings to {}", store.path().display());
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

/// Sessions still marked running belong to a process that exited without ending them.
async fn recover_interrupted_events(db: &Database) -> Result<()> {
    let now = Utc::now();
    for event in db.get_incomplete_events().await? {
        let Some(event_id) = event.id else {
            continue;
        };
        warn!(
            "Recovered incomplete session {}; marking as Interrupted",
            event.session_id
        );
        db.mark_event_interrupted(event_id, now).await?;
    }
    Ok(())
}

async fn watch(db: Database, settings: &Settings, args: WatchArgs) -> Result<()> {
    let collaborators =
        Collaborators::from_settings(settings).context("failed to set up detection")?;
    let controller = SessionController::new(db, settings, collaborators);
    let mut updates = controller.subscribe();

    let started = controller.start_session(&args.procedure).await?;
    print_snapshot(&started);
    let mut last_printed = started;

    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        let stop_at = async {
            match deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.status != SessionStatus::Polling {
                    continue;
                }
                if snapshot.report != last_printed.report || snapshot.overdue != last_printed.overdue {
                    print_snapshot(&snapshot);
                }
                let complete = snapshot.report.is_complete();
                last_printed = snapshot;
                if args.until_complete && complete {
                    info!("All required equipment detected");
                    break;
                }
            }
            _ = stop_at => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; ending session");
                break;
            }
        }
    }

    let event = controller.end_session().await?;
    println!("{}", format_event(&event));
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    let report = &snapshot.report;
    println!(
        "[{}] {}% ({}/{}){}",
        snapshot.procedure.as_deref().unwrap_or("-"),
        report.completion_percentage,
        report.satisfied_count,
        report.total_required,
        if snapshot.overdue { " OVERDUE" } else { "" }
    );
    for entry in &report.entries {
        let mark = match &entry.matched_by {
            Some(detected) => format!("ok  ({detected})"),
            None => "--".to_string(),
        };
        println!("  {:<8} {:<28} {}", entry.priority.as_str(), entry.name, mark);
    }
    if !report.extras.is_empty() {
        println!("  also seen: {}", report.extras.join(", "));
    }
}

fn print_protocols() {
    for protocol in PROTOCOLS {
        println!(
            "{} ({}): {} [{}s]",
            protocol.code, protocol.location, protocol.description, protocol.timeout_secs
        );
        for item in protocol.equipment {
            println!("  {:<8} {}", item.priority.as_str(), item.name);
        }
    }
}

fn format_event(event: &EmergencyEvent) -> String {
    let duration = event
        .duration_secs
        .map(|secs| format!("{secs}s"))
        .unwrap_or_else(|| "-".to_string());
    let missing = if event.missing_equipment.is_empty() {
        String::new()
    } else {
        format!(" missing: {}", event.missing_equipment.join(", "))
    };
    format!(
        "{} {:<10} {:<11} {:>3}% {:>6}{}",
        event.start_time.format("%Y-%m-%d %H:%M:%S"),
        event.event_type,
        event.status.as_str(),
        event.completion_percent,
        duration,
        missing
    )
}
