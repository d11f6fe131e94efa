//! omni-queue - Manage the schedule queue
//!
//! Lists, cancels, reschedules, and force-publishes scheduled content.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libomnipost::adapters::AdapterSet;
use libomnipost::scheduling::parse_publish_at;
use libomnipost::{
    Config, ContentStatus, Database, Dispatcher, FileCredentialProvider, OmnipostError, Result,
    Schedule,
};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "omni-queue")]
#[command(version)]
#[command(about = "Manage the schedule queue")]
#[command(long_about = "\
omni-queue - Manage the schedule queue

DESCRIPTION:
    omni-queue inspects and edits the queue of scheduled content. Use it to
    list what is pending, cancel or move a schedule, publish something ahead
    of its slot, or view aggregate counts.

COMMANDS:
    list        List pending schedules
    cancel      Cancel a schedule and return the content to draft
    reschedule  Move a schedule to a new time
    now         Publish scheduled content immediately
    stats       Show queue statistics

USAGE EXAMPLES:
    # List pending schedules
    omni-queue list
    omni-queue list --format json

    # Cancel a schedule
    omni-queue cancel <CONTENT_ID>

    # Move a schedule
    omni-queue reschedule <CONTENT_ID> 2h
    omni-queue reschedule <CONTENT_ID> 2026-09-01T15:00:00Z

    # Publish right now, ahead of the slot
    omni-queue now <CONTENT_ID>

    # Aggregate counts
    omni-queue stats

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Credential error
    3 - Invalid input (bad content ID, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List pending schedules
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Maximum entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Cancel a schedule
    Cancel {
        /// Content ID whose schedule to cancel
        content_id: String,
    },

    /// Move a schedule to a new time
    Reschedule {
        /// Content ID whose schedule to move
        content_id: String,

        /// New publish time ("now", "2h", RFC 3339)
        time: String,
    },

    /// Publish scheduled content immediately
    Now {
        /// Content ID to publish
        content_id: String,
    },

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Commands::List { format, limit } => cmd_list(&db, &format, limit).await,
        Commands::Cancel { content_id } => cmd_cancel(&db, &content_id).await,
        Commands::Reschedule { content_id, time } => {
            cmd_reschedule(&db, &content_id, &time).await
        }
        Commands::Now { content_id } => cmd_now(&db, &config, &content_id).await,
        Commands::Stats { format } => cmd_stats(&db, &format).await,
    }
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(OmnipostError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

/// List pending schedules
async fn cmd_list(db: &Database, format: &str, limit: Option<usize>) -> Result<()> {
    validate_format(format)?;

    let mut schedules = db.list_schedules().await?;
    if let Some(limit) = limit {
        schedules.truncate(limit);
    }

    if format == "json" {
        output_list_json(db, &schedules).await?;
    } else {
        output_list_text(db, &schedules).await?;
    }

    Ok(())
}

async fn output_list_json(db: &Database, schedules: &[Schedule]) -> Result<()> {
    let mut entries = Vec::new();
    for schedule in schedules {
        let content = db.get_content(&schedule.content_id).await?;
        entries.push(serde_json::json!({
            "content_id": schedule.content_id,
            "publish_at": schedule.publish_at,
            "display_timezone": schedule.display_timezone,
            "body_preview": content.map(|c| preview(&c.body, 50)),
        }));
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&entries)
            .map_err(|e| OmnipostError::InvalidInput(e.to_string()))?
    );
    Ok(())
}

async fn output_list_text(db: &Database, schedules: &[Schedule]) -> Result<()> {
    let now = Utc::now().timestamp();

    for schedule in schedules {
        let body_preview = match db.get_content(&schedule.content_id).await? {
            Some(content) => preview(&content.body, 50),
            None => "(missing content)".to_string(),
        };
        let when = DateTime::from_timestamp(schedule.publish_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| schedule.publish_at.to_string());

        println!(
            "{} | {} | {} | {}",
            schedule.content_id,
            when,
            format_time_until(now, schedule.publish_at),
            body_preview
        );
    }

    Ok(())
}

/// Truncate a body to a single-line preview
fn preview(body: &str, max_chars: usize) -> String {
    let one_line = body.replace('\n', " ");
    let mut chars = one_line.char_indices();
    match chars.nth(max_chars) {
        Some((idx, _)) => format!("{}...", &one_line[..idx]),
        None => one_line,
    }
}

/// Human-readable time until a publish instant
fn format_time_until(now: i64, publish_at: i64) -> String {
    let diff = publish_at - now;
    if diff <= 0 {
        return "due".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

/// Cancel a schedule, returning the content item to draft
async fn cmd_cancel(db: &Database, content_id: &str) -> Result<()> {
    db.get_schedule(content_id)
        .await?
        .ok_or_else(|| OmnipostError::NotFound(format!("No schedule for content {}", content_id)))?;

    db.delete_schedule(content_id).await?;
    db.set_content_status(content_id, ContentStatus::Draft)
        .await?;

    println!("Cancelled schedule for {}", content_id);
    Ok(())
}

/// Move a schedule to a new time
async fn cmd_reschedule(db: &Database, content_id: &str, time: &str) -> Result<()> {
    let publish_at = parse_publish_at(time, Utc::now())?;
    db.update_schedule_time(content_id, publish_at.timestamp())
        .await?;

    println!("Rescheduled {} to {}", content_id, publish_at.to_rfc3339());
    Ok(())
}

/// Publish scheduled content immediately, ahead of its slot
async fn cmd_now(db: &Database, config: &Config, content_id: &str) -> Result<()> {
    let credentials = Arc::new(FileCredentialProvider::load(&config.credentials.path)?);
    let dispatcher = Dispatcher::new(
        db.clone(),
        credentials,
        AdapterSet::from_config(config)?,
    );

    let results = dispatcher.publish_content(content_id).await?;

    // Same finalization the scanner applies: the slot is consumed either way
    db.set_content_status(content_id, ContentStatus::Published)
        .await?;
    db.delete_schedule(content_id).await?;

    let mut failures = 0;
    for result in &results {
        match &result.outcome {
            Ok(report) => {
                println!("{}: published {}", result.network, report.external_id);
            }
            Err(err) => {
                failures += 1;
                println!("{}: FAILED ({})", result.network, err);
            }
        }
    }

    if failures > 0 {
        return Err(OmnipostError::InvalidInput(format!(
            "{} of {} variant(s) failed to publish",
            failures,
            results.len()
        )));
    }

    Ok(())
}

/// Show queue statistics
async fn cmd_stats(db: &Database, format: &str) -> Result<()> {
    validate_format(format)?;

    let stats = db.queue_stats(Utc::now().timestamp()).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats)
                .map_err(|e| OmnipostError::InvalidInput(e.to_string()))?
        );
    } else {
        println!("Scheduled: {}", stats.scheduled);
        println!("Due now:   {}", stats.due_now);
        println!("Published: {}", stats.published);
        println!("Drafts:    {}", stats.drafts);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_body_unchanged() {
        assert_eq!(preview("hello", 50), "hello");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let body = "é".repeat(60);
        let p = preview(&body, 50);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 53);
    }

    #[test]
    fn test_preview_flattens_newlines() {
        assert_eq!(preview("a\nb", 50), "a b");
    }

    #[test]
    fn test_format_time_until() {
        assert_eq!(format_time_until(100, 50), "due");
        assert_eq!(format_time_until(100, 100), "due");
        assert_eq!(format_time_until(0, 30), "in <1 minute");
        assert_eq!(format_time_until(0, 120), "in 2 minutes");
        assert_eq!(format_time_until(0, 3600), "in 1 hour");
        assert_eq!(format_time_until(0, 2 * 24 * 3600), "in 2 days");
    }

    #[test]
    fn test_validate_format() {
        assert!(validate_format("text").is_ok());
        assert!(validate_format("json").is_ok());
        assert!(validate_format("yaml").is_err());
    }
}
