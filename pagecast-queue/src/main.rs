//! pagecast-queue - Manage scheduled posts
//!
//! Unix-style tool for scheduling posts and managing the post queue.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libpagecast::db::{PostFilter, QueueStats};
use libpagecast::logging::LoggingConfig;
use libpagecast::scheduling::parse_schedule;
use libpagecast::service::posts::CancelOutcome;
use libpagecast::{PagecastError, PagecastService, Post, PostStatus, Result};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "pagecast-queue")]
#[command(version)]
#[command(about = "Manage scheduled posts")]
#[command(long_about = "\
pagecast-queue - Manage scheduled posts

DESCRIPTION:
    pagecast-queue is a Unix-style tool for managing the Pagecast post queue.
    Use it to schedule posts from an account's cadence or at a given time,
    and to list, inspect, cancel or reschedule them.

    Accounts are given by id or by email address.

COMMANDS:
    schedule    Schedule posts from the account's cadence or at a time
    list        List posts
    show        Show one post in full
    cancel      Cancel a scheduled post
    reschedule  Move a post to a different time
    stats       Show post counts per status

USAGE EXAMPLES:
    # Schedule the next posts of an account's cadence
    pagecast-queue schedule --account owner@example.com

    # Schedule one post at a given time
    pagecast-queue schedule --account owner@example.com --at \"tomorrow 3pm\"

    # List failed posts in JSON format
    pagecast-queue list --status failed --format json

    # Retry a failed post in two hours
    pagecast-queue reschedule <POST_ID> 2h

CONFIGURATION:
    Configuration file: ~/.config/pagecast/config.toml
    Database location: ~/.local/share/pagecast/pagecast.db

    Override with environment variables:
        PAGECAST_CONFIG    - Path to config file
        PAGECAST_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed (e.g. post already being generated)
    2 - Database or configuration error
    3 - Invalid input (bad post ID, time format, etc.)
    4 - Insufficient credits
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
    /// Schedule posts for an account
    Schedule {
        /// Account id or email
        #[arg(short, long)]
        account: String,

        /// Number of cadence posts to create (default from config)
        #[arg(short = 'n', long, conflicts_with = "at")]
        count: Option<u32>,

        /// Schedule a single post at this time (e.g. "tomorrow 3pm", "2h")
        #[arg(long)]
        at: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List posts in schedule order
    List {
        /// Only posts of this account (id or email)
        #[arg(short, long)]
        account: Option<String>,

        /// Only posts with this status
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of posts
        #[arg(short, long)]
        limit: Option<u32>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one post
    Show {
        post_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Cancel a scheduled post
    Cancel {
        /// Post ID to cancel
        post_id: String,
    },

    /// Reschedule a post
    Reschedule {
        /// Post ID to reschedule
        post_id: String,

        /// New schedule time (e.g., "tomorrow 3pm", "2h")
        time: String,
    },

    /// Show queue statistics
    Stats {
        /// Only posts of this account (id or email)
        #[arg(short, long)]
        account: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env_or("error", cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let service = PagecastService::new().await?;

    match cli.command {
        Commands::Schedule {
            account,
            count,
            at,
            format,
        } => cmd_schedule(&service, &account, count, at.as_deref(), &format).await,
        Commands::List {
            account,
            status,
            limit,
            format,
        } => cmd_list(&service, account.as_deref(), status.as_deref(), limit, &format).await,
        Commands::Show { post_id, format } => cmd_show(&service, &post_id, &format).await,
        Commands::Cancel { post_id } => cmd_cancel(&service, &post_id).await,
        Commands::Reschedule { post_id, time } => cmd_reschedule(&service, &post_id, &time).await,
        Commands::Stats { account, format } => {
            cmd_stats(&service, account.as_deref(), &format).await
        }
    }
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(PagecastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PagecastError::InvalidInput(format!("Failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

async fn resolve_account(service: &PagecastService, key: &str) -> Result<String> {
    Ok(service.accounts().find(key).await?.id)
}

/// Schedule cadence posts, or a single post with --at
async fn cmd_schedule(
    service: &PagecastService,
    account: &str,
    count: Option<u32>,
    at: Option<&str>,
    format: &str,
) -> Result<()> {
    validate_format(format)?;
    let account_id = resolve_account(service, account).await?;

    let posts = match at {
        Some(time) => {
            let at = parse_schedule(time)?;
            vec![service.posts().schedule_at(&account_id, at).await?]
        }
        None => service.posts().schedule_cadence(&account_id, count).await?,
    };
    debug!(account_id, created = posts.len(), "Scheduling done");

    if format == "json" {
        return print_json(&posts);
    }

    if posts.is_empty() {
        eprintln!("Every requested slot is already scheduled");
        return Ok(());
    }
    for post in &posts {
        println!("{} | {}", post.id, format_timestamp(post.scheduled_at));
    }
    Ok(())
}

/// List posts
async fn cmd_list(
    service: &PagecastService,
    account: Option<&str>,
    status: Option<&str>,
    limit: Option<u32>,
    format: &str,
) -> Result<()> {
    validate_format(format)?;

    let account_id = match account {
        Some(key) => Some(resolve_account(service, key).await?),
        None => None,
    };
    let status = status.map(str::parse::<PostStatus>).transpose()?;

    let posts = service
        .posts()
        .list(&PostFilter {
            account_id,
            status,
            limit,
        })
        .await?;

    if format == "json" {
        return print_json(&posts);
    }

    let now = Utc::now().timestamp();
    for post in &posts {
        let when = match post.status {
            PostStatus::Scheduled | PostStatus::Ready => format_time_until(now, post.scheduled_at),
            _ => format_timestamp(post.posted_at.unwrap_or(post.scheduled_at)),
        };
        let preview = post
            .caption
            .as_deref()
            .map(|c| truncate_content(c, 50))
            .unwrap_or_default();
        println!("{} | {} | {} | {}", post.id, post.status, when, preview);
    }
    Ok(())
}

/// Show one post
async fn cmd_show(service: &PagecastService, post_id: &str, format: &str) -> Result<()> {
    validate_format(format)?;
    let post = service.posts().get(post_id).await?;

    if format == "json" {
        return print_json(&post);
    }
    print_post(&post);
    Ok(())
}

fn print_post(post: &Post) {
    println!("ID:        {}", post.id);
    println!("Account:   {}", post.account_id);
    println!("Status:    {}", post.status);
    println!("Scheduled: {}", format_timestamp(post.scheduled_at));
    println!("Charged:   {} credits", post.credits_charged);
    if let Some(posted_at) = post.posted_at {
        println!("Posted:    {}", format_timestamp(posted_at));
    }
    if let Some(url) = &post.post_url {
        println!("URL:       {}", url);
    }
    if let Some(image) = &post.image {
        println!("Image:     {} ({}, {} bytes)", image.path, image.mime_type, image.size);
    }
    if let Some(kind) = &post.error_kind {
        println!(
            "Error:     {}: {}",
            kind,
            post.error_message.as_deref().unwrap_or("")
        );
    }
    if let Some(caption) = &post.caption {
        println!();
        println!("{}", caption);
    }
}

/// Cancel a scheduled post
async fn cmd_cancel(service: &PagecastService, post_id: &str) -> Result<()> {
    match service.posts().cancel(post_id).await? {
        CancelOutcome::Cancelled => println!("Cancelled post {}", post_id),
        CancelOutcome::AlreadyCancelled => println!("Post {} was already cancelled", post_id),
    }
    Ok(())
}

/// Reschedule a post
async fn cmd_reschedule(service: &PagecastService, post_id: &str, time: &str) -> Result<()> {
    let at = parse_schedule(time)?;
    let post = service.posts().reschedule(post_id, at).await?;
    println!(
        "Rescheduled post {} to {} ({})",
        post.id,
        format_timestamp(post.scheduled_at),
        post.status
    );
    Ok(())
}

/// Show queue statistics
async fn cmd_stats(service: &PagecastService, account: Option<&str>, format: &str) -> Result<()> {
    validate_format(format)?;
    let account_id = match account {
        Some(key) => Some(resolve_account(service, key).await?),
        None => None,
    };
    let stats = service.posts().stats(account_id.as_deref()).await?;

    if format == "json" {
        return print_json(&stats);
    }
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &QueueStats) {
    println!("Total posts: {}", stats.total());
    for status in PostStatus::ALL {
        let count = stats.count(status);
        if count > 0 {
            println!("  {:<10} {}", status.as_str(), count);
        }
    }
    if let Some(next_due) = stats.next_due {
        println!(
            "Next due: {} ({})",
            format_timestamp(next_due),
            format_time_until(Utc::now().timestamp(), next_due)
        );
    }
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Truncate content to max characters with ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    let line = content.lines().next().unwrap_or("");
    if line.chars().count() <= max_chars && line.len() == content.len() {
        line.to_string()
    } else {
        format!("{}...", line.chars().take(max_chars).collect::<String>())
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;

    if diff < 0 {
        return "overdue".to_string();
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
