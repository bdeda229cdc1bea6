//! pagecast-account - Manage Pagecast accounts
//!
//! Creates accounts, connects their Facebook page and edits the posting
//! profile the content generators write from.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libpagecast::db::ProfileUpdate;
use libpagecast::logging::LoggingConfig;
use libpagecast::scheduling::parse_schedule;
use libpagecast::service::accounts::PageConnection;
use libpagecast::types::Recurrence;
use libpagecast::{Account, PagecastError, PagecastService, Result};

#[derive(Parser, Debug)]
#[command(name = "pagecast-account")]
#[command(version)]
#[command(about = "Create accounts, connect pages and edit posting profiles")]
#[command(long_about = "\
pagecast-account - Manage Pagecast accounts

DESCRIPTION:
    An account owns one Facebook page, a credit balance and a posting
    profile: what the business does, the tone of its posts and how often
    they go out. New accounts receive trial credits.

    Accounts are given by id or by email address.

COMMANDS:
    create        Create an account
    show          Show an account
    list          List accounts
    connect-page  Attach a page and its access token
    profile       Edit the posting profile
    onboard       Finish onboarding so posts can be scheduled

USAGE EXAMPLES:
    pagecast-account create owner@example.com --name \"Corner Bakery\"

    pagecast-account profile owner@example.com \\
        --summary \"Sourdough bakery in the old town\" \\
        --style \"Warm, short, one emoji\" \\
        --recurrence weekly --time 09:30 --utc-offset 60

    PAGECAST_PAGE_TOKEN=EAAB... pagecast-account connect-page owner@example.com \\
        --page-id 1234567890 --page-name \"Corner Bakery\"

    pagecast-account onboard owner@example.com

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (unknown account, bad time, etc.)
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
    /// Create an account with trial credits
    Create {
        email: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Show an account
    Show {
        /// Account id or email
        account: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List accounts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Attach a page and its access token
    ConnectPage {
        /// Account id or email
        account: String,

        #[arg(long)]
        page_id: String,

        #[arg(long)]
        page_name: Option<String>,

        /// Page access token
        #[arg(long, env = "PAGECAST_PAGE_TOKEN", hide_env_values = true)]
        token: String,

        /// When the token expires (e.g. "60d", "2026-01-31T00:00:00Z")
        #[arg(long)]
        expires: Option<String>,
    },

    /// Edit the posting profile
    Profile {
        /// Account id or email
        account: String,

        #[arg(long)]
        name: Option<String>,

        /// What the business does
        #[arg(long)]
        summary: Option<String>,

        /// Tone and style of the posts
        #[arg(long)]
        style: Option<String>,

        /// daily, weekly, biweekly, monthly or custom
        #[arg(long)]
        recurrence: Option<String>,

        /// Days between posts for a custom recurrence
        #[arg(long)]
        every_days: Option<i64>,

        /// Local posting time, HH:MM
        #[arg(long)]
        time: Option<String>,

        /// Minutes east of UTC
        #[arg(long, allow_hyphen_values = true)]
        utc_offset: Option<i32>,
    },

    /// Finish onboarding
    Onboard {
        /// Account id or email
        account: String,
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
    let accounts = service.accounts();

    match cli.command {
        Commands::Create { email, name } => {
            let account = accounts.create(&email, name.as_deref()).await?;
            println!("{}", account.id);
        }
        Commands::Show { account, format } => {
            validate_format(&format)?;
            let account = accounts.find(&account).await?;
            if format == "json" {
                print_json(&account)?;
            } else {
                print_account(&account);
            }
        }
        Commands::List { format } => {
            validate_format(&format)?;
            let all = accounts.list().await?;
            if format == "json" {
                print_json(&all)?;
            } else {
                for account in &all {
                    println!(
                        "{} | {} | {} | {}",
                        account.id,
                        account.email,
                        account.balance,
                        account_state(account)
                    );
                }
            }
        }
        Commands::ConnectPage {
            account,
            page_id,
            page_name,
            token,
            expires,
        } => {
            let account = accounts.find(&account).await?;
            let expires_at = expires
                .as_deref()
                .map(parse_schedule)
                .transpose()?
                .map(|at| at.timestamp());
            let account = accounts
                .connect_page(
                    &account.id,
                    &PageConnection {
                        page_id,
                        page_name,
                        access_token: token,
                        expires_at,
                    },
                )
                .await?;
            println!(
                "Connected page {} to {}",
                account.page_id.as_deref().unwrap_or_default(),
                account.email
            );
        }
        Commands::Profile {
            account,
            name,
            summary,
            style,
            recurrence,
            every_days,
            time,
            utc_offset,
        } => {
            let update = ProfileUpdate {
                name,
                business_summary: summary,
                post_style: style,
                recurrence: recurrence.as_deref().map(str::parse::<Recurrence>).transpose()?,
                custom_recurrence_days: every_days,
                preferred_time: time,
                utc_offset_minutes: utc_offset,
            };
            let account = accounts.find(&account).await?;
            let account = accounts.update_profile(&account.id, &update).await?;
            print_account(&account);
        }
        Commands::Onboard { account } => {
            let account = accounts.find(&account).await?;
            let account = accounts.complete_onboarding(&account.id).await?;
            println!("{} is onboarded", account.email);
        }
    }

    Ok(())
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

fn account_state(account: &Account) -> &'static str {
    if account.needs_reauth {
        "reauth required"
    } else if !account.page_connected() {
        "no page"
    } else if !account.onboarded {
        "onboarding"
    } else {
        "active"
    }
}

fn print_account(account: &Account) {
    println!("ID:         {}", account.id);
    println!("Email:      {}", account.email);
    if let Some(name) = &account.name {
        println!("Name:       {}", name);
    }
    println!("Status:     {}", account_state(account));
    println!("Balance:    {} credits", account.balance);
    if let Some(page_id) = &account.page_id {
        println!(
            "Page:       {} ({})",
            account.page_name.as_deref().unwrap_or("unnamed"),
            page_id
        );
    }
    if let Some(expires_at) = account.token_expires_at {
        println!("Token until {}", format_timestamp(expires_at));
    }
    let every = match account.recurrence {
        Recurrence::Custom => format!(
            "every {} days",
            account.recurrence.interval_days(account.custom_recurrence_days)
        ),
        recurrence => recurrence.to_string(),
    };
    let offset = account.utc_offset_minutes;
    println!(
        "Posting:    {} at {} (UTC{}{:02}:{:02})",
        every,
        account.preferred_time,
        if offset < 0 { '-' } else { '+' },
        offset.abs() / 60,
        offset.abs() % 60
    );
    if let Some(summary) = &account.business_summary {
        println!("Summary:    {}", summary);
    }
    if let Some(style) = &account.post_style {
        println!("Style:      {}", style);
    }
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_state() {
        let mut account = Account::new("a@example.com".to_string(), None);
        assert_eq!(account_state(&account), "no page");

        account.page_id = Some("111".to_string());
        assert_eq!(account_state(&account), "onboarding");

        account.onboarded = true;
        assert_eq!(account_state(&account), "active");

        account.needs_reauth = true;
        assert_eq!(account_state(&account), "reauth required");
    }
}
