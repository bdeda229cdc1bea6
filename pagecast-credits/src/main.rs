//! pagecast-credits - Credit balances and purchases
//!
//! Every generated post costs credits. This tool shows what an account
//! has, where it went, and records purchases.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libpagecast::ledger::CreditSummary;
use libpagecast::logging::LoggingConfig;
use libpagecast::service::credits::CreditPackage;
use libpagecast::{Credits, LedgerEntry, PagecastError, PagecastService, Result};

#[derive(Parser, Debug)]
#[command(name = "pagecast-credits")]
#[command(version)]
#[command(about = "Credit balances, purchases and price list")]
#[command(long_about = "\
pagecast-credits - Credit balances and purchases

DESCRIPTION:
    Each post costs credits when its content is generated. Failed
    generations are refunded. pagecast-credits shows balances and the
    ledger behind them, records purchases and lists credit packages.

    Accounts are given by id or by email address.

USAGE EXAMPLES:
    # Current balance
    pagecast-credits balance owner@example.com

    # Lifetime totals as JSON
    pagecast-credits summary owner@example.com --format json

    # Last 10 ledger entries
    pagecast-credits history owner@example.com --limit 10

    # Record a purchase of 30 credits
    pagecast-credits purchase owner@example.com 30 --payment-ref pi_123

    # Price list
    pagecast-credits packages

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (unknown account, bad amount, etc.)
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
    /// Print the current balance
    Balance {
        /// Account id or email
        account: String,
    },

    /// Balance with lifetime totals
    Summary {
        /// Account id or email
        account: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Ledger entries, newest first
    History {
        /// Account id or email
        account: String,

        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Record purchased credits
    Purchase {
        /// Account id or email
        account: String,

        /// Credits bought (e.g. 30 or 2.5)
        amount: String,

        /// Payment reference from the payment provider
        #[arg(long)]
        payment_ref: Option<String>,
    },

    /// Show credit packages and prices
    Packages {
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
        Commands::Balance { account } => {
            let account = service.accounts().find(&account).await?;
            println!("{}", service.credits().balance(&account.id).await?);
            Ok(())
        }
        Commands::Summary { account, format } => {
            validate_format(&format)?;
            let account = service.accounts().find(&account).await?;
            let summary = service.credits().summary(&account.id).await?;
            if format == "json" {
                print_json(&summary)
            } else {
                print_summary(&summary);
                Ok(())
            }
        }
        Commands::History {
            account,
            limit,
            format,
        } => {
            validate_format(&format)?;
            let account = service.accounts().find(&account).await?;
            let entries = service.credits().history(&account.id, limit).await?;
            if format == "json" {
                print_json(&entries)
            } else {
                print_history(&entries);
                Ok(())
            }
        }
        Commands::Purchase {
            account,
            amount,
            payment_ref,
        } => {
            let amount: Credits = amount.parse()?;
            let account = service.accounts().find(&account).await?;
            let balance = service
                .credits()
                .purchase(&account.id, amount, payment_ref.as_deref())
                .await?;
            println!("Added {} credits, balance is now {}", amount, balance);
            Ok(())
        }
        Commands::Packages { format } => {
            validate_format(&format)?;
            let credits = service.credits();
            let packages = credits.packages();
            if format == "json" {
                print_json(&packages)
            } else {
                print_packages(credits.price_per_credit_cents(), &packages);
                Ok(())
            }
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

fn print_summary(summary: &CreditSummary) {
    println!("Balance:   {}", summary.balance);
    println!("Purchased: {}", summary.purchased);
    println!("Granted:   {}", summary.granted);
    println!("Used:      {}", summary.used);
}

fn print_history(entries: &[LedgerEntry]) {
    for entry in entries {
        let when = DateTime::<Utc>::from_timestamp(entry.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let amount = if entry.amount.is_positive() {
            format!("+{}", entry.amount)
        } else {
            entry.amount.to_string()
        };
        println!(
            "{} | {:>8} | {:>8} | {:<10} | {}",
            when,
            amount,
            entry.balance_after,
            entry.kind.as_str(),
            entry.description
        );
    }
}

fn print_packages(unit_cents: u64, packages: &[CreditPackage]) {
    println!("1 credit = {}", format_cents(unit_cents));
    for package in packages {
        let discount = if package.discount_percent > 0 {
            format!(" ({}% off)", package.discount_percent)
        } else {
            String::new()
        };
        println!(
            "  {:<13} {:>4} credits  {:>9}{}",
            package.name,
            package.credits,
            format_cents(package.price_cents),
            discount
        );
    }
}

fn format_cents(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
