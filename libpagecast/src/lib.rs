//! Pagecast - scheduled, AI-written posts for Facebook pages
//!
//! This library holds the post pipeline (scheduling, credit-gated content
//! generation, publication), the credit ledger, and the services shared by
//! the `pagecast-*` command-line tools.

pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod generation;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod publishing;
pub mod retry;
pub mod scheduling;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{PagecastError, Result};
pub use pipeline::{Pipeline, SweepReport};
pub use service::PagecastService;
pub use types::{Account, Credits, LedgerEntry, Post, PostStatus};
