//! Error types for Pagecast

use thiserror::Error;

use crate::types::{Credits, PostStatus};

pub type Result<T> = std::result::Result<T, PagecastError>;

#[derive(Error, Debug)]
pub enum PagecastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Publishing error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot {action} post {post_id} while it is {from}")]
    InvalidTransition {
        post_id: String,
        from: PostStatus,
        action: &'static str,
    },
}

impl PagecastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PagecastError::InvalidInput(_) | PagecastError::NotFound(_) => 3,
            PagecastError::Ledger(LedgerError::InsufficientBalance { .. }) => 4,
            PagecastError::Publish(PublishError::AuthExpired(_)) => 2,
            PagecastError::Config(_) | PagecastError::Database(_) => 2,
            PagecastError::Ledger(_)
            | PagecastError::Generation(_)
            | PagecastError::Publish(_)
            | PagecastError::InvalidTransition { .. } => 1,
        }
    }
}

impl From<sqlx::Error> for PagecastError {
    fn from(err: sqlx::Error) -> Self {
        PagecastError::Database(DbError::SqlxError(err))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient balance on account {account_id}: have {balance}, need {requested}")]
    InsufficientBalance {
        account_id: String,
        balance: Credits,
        requested: Credits,
    },

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Credits),

    #[error("Account not found: {0}")]
    AccountNotFound(String),
}

/// Failures reported by a content generation provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),
}

/// Failures reported by the publishing platform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    #[error("Rejected by platform: {0}")]
    PlatformRejected(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl PublishError {
    /// Stable identifier stored alongside failed posts
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::AuthExpired(_) => "auth_expired",
            PublishError::PlatformRejected(_) => "platform_rejected",
            PublishError::Network(_) => "network",
        }
    }
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Provider(_) => "provider_error",
            GenerationError::RateLimited(_) => "rate_limited",
        }
    }
}
