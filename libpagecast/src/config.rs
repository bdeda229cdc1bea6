//! Configuration management for Pagecast
//!
//! Configuration lives in a TOML file resolved from `PAGECAST_CONFIG` or the
//! XDG config directory. Every section has defaults, so a file containing only
//! `[database]` is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Credits;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub credits: CreditsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Directory where generated images are written
    #[serde(default = "default_images_dir")]
    pub images_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            images_dir: default_images_dir(),
        }
    }
}

fn default_db_path() -> String {
    "~/.local/share/pagecast/pagecast.db".to_string()
}

fn default_images_dir() -> String {
    "~/.local/share/pagecast/images".to_string()
}

/// What a sweep does with posts stuck in `generating` or `posting`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StaleAction {
    /// Mark the post failed (refunding generation charges)
    #[default]
    Fail,
    /// Put the post back in the queue for another attempt
    Reclaim,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Seconds between sweeps
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Maximum due posts fetched per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Posts processed concurrently within one sweep
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Seconds after which an in-flight post is considered abandoned
    #[serde(default = "default_stale_after")]
    pub stale_after: u64,
    #[serde(default)]
    pub stale_action: StaleAction,
    /// Sweeps a post may fail to be paid for before it is failed; 0 = forever
    #[serde(default)]
    pub max_debit_attempts: u32,
    /// Number of posts created by a cadence schedule request
    #[serde(default = "default_post_count")]
    pub default_post_count: u32,
}

impl SchedulingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after)
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            stale_after: default_stale_after(),
            stale_action: StaleAction::default(),
            max_debit_attempts: 0,
            default_post_count: default_post_count(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_concurrency() -> usize {
    4
}

fn default_stale_after() -> u64 {
    900
}

fn default_post_count() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsConfig {
    /// Charged when a post is claimed for generation
    #[serde(default = "default_per_post")]
    pub per_post: Credits,
    /// Granted once when an account is created
    #[serde(default = "default_trial_grant")]
    pub trial_grant: Credits,
    /// Reject schedule requests when the balance cannot cover one post
    #[serde(default)]
    pub require_balance_to_schedule: bool,
    #[serde(default)]
    pub pricing: PricingConfig,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            per_post: default_per_post(),
            trial_grant: default_trial_grant(),
            require_balance_to_schedule: false,
            pricing: PricingConfig::default(),
        }
    }
}

fn default_per_post() -> Credits {
    Credits::from_whole(1)
}

fn default_trial_grant() -> Credits {
    Credits::from_whole(1)
}

/// Price list inputs, in US cents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_caption_cost")]
    pub caption_cost_cents: u32,
    #[serde(default = "default_image_cost")]
    pub image_cost_cents: u32,
    #[serde(default = "default_markup")]
    pub markup: u32,
    /// Credit package sizes offered for purchase
    #[serde(default = "default_packages")]
    pub packages: Vec<u32>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            caption_cost_cents: default_caption_cost(),
            image_cost_cents: default_image_cost(),
            markup: default_markup(),
            packages: default_packages(),
        }
    }
}

fn default_caption_cost() -> u32 {
    2
}

fn default_image_cost() -> u32 {
    5
}

fn default_markup() -> u32 {
    2
}

fn default_packages() -> Vec<u32> {
    vec![10, 30, 100, 500]
}

/// Which content generator the pipeline uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// OpenAI captions plus Gemini images
    #[default]
    Live,
    /// Deterministic local generator, no network access
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: GenerationProvider,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Falls back to `OPENAI_API_KEY` when unset
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            model: default_openai_model(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4.1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Falls back to `GEMINI_API_KEY` when unset
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_image_size")]
    pub image_size: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            aspect_ratio: default_aspect_ratio(),
            image_size: default_image_size(),
        }
    }
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

fn default_image_size() -> String {
    "2K".to_string()
}

/// Which publisher the pipeline uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublishingPlatform {
    #[default]
    Facebook,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    #[serde(default)]
    pub platform: PublishingPlatform,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            platform: PublishingPlatform::default(),
            graph_base_url: default_graph_base_url(),
        }
    }
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}

/// Timeout and backoff applied to every external call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl RetryConfig {
    /// Longest one retried call can take: every attempt timing out, with the
    /// largest backoff between attempts
    pub fn worst_case_secs(&self) -> u64 {
        let attempts = u64::from(self.max_attempts.max(1));
        let waits_ms = (attempts - 1).saturating_mul(self.max_delay_ms);
        attempts
            .saturating_mul(self.timeout_secs)
            .saturating_add(waits_ms.div_ceil(1000))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_jitter() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the default location yields the default
    /// configuration; a missing file named by `PAGECAST_CONFIG` is an error.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() || std::env::var("PAGECAST_CONFIG").is_ok() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path without environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Apply `PAGECAST_DB_PATH`, `OPENAI_API_KEY` and `GEMINI_API_KEY`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("PAGECAST_DB_PATH") {
            self.database.path = path;
        }
        if self.generation.openai.api_key.is_none() {
            self.generation.openai.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if self.generation.gemini.api_key.is_none() {
            self.generation.gemini.api_key = std::env::var("GEMINI_API_KEY").ok();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduling.max_concurrency == 0 {
            return Err(invalid("scheduling.max_concurrency", "must be at least 1"));
        }
        if self.scheduling.batch_size == 0 {
            return Err(invalid("scheduling.batch_size", "must be at least 1"));
        }
        if self.scheduling.poll_interval == 0 {
            return Err(invalid("scheduling.poll_interval", "must be at least 1 second"));
        }
        if !self.credits.per_post.is_positive() {
            return Err(invalid("credits.per_post", "must be positive"));
        }
        if self.credits.trial_grant < Credits::ZERO {
            return Err(invalid("credits.trial_grant", "must not be negative"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.timeout_secs == 0 {
            return Err(invalid("retry.timeout_secs", "must be at least 1 second"));
        }
        // A generating post waits on a caption call and an image call
        let in_flight = self.retry.worst_case_secs().saturating_mul(GENERATION_CALLS);
        if self.scheduling.stale_after <= in_flight {
            return Err(ConfigError::InvalidValue {
                field: "scheduling.stale_after".to_string(),
                reason: format!(
                    "must exceed {}s, the longest a post can spend generating with the [retry] settings",
                    in_flight
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Database path with `~` expanded
    pub fn db_path(&self) -> PathBuf {
        expand_path(&self.database.path)
    }

    /// Image directory with `~` expanded
    pub fn images_dir(&self) -> PathBuf {
        expand_path(&self.database.images_dir)
    }
}

const GENERATION_CALLS: u64 = 2;

fn invalid(field: &str, reason: &str) -> crate::error::PagecastError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path following the XDG base directory layout
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PAGECAST_CONFIG") {
        return Ok(expand_path(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("pagecast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config(
            r#"
[database]
path = "/tmp/pagecast-test.db"
"#,
        );

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.database.path, "/tmp/pagecast-test.db");
        assert_eq!(config.scheduling.poll_interval, 60);
        assert_eq!(config.scheduling.stale_action, StaleAction::Fail);
        assert_eq!(config.scheduling.max_debit_attempts, 0);
        assert_eq!(config.credits.per_post, Credits::from_whole(1));
        assert_eq!(config.credits.trial_grant, Credits::from_whole(1));
        assert_eq!(config.credits.pricing.packages, vec![10, 30, 100, 500]);
        assert_eq!(config.generation.provider, GenerationProvider::Live);
        assert_eq!(config.publishing.platform, PublishingPlatform::Facebook);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_full_config_parses() {
        let file = write_config(
            r#"
[database]
path = "~/pagecast.db"
images_dir = "~/pagecast-images"

[scheduling]
poll_interval = 30
batch_size = 10
max_concurrency = 2
stale_after = 120
stale_action = "reclaim"
max_debit_attempts = 5

[credits]
per_post = 1.5
trial_grant = 0
require_balance_to_schedule = true

[credits.pricing]
markup = 3

[generation]
provider = "mock"

[generation.openai]
model = "gpt-4o"

[publishing]
platform = "mock"
graph_base_url = "http://localhost:9999"

[retry]
max_attempts = 5
jitter = false
"#,
        );

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.scheduling.stale_action, StaleAction::Reclaim);
        assert_eq!(config.scheduling.max_debit_attempts, 5);
        assert_eq!(config.credits.per_post, Credits::from_hundredths(150));
        assert_eq!(config.credits.trial_grant, Credits::ZERO);
        assert!(config.credits.require_balance_to_schedule);
        assert_eq!(config.credits.pricing.markup, 3);
        assert_eq!(config.credits.pricing.caption_cost_cents, 2);
        assert_eq!(config.generation.provider, GenerationProvider::Mock);
        assert_eq!(config.generation.openai.model, "gpt-4o");
        assert_eq!(config.publishing.platform, PublishingPlatform::Mock);
        assert!(!config.retry.jitter);
        assert!(!config.db_path().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let file = write_config("[database\npath = ");
        let result = Config::load_from_path(file.path());
        assert!(matches!(
            result,
            Err(crate::error::PagecastError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_unknown_stale_action_rejected() {
        let file = write_config("[scheduling]\nstale_action = \"retry\"\n");
        assert!(Config::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.scheduling.max_concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scheduling.max_concurrency"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_default_stale_after_covers_retry_budget() {
        let config = Config::default();
        assert_eq!(config.retry.worst_case_secs(), 3 * 120 + 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_stale_after_within_retry_budget() {
        let mut config = Config::default();
        for stale_after in [0, 60, 840] {
            config.scheduling.stale_after = stale_after;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("scheduling.stale_after"), "{}", stale_after);
        }

        // Shorter calls allow a shorter staleness window
        config.retry.timeout_secs = 10;
        config.retry.max_delay_ms = 2_000;
        config.scheduling.stale_after = 120;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_positive_price() {
        let mut config = Config::default();
        config.credits.per_post = Credits::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_honours_env_config_and_db_override() {
        let file = write_config("[database]\npath = \"/tmp/from-file.db\"\n");
        std::env::set_var("PAGECAST_CONFIG", file.path());
        std::env::set_var("PAGECAST_DB_PATH", "/tmp/from-env.db");

        let config = Config::load().unwrap();

        std::env::remove_var("PAGECAST_CONFIG");
        std::env::remove_var("PAGECAST_DB_PATH");

        assert_eq!(config.database.path, "/tmp/from-env.db");
    }

    #[test]
    #[serial]
    fn test_load_missing_explicit_config_fails() {
        std::env::set_var("PAGECAST_CONFIG", "/nonexistent/pagecast/config.toml");
        let result = Config::load();
        std::env::remove_var("PAGECAST_CONFIG");

        assert!(matches!(
            result,
            Err(crate::error::PagecastError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_api_keys_fall_back_to_env() {
        std::env::set_var("OPENAI_API_KEY", "sk-from-env");
        let mut config = Config::default();
        config.generation.gemini.api_key = Some("from-file".to_string());
        config.apply_env_overrides();
        std::env::remove_var("OPENAI_API_KEY");

        assert_eq!(config.generation.openai.api_key.as_deref(), Some("sk-from-env"));
        assert_eq!(config.generation.gemini.api_key.as_deref(), Some("from-file"));
    }
}
