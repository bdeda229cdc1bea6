//! Logging setup shared by the Pagecast binaries
//!
//! All output goes to stderr so that stdout stays machine readable. The
//! format comes from `PAGECAST_LOG_FORMAT` (text, json, pretty) and the level
//! from `RUST_LOG`, then `PAGECAST_LOG_LEVEL`, then `info`.
//!
//! ```no_run
//! use libpagecast::logging::LoggingConfig;
//!
//! LoggingConfig::from_env(false).init();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain text without target names
    #[default]
    Text,
    /// One JSON object per line, with span context
    Json,
    /// Multi-line colored output for development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    /// Forces `debug` unless `RUST_LOG` says otherwise
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>, verbose: bool) -> Self {
        Self {
            format,
            level: level.into(),
            verbose,
        }
    }

    /// Read `PAGECAST_LOG_FORMAT` and `PAGECAST_LOG_LEVEL`
    ///
    /// An unparsable format falls back to text.
    pub fn from_env(verbose: bool) -> Self {
        Self::from_env_or("info", verbose)
    }

    /// Like [`LoggingConfig::from_env`], with `default_level` when
    /// `PAGECAST_LOG_LEVEL` is unset
    pub fn from_env_or(default_level: &str, verbose: bool) -> Self {
        let format = std::env::var("PAGECAST_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let level =
            std::env::var("PAGECAST_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());
        Self::new(format, level, verbose)
    }

    fn filter(&self) -> EnvFilter {
        let fallback = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Install the global subscriber
    ///
    /// Returns false when a subscriber was already installed, which happens
    /// when tests in one process initialize logging more than once.
    pub fn init(&self) -> bool {
        let filter = self.filter();
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        let result = match self.format {
            LogFormat::Json => builder
                .json()
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => builder
                .pretty()
                .with_target(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => builder.with_target(false).with_ansi(false).try_init(),
        };

        result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);

        let err = "yaml".parse::<LogFormat>().unwrap_err();
        assert!(err.contains("Invalid log format: 'yaml'"));
    }

    #[test]
    fn test_log_format_display() {
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variables() {
        std::env::set_var("PAGECAST_LOG_FORMAT", "json");
        std::env::set_var("PAGECAST_LOG_LEVEL", "warn");
        let config = LoggingConfig::from_env(false);
        std::env::remove_var("PAGECAST_LOG_FORMAT");
        std::env::remove_var("PAGECAST_LOG_LEVEL");

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "warn");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::set_var("PAGECAST_LOG_FORMAT", "nonsense");
        std::env::remove_var("PAGECAST_LOG_LEVEL");
        let config = LoggingConfig::from_env(true);
        std::env::remove_var("PAGECAST_LOG_FORMAT");

        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "info");
        assert!(config.verbose);
    }

    #[test]
    #[serial]
    fn test_from_env_or_uses_tool_default() {
        std::env::remove_var("PAGECAST_LOG_LEVEL");
        assert_eq!(LoggingConfig::from_env_or("warn", false).level, "warn");
    }

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig::new(LogFormat::Text, "info", false);
        config.init();
        assert!(!config.init());
    }
}
