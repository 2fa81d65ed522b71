//! Logging for Care Companion.
//!
//! Everything goes to stderr; stdout belongs to the conversation.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Line format of the stderr log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    /// Read `CARE_LOG_FORMAT` (`text` or `json`), defaulting to text.
    pub fn from_env() -> Self {
        std::env::var("CARE_LOG_FORMAT")
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Install the global subscriber.
///
/// `log_level` is an `EnvFilter` directive such as `debug` or
/// `care_chat=trace,info`; `RUST_LOG` is used when it is `None`.
///
/// # Example
/// ```no_run
/// use care_core::logging::init_logging;
///
/// init_logging(Some("care_chat=debug,info"), false).expect("Failed to initialize logging");
/// ```
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> AppResult<()> {
    init_logging_with(log_level, no_color, LogFormat::from_env())
}

/// Install the global subscriber with an explicit line format.
pub fn init_logging_with(
    log_level: Option<&str>,
    no_color: bool,
    format: LogFormat,
) -> AppResult<()> {
    let env_filter = build_filter(log_level)?;

    let (text, json) = match format {
        LogFormat::Text => (
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(!no_color && std::env::var("NO_COLOR").is_err()),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(json)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))
}

fn build_filter(log_level: Option<&str>) -> AppResult<EnvFilter> {
    let directive = match log_level {
        Some(level) => level.to_string(),
        None => std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
    };

    EnvFilter::try_new(&directive)
        .map_err(|e| AppError::Config(format!("Invalid log filter {:?}: {}", directive, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_config_error() {
        assert!(matches!(
            build_filter(Some("care_chat=notalevel")),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_valid_filter() {
        assert!(build_filter(Some("care_chat=debug,warn")).is_ok());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Text);
    }
}
