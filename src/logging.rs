//! Tracing setup for the watcher process and the `[parser] event` macros.
//!
//! Every line a poll loop emits is prefixed with the parser it belongs to,
//! so one stream can be grepped per parser:
//!
//! ```text
//! 14:02:11.503  INFO parsewatch::watcher::polling: [invoices] handed off: 2 files
//! 14:02:16.504 DEBUG parsewatch::watcher::polling: [invoices] checking: /data/in
//! ```
//!
//! Levels come from `[logging]` in the settings file. A non-empty `RUST_LOG`
//! replaces them entirely; an unparseable one is reported and ignored.
//!
//! ```toml
//! [logging]
//! default = "info"
//!
//! [logging.modules]
//! "parsewatch::dispatch" = "debug"
//! ```

use std::sync::Once;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

const ENV_OVERRIDE: &str = "RUST_LOG";

static INIT: Once = Once::new();

/// Wall-clock time of day with milliseconds; poll intervals are seconds apart.
struct PollClock;

impl FormatTime for PollClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Where the active filter came from.
#[derive(Debug, PartialEq, Eq)]
enum FilterSource {
    Settings,
    Environment,
    /// `RUST_LOG` was set but did not parse; settings were used instead.
    RejectedEnvironment(String),
}

fn build_filter(config: &LoggingConfig, env_override: Option<&str>) -> (EnvFilter, FilterSource) {
    match env_override.map(str::trim).filter(|v| !v.is_empty()) {
        Some(directive) => match EnvFilter::try_new(directive) {
            Ok(filter) => (filter, FilterSource::Environment),
            Err(e) => (
                EnvFilter::new(config.filter_directive()),
                FilterSource::RejectedEnvironment(e.to_string()),
            ),
        },
        None => (EnvFilter::new(config.filter_directive()), FilterSource::Settings),
    }
}

/// Install the global subscriber. Only the first call in a process has an
/// effect; later calls, with any config, are ignored.
///
/// Output goes to stderr so `parsewatch config` and `watermarks` can be piped.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let env_override = std::env::var(ENV_OVERRIDE).ok();
        let (filter, source) = build_filter(config, env_override.as_deref());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(PollClock)
            .with_writer(std::io::stderr)
            .with_filter(filter);

        // try_init: a test harness may already own the global subscriber
        if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
            return;
        }

        if let FilterSource::RejectedEnvironment(reason) = source {
            tracing::warn!("[logging] ignoring {ENV_OVERRIDE}: {reason}");
        }
    });
}

/// [`init_with_config`] with `info` everywhere.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Info-level `[parser] event` line, with an optional formatted detail.
///
/// ```ignore
/// log_event!("invoices", "handed off", "{} files", files.len());
/// log_event!("invoices", "found no new files");
/// ```
#[macro_export]
macro_rules! log_event {
    ($parser:expr, $event:expr) => {
        tracing::info!("[{}] {}", $parser, $event)
    };
    ($parser:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $parser, $event, format!($($arg)*))
    };
}

/// Debug-level counterpart of [`log_event!`].
#[macro_export]
macro_rules! debug_event {
    ($parser:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $parser, $event)
    };
    ($parser:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $parser, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(default: &str) -> LoggingConfig {
        LoggingConfig {
            default: default.to_string(),
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn test_settings_used_without_override() {
        let (filter, source) = build_filter(&config("warn"), None);
        assert_eq!(source, FilterSource::Settings);
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let (_, source) = build_filter(&config("warn"), Some("  "));
        assert_eq!(source, FilterSource::Settings);
    }

    #[test]
    fn test_environment_override_wins() {
        let (filter, source) = build_filter(&config("warn"), Some("parsewatch::watcher=trace"));
        assert_eq!(source, FilterSource::Environment);
        assert_eq!(filter.to_string(), "parsewatch::watcher=trace");
    }

    #[test]
    fn test_bad_override_falls_back_to_settings() {
        let (filter, source) = build_filter(&config("error"), Some("parsewatch=loudest"));
        assert!(matches!(source, FilterSource::RejectedEnvironment(_)));
        assert_eq!(filter.to_string(), "error");
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init_with_config(&config("debug"));
        crate::log_event!("invoices", "found no new files");
        crate::debug_event!("invoices", "checking", "{}", "/data");
    }
}
