//! Tracing setup for eventide binaries.
//!
//! Console output follows the requested level (or `RUST_LOG`), with
//! optional per-component overrides: the dispatch loop traces every event
//! and reader threads log every chunk, so each can be turned up or down on
//! its own. A second layer writes everything at trace level to
//! `logs/eventide-last-run.log`, overwriting the previous run; reader
//! threads are named `eventide-fd-<fd>` there.

use std::fs::{File, create_dir_all};
use std::path::Path;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Target of the per-event dispatch logs.
pub const DISPATCH_TARGET: &str = "eventide_core::simulator";

/// Target prefix of the descriptor reader logs.
pub const READER_TARGET: &str = "eventide_io";

/// Console levels for individual kernel components, layered over the base
/// console level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentLevels {
    /// Simulator run loop and dispatch
    pub dispatch: Option<Level>,
    /// Background descriptor readers
    pub readers: Option<Level>,
}

impl ComponentLevels {
    /// `EnvFilter` directives for `base` plus the component overrides.
    pub fn directives(&self, base: Level) -> String {
        let mut directives = base.to_string().to_lowercase();
        for (target, level) in [(DISPATCH_TARGET, self.dispatch), (READER_TARGET, self.readers)] {
            if let Some(level) = level {
                directives.push_str(&format!(",{target}={}", level.to_string().to_lowercase()));
            }
        }
        directives
    }
}

/// Initialize tracing with console and file output.
///
/// # Arguments
/// * `console_level` - Log level for console output
/// * `components` - Per-component console overrides, ignored when `RUST_LOG` is set
/// * `logs_dir` - Directory for the run log (defaults to "./logs")
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - If the logs directory cannot be created, the log file cannot be opened, or the directives do not parse
pub fn init_tracing(
    console_level: Level,
    components: ComponentLevels,
    logs_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join("eventide-last-run.log");
    let log_file = File::create(&log_file_path)?;

    let directives = components.directives(console_level);
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&directives)?,
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    // Reader threads are named, so keep thread names in the file.
    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Tracing initialized: console={}, run_log={}",
        directives,
        log_file_path.display()
    );

    Ok(())
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    #[default]
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including per-event dispatch
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use eventide_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(CliLogLevel::Error),
            "warn" => Ok(CliLogLevel::Warn),
            "info" => Ok(CliLogLevel::Info),
            "debug" => Ok(CliLogLevel::Debug),
            "trace" => Ok(CliLogLevel::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_round_trip_names() {
        for level in ["error", "warn", "info", "debug", "trace"] {
            let parsed: CliLogLevel = level.parse().unwrap();
            assert_eq!(parsed.to_string(), level);
        }
        assert!("verbose".parse::<CliLogLevel>().is_err());
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
    }

    #[test]
    fn test_component_directives() {
        assert_eq!(ComponentLevels::default().directives(Level::WARN), "warn");

        let components = ComponentLevels {
            dispatch: Some(Level::TRACE),
            readers: Some(Level::DEBUG),
        };
        let directives = components.directives(Level::INFO);
        assert_eq!(
            directives,
            "info,eventide_core::simulator=trace,eventide_io=debug"
        );
        assert!(EnvFilter::try_new(&directives).is_ok());

        let quiet_readers = ComponentLevels {
            readers: Some(Level::ERROR),
            ..Default::default()
        };
        assert_eq!(quiet_readers.directives(Level::DEBUG), "debug,eventide_io=error");
    }
}
