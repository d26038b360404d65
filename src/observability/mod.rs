//! Logging setup.
//!
//! Records go to stderr (stdout is kept for summaries and JSON output) or to
//! an append-only log file. Metrics are emitted through the `metrics` facade;
//! no exporter is installed here, so they are dropped unless the embedding
//! process installs a recorder.

use crate::config::ConfigFileLogging;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter variables, checked in order.
pub const LOG_FILTER_ENV_VARS: [&str; 2] = ["REDSWEEP_LOG", "RUST_LOG"];

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "REDSWEEP_LOG_FORMAT";

/// Environment variable naming a log file.
pub const LOG_FILE_ENV: &str = "REDSWEEP_LOG_FILE";

const DEFAULT_FILTER: &str = "info";
const VERBOSE_FILTER: &str = "debug";

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything other than `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Options from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Whether verbose output was requested via CLI.
    pub verbose: bool,
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive.
    pub filter: String,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds the configuration from file settings, `--verbose` and the environment.
    ///
    /// A filter variable beats `--verbose`, which beats the configured level.
    #[must_use]
    pub fn from_settings(settings: Option<&ConfigFileLogging>, verbose: bool) -> Self {
        Self::from_settings_with(settings, verbose, |name| std::env::var(name).ok())
    }

    fn from_settings_with<F>(settings: Option<&ConfigFileLogging>, verbose: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(settings) = settings {
            if let Some(format) = &settings.format {
                config.format = LogFormat::parse(format);
            }
            if let Some(level) = &settings.level {
                config.filter.clone_from(level);
            }
            config.file = settings.file.as_ref().map(PathBuf::from);
        }
        if verbose {
            config.filter = VERBOSE_FILTER.to_string();
        }

        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(filter) = LOG_FILTER_ENV_VARS.iter().find_map(|name| non_empty(name)) {
            config.filter = filter;
        }
        if let Some(format) = non_empty(LOG_FORMAT_ENV) {
            config.format = LogFormat::parse(&format);
        }
        if let Some(file) = non_empty(LOG_FILE_ENV) {
            config.file = Some(PathBuf::from(file));
        }
        config
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.filter)
            .map_err(|e| Error::InvalidInput(format!("invalid log filter '{}': {e}", self.filter)))
    }
}

/// Initializes logging from config settings with env overrides.
///
/// # Errors
///
/// Returns an error if logging has already been initialized or the log file
/// cannot be opened.
pub fn init_from_config(settings: &ConfigFileLogging, options: InitOptions) -> Result<()> {
    init(&LoggingConfig::from_settings(Some(settings), options.verbose))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if logging has already been initialized, the filter is
/// invalid or the log file cannot be opened.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(Error::operation("logging_init", "logging already initialized"));
    }

    let filter = config.env_filter()?;
    match (&config.file, config.format) {
        (Some(log_file), LogFormat::Json) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        },
        (Some(log_file), LogFormat::Pretty) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        },
        (None, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        },
        (None, LogFormat::Pretty) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(false),
                )
                .with(filter)
                .try_init()
                .map_err(init_error)?;
        },
    }

    LOGGING_INIT
        .set(())
        .map_err(|()| Error::operation("logging_init", "failed to mark logging initialized"))
}

/// Thread-safe file writer for logging.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Opens a log file for appending.
fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_log_dir", e))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::operation("open_log_file", format!("{}: {e}", path.display())))?;

    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::operation("logging_init", e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::from_settings_with(None, false, no_env);
        assert_eq!(config, LoggingConfig::default());
    }

    #[test]
    fn test_settings_then_verbose() {
        let settings = ConfigFileLogging {
            format: Some("JSON".to_string()),
            level: Some("warn".to_string()),
            file: Some("/tmp/redsweep.log".to_string()),
        };
        let config = LoggingConfig::from_settings_with(Some(&settings), false, no_env);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "warn");
        assert_eq!(config.file, Some(PathBuf::from("/tmp/redsweep.log")));

        let config = LoggingConfig::from_settings_with(Some(&settings), true, no_env);
        assert_eq!(config.filter, "debug");
    }

    #[test]
    fn test_env_filter_beats_verbose() {
        let lookup = |name: &str| match name {
            "RUST_LOG" => Some("redsweep=trace".to_string()),
            "REDSWEEP_LOG_FORMAT" => Some("json".to_string()),
            _ => None,
        };
        let config = LoggingConfig::from_settings_with(None, true, lookup);
        assert_eq!(config.filter, "redsweep=trace");
        assert_eq!(config.format, LogFormat::Json);

        let lookup = |name: &str| match name {
            "REDSWEEP_LOG" => Some("error".to_string()),
            "RUST_LOG" => Some("trace".to_string()),
            _ => None,
        };
        assert_eq!(LoggingConfig::from_settings_with(None, false, lookup).filter, "error");
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = LoggingConfig {
            filter: "redsweep=[".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(config.env_filter(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_open_log_file_creates_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("redsweep.log");
        let mut writer = open_log_file(&path).unwrap();
        writer.write_all(b"line\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line\n");
    }
}
