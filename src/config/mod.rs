//! Configuration management.
//!
//! Settings come from a TOML file, then environment variables override
//! individual values. Every section is optional:
//!
//! ```toml
//! credentials_file = "Credentials.txt"
//!
//! [retention]
//! rule = "score-below-one-or-stale-at-one"
//! age_threshold_days = 14
//!
//! [retry]
//! max_attempts = 4
//! backoff_secs = [5, 15, 45]
//!
//! [archive]
//! dir = "."
//!
//! [reddit]
//! user_agent = "redsweep/0.3 (by u/me)"
//!
//! [sync]
//! folder_id = "1AbC..."
//!
//! [logging]
//! format = "json"
//! level = "info"
//! ```

use crate::platform::RedditSettings;
use crate::retention::{RetentionPolicy, RetentionRule};
use crate::services::{ArchiveConfig, RetryConfig, SyncSettings};
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "REDSWEEP_CONFIG_PATH";

/// Default credentials file, relative to the working directory.
pub const DEFAULT_CREDENTIALS_FILE: &str = "Credentials.txt";

/// Main configuration for redsweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Retention policy for scheduled and CLI runs.
    pub policy: RetentionPolicy,
    /// Rate-limit retry settings.
    pub retry: RetryConfig,
    /// Archive log location.
    pub archive: ArchiveConfig,
    /// Reddit transport settings.
    pub reddit: RedditSettings,
    /// Remote sync settings.
    pub sync: SyncSettings,
    /// Logging settings, resolved by [`crate::observability`].
    pub logging: ConfigFileLogging,
    /// Credentials file consulted after the environment.
    pub credentials_file: PathBuf,
    /// File this configuration was loaded from, if any.
    pub source: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Credentials file path.
    pub credentials_file: Option<String>,
    /// Retention section.
    pub retention: Option<ConfigFileRetention>,
    /// Retry section.
    pub retry: Option<ConfigFileRetry>,
    /// Archive section.
    pub archive: Option<ConfigFileArchive>,
    /// Reddit section.
    pub reddit: Option<ConfigFileReddit>,
    /// Sync section.
    pub sync: Option<ConfigFileSync>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Retention section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRetention {
    /// Rule name.
    pub rule: Option<String>,
    /// Age threshold in days.
    pub age_threshold_days: Option<u32>,
}

/// Retry section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRetry {
    /// Attempts per call, including the first.
    pub max_attempts: Option<u32>,
    /// Waits between attempts, in seconds.
    pub backoff_secs: Option<Vec<u64>>,
}

/// Archive section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileArchive {
    /// Directory holding the logs.
    pub dir: Option<String>,
    /// Comment log file name.
    pub comments_file: Option<String>,
    /// Post log file name.
    pub posts_file: Option<String>,
}

/// Reddit section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileReddit {
    /// User agent sent with every request.
    pub user_agent: Option<String>,
    /// Token endpoint base URL.
    pub auth_url: Option<String>,
    /// API base URL.
    pub api_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Sync section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileSync {
    /// Service account key path or inline JSON.
    pub service_account_key: Option<String>,
    /// Target folder id.
    pub folder_id: Option<String>,
}

/// Logging section in config file.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `redsweep=debug`.
    pub level: Option<String>,
    /// Log file path; stderr when unset.
    pub file: Option<String>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            policy: RetentionPolicy::default(),
            retry: RetryConfig::default(),
            archive: ArchiveConfig::default(),
            reddit: RedditSettings::default(),
            sync: SyncSettings::default(),
            logging: ConfigFileLogging::default(),
            credentials_file: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            source: None,
        }
    }
}

impl SweepConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration for a process.
    ///
    /// An explicit path wins, then `REDSWEEP_CONFIG_PATH`, then the default
    /// locations. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };
        config.with_env_overrides()
    }

    /// Loads configuration from a file path, without env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown rule.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::operation("read_config_file", format!("{}: {e}", path.display())))?;
        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| Error::operation("parse_config_file", format!("{}: {e}", path.display())))?;

        let mut config = Self::from_config_file(file)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/redsweep/` on macOS)
    /// 2. XDG config dir (`~/.config/redsweep/` for Unix compatibility)
    ///
    /// Returns default configuration if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("redsweep").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("redsweep")
                .join("config.toml"),
        ];
        for path in &candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file"),
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `SweepConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = file.credentials_file {
            config.credentials_file = PathBuf::from(path);
        }
        if let Some(retention) = file.retention {
            if let Some(rule) = retention.rule {
                config.policy.rule = rule.parse::<RetentionRule>()?;
            }
            if let Some(days) = retention.age_threshold_days {
                config.policy.age_threshold_days = days;
            }
        }
        if let Some(retry) = &file.retry {
            config.retry = RetryConfig::from_config(retry);
        }
        if let Some(archive) = &file.archive {
            config.archive = ArchiveConfig::from_config(archive);
        }
        if let Some(reddit) = &file.reddit {
            config.reddit = RedditSettings::from_config(reddit);
        }
        if let Some(sync) = file.sync {
            config.sync = SyncSettings {
                service_account_key: sync.service_account_key.filter(|v| !v.trim().is_empty()),
                folder_id: sync.folder_id.filter(|v| !v.trim().is_empty()),
            };
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        Ok(config)
    }

    /// Applies environment variable overrides to every section.
    ///
    /// # Errors
    ///
    /// Returns an error if `REDSWEEP_RETENTION_RULE` names an unknown rule.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        self.policy = self.policy.with_env_overrides()?;
        self.retry = self.retry.with_env_overrides();
        self.archive = self.archive.with_env_overrides();
        self.reddit = self.reddit.with_env_overrides();

        let env_sync = SyncSettings::from_env();
        if env_sync.service_account_key.is_some() {
            self.sync.service_account_key = env_sync.service_account_key;
        }
        if env_sync.folder_id.is_some() {
            self.sync.folder_id = env_sync.folder_id;
        }
        if let Ok(v) = std::env::var("REDSWEEP_CREDENTIALS_FILE") {
            if !v.trim().is_empty() {
                self.credentials_file = PathBuf::from(v);
            }
        }
        Ok(self)
    }

    /// Sets the retention policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetentionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the archive directory.
    #[must_use]
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive.dir = dir.into();
        self
    }

    /// Human-readable dump for `redsweep config --show`. Secrets are never printed.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let source = self
            .source
            .as_ref()
            .map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string());
        let _ = writeln!(out, "config file:      {source}");
        let _ = writeln!(out, "policy:           {}", self.policy.describe());
        let backoff: Vec<String> = self
            .retry
            .backoff_schedule
            .iter()
            .map(|d| format!("{}s", d.as_secs()))
            .collect();
        let _ = writeln!(
            out,
            "retry:            {} attempts, backoff [{}]",
            self.retry.max_attempts,
            backoff.join(", ")
        );
        for path in self.archive.log_paths() {
            let _ = writeln!(out, "archive log:      {}", path.display());
        }
        let _ = writeln!(out, "reddit api:       {}", self.reddit.api_url);
        let _ = writeln!(out, "user agent:       {}", self.reddit.user_agent);
        let sync = match &self.sync.folder_id {
            Some(folder) if self.sync.is_configured() => format!("folder {folder}"),
            Some(_) => "incomplete (service account key missing)".to_string(),
            None => "disabled".to_string(),
        };
        let _ = writeln!(out, "sync:             {sync}");
        let _ = write!(out, "credentials file: {}", self.credentials_file.display());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = SweepConfig::new();
        assert_eq!(config.policy, RetentionPolicy::default());
        assert_eq!(config.credentials_file, PathBuf::from("Credentials.txt"));
        assert!(config.source.is_none());
        assert!(!config.sync.is_configured());
    }

    #[test]
    fn test_load_every_section() {
        let file = write_config(
            r#"
credentials_file = "/etc/redsweep/creds.txt"

[retention]
rule = "stale-only"
age_threshold_days = 30

[retry]
max_attempts = 2
backoff_secs = [1]

[archive]
dir = "/var/lib/redsweep"
posts_file = "posts.jsonl"

[reddit]
user_agent = "test-agent"
api_url = "http://localhost:9000/"
timeout_secs = 5

[sync]
folder_id = "folder1"
service_account_key = ""

[logging]
format = "json"
level = "debug"
"#,
        );
        let config = SweepConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.policy.rule, RetentionRule::StaleOnly);
        assert_eq!(config.policy.age_threshold_days, 30);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.backoff_schedule, vec![Duration::from_secs(1)]);
        assert_eq!(
            config.archive.path_for(crate::ItemKind::Post),
            PathBuf::from("/var/lib/redsweep/posts.jsonl")
        );
        assert_eq!(config.reddit.user_agent, "test-agent");
        assert_eq!(config.reddit.api_url, "http://localhost:9000");
        assert_eq!(config.sync.folder_id.as_deref(), Some("folder1"));
        assert!(config.sync.service_account_key.is_none());
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(config.credentials_file, PathBuf::from("/etc/redsweep/creds.txt"));
        assert_eq!(config.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_unknown_rule_is_rejected() {
        let file = write_config("[retention]\nrule = \"forever\"\n");
        let err = SweepConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let file = write_config("[retention\n");
        let err = SweepConfig::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse_config_file"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = SweepConfig::load_from_file(Path::new("/no/such/redsweep.toml")).unwrap_err();
        assert!(err.to_string().contains("read_config_file"));
    }

    #[test]
    fn test_describe_hides_secrets() {
        let mut config = SweepConfig::new();
        config.sync = SyncSettings {
            service_account_key: Some("{\"private_key\":\"SECRET\"}".to_string()),
            folder_id: Some("folder1".to_string()),
        };
        let text = config.describe();
        assert!(text.contains("sync:             folder folder1"));
        assert!(!text.contains("SECRET"));
        assert!(text.contains("deleted_comments.txt"));
    }
}
