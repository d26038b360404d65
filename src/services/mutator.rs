//! Scrub-then-remove with bounded rate-limit retry.
//!
//! Every destructive call goes through [`with_retry`]. A rate-limit signal
//! waits for the server-suggested delay when one is present, otherwise the
//! next entry of the backoff schedule. Once the schedule is exhausted the
//! final attempt runs unguarded and its error propagates.
//!
//! # Configuration
//!
//! - Config file: `[retry] max_attempts = 4`, `backoff_secs = [5, 15, 45]`
//! - Environment: `REDSWEEP_RETRY_MAX_ATTEMPTS`, `REDSWEEP_RETRY_BACKOFF_SECS`
//!   (comma-separated seconds)

use crate::config::ConfigFileRetry;
use crate::models::Item;
use crate::platform::Platform;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Text written over an item's content before it is removed.
pub const SCRUB_PLACEHOLDER: &str = ".";

/// Default number of attempts, including the final unguarded one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default backoff schedule in seconds.
pub const DEFAULT_BACKOFF_SECS: [u64; 3] = [5, 15, 45];

/// Blocking wait used between attempts.
pub trait Sleeper: Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts per call. The last one is unguarded.
    pub max_attempts: u32,
    /// Waits used when the server does not suggest one.
    ///
    /// The last entry is reused when there are more retries than entries.
    pub backoff_schedule: Vec<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_schedule: DEFAULT_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

impl RetryConfig {
    /// Creates a retry config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads retry configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads retry configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &ConfigFileRetry) -> Self {
        let mut settings = Self::default();
        if let Some(max_attempts) = config.max_attempts {
            settings.max_attempts = max_attempts.max(1);
        }
        if let Some(secs) = &config.backoff_secs {
            settings.backoff_schedule = secs.iter().map(|s| Duration::from_secs(*s)).collect();
        }
        settings
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("REDSWEEP_RETRY_MAX_ATTEMPTS") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.max_attempts = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("REDSWEEP_RETRY_BACKOFF_SECS") {
            if let Some(schedule) = parse_schedule(&v) {
                self.backoff_schedule = schedule;
            }
        }
        self
    }

    /// Sets the attempt limit.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the backoff schedule.
    #[must_use]
    pub fn with_backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff_schedule = schedule;
        self
    }

    /// Returns the scheduled wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = usize::try_from(attempt.saturating_sub(1)).unwrap_or(usize::MAX);
        self.backoff_schedule
            .get(index)
            .or_else(|| self.backoff_schedule.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

fn parse_schedule(raw: &str) -> Option<Vec<Duration>> {
    raw.split(',')
        .map(|part| part.trim().parse::<u64>().ok().map(Duration::from_secs))
        .collect()
}

/// Runs `op`, retrying on rate limiting under `config`.
///
/// Attempts `1..max_attempts` are guarded. Any error other than
/// [`Error::RateLimited`] is returned immediately.
pub fn with_retry<T, F>(config: &RetryConfig, sleeper: &dyn Sleeper, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    for attempt in 1..max_attempts {
        match op() {
            Err(Error::RateLimited { retry_after }) => {
                let wait = retry_after.unwrap_or_else(|| config.delay_for(attempt));
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    wait_secs = wait.as_secs_f64(),
                    server_hint = retry_after.is_some(),
                    "Rate limited, backing off"
                );
                metrics::counter!("mutation_retries_total", "operation" => label.to_string())
                    .increment(1);
                sleeper.sleep(wait);
            },
            other => return other,
        }
    }
    op()
}

/// Which mutation step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStage {
    /// Overwriting the content. Nothing changed on the platform.
    Scrub,
    /// Removing the item. The content was already overwritten.
    Remove,
}

impl MutationStage {
    /// Returns the stage as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scrub => "scrub",
            Self::Remove => "remove",
        }
    }

    /// Describes what state the item was left in.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Scrub => "not scrubbed",
            Self::Remove => "scrubbed but not removed",
        }
    }
}

impl fmt::Display for MutationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed two-step mutation.
#[derive(Debug, thiserror::Error)]
#[error("{} ({}): {source}", stage.as_str(), stage.outcome())]
pub struct MutationFailure {
    /// Step that failed.
    pub stage: MutationStage,
    /// Underlying error.
    #[source]
    pub source: Error,
}

/// Scrubs then removes items, retrying each step independently.
pub struct RetryingMutator<'a> {
    platform: &'a dyn Platform,
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl<'a> RetryingMutator<'a> {
    /// Creates a mutator that sleeps the current thread between attempts.
    #[must_use]
    pub fn new(platform: &'a dyn Platform, config: RetryConfig) -> Self {
        Self {
            platform,
            config,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replaces the sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns the retry configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs any platform call under this mutator's retry policy.
    pub fn retry<T, F>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        with_retry(&self.config, self.sleeper.as_ref(), label, op)
    }

    /// Scrubs `item` and then removes it.
    ///
    /// A [`MutationStage::Remove`] failure means the item was scrubbed but is
    /// still present.
    #[instrument(
        name = "redsweep.mutate",
        skip(self, item),
        fields(id = %item.id(), kind = %item.kind())
    )]
    pub fn mutate(&self, item: &Item) -> std::result::Result<(), MutationFailure> {
        let kind = item.kind();
        self.retry(&format!("{kind} scrub"), || {
            self.platform.scrub(item, SCRUB_PLACEHOLDER)
        })
        .map_err(|source| MutationFailure {
            stage: MutationStage::Scrub,
            source,
        })?;

        self.retry(&format!("{kind} remove"), || self.platform.remove(item))
            .map_err(|source| MutationFailure {
                stage: MutationStage::Remove,
                source,
            })?;

        debug!("Item scrubbed and removed");
        Ok(())
    }
}
