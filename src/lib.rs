//! # Redsweep
//!
//! Retention-policy cleanup for a user's Reddit comments and posts.
//!
//! Redsweep scans a user's history newest-first, decides per item whether a
//! retention policy retires it, archives each retired item to an append-only
//! JSON-lines log, scrubs and removes it, and optionally mirrors the logs to a
//! Google Drive folder.
//!
//! ## Features
//!
//! - Four retention rules over score and age, with strict age boundaries
//! - Rate-limit aware scrub-then-remove with an injectable backoff schedule
//! - Append-only per-kind archive logs written before every mutation
//! - Idempotent stable-name or dated snapshot sync of the logs
//! - Interactive, scheduled and (with the `http` feature) web entry points
//!
//! ## Example
//!
//! ```rust,ignore
//! use redsweep::platform::RedditClient;
//! use redsweep::retention::{RetentionPolicy, RetentionRule};
//! use redsweep::services::{CleanupOptions, CleanupOrchestrator, RetryConfig};
//!
//! let client = RedditClient::login(&credentials, &config.reddit)?;
//! let options = CleanupOptions::new(RetentionPolicy::default()).with_dry_run(true);
//! let report = CleanupOrchestrator::new(&client, options, RetryConfig::default())
//!     .run(credentials.username())?;
//! println!("{}", report.summary());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::time::Duration;
use thiserror::Error as ThisError;

pub mod cli;
pub mod config;
pub mod credentials;
pub mod models;
pub mod observability;
pub mod platform;
pub mod remote;
pub mod retention;
pub mod services;
mod transport;
#[cfg(feature = "http")]
pub mod web;

pub use config::SweepConfig;
pub use credentials::Credentials;
pub use models::{DeletionRecord, Item, ItemKind, SourceTag};
pub use retention::{RetentionPolicy, RetentionRule};
pub use services::{
    ArchiveLogger, ArchiveSync, CleanupOrchestrator, CleanupReport, RetryConfig, RetryingMutator,
};

/// Error type for redsweep operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Class |
/// |---------|-------------|-------|
/// | `RateLimited` | HTTP 429 or a `RATELIMIT` API error | Retryable |
/// | `Api` | Platform rejects a request (edit/delete refused, bad listing) | Item-fatal |
/// | `NotFound` | An item fetched by id no longer exists | Item-fatal |
/// | `MissingReplyCount` | Reply-aware rule evaluated on an unrefreshed comment | Item-fatal |
/// | `Transport` | Timeout, connect failure or unreadable body on a platform call | Item-fatal |
/// | `Unauthorized` | Token grant rejected, 401 from the API after one token renewal | Run-fatal |
/// | `CredentialsNotFound` | No env vars, no credentials file, prompting disabled | Run-fatal |
/// | `RemoteFolderInaccessible` | Sync folder missing or not shared | Run-fatal |
/// | `InvalidInput` | Bad rule name, cutoff mode with a score-aware rule | Run-fatal |
/// | `OperationFailed` | Archive I/O, token grant and local parse failures | Run-fatal |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The platform asked us to slow down.
    ///
    /// `retry_after` carries the server-suggested delay when one was sent.
    #[error("rate limited{}", retry_after.map_or_else(String::new, |d| format!(" (retry after {}s)", d.as_secs())))]
    RateLimited {
        /// Server-suggested delay before the next attempt.
        retry_after: Option<Duration>,
    },

    /// The platform rejected a request.
    #[error("api error (status {status}): {message}")]
    Api {
        /// HTTP status code, or 200 for errors reported in a JSON body.
        status: u16,
        /// Message extracted from the response.
        message: String,
    },

    /// The requested item does not exist (or is already gone).
    #[error("not found: {0}")]
    NotFound(String),

    /// A reply-count-aware rule was evaluated before the reply count was refreshed.
    #[error("reply count not populated for {id}; refresh the item before evaluating")]
    MissingReplyCount {
        /// Fullname of the item.
        id: String,
    },

    /// A request never produced a usable response.
    #[error("transport error during '{operation}': {cause}")]
    Transport {
        /// The operation that was in flight.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No credential source yielded a complete credential set.
    #[error("credentials not found: {0}")]
    CredentialsNotFound(String),

    /// The configured remote sync folder cannot be reached.
    #[error("remote folder '{folder_id}' is not accessible: {hint}")]
    RemoteFolderInaccessible {
        /// Folder identifier.
        folder_id: String,
        /// What the user should do about it.
        hint: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// How the orchestrator should react to an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Handled by the retry loop; surfaces only once the schedule is exhausted.
    Retryable,
    /// Fatal for the current item only; the run continues.
    ItemFatal,
    /// Aborts the whole run.
    RunFatal,
}

impl Error {
    /// Classifies this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. } => ErrorClass::Retryable,
            Self::Api { .. }
            | Self::Transport { .. }
            | Self::NotFound(_)
            | Self::MissingReplyCount { .. } => ErrorClass::ItemFatal,
            Self::Unauthorized(_)
            | Self::CredentialsNotFound(_)
            | Self::RemoteFolderInaccessible { .. }
            | Self::InvalidInput(_)
            | Self::OperationFailed { .. } => ErrorClass::RunFatal,
        }
    }

    /// Shorthand for building an [`Error::OperationFailed`].
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Shorthand for building an [`Error::Transport`].
    pub fn transport(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for redsweep operations.
pub type Result<T> = std::result::Result<T, Error>;
