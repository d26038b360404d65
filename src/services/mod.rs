//! Cleanup services.
//!
//! Services sit between the entry points and the platform/remote boundaries:
//! the archive logger, the retrying mutator, the remote sync and the
//! orchestrator that drives a run.

mod archive;
mod cleanup;
mod mutator;
mod sync;

pub use archive::{ArchiveConfig, ArchiveLogger, DEFAULT_COMMENTS_FILE, DEFAULT_POSTS_FILE};
pub use cleanup::{
    CleanupOptions, CleanupOrchestrator, CleanupReport, ItemError, ItemStage, KindSummary,
    PREVIEW_TEXT_LIMIT, PreviewItem, RunState, SyncOutcome,
};
pub use mutator::{
    DEFAULT_BACKOFF_SECS, DEFAULT_MAX_ATTEMPTS, MutationFailure, MutationStage, RetryConfig,
    RetryingMutator, SCRUB_PLACEHOLDER, Sleeper, ThreadSleeper, with_retry,
};
pub use sync::{
    ArchiveSync, FOLDER_ID_ENV, SERVICE_ACCOUNT_KEY_ENV, SyncSettings, SyncTarget, SyncedFile,
};
