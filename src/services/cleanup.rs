//! Cleanup orchestration.
//!
//! One run walks each kind newest-first, decides per item, archives and
//! mutates the retired ones, then syncs the logs once at the end.
//!
//! ```text
//! Idle → (auth check) → Scanning(kind) → {Mutating | Skipping} → … → Syncing → Done
//!                     ↘ Aborted
//! ```
//!
//! The orchestrator is the only place that branches on
//! [`crate::ErrorClass`]: item-fatal errors are recorded and the scan moves
//! on, run-fatal errors abort the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use redsweep::services::{CleanupOptions, CleanupOrchestrator, RetryConfig};
//!
//! let options = CleanupOptions::new(policy).with_dry_run(true);
//! let report = CleanupOrchestrator::new(&client, options, RetryConfig::default())
//!     .with_archive(config.archive.clone())
//!     .run("my_username")?;
//! println!("{}", report.summary());
//! ```

use super::archive::{ArchiveConfig, ArchiveLogger};
use super::mutator::{MutationStage, RetryConfig, RetryingMutator, Sleeper, ThreadSleeper};
use super::sync::{ArchiveSync, SyncedFile};
use crate::models::{Item, ItemKind, SourceTag};
use crate::platform::{Platform, ScanDecider, ScanMode, ScanPaginator};
use crate::retention::RetentionPolicy;
use crate::{Error, ErrorClass, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, instrument, warn};

/// Longest text excerpt returned by [`CleanupOrchestrator::preview`].
pub const PREVIEW_TEXT_LIMIT: usize = 300;

/// Safely converts Duration to milliseconds as u64, capping at `u64::MAX`.
#[inline]
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Where a run ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started.
    Idle,
    /// Walking one kind's listing.
    Scanning(ItemKind),
    /// Uploading the logs.
    Syncing,
    /// Finished.
    Done,
    /// Stopped by a run-fatal error.
    Aborted,
}

/// Per-run options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Retention policy.
    pub policy: RetentionPolicy,
    /// Decision mode.
    pub scan_mode: ScanMode,
    /// Tag written into every record.
    pub source: SourceTag,
    /// Scan and decide only.
    pub dry_run: bool,
    /// Kinds to process, in order.
    pub kinds: Vec<ItemKind>,
    /// Dated sync suffix; `None` syncs stable names.
    pub dated_suffix: Option<String>,
}

impl CleanupOptions {
    /// Creates options for `policy` with every kind, full scans and the `cli` tag.
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            scan_mode: ScanMode::Full,
            source: SourceTag::Cli,
            dry_run: false,
            kinds: ItemKind::all().to_vec(),
            dated_suffix: None,
        }
    }

    /// Sets the scan mode.
    #[must_use]
    pub const fn with_scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = mode;
        self
    }

    /// Sets the source tag.
    #[must_use]
    pub const fn with_source(mut self, source: SourceTag) -> Self {
        self.source = source;
        self
    }

    /// Enables or disables dry-run.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Restricts the kinds processed. Duplicates are dropped.
    #[must_use]
    pub fn with_kinds(mut self, kinds: &[ItemKind]) -> Self {
        self.kinds.clear();
        for kind in kinds {
            if !self.kinds.contains(kind) {
                self.kinds.push(*kind);
            }
        }
        self
    }

    /// Sets the dated sync suffix.
    #[must_use]
    pub fn with_dated_suffix(mut self, suffix: Option<String>) -> Self {
        self.dated_suffix = suffix;
        self
    }
}

/// Counts for one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    /// Kind.
    pub kind: ItemKind,
    /// Items pulled from the listing.
    pub scanned: usize,
    /// Items the policy retired (in dry-run: would retire).
    pub matched: usize,
    /// Items scrubbed and removed.
    pub mutated: usize,
    /// Items kept.
    pub skipped: usize,
    /// Items that hit an item-fatal error.
    pub failed: usize,
    /// Listing error that ended this kind early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
}

impl KindSummary {
    const fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            scanned: 0,
            matched: 0,
            mutated: 0,
            skipped: 0,
            failed: 0,
            scan_error: None,
        }
    }
}

/// Step at which an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStage {
    /// Looking the item up by id.
    Fetch,
    /// Refreshing the reply count.
    Refresh,
    /// Applying the policy.
    Evaluate,
    /// Overwriting content.
    Scrub,
    /// Removing; the content was already overwritten.
    Remove,
}

impl From<MutationStage> for ItemStage {
    fn from(stage: MutationStage) -> Self {
        match stage {
            MutationStage::Scrub => Self::Scrub,
            MutationStage::Remove => Self::Remove,
        }
    }
}

impl ItemStage {
    /// Returns the stage as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Refresh => "refresh",
            Self::Evaluate => "evaluate",
            Self::Scrub => "scrub",
            Self::Remove => "remove",
        }
    }
}

/// An item-fatal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    /// Kind.
    pub kind: ItemKind,
    /// Fullname.
    pub id: String,
    /// Community, empty when the item could not be fetched.
    pub subreddit: String,
    /// Failed step.
    pub stage: ItemStage,
    /// Underlying error message.
    pub message: String,
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outcome = match self.stage {
            ItemStage::Remove => " (scrubbed but not removed)",
            _ => "",
        };
        if self.subreddit.is_empty() {
            write!(f, "{} {}: {} failed{outcome}: {}", self.kind, self.id, self.stage.as_str(), self.message)
        } else {
            write!(
                f,
                "{} {} in r/{}: {} failed{outcome}: {}",
                self.kind,
                self.id,
                self.subreddit,
                self.stage.as_str(),
                self.message
            )
        }
    }
}

/// What happened to the remote sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No remote folder configured.
    NotConfigured,
    /// Dry-run: nothing uploaded.
    DryRun,
    /// No log file exists yet.
    NothingToSync,
    /// Files uploaded.
    Uploaded {
        /// Uploaded files.
        files: Vec<SyncedFile>,
    },
    /// The sync failed; mutations already made are kept.
    Skipped {
        /// Why.
        reason: String,
    },
}

impl SyncOutcome {
    /// Returns the uploaded files, if any.
    #[must_use]
    pub fn files(&self) -> &[SyncedFile] {
        match self {
            Self::Uploaded { files } => files,
            _ => &[],
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Run identifier, also attached to the tracing span.
    pub run_id: String,
    /// Final state.
    pub state: RunState,
    /// Whether this was a dry-run.
    pub dry_run: bool,
    /// Policy used.
    pub policy: RetentionPolicy,
    /// Per-kind counts.
    pub kinds: Vec<KindSummary>,
    /// Item-fatal failures.
    pub errors: Vec<ItemError>,
    /// Remote sync outcome.
    pub sync: SyncOutcome,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl CleanupReport {
    /// Total items scrubbed and removed.
    #[must_use]
    pub fn total_mutated(&self) -> usize {
        self.kinds.iter().map(|k| k.mutated).sum()
    }

    /// Total items the policy retired.
    #[must_use]
    pub fn total_matched(&self) -> usize {
        self.kinds.iter().map(|k| k.matched).sum()
    }

    /// Total item-fatal failures.
    #[must_use]
    pub fn total_failed(&self) -> usize {
        self.kinds.iter().map(|k| k.failed).sum()
    }

    /// Returns true when any item failed or a listing ended early.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.kinds.iter().any(|k| k.scan_error.is_some())
    }

    /// Returns the summary for `kind`.
    #[must_use]
    pub fn kind(&self, kind: ItemKind) -> Option<&KindSummary> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    /// Multi-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let verb = if self.dry_run { "would delete" } else { "deleted" };
        let _ = writeln!(out, "Policy: {}", self.policy.describe());
        for k in &self.kinds {
            let _ = write!(
                out,
                "{}: scanned {}, {verb} {}, kept {}",
                k.kind.plural(),
                k.scanned,
                if self.dry_run { k.matched } else { k.mutated },
                k.skipped
            );
            if k.failed > 0 {
                let _ = write!(out, ", failed {}", k.failed);
            }
            if let Some(err) = &k.scan_error {
                let _ = write!(out, " (listing stopped early: {err})");
            }
            out.push('\n');
        }
        for err in &self.errors {
            let _ = writeln!(out, "  error: {err}");
        }
        match &self.sync {
            SyncOutcome::Uploaded { files } => {
                for file in files {
                    let _ = writeln!(out, "Uploaded {} -> {}", file.name, file.url);
                }
            },
            SyncOutcome::Skipped { reason } => {
                let _ = writeln!(out, "Sync skipped: {reason}");
            },
            SyncOutcome::NotConfigured | SyncOutcome::DryRun | SyncOutcome::NothingToSync => {},
        }
        out.trim_end().to_string()
    }
}

/// One listed item with its decision, for selection front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewItem {
    /// Kind.
    pub kind: ItemKind,
    /// Fullname.
    pub id: String,
    /// Body or title, truncated.
    pub text: String,
    /// Score.
    pub score: i64,
    /// Community.
    pub subreddit: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Absolute URL.
    pub permalink: String,
    /// Comment count, posts only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_comments: Option<u32>,
    /// Policy decision; `None` when it needs a reply-count refresh.
    pub matches_policy: Option<bool>,
}

/// Shared per-run machinery.
struct RunContext<'r> {
    mutator: RetryingMutator<'r>,
    logger: Option<ArchiveLogger>,
    kinds: Vec<KindSummary>,
    errors: Vec<ItemError>,
}

impl RunContext<'_> {
    fn summary_mut(&mut self, kind: ItemKind) -> &mut KindSummary {
        if let Some(index) = self.kinds.iter().position(|k| k.kind == kind) {
            return &mut self.kinds[index];
        }
        self.kinds.push(KindSummary::new(kind));
        let last = self.kinds.len() - 1;
        &mut self.kinds[last]
    }

    /// Records an item failure, or propagates it when it is run-fatal.
    fn fail(&mut self, item_kind: ItemKind, id: &str, subreddit: &str, stage: ItemStage, err: Error) -> Result<()> {
        if err.class() == ErrorClass::RunFatal {
            return Err(err);
        }
        warn!(
            kind = %item_kind,
            id,
            subreddit,
            stage = stage.as_str(),
            error = %err,
            "Item failed"
        );
        metrics::counter!("cleanup_items_total", "kind" => item_kind.as_str(), "outcome" => "failed")
            .increment(1);
        self.summary_mut(item_kind).failed += 1;
        self.errors.push(ItemError {
            kind: item_kind,
            id: id.to_string(),
            subreddit: subreddit.to_string(),
            stage,
            message: err.to_string(),
        });
        Ok(())
    }

    /// Archives then mutates one retired item.
    fn retire(&mut self, item: &Item, source: SourceTag) -> Result<()> {
        let kind = item.kind();
        if let Some(logger) = self.logger.as_mut() {
            logger.record(item, source)?;
        }
        match self.mutator.mutate(item) {
            Ok(()) => {
                self.summary_mut(kind).mutated += 1;
                metrics::counter!("cleanup_items_total", "kind" => kind.as_str(), "outcome" => "mutated")
                    .increment(1);
                info!(kind = %kind, id = %item.id(), subreddit = %item.base().subreddit, "Deleted item");
                Ok(())
            },
            Err(failure) => {
                let base = item.base();
                self.fail(kind, &base.id, &base.subreddit, failure.stage.into(), failure.source)
            },
        }
    }
}

/// Runs cleanups against a platform.
pub struct CleanupOrchestrator<'a> {
    platform: &'a dyn Platform,
    options: CleanupOptions,
    retry: RetryConfig,
    archive: ArchiveConfig,
    sync: Option<ArchiveSync>,
    sleeper: Arc<dyn Sleeper>,
    now: Option<DateTime<Utc>>,
}

impl<'a> CleanupOrchestrator<'a> {
    /// Creates an orchestrator with the default archive location and no sync.
    #[must_use]
    pub fn new(platform: &'a dyn Platform, options: CleanupOptions, retry: RetryConfig) -> Self {
        Self {
            platform,
            options,
            retry,
            archive: ArchiveConfig::default(),
            sync: None,
            sleeper: Arc::new(ThreadSleeper),
            now: None,
        }
    }

    /// Sets where archive logs are written.
    #[must_use]
    pub fn with_archive(mut self, archive: ArchiveConfig) -> Self {
        self.archive = archive;
        self
    }

    /// Enables remote sync.
    #[must_use]
    pub fn with_sync(mut self, sync: ArchiveSync) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Enables remote sync when `sync` is `Some`.
    #[must_use]
    pub fn with_optional_sync(mut self, sync: Option<ArchiveSync>) -> Self {
        self.sync = sync;
        self
    }

    /// Replaces the sleeper used for backoff waits.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Pins the evaluation clock.
    #[must_use]
    pub const fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Returns the options.
    #[must_use]
    pub const fn options(&self) -> &CleanupOptions {
        &self.options
    }

    fn mutator(&self) -> RetryingMutator<'a> {
        RetryingMutator::new(self.platform, self.retry.clone()).with_sleeper(Arc::clone(&self.sleeper))
    }

    fn context(&self) -> RunContext<'a> {
        RunContext {
            mutator: self.mutator(),
            logger: (!self.options.dry_run).then(|| ArchiveLogger::new(self.archive.clone())),
            kinds: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Fails the run unless the platform session belongs to `username`.
    fn check_auth(&self, username: &str) -> Result<()> {
        let me = self.mutator().retry("auth check", || self.platform.authenticated_user())?;
        if me.eq_ignore_ascii_case(username) {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "session belongs to '{me}', not '{username}'"
            )))
        }
    }

    /// Runs one cleanup for `username`.
    ///
    /// # Errors
    ///
    /// Returns an error when authentication fails before scanning, when an
    /// archive record cannot be written, or on any other run-fatal error.
    /// Item-fatal errors are reported in [`CleanupReport::errors`].
    pub fn run(&self, username: &str) -> Result<CleanupReport> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!(
            "redsweep.cleanup",
            run_id = %run_id,
            source = %self.options.source,
            dry_run = self.options.dry_run,
            rule = %self.options.policy.rule,
            threshold_days = self.options.policy.age_threshold_days
        );
        let _enter = span.enter();

        let now = self.now.unwrap_or_else(Utc::now);
        // Reject invalid option combinations before touching the platform.
        ScanDecider::new(self.options.policy, self.options.scan_mode, now)?;

        let result = self.run_inner(username, now);
        let (kinds, errors, sync) = match result {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, state = ?RunState::Aborted, "Cleanup aborted");
                return Err(e);
            },
        };

        let report = CleanupReport {
            run_id,
            state: RunState::Done,
            dry_run: self.options.dry_run,
            policy: self.options.policy,
            kinds,
            errors,
            sync,
            duration_ms: duration_to_millis(start.elapsed()),
        };

        metrics::histogram!("cleanup_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);
        info!(
            matched = report.total_matched(),
            mutated = report.total_mutated(),
            failed = report.total_failed(),
            duration_ms = report.duration_ms,
            "Cleanup finished"
        );
        Ok(report)
    }

    fn run_inner(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<(Vec<KindSummary>, Vec<ItemError>, SyncOutcome)> {
        self.check_auth(username)?;

        let mut ctx = self.context();
        let paginator = ScanPaginator::new(self.platform, self.retry.clone())
            .with_sleeper(Arc::clone(&self.sleeper));

        for kind in &self.options.kinds {
            if !self.options.policy.applies_to(*kind) {
                debug!(kind = %kind, "Rule does not apply to this kind, not scanning");
                continue;
            }
            self.scan_kind(&mut ctx, &paginator, username, *kind, now)?;
        }

        let sync = self.finish_sync(ctx.logger.take());
        Ok((ctx.kinds, ctx.errors, sync))
    }

    #[instrument(name = "redsweep.cleanup.scan", skip(self, ctx, paginator, username, now), fields(kind = %kind))]
    fn scan_kind(
        &self,
        ctx: &mut RunContext<'_>,
        paginator: &ScanPaginator<'_>,
        username: &str,
        kind: ItemKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        debug!(state = ?RunState::Scanning(kind), "Scanning");
        ctx.summary_mut(kind);
        let policy = self.options.policy;
        let mut decider = ScanDecider::new(policy, self.options.scan_mode, now)?;

        for result in paginator.scan(username, kind) {
            let mut item = match result {
                Ok(item) => item,
                Err(e) if e.class() == ErrorClass::RunFatal => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Listing failed, moving on to the next kind");
                    ctx.summary_mut(kind).scan_error = Some(e.to_string());
                    break;
                },
            };
            ctx.summary_mut(kind).scanned += 1;

            if policy.requires_reply_count() {
                if let Item::Comment(comment) = &mut item {
                    if comment.reply_count.is_none() {
                        let refreshed = ctx.mutator.retry("comment refresh", || {
                            self.platform.refresh_reply_count(comment)
                        });
                        match refreshed {
                            Ok(count) => comment.reply_count = Some(count),
                            Err(e) => {
                                let base = comment.base.clone();
                                ctx.fail(kind, &base.id, &base.subreddit, ItemStage::Refresh, e)?;
                                continue;
                            },
                        }
                    }
                }
            }

            let delete = match decider.decide(&item) {
                Ok(delete) => delete,
                Err(e) => {
                    let base = item.base();
                    ctx.fail(kind, &base.id, &base.subreddit, ItemStage::Evaluate, e)?;
                    continue;
                },
            };

            if !delete {
                ctx.summary_mut(kind).skipped += 1;
                metrics::counter!("cleanup_items_total", "kind" => kind.as_str(), "outcome" => "kept")
                    .increment(1);
                continue;
            }

            ctx.summary_mut(kind).matched += 1;
            if self.options.dry_run {
                info!(
                    id = %item.id(),
                    subreddit = %item.base().subreddit,
                    score = item.base().score,
                    "Would delete item"
                );
                continue;
            }
            ctx.retire(&item, self.options.source)?;
        }
        Ok(())
    }

    /// Uploads the logs once. Never fails the run.
    fn finish_sync(&self, logger: Option<ArchiveLogger>) -> SyncOutcome {
        let Some(logger) = logger else {
            return SyncOutcome::DryRun;
        };
        let Some(sync) = &self.sync else {
            return SyncOutcome::NotConfigured;
        };
        debug!(state = ?RunState::Syncing, "Syncing archive logs");

        let written = logger.paths_written().to_vec();
        let files: Vec<PathBuf> = logger
            .log_paths()
            .into_iter()
            .filter(|path| written.contains(path) || path.exists())
            .collect();
        drop(logger);
        if files.is_empty() {
            return SyncOutcome::NothingToSync;
        }

        match sync.sync(&files, self.options.dated_suffix.as_deref()) {
            Ok(files) => SyncOutcome::Uploaded { files },
            Err(e) => {
                warn!(error = %e, "Archive sync failed, mutations are kept");
                SyncOutcome::Skipped {
                    reason: e.to_string(),
                }
            },
        }
    }

    /// Retires explicitly selected items, bypassing the policy.
    ///
    /// Each id is fetched, archived with the run's source tag and mutated.
    /// The logs are synced once at the end.
    ///
    /// # Errors
    ///
    /// Same run-fatal conditions as [`Self::run`].
    pub fn delete_by_ids(&self, username: &str, ids: &[(ItemKind, String)]) -> Result<CleanupReport> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!(
            "redsweep.cleanup.selected",
            run_id = %run_id,
            source = %self.options.source,
            count = ids.len()
        );
        let _enter = span.enter();

        self.check_auth(username)?;
        let mut ctx = self.context();
        for kind in ItemKind::all() {
            if ids.iter().any(|(k, _)| k == kind) {
                ctx.summary_mut(*kind);
            }
        }

        for (kind, id) in ids {
            let fullname = kind.fullname(id);
            ctx.summary_mut(*kind).scanned += 1;
            let item = match ctx.mutator.retry("fetch", || self.platform.fetch(*kind, &fullname)) {
                Ok(item) => item,
                Err(e) => {
                    ctx.fail(*kind, &fullname, "", ItemStage::Fetch, e)?;
                    continue;
                },
            };
            ctx.summary_mut(*kind).matched += 1;
            if self.options.dry_run {
                continue;
            }
            ctx.retire(&item, self.options.source)?;
        }

        let sync = self.finish_sync(ctx.logger.take());
        Ok(CleanupReport {
            run_id,
            state: RunState::Done,
            dry_run: self.options.dry_run,
            policy: self.options.policy,
            kinds: ctx.kinds,
            errors: ctx.errors,
            sync,
            duration_ms: duration_to_millis(start.elapsed()),
        })
    }

    /// Lists up to `limit` items per kind with their policy decision.
    ///
    /// Read-only. Items whose decision needs a reply-count refresh report
    /// `matches_policy: None`.
    ///
    /// # Errors
    ///
    /// Returns the first listing error.
    pub fn preview(&self, username: &str, limit: Option<usize>) -> Result<Vec<PreviewItem>> {
        let now = self.now.unwrap_or_else(Utc::now);
        let policy = self.options.policy;
        let limit = limit.unwrap_or(usize::MAX);
        let paginator = ScanPaginator::new(self.platform, self.retry.clone())
            .with_sleeper(Arc::clone(&self.sleeper));

        let mut out = Vec::new();
        for kind in &self.options.kinds {
            for result in paginator.scan(username, *kind).take(limit) {
                let item = result?;
                let matches_policy = match policy.evaluate(&item, now) {
                    Ok(decision) => Some(decision),
                    Err(Error::MissingReplyCount { .. }) => None,
                    Err(e) => return Err(e),
                };
                out.push(preview_item(&item, matches_policy));
            }
        }
        debug!(count = out.len(), "Built preview");
        Ok(out)
    }
}

fn preview_item(item: &Item, matches_policy: Option<bool>) -> PreviewItem {
    let base = item.base();
    let text: String = item.text().chars().take(PREVIEW_TEXT_LIMIT).collect();
    PreviewItem {
        kind: item.kind(),
        id: base.id.clone(),
        text,
        score: base.score,
        subreddit: base.subreddit.clone(),
        created_at: base.created_at,
        permalink: base.permalink.clone(),
        num_comments: match item {
            Item::Post(p) => Some(p.reply_count),
            Item::Comment(_) => None,
        },
        matches_policy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, ItemBase};

    fn report(dry_run: bool) -> CleanupReport {
        CleanupReport {
            run_id: "run".to_string(),
            state: RunState::Done,
            dry_run,
            policy: RetentionPolicy::default(),
            kinds: vec![
                KindSummary {
                    kind: ItemKind::Comment,
                    scanned: 10,
                    matched: 4,
                    mutated: 3,
                    skipped: 6,
                    failed: 1,
                    scan_error: None,
                },
                KindSummary {
                    kind: ItemKind::Post,
                    scanned: 2,
                    matched: 1,
                    mutated: 1,
                    skipped: 1,
                    failed: 0,
                    scan_error: Some("api error (status 500): boom".to_string()),
                },
            ],
            errors: vec![ItemError {
                kind: ItemKind::Comment,
                id: "t1_x".to_string(),
                subreddit: "rust".to_string(),
                stage: ItemStage::Remove,
                message: "api error (status 403): forbidden".to_string(),
            }],
            sync: SyncOutcome::Skipped {
                reason: "network".to_string(),
            },
            duration_ms: 5,
        }
    }

    #[test]
    fn test_options_defaults_and_builders() {
        let options = CleanupOptions::new(RetentionPolicy::default());
        assert_eq!(options.kinds, vec![ItemKind::Comment, ItemKind::Post]);
        assert_eq!(options.source, SourceTag::Cli);
        assert!(!options.dry_run);

        let options = options
            .with_kinds(&[ItemKind::Post, ItemKind::Post])
            .with_source(SourceTag::Scheduled)
            .with_dry_run(true);
        assert_eq!(options.kinds, vec![ItemKind::Post]);
        assert_eq!(options.source, SourceTag::Scheduled);
        assert!(options.dry_run);
    }

    #[test]
    fn test_report_totals() {
        let report = report(false);
        assert_eq!(report.total_mutated(), 4);
        assert_eq!(report.total_matched(), 5);
        assert_eq!(report.total_failed(), 1);
        assert!(report.has_errors());
        assert_eq!(report.kind(ItemKind::Post).map(|k| k.scanned), Some(2));
    }

    #[test]
    fn test_summary_text() {
        let summary = report(false).summary();
        assert!(summary.contains("comments: scanned 10, deleted 3, kept 6, failed 1"));
        assert!(summary.contains("listing stopped early"));
        assert!(summary.contains("t1_x in r/rust: remove failed (scrubbed but not removed)"));
        assert!(summary.contains("Sync skipped: network"));

        let summary = report(true).summary();
        assert!(summary.contains("comments: scanned 10, would delete 4"));
    }

    #[test]
    fn test_sync_outcome_serializes_with_status() {
        let json = serde_json::to_value(SyncOutcome::Uploaded {
            files: vec![SyncedFile {
                name: "a.txt".to_string(),
                url: "https://drive.google.com/file/d/1/view".to_string(),
            }],
        })
        .unwrap();
        assert_eq!(json["status"], "uploaded");
        assert_eq!(json["files"][0]["name"], "a.txt");
        assert_eq!(
            serde_json::to_value(SyncOutcome::NotConfigured).unwrap()["status"],
            "not_configured"
        );
    }

    #[test]
    fn test_preview_item_truncates_text() {
        let item = Item::Comment(Comment {
            base: ItemBase {
                id: "t1_a".to_string(),
                created_at: Utc::now(),
                score: 1,
                subreddit: "rust".to_string(),
                permalink: "https://reddit.com/x".to_string(),
            },
            body: "é".repeat(500),
            link_id: "t3_p".to_string(),
            reply_count: None,
        });
        let preview = preview_item(&item, Some(true));
        assert_eq!(preview.text.chars().count(), PREVIEW_TEXT_LIMIT);
        assert_eq!(preview.num_comments, None);
    }
}
