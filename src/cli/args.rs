//! Argument parsing helpers.

use crate::models::{ItemKind, SourceTag};
use crate::platform::ScanMode;
use crate::retention::{RetentionPolicy, RetentionRule};
use crate::services::CleanupOptions;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Parses a comma-separated kind list such as `comments,posts`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an unknown or empty list.
pub fn parse_kinds(s: &str) -> Result<Vec<ItemKind>> {
    let mut kinds = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind = ItemKind::parse(part).ok_or_else(|| {
            Error::InvalidInput(format!("unknown kind '{part}' (expected comments or posts)"))
        })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(Error::InvalidInput("no kinds given".to_string()));
    }
    Ok(kinds)
}

/// Validates a `YYYY-MM-DD` sync suffix.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless `s` is a real calendar date.
pub fn parse_date_suffix(s: &str) -> Result<String> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .filter(|date| date.format("%Y-%m-%d").to_string() == s)
        .map(|_| s.to_string())
        .ok_or_else(|| Error::InvalidInput(format!("date suffix '{s}' is not YYYY-MM-DD")))
}

/// Returns today's date as a sync suffix.
#[must_use]
pub fn today_suffix(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// One entry of the interactive menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractiveAction {
    /// Comments older than N days.
    StaleComments,
    /// Comments with a score below one.
    LowScoreComments,
    /// Comments at or below one point with no replies, older than a week.
    LonelyComments,
    /// Posts older than N days.
    StalePosts,
    /// Leave the menu.
    Quit,
}

impl InteractiveAction {
    /// Returns all entries in menu order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::StaleComments,
            Self::LowScoreComments,
            Self::LonelyComments,
            Self::StalePosts,
            Self::Quit,
        ]
    }

    /// Menu label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::StaleComments => "Delete comments older than N days",
            Self::LowScoreComments => "Delete comments with a score below 1",
            Self::LonelyComments => "Delete comments with 1 point or less, no replies, older than a week",
            Self::StalePosts => "Delete posts older than N days",
            Self::Quit => "Quit",
        }
    }

    /// Returns true when the entry needs an age in days.
    #[must_use]
    pub const fn needs_days(&self) -> bool {
        matches!(self, Self::StaleComments | Self::StalePosts)
    }

    /// Builds run options, or `None` for [`Self::Quit`].
    ///
    /// `days` is ignored by entries that do not need it. Age-only entries
    /// stop scanning at the first item older than the threshold.
    #[must_use]
    pub fn options(&self, days: u32, dry_run: bool) -> Option<CleanupOptions> {
        let (rule, kind) = match self {
            Self::StaleComments => (RetentionRule::StaleOnly, ItemKind::Comment),
            Self::LowScoreComments => (RetentionRule::ScoreBelowOne, ItemKind::Comment),
            Self::LonelyComments => (RetentionRule::NonPositiveOrLonelyStale, ItemKind::Comment),
            Self::StalePosts => (RetentionRule::StaleOnly, ItemKind::Post),
            Self::Quit => return None,
        };
        let mut policy = RetentionPolicy::default().with_rule(rule);
        let mut scan_mode = ScanMode::Full;
        if self.needs_days() {
            policy = policy.with_age_threshold_days(days);
            scan_mode = ScanMode::CutoffOptimized;
        }
        Some(
            CleanupOptions::new(policy)
                .with_kinds(&[kind])
                .with_source(SourceTag::Cli)
                .with_dry_run(dry_run)
                .with_scan_mode(scan_mode),
        )
    }
}
