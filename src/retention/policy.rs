//! Retention rules and the decision predicate.

use crate::models::{Item, ItemKind};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable overriding the age threshold in days.
pub const RETENTION_DAYS_ENV: &str = "REDSWEEP_RETENTION_DAYS";

/// Environment variable overriding the retention rule.
pub const RETENTION_RULE_ENV: &str = "REDSWEEP_RETENTION_RULE";

/// Default age threshold in days.
pub const DEFAULT_AGE_THRESHOLD_DAYS: u32 = 14;

/// Fixed age window of the lonely-comment rule, in days.
pub const LONELY_AGE_DAYS: i64 = 7;

/// The boolean combination deciding whether an item is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionRule {
    /// `score < 1`.
    ScoreBelowOne,
    /// `score < 1`, or `score == 1` and older than the threshold.
    #[default]
    ScoreBelowOneOrStaleAtOne,
    /// Older than the threshold, regardless of score.
    StaleOnly,
    /// `score <= 0`, or `score <= 1` with no replies and older than a week.
    ///
    /// Comments only. Requires a refreshed reply count.
    NonPositiveOrLonelyStale,
}

impl RetentionRule {
    /// Returns all rules.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ScoreBelowOne,
            Self::ScoreBelowOneOrStaleAtOne,
            Self::StaleOnly,
            Self::NonPositiveOrLonelyStale,
        ]
    }

    /// Returns the rule name used in config files and CLI flags.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ScoreBelowOne => "score-below-one",
            Self::ScoreBelowOneOrStaleAtOne => "score-below-one-or-stale-at-one",
            Self::StaleOnly => "stale-only",
            Self::NonPositiveOrLonelyStale => "non-positive-or-lonely-stale",
        }
    }

    /// Parses a rule name, accepting `_` in place of `-`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "score-below-one" => Some(Self::ScoreBelowOne),
            "score-below-one-or-stale-at-one" | "weekly" => Some(Self::ScoreBelowOneOrStaleAtOne),
            "stale-only" | "age" => Some(Self::StaleOnly),
            "non-positive-or-lonely-stale" | "lonely" => Some(Self::NonPositiveOrLonelyStale),
            _ => None,
        }
    }
}

impl FromStr for RetentionRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            let known: Vec<&str> = Self::all().iter().map(Self::as_str).collect();
            Error::InvalidInput(format!(
                "unknown retention rule '{s}' (expected one of: {})",
                known.join(", ")
            ))
        })
    }
}

impl fmt::Display for RetentionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Age threshold in whole days. Items exactly this old are kept.
    pub age_threshold_days: u32,
    /// Decision rule.
    pub rule: RetentionRule,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            age_threshold_days: DEFAULT_AGE_THRESHOLD_DAYS,
            rule: RetentionRule::default(),
        }
    }
}

impl RetentionPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(rule: RetentionRule, age_threshold_days: u32) -> Self {
        Self {
            age_threshold_days,
            rule,
        }
    }

    /// Sets the age threshold.
    #[must_use]
    pub const fn with_age_threshold_days(mut self, days: u32) -> Self {
        self.age_threshold_days = days;
        self
    }

    /// Sets the rule.
    #[must_use]
    pub const fn with_rule(mut self, rule: RetentionRule) -> Self {
        self.rule = rule;
        self
    }

    /// Applies `REDSWEEP_RETENTION_RULE` and `REDSWEEP_RETENTION_DAYS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the rule variable names an unknown rule.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::with_env_overrides`] with an injectable lookup.
    ///
    /// Blank values are ignored. An unparseable day count is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the rule variable names an unknown rule.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(RETENTION_RULE_ENV) {
            self.rule = v.parse()?;
        }
        if let Some(v) = non_empty(RETENTION_DAYS_ENV) {
            match v.trim().parse::<u32>() {
                Ok(days) => self.age_threshold_days = days,
                Err(e) => tracing::warn!(value = %v, error = %e, "Ignoring {RETENTION_DAYS_ENV}"),
            }
        }
        Ok(self)
    }

    /// Returns true when the rule depends on age alone.
    ///
    /// Only age-only policies are monotonic over a newest-first stream.
    #[must_use]
    pub const fn is_age_only(&self) -> bool {
        matches!(self.rule, RetentionRule::StaleOnly)
    }

    /// Returns true when items must have a refreshed reply count.
    #[must_use]
    pub const fn requires_reply_count(&self) -> bool {
        matches!(self.rule, RetentionRule::NonPositiveOrLonelyStale)
    }

    /// Returns true when the policy can retire items of `kind`.
    #[must_use]
    pub const fn applies_to(&self, kind: ItemKind) -> bool {
        match self.rule {
            RetentionRule::NonPositiveOrLonelyStale => matches!(kind, ItemKind::Comment),
            _ => true,
        }
    }

    /// Returns the instant before which items count as stale.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.age_threshold_days))
    }

    /// Returns true when `item` is strictly older than the threshold.
    #[must_use]
    pub fn is_past_threshold(&self, item: &Item, now: DateTime<Utc>) -> bool {
        item.age_days_at(now) > i64::from(self.age_threshold_days)
    }

    /// Decides whether `item` should be retired. See [`evaluate`].
    pub fn evaluate(&self, item: &Item, now: DateTime<Utc>) -> Result<bool> {
        evaluate(item, self, now)
    }

    /// Human-readable description of the policy.
    #[must_use]
    pub fn describe(&self) -> String {
        let days = self.age_threshold_days;
        match self.rule {
            RetentionRule::ScoreBelowOne => "score below 1 (any age)".to_string(),
            RetentionRule::ScoreBelowOneOrStaleAtOne => {
                format!("score below 1, or score of 1 and older than {days} days")
            },
            RetentionRule::StaleOnly => format!("older than {days} days (any score)"),
            RetentionRule::NonPositiveOrLonelyStale => format!(
                "comments with score 0 or less, or score 1 or less with no replies and older than {LONELY_AGE_DAYS} days"
            ),
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} days)", self.rule, self.age_threshold_days)
    }
}

/// Decides whether `item` should be retired under `policy` at `now`.
///
/// Pure: no I/O and no hidden state. Age is whole elapsed days compared
/// strictly, so an item exactly at the threshold is kept.
///
/// # Errors
///
/// Returns [`Error::MissingReplyCount`] when a reply-aware rule meets a
/// comment whose reply count was never refreshed.
pub fn evaluate(item: &Item, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<bool> {
    let score = item.base().score;
    let decision = match policy.rule {
        RetentionRule::ScoreBelowOne => score < 1,
        RetentionRule::ScoreBelowOneOrStaleAtOne => {
            score < 1 || (score == 1 && policy.is_past_threshold(item, now))
        },
        RetentionRule::StaleOnly => policy.is_past_threshold(item, now),
        RetentionRule::NonPositiveOrLonelyStale => match item {
            Item::Post(_) => false,
            Item::Comment(comment) => {
                let replies = comment.reply_count.ok_or_else(|| Error::MissingReplyCount {
                    id: comment.base.id.clone(),
                })?;
                score <= 0 || (score <= 1 && replies == 0 && item.age_days_at(now) > LONELY_AGE_DAYS)
            },
        },
    };
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, ItemBase, Post};
    use chrono::TimeZone;
    use test_case::test_case;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap()
    }

    fn base(score: i64, age_days: i64) -> ItemBase {
        ItemBase {
            id: "t1_test".to_string(),
            created_at: now() - Duration::days(age_days),
            score,
            subreddit: "test".to_string(),
            permalink: "https://reddit.com/r/test/t1_test".to_string(),
        }
    }

    fn comment(score: i64, age_days: i64, reply_count: Option<u32>) -> Item {
        Item::Comment(Comment {
            base: base(score, age_days),
            body: "body".to_string(),
            link_id: "t3_parent".to_string(),
            reply_count,
        })
    }

    fn post(score: i64, age_days: i64) -> Item {
        Item::Post(Post {
            base: base(score, age_days),
            title: "title".to_string(),
            reply_count: 0,
        })
    }

    #[test]
    fn test_overrides_apply_rule_and_days() {
        let lookup = |name: &str| match name {
            RETENTION_RULE_ENV => Some("stale-only".to_string()),
            RETENTION_DAYS_ENV => Some(" 30 ".to_string()),
            _ => None,
        };
        let policy = RetentionPolicy::default().with_overrides_from(lookup).unwrap();
        assert_eq!(policy, RetentionPolicy::new(RetentionRule::StaleOnly, 30));
    }

    #[test]
    fn test_unknown_override_rule_is_rejected() {
        let lookup = |name: &str| match name {
            RETENTION_RULE_ENV => Some("forever".to_string()),
            RETENTION_DAYS_ENV => Some("30".to_string()),
            _ => None,
        };
        let err = RetentionPolicy::default().with_overrides_from(lookup).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("forever")));
    }

    #[test]
    fn test_blank_and_bad_overrides_keep_defaults() {
        let lookup = |name: &str| match name {
            RETENTION_RULE_ENV => Some("  ".to_string()),
            RETENTION_DAYS_ENV => Some("two weeks".to_string()),
            _ => None,
        };
        let policy = RetentionPolicy::default().with_overrides_from(lookup).unwrap();
        assert_eq!(policy, RetentionPolicy::default());
    }

    #[test]
    fn test_default_policy() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.rule, RetentionRule::ScoreBelowOneOrStaleAtOne);
        assert_eq!(policy.age_threshold_days, 14);
    }

    #[test_case(RetentionRule::ScoreBelowOne, 0, 1 => true; "zero score one day old")]
    #[test_case(RetentionRule::ScoreBelowOne, 1, 1000 => false; "score one never old enough")]
    #[test_case(RetentionRule::ScoreBelowOneOrStaleAtOne, 1, 15 => true; "score one past threshold")]
    #[test_case(RetentionRule::ScoreBelowOneOrStaleAtOne, 1, 14 => false; "score one at boundary kept")]
    #[test_case(RetentionRule::ScoreBelowOneOrStaleAtOne, -3, 0 => true; "negative score any age")]
    #[test_case(RetentionRule::ScoreBelowOneOrStaleAtOne, 2, 400 => false; "score two kept")]
    #[test_case(RetentionRule::ScoreBelowOneOrStaleAtOne, 5, 1000 => false; "high score very old kept")]
    #[test_case(RetentionRule::StaleOnly, 500, 15 => true; "stale ignores score")]
    #[test_case(RetentionRule::StaleOnly, -10, 14 => false; "stale boundary kept")]
    fn test_rule_table(rule: RetentionRule, score: i64, age_days: i64) -> bool {
        let policy = RetentionPolicy::new(rule, 14);
        evaluate(&comment(score, age_days, None), &policy, now()).unwrap()
    }

    #[test]
    fn test_partial_day_does_not_cross_boundary() {
        let policy = RetentionPolicy::default();
        let mut item = comment(1, 14, None);
        if let Item::Comment(c) = &mut item {
            c.base.created_at -= Duration::hours(23);
        }
        assert!(!policy.evaluate(&item, now()).unwrap());
    }

    #[test_case(0, Some(5), 0 => true; "non positive always")]
    #[test_case(1, Some(0), 8 => true; "lonely and stale")]
    #[test_case(1, Some(0), 7 => false; "lonely at week boundary")]
    #[test_case(1, Some(2), 30 => false; "has replies")]
    #[test_case(2, Some(0), 30 => false; "score two")]
    fn test_lonely_rule(score: i64, replies: Option<u32>, age_days: i64) -> bool {
        let policy = RetentionPolicy::new(RetentionRule::NonPositiveOrLonelyStale, 14);
        evaluate(&comment(score, age_days, replies), &policy, now()).unwrap()
    }

    #[test]
    fn test_lonely_rule_requires_reply_count() {
        let policy = RetentionPolicy::new(RetentionRule::NonPositiveOrLonelyStale, 14);
        let err = evaluate(&comment(0, 30, None), &policy, now()).unwrap_err();
        assert!(matches!(err, Error::MissingReplyCount { ref id } if id == "t1_test"));
    }

    #[test]
    fn test_lonely_rule_keeps_posts() {
        let policy = RetentionPolicy::new(RetentionRule::NonPositiveOrLonelyStale, 14);
        assert!(!evaluate(&post(-5, 300), &policy, now()).unwrap());
        assert!(!policy.applies_to(ItemKind::Post));
        assert!(policy.applies_to(ItemKind::Comment));
    }

    #[test]
    fn test_policy_shape_helpers() {
        assert!(RetentionPolicy::new(RetentionRule::StaleOnly, 30).is_age_only());
        assert!(!RetentionPolicy::default().is_age_only());
        assert!(!RetentionPolicy::new(RetentionRule::ScoreBelowOne, 30).is_age_only());
        assert!(
            RetentionPolicy::new(RetentionRule::NonPositiveOrLonelyStale, 30).requires_reply_count()
        );
        assert!(!RetentionPolicy::default().requires_reply_count());
    }

    #[test]
    fn test_rule_parse() {
        for rule in RetentionRule::all() {
            assert_eq!(RetentionRule::parse(rule.as_str()), Some(*rule));
        }
        assert_eq!(
            RetentionRule::parse("STALE_ONLY"),
            Some(RetentionRule::StaleOnly)
        );
        let err = "everything".parse::<RetentionRule>().unwrap_err();
        assert!(err.to_string().contains("stale-only"));
    }

    #[test]
    fn test_describe_mentions_threshold() {
        let policy = RetentionPolicy::new(RetentionRule::StaleOnly, 30);
        assert!(policy.describe().contains("30 days"));
        assert_eq!(policy.to_string(), "stale-only (30 days)");
    }

    #[test]
    fn test_cutoff() {
        let policy = RetentionPolicy::new(RetentionRule::StaleOnly, 10);
        assert_eq!(policy.cutoff(now()), now() - Duration::days(10));
    }
}
