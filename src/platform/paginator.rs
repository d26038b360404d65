//! Lazy newest-first scans and per-item decisions.

use super::Platform;
use crate::models::{Item, ItemKind};
use crate::retention::RetentionPolicy;
use crate::services::{RetryConfig, Sleeper, ThreadSleeper, with_retry};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Maximum items requested per listing page.
pub const PAGE_LIMIT: u32 = 100;

/// How decisions are computed over a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Evaluate every item independently.
    #[default]
    Full,
    /// Stop recomputing age once the stream has crossed the cutoff.
    ///
    /// Valid only for age-only policies.
    CutoffOptimized,
}

impl ScanMode {
    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::CutoffOptimized => "cutoff-optimized",
        }
    }
}

/// Produces item streams from a platform.
pub struct ScanPaginator<'a> {
    platform: &'a dyn Platform,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl<'a> ScanPaginator<'a> {
    /// Creates a paginator. Page fetches retry on rate limiting under `retry`.
    #[must_use]
    pub fn new(platform: &'a dyn Platform, retry: RetryConfig) -> Self {
        Self {
            platform,
            retry,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replaces the sleeper used between page retries.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Starts a fresh listing of `user`'s items of `kind`.
    ///
    /// Nothing is fetched until the stream is polled.
    #[must_use]
    pub fn scan(&self, user: &str, kind: ItemKind) -> ItemStream<'_> {
        ItemStream {
            paginator: self,
            user: user.to_string(),
            kind,
            buffer: VecDeque::new(),
            after: None,
            exhausted: false,
            pages: 0,
        }
    }
}

/// A lazy, newest-first stream of items.
///
/// Unbounded and not restartable. After yielding an error the stream ends.
pub struct ItemStream<'p> {
    paginator: &'p ScanPaginator<'p>,
    user: String,
    kind: ItemKind,
    buffer: VecDeque<Item>,
    after: Option<String>,
    exhausted: bool,
    pages: u32,
}

impl ItemStream<'_> {
    /// Returns the number of pages fetched so far.
    #[must_use]
    pub const fn pages_fetched(&self) -> u32 {
        self.pages
    }

    fn fetch_page(&mut self) -> Result<()> {
        let platform = self.paginator.platform;
        let label = format!("{} listing", self.kind);
        let page = with_retry(
            &self.paginator.retry,
            self.paginator.sleeper.as_ref(),
            &label,
            || platform.list_page(&self.user, self.kind, self.after.as_deref(), PAGE_LIMIT),
        )?;
        self.pages += 1;
        debug!(
            kind = %self.kind,
            page = self.pages,
            items = page.items.len(),
            has_more = page.after.is_some(),
            "Fetched listing page"
        );
        if page.items.is_empty() || page.after.is_none() {
            self.exhausted = true;
        }
        self.after = page.after;
        self.buffer.extend(page.items);
        Ok(())
    }
}

impl Iterator for ItemStream<'_> {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

/// Stateful per-item decision over a newest-first stream.
#[derive(Debug, Clone)]
pub struct ScanDecider {
    policy: RetentionPolicy,
    mode: ScanMode,
    now: DateTime<Utc>,
    past_cutoff: bool,
}

impl ScanDecider {
    /// Creates a decider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when `mode` is
    /// [`ScanMode::CutoffOptimized`] and the policy also depends on score.
    pub fn new(policy: RetentionPolicy, mode: ScanMode, now: DateTime<Utc>) -> Result<Self> {
        if mode == ScanMode::CutoffOptimized && !policy.is_age_only() {
            return Err(Error::InvalidInput(format!(
                "cutoff-optimized scans require an age-only rule, got '{}'",
                policy.rule
            )));
        }
        Ok(Self {
            policy,
            mode,
            now,
            past_cutoff: false,
        })
    }

    /// Returns true once the stream has crossed the cutoff.
    #[must_use]
    pub const fn past_cutoff(&self) -> bool {
        self.past_cutoff
    }

    /// Decides whether `item` is retired.
    ///
    /// Items must be presented newest first.
    pub fn decide(&mut self, item: &Item) -> Result<bool> {
        match self.mode {
            ScanMode::Full => self.policy.evaluate(item, self.now),
            ScanMode::CutoffOptimized => {
                if !self.past_cutoff && self.policy.is_past_threshold(item, self.now) {
                    self.past_cutoff = true;
                    debug!(id = %item.id(), "Crossed retention cutoff");
                }
                Ok(self.past_cutoff)
            },
        }
    }
}

/// Adapts an item stream into `(item, delete)` decisions.
pub struct Decisions<I> {
    inner: I,
    decider: ScanDecider,
}

impl<I> Decisions<I>
where
    I: Iterator<Item = Result<Item>>,
{
    /// Wraps `inner`.
    ///
    /// # Errors
    ///
    /// See [`ScanDecider::new`].
    pub fn new(inner: I, policy: RetentionPolicy, mode: ScanMode, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            inner,
            decider: ScanDecider::new(policy, mode, now)?,
        })
    }
}

impl<I> Iterator for Decisions<I>
where
    I: Iterator<Item = Result<Item>>,
{
    type Item = Result<(Item, bool)>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.inner.next()? {
            Ok(item) => item,
            Err(e) => return Some(Err(e)),
        };
        Some(self.decider.decide(&item).map(|delete| (item, delete)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, ItemBase};
    use crate::platform::Page;
    use crate::retention::RetentionRule;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap()
    }

    fn comment(n: usize, score: i64, age_days: i64) -> Item {
        Item::Comment(Comment {
            base: ItemBase {
                id: format!("t1_{n}"),
                created_at: now() - Duration::days(age_days),
                score,
                subreddit: "test".to_string(),
                permalink: format!("https://reddit.com/r/test/{n}"),
            },
            body: "text".to_string(),
            link_id: "t3_p".to_string(),
            reply_count: None,
        })
    }

    /// Serves fixed pages; `fail_on` makes that page fetch fail.
    struct PagedPlatform {
        pages: Vec<Vec<Item>>,
        fail_on: Option<usize>,
        requests: Mutex<Vec<Option<String>>>,
    }

    impl Platform for PagedPlatform {
        fn authenticated_user(&self) -> Result<String> {
            Ok("me".to_string())
        }

        fn list_page(
            &self,
            _user: &str,
            _kind: ItemKind,
            after: Option<&str>,
            _limit: u32,
        ) -> Result<Page> {
            self.requests.lock().unwrap().push(after.map(str::to_string));
            let index = after.map_or(0, |a| a.trim_start_matches("page").parse().unwrap());
            if self.fail_on == Some(index) {
                return Err(Error::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            let next = index + 1;
            Ok(Page {
                items: self.pages[index].clone(),
                after: (next < self.pages.len()).then(|| format!("page{next}")),
            })
        }

        fn fetch(&self, _kind: ItemKind, id: &str) -> Result<Item> {
            Err(Error::NotFound(id.to_string()))
        }

        fn refresh_reply_count(&self, _comment: &Comment) -> Result<u32> {
            Ok(0)
        }

        fn scrub(&self, _item: &Item, _placeholder: &str) -> Result<()> {
            Ok(())
        }

        fn remove(&self, _item: &Item) -> Result<()> {
            Ok(())
        }
    }

    fn platform(pages: Vec<Vec<Item>>, fail_on: Option<usize>) -> PagedPlatform {
        PagedPlatform {
            pages,
            fail_on,
            requests: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_scan_walks_all_pages_in_order() {
        let p = platform(
            vec![
                vec![comment(1, 1, 1), comment(2, 1, 2)],
                vec![comment(3, 1, 3)],
            ],
            None,
        );
        let paginator = ScanPaginator::new(&p, RetryConfig::default());
        let ids: Vec<String> = paginator
            .scan("me", ItemKind::Comment)
            .map(|r| r.unwrap().id().to_string())
            .collect();
        assert_eq!(ids, vec!["t1_1", "t1_2", "t1_3"]);
        assert_eq!(
            *p.requests.lock().unwrap(),
            vec![None, Some("page1".to_string())]
        );
    }

    #[test]
    fn test_scan_is_lazy() {
        let p = platform(vec![vec![comment(1, 1, 1)], vec![comment(2, 1, 2)]], None);
        let paginator = ScanPaginator::new(&p, RetryConfig::default());
        let mut stream = paginator.scan("me", ItemKind::Comment);
        assert!(p.requests.lock().unwrap().is_empty());
        stream.next();
        assert_eq!(stream.pages_fetched(), 1);
    }

    #[test]
    fn test_each_scan_starts_over() {
        let p = platform(vec![vec![comment(1, 1, 1)]], None);
        let paginator = ScanPaginator::new(&p, RetryConfig::default());
        assert_eq!(paginator.scan("me", ItemKind::Comment).count(), 1);
        assert_eq!(paginator.scan("me", ItemKind::Comment).count(), 1);
        assert_eq!(*p.requests.lock().unwrap(), vec![None, None]);
    }

    #[test]
    fn test_error_ends_stream() {
        let p = platform(vec![vec![comment(1, 1, 1)], vec![comment(2, 1, 2)]], Some(1));
        let paginator = ScanPaginator::new(&p, RetryConfig::default());
        let results: Vec<Result<Item>> = paginator.scan("me", ItemKind::Comment).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Api { status: 500, .. })));
    }

    #[test]
    fn test_cutoff_mode_rejects_score_aware_policy() {
        let result = ScanDecider::new(RetentionPolicy::default(), ScanMode::CutoffOptimized, now());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_cutoff_mode_matches_full_mode() {
        let policy = RetentionPolicy::new(RetentionRule::StaleOnly, 10);
        let stream: Vec<Item> = [0, 3, 10, 11, 12, 40, 400]
            .iter()
            .enumerate()
            .map(|(n, age)| comment(n, 5, *age))
            .collect();

        let full: Vec<bool> = Decisions::new(
            stream.clone().into_iter().map(Ok),
            policy,
            ScanMode::Full,
            now(),
        )
        .unwrap()
        .map(|r| r.unwrap().1)
        .collect();
        let cutoff: Vec<bool> = Decisions::new(
            stream.into_iter().map(Ok),
            policy,
            ScanMode::CutoffOptimized,
            now(),
        )
        .unwrap()
        .map(|r| r.unwrap().1)
        .collect();

        assert_eq!(full, vec![false, false, false, true, true, true, true]);
        assert_eq!(full, cutoff);
    }

    #[test]
    fn test_cutoff_flag_latches() {
        let policy = RetentionPolicy::new(RetentionRule::StaleOnly, 10);
        let mut decider = ScanDecider::new(policy, ScanMode::CutoffOptimized, now()).unwrap();
        assert!(!decider.decide(&comment(0, 1, 2)).unwrap());
        assert!(!decider.past_cutoff());
        assert!(decider.decide(&comment(1, 1, 11)).unwrap());
        assert!(decider.past_cutoff());
        // An out-of-order younger item is still treated as past the cutoff.
        assert!(decider.decide(&comment(2, 1, 1)).unwrap());
    }
}
