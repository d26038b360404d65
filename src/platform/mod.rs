//! Platform boundary.
//!
//! The engine talks to the platform only through the [`Platform`] trait:
//! paged newest-first listings, fetch by id, reply-count refresh, and the
//! two destructive calls. [`RedditClient`] is the production implementation.
//!
//! Implementations map failures onto [`crate::Error`] so the orchestrator can
//! branch on [`crate::ErrorClass`]: rate limiting becomes
//! [`crate::Error::RateLimited`], a rejected request [`crate::Error::Api`],
//! a missing item [`crate::Error::NotFound`], and bad credentials
//! [`crate::Error::Unauthorized`].

mod paginator;
mod reddit;

pub use paginator::{Decisions, ItemStream, PAGE_LIMIT, ScanDecider, ScanMode, ScanPaginator};
pub use reddit::{RedditClient, RedditSettings};

use crate::Result;
use crate::models::{Comment, Item, ItemKind};

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Items on this page, newest first.
    pub items: Vec<Item>,
    /// Cursor for the next page, `None` on the last page.
    pub after: Option<String>,
}

/// Operations the engine needs from the platform.
pub trait Platform: Send + Sync {
    /// Returns the name of the authenticated account.
    ///
    /// Used as the pre-scan authentication check.
    fn authenticated_user(&self) -> Result<String>;

    /// Fetches one listing page of `user`'s items of `kind`, newest first.
    fn list_page(&self, user: &str, kind: ItemKind, after: Option<&str>, limit: u32)
    -> Result<Page>;

    /// Fetches a single item by fullname.
    fn fetch(&self, kind: ItemKind, id: &str) -> Result<Item>;

    /// Returns the number of direct replies to `comment`.
    fn refresh_reply_count(&self, comment: &Comment) -> Result<u32>;

    /// Overwrites the item's content with `placeholder`.
    fn scrub(&self, item: &Item, placeholder: &str) -> Result<()>;

    /// Removes the item.
    fn remove(&self, item: &Item) -> Result<()>;
}
