//! Item snapshots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a removable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A comment.
    Comment,
    /// A post (submission).
    Post,
}

impl ItemKind {
    /// Returns all kinds in scan order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Comment, Self::Post]
    }

    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Post => "post",
        }
    }

    /// Returns the plural label used in summaries and CLI flags.
    #[must_use]
    pub const fn plural(&self) -> &'static str {
        match self {
            Self::Comment => "comments",
            Self::Post => "posts",
        }
    }

    /// Returns the fullname prefix the platform uses for this kind.
    #[must_use]
    pub const fn fullname_prefix(&self) -> &'static str {
        match self {
            Self::Comment => "t1_",
            Self::Post => "t3_",
        }
    }

    /// Parses a kind from a string.
    ///
    /// Accepts singular and plural forms, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "comment" | "comments" => Some(Self::Comment),
            "post" | "posts" | "submission" | "submissions" => Some(Self::Post),
            _ => None,
        }
    }

    /// Infers the kind from a fullname such as `t1_abc`.
    #[must_use]
    pub fn from_fullname(fullname: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| fullname.starts_with(kind.fullname_prefix()))
    }

    /// Normalizes a bare or prefixed id into a fullname for this kind.
    #[must_use]
    pub fn fullname(&self, id: &str) -> String {
        let prefix = self.fullname_prefix();
        if id.starts_with(prefix) {
            id.to_string()
        } else {
            format!("{prefix}{id}")
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fields shared by every item kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBase {
    /// Platform fullname (`t1_…` or `t3_…`).
    pub id: String,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Voting score.
    pub score: i64,
    /// Community the item was posted in.
    pub subreddit: String,
    /// Absolute URL of the item.
    pub permalink: String,
}

/// A comment snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Shared fields.
    #[serde(flatten)]
    pub base: ItemBase,
    /// Comment text.
    pub body: String,
    /// Fullname of the post the comment belongs to.
    pub link_id: String,
    /// Number of direct replies, when known.
    ///
    /// Listings leave this unset; a refresh populates it.
    pub reply_count: Option<u32>,
}

/// A post snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Shared fields.
    #[serde(flatten)]
    pub base: ItemBase,
    /// Post title.
    pub title: String,
    /// Number of comments on the post.
    pub reply_count: u32,
}

/// A removable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Item {
    /// A comment.
    Comment(Comment),
    /// A post.
    Post(Post),
}

impl Item {
    /// Returns the item kind.
    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        match self {
            Self::Comment(_) => ItemKind::Comment,
            Self::Post(_) => ItemKind::Post,
        }
    }

    /// Returns the shared fields.
    #[must_use]
    pub const fn base(&self) -> &ItemBase {
        match self {
            Self::Comment(c) => &c.base,
            Self::Post(p) => &p.base,
        }
    }

    /// Returns the fullname.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// Returns the comment body or the post title.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Comment(c) => &c.body,
            Self::Post(p) => &p.title,
        }
    }

    /// Returns the reply count if it is known.
    #[must_use]
    pub const fn reply_count(&self) -> Option<u32> {
        match self {
            Self::Comment(c) => c.reply_count,
            Self::Post(p) => Some(p.reply_count),
        }
    }

    /// Returns the elapsed time since creation.
    ///
    /// Items created in the future (clock skew) have a zero age.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        let age = now - self.base().created_at;
        if age < Duration::zero() {
            Duration::zero()
        } else {
            age
        }
    }

    /// Returns the age in whole elapsed days, floored.
    #[must_use]
    pub fn age_days_at(&self, now: DateTime<Utc>) -> i64 {
        self.age_at(now).num_days()
    }
}
