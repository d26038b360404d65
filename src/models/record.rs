//! Archive records.

use super::{Item, ItemKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which entry point produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SourceTag {
    /// Interactive tool.
    #[default]
    #[serde(rename = "cli")]
    Cli,
    /// Web service.
    #[serde(rename = "web")]
    Web,
    /// Unattended scheduled job.
    #[serde(rename = "ci")]
    Scheduled,
}

impl SourceTag {
    /// Returns the tag as written to the archive.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Web => "web",
            Self::Scheduled => "ci",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific record fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordContent {
    /// Comment fields.
    Comment {
        /// Comment text at the time of archival.
        body: String,
        /// Direct reply count, when it was known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_count: Option<u32>,
    },
    /// Post fields.
    Post {
        /// Post title at the time of archival.
        title: String,
        /// Comment count on the post.
        num_comments: u32,
    },
}

/// One archive entry, written before the item is mutated.
///
/// A record means "mutation attempted". The mutation that follows may still
/// have failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRecord {
    /// When the record was written.
    #[serde(with = "timestamp")]
    pub deleted_at: DateTime<Utc>,
    /// When the item was created.
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Item fullname.
    pub id: String,
    /// Community name.
    pub subreddit: String,
    /// Score at archival time.
    pub score: i64,
    /// Absolute URL.
    pub permalink: String,
    /// Kind-specific fields.
    #[serde(flatten)]
    pub content: RecordContent,
    /// Entry point that produced the record.
    pub source: SourceTag,
}

impl DeletionRecord {
    /// Builds a record for `item` stamped at `deleted_at`.
    #[must_use]
    pub fn from_item(item: &Item, source: SourceTag, deleted_at: DateTime<Utc>) -> Self {
        let base = item.base();
        let content = match item {
            Item::Comment(c) => RecordContent::Comment {
                body: c.body.clone(),
                reply_count: c.reply_count,
            },
            Item::Post(p) => RecordContent::Post {
                title: p.title.clone(),
                num_comments: p.reply_count,
            },
        };
        Self {
            deleted_at,
            created_at: base.created_at,
            id: base.id.clone(),
            subreddit: base.subreddit.clone(),
            score: base.score,
            permalink: base.permalink.clone(),
            content,
            source,
        }
    }

    /// Returns the item kind this record describes.
    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        match self.content {
            RecordContent::Comment { .. } => ItemKind::Comment,
            RecordContent::Post { .. } => ItemKind::Post,
        }
    }
}

/// Second-precision UTC timestamps with a trailing `Z`.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, ItemBase, Post};
    use chrono::TimeZone;

    fn base(id: &str) -> ItemBase {
        ItemBase {
            id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 12, 24, 8, 30, 15).unwrap(),
            score: 0,
            subreddit: "rust".to_string(),
            permalink: format!("https://reddit.com/r/rust/{id}"),
        }
    }

    #[test]
    fn test_comment_record_shape() {
        let item = Item::Comment(Comment {
            base: base("t1_abc"),
            body: "old take".to_string(),
            link_id: "t3_p".to_string(),
            reply_count: Some(0),
        });
        let deleted_at = Utc.with_ymd_and_hms(2026, 2, 27, 1, 2, 3).unwrap();
        let record = DeletionRecord::from_item(&item, SourceTag::Scheduled, deleted_at);

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["deleted_at"], "2026-02-27T01:02:03Z");
        assert_eq!(json["created_at"], "2025-12-24T08:30:15Z");
        assert_eq!(json["id"], "t1_abc");
        assert_eq!(json["body"], "old take");
        assert_eq!(json["reply_count"], 0);
        assert_eq!(json["source"], "ci");
        assert!(json.get("title").is_none());
        assert!(json.get("num_comments").is_none());
    }

    #[test]
    fn test_post_record_shape() {
        let item = Item::Post(Post {
            base: base("t3_xyz"),
            title: "Ask me anything".to_string(),
            reply_count: 12,
        });
        let record = DeletionRecord::from_item(&item, SourceTag::Web, Utc::now());

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "Ask me anything");
        assert_eq!(json["num_comments"], 12);
        assert_eq!(json["source"], "web");
        assert!(json.get("body").is_none());
        assert_eq!(record.kind(), ItemKind::Post);
    }

    #[test]
    fn test_unknown_reply_count_is_omitted() {
        let item = Item::Comment(Comment {
            base: base("t1_abc"),
            body: "x".to_string(),
            link_id: "t3_p".to_string(),
            reply_count: None,
        });
        let line = serde_json::to_string(&DeletionRecord::from_item(&item, SourceTag::Cli, Utc::now()))
            .unwrap();
        assert!(!line.contains("reply_count"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_record_parses_back() {
        let line = r#"{"deleted_at":"2026-02-27T01:02:03Z","created_at":"2025-12-24T08:30:15Z","id":"t3_xyz","subreddit":"rust","score":1,"permalink":"https://reddit.com/r/rust/t3_xyz","title":"t","num_comments":2,"source":"cli"}"#;
        let record: DeletionRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.kind(), ItemKind::Post);
        assert_eq!(record.source, SourceTag::Cli);
        assert_eq!(record.deleted_at, Utc.with_ymd_and_hms(2026, 2, 27, 1, 2, 3).unwrap());
    }
}
