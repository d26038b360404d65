//! Shared fakes for integration tests.

#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use redsweep::models::{Comment, Item, ItemBase, ItemKind, Post};
use redsweep::platform::{Page, Platform};
use redsweep::remote::{FolderAccess, RemoteFolder};
use redsweep::services::{RetryConfig, Sleeper};
use redsweep::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Fixed clock for every test.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap()
}

/// A comment `age_days` old.
pub fn comment(id: &str, score: i64, age_days: i64) -> Item {
    Item::Comment(Comment {
        base: base(&ItemKind::Comment.fullname(id), score, age_days),
        body: format!("body of {id}"),
        link_id: "t3_parent".to_string(),
        reply_count: None,
    })
}

/// A post `age_days` old.
pub fn post(id: &str, score: i64, age_days: i64) -> Item {
    Item::Post(Post {
        base: base(&ItemKind::Post.fullname(id), score, age_days),
        title: format!("title of {id}"),
        reply_count: 3,
    })
}

fn base(fullname: &str, score: i64, age_days: i64) -> ItemBase {
    ItemBase {
        id: fullname.to_string(),
        created_at: now() - Duration::days(age_days) - Duration::minutes(5),
        score,
        subreddit: "rust".to_string(),
        permalink: format!("https://www.reddit.com/r/rust/comments/{fullname}"),
    }
}

/// Failure to inject into a fake call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    RateLimited,
    Api(u16),
    NotFound,
    Unauthorized,
    Timeout,
}

impl Fault {
    fn into_error(self, what: &str) -> Error {
        match self {
            Self::RateLimited => Error::RateLimited { retry_after: None },
            Self::Api(status) => Error::Api {
                status,
                message: format!("{what} refused"),
            },
            Self::NotFound => Error::NotFound(what.to_string()),
            Self::Unauthorized => Error::Unauthorized(what.to_string()),
            Self::Timeout => Error::transport(what, "timeout error: operation timed out"),
        }
    }
}

#[derive(Default)]
struct PlatformState {
    calls: Vec<String>,
    faults: HashMap<String, VecDeque<Fault>>,
}

/// In-memory platform with scripted failures.
///
/// Faults are keyed by `"<op> <id>"`, for example `"scrub t1_a"`,
/// `"list comment"` or `"auth"`, and are consumed one per call.
pub struct FakePlatform {
    user: String,
    comments: Vec<Item>,
    posts: Vec<Item>,
    replies: HashMap<String, u32>,
    page_size: usize,
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            comments: Vec::new(),
            posts: Vec::new(),
            replies: HashMap::new(),
            page_size: 2,
            state: Mutex::new(PlatformState::default()),
        }
    }

    /// Adds items; they are listed in insertion order, which must be newest first.
    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        for item in items {
            match item.kind() {
                ItemKind::Comment => self.comments.push(item),
                ItemKind::Post => self.posts.push(item),
            }
        }
        self
    }

    pub fn with_replies(mut self, id: &str, count: u32) -> Self {
        self.replies.insert(ItemKind::Comment.fullname(id), count);
        self
    }

    pub fn fail(self, key: &str, faults: &[Fault]) -> Self {
        self.state
            .lock()
            .unwrap()
            .faults
            .entry(key.to_string())
            .or_default()
            .extend(faults.iter().copied());
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls whose key starts with `op`.
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .collect()
    }

    fn enter(&self, key: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(key.clone());
        match state.faults.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(fault) => Err(fault.into_error(&key)),
            None => Ok(()),
        }
    }

    fn items(&self, kind: ItemKind) -> &[Item] {
        match kind {
            ItemKind::Comment => &self.comments,
            ItemKind::Post => &self.posts,
        }
    }
}

impl Platform for FakePlatform {
    fn authenticated_user(&self) -> Result<String> {
        self.enter("auth".to_string())?;
        Ok(self.user.clone())
    }

    fn list_page(&self, _user: &str, kind: ItemKind, after: Option<&str>, _limit: u32) -> Result<Page> {
        self.enter(format!("list {kind}"))?;
        let items = self.items(kind);
        let start = after.and_then(|a| a.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + self.page_size).min(items.len());
        let page = items.get(start..end).unwrap_or_default().to_vec();
        Ok(Page {
            items: page,
            after: (end < items.len()).then(|| end.to_string()),
        })
    }

    fn fetch(&self, kind: ItemKind, id: &str) -> Result<Item> {
        self.enter(format!("fetch {id}"))?;
        self.items(kind)
            .iter()
            .find(|item| item.id() == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn refresh_reply_count(&self, comment: &Comment) -> Result<u32> {
        self.enter(format!("refresh {}", comment.base.id))?;
        Ok(self.replies.get(&comment.base.id).copied().unwrap_or(0))
    }

    fn scrub(&self, item: &Item, placeholder: &str) -> Result<()> {
        assert_eq!(placeholder, ".");
        self.enter(format!("scrub {}", item.id()))
    }

    fn remove(&self, item: &Item) -> Result<()> {
        self.enter(format!("remove {}", item.id()))
    }
}

/// Records waits instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<std::time::Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<std::time::Duration> {
        self.waits.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: std::time::Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// Sleeper handle usable both by the orchestrator and by assertions.
pub fn sleeper() -> Arc<RecordingSleeper> {
    Arc::new(RecordingSleeper::default())
}

/// The default retry schedule.
pub fn retry() -> RetryConfig {
    RetryConfig::default()
}

/// A file held by [`FakeFolder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(Default)]
struct FolderState {
    files: Vec<StoredFile>,
    creates: usize,
    updates: usize,
}

/// In-memory remote folder. Clones share storage.
#[derive(Clone)]
pub struct FakeFolder {
    folder_id: String,
    accessible: bool,
    state: Arc<Mutex<FolderState>>,
}

impl FakeFolder {
    pub fn new(folder_id: &str) -> Self {
        Self {
            folder_id: folder_id.to_string(),
            accessible: true,
            state: Arc::default(),
        }
    }

    /// A folder that probes as missing.
    pub fn inaccessible(folder_id: &str) -> Self {
        Self {
            accessible: false,
            ..Self::new(folder_id)
        }
    }

    pub fn files(&self) -> Vec<StoredFile> {
        self.state.lock().unwrap().files.clone()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files().into_iter().map(|f| f.name).collect();
        names.sort();
        names
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn updates(&self) -> usize {
        self.state.lock().unwrap().updates
    }
}

impl RemoteFolder for FakeFolder {
    fn check_access(&self, folder_id: &str) -> Result<FolderAccess> {
        if self.accessible && folder_id == self.folder_id {
            Ok(FolderAccess::Ok)
        } else {
            Ok(FolderAccess::NotFound)
        }
    }

    fn resolve_by_name(&self, folder_id: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .iter()
            .find(|f| f.folder_id == folder_id && f.name == name)
            .map(|f| f.id.clone()))
    }

    fn create(&self, folder_id: &str, name: &str, content: &[u8]) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        let id = format!("file-{}", state.creates);
        state.files.push(StoredFile {
            id: id.clone(),
            folder_id: folder_id.to_string(),
            name: name.to_string(),
            content: content.to_vec(),
        });
        Ok(id)
    }

    fn update(&self, file_id: &str, content: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.updates += 1;
        let file = state
            .files
            .iter_mut()
            .find(|f| f.id == file_id)
            .ok_or_else(|| Error::NotFound(file_id.to_string()))?;
        file.content = content.to_vec();
        Ok(())
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("https://drive.example/file/{file_id}")
    }

    fn account(&self) -> Option<String> {
        Some("sweeper@project.iam.example".to_string())
    }
}
