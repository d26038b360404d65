//! Append-only deletion archive.
//!
//! One JSON object per line, one file per kind. A record is written and
//! flushed before the item is mutated, so the log reads as "mutation
//! attempted" rather than "mutation succeeded".

use crate::config::ConfigFileArchive;
use crate::models::{DeletionRecord, Item, ItemKind, SourceTag};
use crate::{Error, Result};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default comment log file name.
pub const DEFAULT_COMMENTS_FILE: &str = "deleted_comments.txt";

/// Default post log file name.
pub const DEFAULT_POSTS_FILE: &str = "deleted_posts.txt";

/// Where archive logs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Directory holding both log files.
    pub dir: PathBuf,
    /// Comment log file name.
    pub comments_file: String,
    /// Post log file name.
    pub posts_file: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            comments_file: DEFAULT_COMMENTS_FILE.to_string(),
            posts_file: DEFAULT_POSTS_FILE.to_string(),
        }
    }
}

impl ArchiveConfig {
    /// Creates an archive config rooted at `dir` with default file names.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Loads archive settings from config file values.
    #[must_use]
    pub fn from_config(config: &ConfigFileArchive) -> Self {
        let mut settings = Self::default();
        if let Some(dir) = &config.dir {
            settings.dir = PathBuf::from(dir);
        }
        if let Some(name) = &config.comments_file {
            settings.comments_file.clone_from(name);
        }
        if let Some(name) = &config.posts_file {
            settings.posts_file.clone_from(name);
        }
        settings
    }

    /// Applies `REDSWEEP_ARCHIVE_DIR`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("REDSWEEP_ARCHIVE_DIR") {
            if !v.trim().is_empty() {
                self.dir = PathBuf::from(v);
            }
        }
        self
    }

    /// Returns the log path for `kind`.
    #[must_use]
    pub fn path_for(&self, kind: ItemKind) -> PathBuf {
        match kind {
            ItemKind::Comment => self.dir.join(&self.comments_file),
            ItemKind::Post => self.dir.join(&self.posts_file),
        }
    }

    /// Returns both log paths in kind order.
    #[must_use]
    pub fn log_paths(&self) -> Vec<PathBuf> {
        ItemKind::all().iter().map(|k| self.path_for(*k)).collect()
    }
}

/// Writes deletion records.
///
/// Files are opened on first use and closed when the logger is dropped.
#[derive(Debug)]
pub struct ArchiveLogger {
    config: ArchiveConfig,
    comments: Option<File>,
    posts: Option<File>,
    written: Vec<PathBuf>,
}

impl ArchiveLogger {
    /// Creates a logger. No file is touched until the first record.
    #[must_use]
    pub const fn new(config: ArchiveConfig) -> Self {
        Self {
            config,
            comments: None,
            posts: None,
            written: Vec::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Appends a record for `item` and flushes it.
    ///
    /// # Errors
    ///
    /// Any I/O failure is run-fatal: mutating without a record is not allowed.
    pub fn record(&mut self, item: &Item, source: SourceTag) -> Result<DeletionRecord> {
        let record = DeletionRecord::from_item(item, source, Utc::now());
        let line = serde_json::to_string(&record)
            .map_err(|e| Error::operation("serialize_deletion_record", e))?;

        let kind = item.kind();
        let path = self.config.path_for(kind);
        let file = self.file_for(kind, &path)?;
        writeln!(file, "{line}")
            .and_then(|()| file.flush())
            .map_err(|e| Error::operation("write_archive_log", format!("{}: {e}", path.display())))?;

        debug!(id = %record.id, path = %path.display(), "Archived deletion record");
        Ok(record)
    }

    /// Returns the files written during this logger's lifetime.
    #[must_use]
    pub fn paths_written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Returns both configured log paths.
    #[must_use]
    pub fn log_paths(&self) -> Vec<PathBuf> {
        self.config.log_paths()
    }

    fn file_for(&mut self, kind: ItemKind, path: &Path) -> Result<&mut File> {
        let slot = match kind {
            ItemKind::Comment => &mut self.comments,
            ItemKind::Post => &mut self.posts,
        };
        if slot.is_none() {
            *slot = Some(open_log(path)?);
            self.written.push(path.to_path_buf());
        }
        slot.as_mut()
            .ok_or_else(|| Error::operation("open_archive_log", "log handle missing after open"))
    }
}

/// Opens a log file in create+append mode, owner-only on Unix.
fn open_log(path: &Path) -> Result<File> {
    let to_error = |e: std::io::Error| Error::operation("open_archive_log", format!("{}: {e}", path.display()));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(to_error)?;
    }

    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(to_error)
}
