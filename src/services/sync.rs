//! Idempotent upload of archive logs to a remote folder.
//!
//! Two modes:
//!
//! - **Stable** (no suffix): the file keeps its local name. An existing
//!   remote file with that name is updated in place, otherwise it is created.
//!   Repeated syncs leave exactly one remote copy. When the folder already
//!   holds duplicates the first match is updated and the rest are left alone.
//! - **Dated** (`<stem>_<suffix><ext>`): always creates a new remote file.
//!   The same suffix twice yields two copies.
//!
//! # Configuration
//!
//! Opt-in through `GOOGLE_SERVICE_ACCOUNT_KEY` (key path or inline JSON) and
//! `GOOGLE_DRIVE_FOLDER_ID`. With either missing, [`ArchiveSync::from_settings`]
//! returns `None` and nothing is uploaded.

use crate::remote::{DriveClient, FolderAccess, RemoteFolder};
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Environment variable holding the service account key (path or JSON).
pub const SERVICE_ACCOUNT_KEY_ENV: &str = "GOOGLE_SERVICE_ACCOUNT_KEY";

/// Environment variable holding the target folder id.
pub const FOLDER_ID_ENV: &str = "GOOGLE_DRIVE_FOLDER_ID";

/// Remote sync settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSettings {
    /// Service account key path or inline JSON.
    pub service_account_key: Option<String>,
    /// Target folder id.
    pub folder_id: Option<String>,
}

impl SyncSettings {
    /// Reads both settings from the environment. Blank values count as unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service_account_key: non_empty_env(SERVICE_ACCOUNT_KEY_ENV),
            folder_id: non_empty_env(FOLDER_ID_ENV),
        }
    }

    /// Returns true when both settings are present.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.service_account_key.is_some() && self.folder_id.is_some()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Where one local file lands remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// Remote folder id.
    pub folder_id: String,
    /// Remote file name.
    pub filename: String,
    /// True for dated snapshots.
    pub dated: bool,
}

impl SyncTarget {
    /// Resolves the target for `local`, or `None` if it has no file name.
    #[must_use]
    pub fn resolve(folder_id: &str, local: &Path, dated_suffix: Option<&str>) -> Option<Self> {
        let base = local.file_name()?.to_string_lossy().into_owned();
        let filename = match dated_suffix {
            Some(suffix) => dated_name(&base, suffix),
            None => base,
        };
        Some(Self {
            folder_id: folder_id.to_string(),
            filename,
            dated: dated_suffix.is_some(),
        })
    }
}

/// Inserts `_<suffix>` before the extension.
fn dated_name(base: &str, suffix: &str) -> String {
    let path = Path::new(base);
    let stem = path.file_stem().map_or_else(|| base.to_string(), |s| s.to_string_lossy().into_owned());
    match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    }
}

/// A file that was uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedFile {
    /// Remote file name.
    pub name: String,
    /// Browser URL of the remote file.
    pub url: String,
}

/// Uploads archive logs into one remote folder.
pub struct ArchiveSync {
    remote: Box<dyn RemoteFolder>,
    folder_id: String,
}

impl std::fmt::Debug for ArchiveSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSync")
            .field("folder_id", &self.folder_id)
            .finish_non_exhaustive()
    }
}

impl ArchiveSync {
    /// Creates a sync over `remote` targeting `folder_id`.
    #[must_use]
    pub fn new(remote: Box<dyn RemoteFolder>, folder_id: impl Into<String>) -> Self {
        Self {
            remote,
            folder_id: folder_id.into(),
        }
    }

    /// Builds a Drive-backed sync, or `None` when sync is not configured.
    #[must_use]
    pub fn from_settings(settings: &SyncSettings) -> Option<Self> {
        let (Some(key), Some(folder_id)) = (&settings.service_account_key, &settings.folder_id)
        else {
            debug!("Remote sync not configured");
            return None;
        };
        Some(Self::new(Box::new(DriveClient::new(key.clone())), folder_id.clone()))
    }

    /// Returns the target folder id.
    #[must_use]
    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    /// Uploads every existing file in `files`.
    ///
    /// Missing local files are skipped silently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteFolderInaccessible`] when the folder cannot be
    /// found, and any remote failure as-is.
    #[instrument(
        name = "redsweep.sync",
        skip(self, files),
        fields(folder_id = %self.folder_id, file_count = files.len())
    )]
    pub fn sync(&self, files: &[PathBuf], dated_suffix: Option<&str>) -> Result<Vec<SyncedFile>> {
        let start = Instant::now();
        if self.remote.check_access(&self.folder_id)? == FolderAccess::NotFound {
            return Err(self.inaccessible());
        }

        let mode = if dated_suffix.is_some() { "dated" } else { "stable" };
        let mut synced = Vec::new();
        for path in files {
            if !path.exists() {
                debug!(path = %path.display(), "Skipping missing log file");
                continue;
            }
            let Some(target) = SyncTarget::resolve(&self.folder_id, path, dated_suffix) else {
                continue;
            };
            let content = std::fs::read(path)
                .map_err(|e| Error::operation("read_archive_log", format!("{}: {e}", path.display())))?;

            let (file_id, action) = self.upsert(&target, &content)?;
            let url = self.remote.file_url(&file_id);
            metrics::counter!("archive_sync_total", "mode" => mode, "action" => action).increment(1);
            info!(name = %target.filename, action, url = %url, "Uploaded archive log");
            synced.push(SyncedFile {
                name: target.filename,
                url,
            });
        }

        metrics::histogram!("archive_sync_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        Ok(synced)
    }

    fn upsert(&self, target: &SyncTarget, content: &[u8]) -> Result<(String, &'static str)> {
        if !target.dated {
            if let Some(existing) = self.remote.resolve_by_name(&target.folder_id, &target.filename)? {
                self.remote.update(&existing, content)?;
                return Ok((existing, "updated"));
            }
        }
        let id = self.remote.create(&target.folder_id, &target.filename, content)?;
        Ok((id, "created"))
    }

    fn inaccessible(&self) -> Error {
        let who = self
            .remote
            .account()
            .map_or_else(|| "the service account".to_string(), |email| format!("the service account ({email})"));
        Error::RemoteFolderInaccessible {
            folder_id: self.folder_id.clone(),
            hint: format!(
                "it was not found or is not shared with {who}; share the folder with that account (Editor access) and try again"
            ),
        }
    }
}
