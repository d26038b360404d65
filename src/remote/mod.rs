//! Remote folder boundary.
//!
//! [`crate::services::ArchiveSync`] consumes a [`RemoteFolder`]; the
//! production implementation is [`DriveClient`], a Google Drive v3 client
//! authenticated with a service account.

mod drive;

pub use drive::{DriveClient, ServiceAccountKey};

use crate::Result;

/// Result of probing a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderAccess {
    /// The folder exists and is reachable.
    Ok,
    /// The folder does not exist or is not shared with us.
    NotFound,
}

/// A remote folder that can hold uploaded files.
pub trait RemoteFolder: Send + Sync {
    /// Probes `folder_id`.
    fn check_access(&self, folder_id: &str) -> Result<FolderAccess>;

    /// Returns the first file in `folder_id` named exactly `name`.
    ///
    /// Further matches are ignored.
    fn resolve_by_name(&self, folder_id: &str, name: &str) -> Result<Option<String>>;

    /// Creates `name` in `folder_id` with `content` and returns its id.
    fn create(&self, folder_id: &str, name: &str, content: &[u8]) -> Result<String>;

    /// Replaces the content of an existing file, keeping its identity.
    fn update(&self, file_id: &str, content: &[u8]) -> Result<()>;

    /// Returns a browser URL for `file_id`.
    fn file_url(&self, file_id: &str) -> String;

    /// Returns the account the folder must be shared with, when known.
    fn account(&self) -> Option<String> {
        None
    }
}
