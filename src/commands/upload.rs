//! Explicit log upload.

use chrono::Utc;
use redsweep::cli::{parse_date_suffix, today_suffix};
use redsweep::config::SweepConfig;
use redsweep::services::{ArchiveSync, FOLDER_ID_ENV, SERVICE_ACCOUNT_KEY_ENV};
use redsweep::Error;
use std::path::PathBuf;

/// Uploads `files` to the configured folder.
///
/// Unlike the upload at the end of a run, every failure here is returned,
/// including an inaccessible folder.
pub fn cmd_upload(
    config: &SweepConfig,
    files: &[PathBuf],
    date_suffix: Option<String>,
    today: bool,
) -> redsweep::Result<()> {
    let suffix = match (date_suffix, today) {
        (Some(s), _) => Some(parse_date_suffix(&s)?),
        (None, true) => Some(today_suffix(Utc::now())),
        (None, false) => None,
    };

    let Some(sync) = ArchiveSync::from_settings(&config.sync) else {
        return Err(Error::InvalidInput(format!(
            "remote sync is not configured; set {SERVICE_ACCOUNT_KEY_ENV} and {FOLDER_ID_ENV}"
        )));
    };

    for missing in files.iter().filter(|f| !f.exists()) {
        eprintln!("Skipping missing file {}", missing.display());
    }

    let uploaded = sync.sync(files, suffix.as_deref())?;
    if uploaded.is_empty() {
        println!("Nothing uploaded.");
    }
    for file in &uploaded {
        println!("Uploaded {} -> {}", file.name, file.url);
    }
    Ok(())
}
