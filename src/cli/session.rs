//! An authenticated session shared by the entry points.

use crate::config::SweepConfig;
use crate::credentials::{CredentialPrompt, Credentials};
use crate::platform::RedditClient;
use crate::services::{ArchiveSync, CleanupOptions, CleanupOrchestrator};
use crate::Result;
use tracing::info;

/// A logged-in platform client plus the configuration it was built from.
#[derive(Debug)]
pub struct Session {
    client: RedditClient,
    username: String,
    config: SweepConfig,
}

impl Session {
    /// Resolves credentials and logs in.
    ///
    /// `prompt` is consulted only when neither the environment nor the
    /// credentials file yields a complete set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CredentialsNotFound`] or
    /// [`crate::Error::Unauthorized`] before any scanning happens.
    pub fn connect(config: &SweepConfig, prompt: Option<&dyn CredentialPrompt>) -> Result<Self> {
        let (credentials, source) = Credentials::resolve(&config.credentials_file, prompt)?;
        let client = RedditClient::login(&credentials, &config.reddit)?;
        info!(username = %client.username(), source = ?source, "Logged in");
        Ok(Self {
            username: credentials.username().to_string(),
            client,
            config: config.clone(),
        })
    }

    /// Returns the account name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the platform client.
    #[must_use]
    pub const fn client(&self) -> &RedditClient {
        &self.client
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Splits the session into the client, account name and configuration.
    #[must_use]
    pub fn into_parts(self) -> (RedditClient, String, SweepConfig) {
        (self.client, self.username, self.config)
    }

    /// Builds a remote sync from the configuration, if configured.
    #[must_use]
    pub fn archive_sync(&self) -> Option<ArchiveSync> {
        ArchiveSync::from_settings(&self.config.sync)
    }

    /// Builds an orchestrator wired to this session's archive and sync settings.
    #[must_use]
    pub fn orchestrator(&self, options: CleanupOptions) -> CleanupOrchestrator<'_> {
        CleanupOrchestrator::new(&self.client, options, self.config.retry.clone())
            .with_archive(self.config.archive.clone())
            .with_optional_sync(self.archive_sync())
    }
}
