//! Reddit script-app credentials.
//!
//! Resolution order:
//!
//! 1. `REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`, `REDDIT_USERNAME` and
//!    `REDDIT_PASSWORD`, all four set and non-empty
//! 2. A credentials file of four lines in the same order
//! 3. An interactive prompt, only when the caller allows one
//!
//! A partial environment falls through to the file. When nothing yields a
//! complete set, [`Error::CredentialsNotFound`] is returned before any
//! network traffic.

use crate::{Error, Result};
use secrecy::SecretString;
use std::path::Path;
use tracing::debug;

/// Environment variables read, in file-line order.
pub const CREDENTIAL_ENV_VARS: [&str; 4] = [
    "REDDIT_CLIENT_ID",
    "REDDIT_CLIENT_SECRET",
    "REDDIT_USERNAME",
    "REDDIT_PASSWORD",
];

/// Where a credential set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Environment variables.
    Environment,
    /// Credentials file.
    File,
    /// Interactive prompt.
    Prompt,
}

/// A complete Reddit credential set.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: SecretString,
    username: String,
    password: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Creates a credential set.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Builds a set from four values, or `None` if any is blank.
    fn from_parts(parts: [Option<String>; 4]) -> Option<Self> {
        let [id, secret, user, pass] = parts.map(|p| p.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()));
        Some(Self::new(id?, secret?, user?, pass?))
    }

    /// Returns the script app client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the script app secret.
    #[must_use]
    pub const fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    /// Returns the account name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the account password.
    #[must_use]
    pub const fn password(&self) -> &SecretString {
        &self.password
    }

    /// Resolves credentials from the process environment, then `file`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialsNotFound`] when no source is complete and
    /// prompting is not allowed, or the prompt fails.
    pub fn resolve(file: &Path, prompt: Option<&dyn CredentialPrompt>) -> Result<(Self, CredentialSource)> {
        Self::resolve_with(|name| std::env::var(name).ok(), file, prompt)
    }

    /// Same as [`Self::resolve`] with an injectable environment lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    pub fn resolve_with<F>(
        lookup: F,
        file: &Path,
        prompt: Option<&dyn CredentialPrompt>,
    ) -> Result<(Self, CredentialSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(creds) = Self::from_parts(CREDENTIAL_ENV_VARS.map(&lookup)) {
            debug!("Using credentials from the environment");
            return Ok((creds, CredentialSource::Environment));
        }

        if let Some(creds) = Self::from_file(file)? {
            debug!(path = %file.display(), "Using credentials file");
            return Ok((creds, CredentialSource::File));
        }

        match prompt {
            Some(prompt) => Ok((prompt.prompt()?, CredentialSource::Prompt)),
            None => Err(Error::CredentialsNotFound(format!(
                "set {} or create {} with four lines (client id, client secret, username, password)",
                CREDENTIAL_ENV_VARS.join(" / "),
                file.display()
            ))),
        }
    }

    /// Reads a four-line credentials file.
    ///
    /// Returns `Ok(None)` when the file is missing or has fewer than four
    /// non-blank lines.
    fn from_file(path: &Path) -> Result<Option<Self>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::operation(
                    "read_credentials_file",
                    format!("{}: {e}", path.display()),
                ));
            },
        };
        let mut lines = contents.lines().map(|l| Some(l.to_string()));
        let parts = [
            lines.next().flatten(),
            lines.next().flatten(),
            lines.next().flatten(),
            lines.next().flatten(),
        ];
        Ok(Self::from_parts(parts))
    }
}

/// Asks the user for credentials.
pub trait CredentialPrompt {
    /// Prompts for a complete credential set.
    ///
    /// # Errors
    ///
    /// Returns an error when input cannot be read or is incomplete.
    fn prompt(&self) -> Result<Credentials>;
}

/// Prompts on the terminal with `dialoguer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn prompt(&self) -> Result<Credentials> {
        use dialoguer::{Input, Password, theme::ColorfulTheme};

        let theme = ColorfulTheme::default();
        let prompt_err = |e: dialoguer::Error| Error::CredentialsNotFound(format!("prompt failed: {e}"));
        let client_id: String = Input::with_theme(&theme)
            .with_prompt("Reddit client ID")
            .interact_text()
            .map_err(prompt_err)?;
        let client_secret = Password::with_theme(&theme)
            .with_prompt("Reddit client secret")
            .interact()
            .map_err(prompt_err)?;
        let username: String = Input::with_theme(&theme)
            .with_prompt("Reddit username")
            .interact_text()
            .map_err(prompt_err)?;
        let password = Password::with_theme(&theme)
            .with_prompt("Reddit password")
            .interact()
            .map_err(prompt_err)?;

        Credentials::from_parts([Some(client_id), Some(client_secret), Some(username), Some(password)])
            .ok_or_else(|| Error::CredentialsNotFound("all four values are required".to_string()))
    }
}
