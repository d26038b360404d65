//! Google Drive v3 client using a service account.

use super::{FolderAccess, RemoteFolder};
use crate::transport;
use crate::{Error, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// OAuth scope requested for the service account.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::from(s))
}

/// The fields of a service-account JSON key that we use.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account email. Share the folder with this address.
    pub client_email: String,
    /// PEM-encoded RSA private key.
    #[serde(deserialize_with = "deserialize_secret")]
    pub private_key: SecretString,
    /// Token endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Parses a key from a file path or inline JSON.
    ///
    /// An existing file wins; anything else is parsed as JSON.
    pub fn load(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let path = Path::new(raw);
        let json = if path.is_file() {
            std::fs::read_to_string(path).map_err(|e| Error::operation("read_service_account_key", e))?
        } else {
            raw.to_string()
        };
        serde_json::from_str(&json).map_err(|e| {
            Error::InvalidInput(format!(
                "service account key is neither a readable file nor valid key JSON: {e}"
            ))
        })
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FileId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    parents: [&'a str; 1],
    mime_type: &'a str,
}

struct Session {
    token: SecretString,
    service_account: String,
}

/// Drive client that authenticates on first use.
///
/// The key source is a path to a service-account JSON key or the inline JSON.
/// Nothing is read or exchanged until the first request, so a broken key
/// surfaces as a sync failure rather than at startup.
pub struct DriveClient {
    client: Client,
    key_source: String,
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient").finish_non_exhaustive()
    }
}

impl DriveClient {
    /// Creates a client for the given key path or inline key JSON.
    #[must_use]
    pub fn new(key_source: impl Into<String>) -> Self {
        Self {
            client: transport::build_client(
                &format!("redsweep/{}", env!("CARGO_PKG_VERSION")),
                Duration::from_secs(60),
            ),
            key_source: key_source.into(),
            session: Mutex::new(None),
        }
    }

    #[instrument(name = "redsweep.drive.authenticate", skip_all)]
    fn authenticate(&self) -> Result<Session> {
        let key = ServiceAccountKey::load(&self.key_source)?;
        let assertion = sign_assertion(&key)?;
        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .map_err(|e| Error::operation("drive_token_request", e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().unwrap_or_default();
            return Err(Error::Unauthorized(format!(
                "service account token rejected: {}",
                transport::truncate(body.trim())
            )));
        }
        let token: TokenResponse = transport::check_status(response)?
            .json()
            .map_err(|e| Error::operation("parse_drive_token", e))?;

        info!(service_account = %key.client_email, "Authenticated with Google Drive");
        Ok(Session {
            token: SecretString::from(token.access_token),
            service_account: key.client_email,
        })
    }

    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::operation("drive_session", "session lock poisoned"))?;
        if session.is_none() {
            *session = Some(self.authenticate()?);
        }
        session
            .as_ref()
            .map(|s| request.bearer_auth(s.token.expose_secret()))
            .ok_or_else(|| Error::operation("drive_session", "no session after authentication"))
    }
}

fn sign_assertion(key: &ServiceAccountKey) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: DRIVE_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())
        .map_err(|e| Error::InvalidInput(format!("service account private key is not valid PEM: {e}")))?;
    encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
        .map_err(|e| Error::operation("sign_service_account_assertion", e))
}

/// Escapes a value for a Drive query string literal.
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn name_query(folder_id: &str, name: &str) -> String {
    format!(
        "name = '{}' and '{}' in parents and trashed = false",
        quote(name),
        quote(folder_id)
    )
}

impl RemoteFolder for DriveClient {
    fn check_access(&self, folder_id: &str) -> Result<FolderAccess> {
        let request = self
            .authed(self.client.get(format!("{API_BASE}/files/{folder_id}")))?
            .query(&[("fields", "id"), ("supportsAllDrives", "true")]);
        match transport::send(request, "drive_check_folder") {
            Ok(_) => Ok(FolderAccess::Ok),
            Err(Error::NotFound(_)) => Ok(FolderAccess::NotFound),
            Err(e) => Err(e),
        }
    }

    fn resolve_by_name(&self, folder_id: &str, name: &str) -> Result<Option<String>> {
        let query = name_query(folder_id, name);
        let request = self
            .authed(self.client.get(format!("{API_BASE}/files")))?
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]);
        let list: FileList = transport::send(request, "drive_list_files")?
            .json()
            .map_err(|e| Error::operation("drive_list_files", e))?;
        if list.files.len() > 1 {
            debug!(name, matches = list.files.len(), "Multiple remote files share a name, using the first");
        }
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    fn create(&self, folder_id: &str, name: &str, content: &[u8]) -> Result<String> {
        let metadata = FileMetadata {
            name,
            parents: [folder_id],
            mime_type: "text/plain",
        };
        let request = self
            .authed(self.client.post(format!("{API_BASE}/files")))?
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .json(&metadata);
        let file: FileId = transport::send(request, "drive_create_file")?
            .json()
            .map_err(|e| Error::operation("drive_create_file", e))?;
        self.update(&file.id, content)?;
        Ok(file.id)
    }

    fn update(&self, file_id: &str, content: &[u8]) -> Result<()> {
        let request = self
            .authed(self.client.patch(format!("{UPLOAD_BASE}/files/{file_id}")))?
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(content.to_vec());
        transport::send(request, "drive_upload_media")?;
        Ok(())
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("https://drive.google.com/file/d/{file_id}/view")
    }

    fn account(&self) -> Option<String> {
        self.session
            .lock()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.service_account.clone()))
            .or_else(|| {
                ServiceAccountKey::load(&self.key_source)
                    .ok()
                    .map(|k| k.client_email)
            })
    }
}
