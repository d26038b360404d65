//! Reddit OAuth client.
//!
//! Uses the script-app password grant and the `oauth.reddit.com` API over
//! `reqwest::blocking`. Bearer tokens are renewed shortly before they expire
//! and once more whenever the API answers 401.

use super::{Page, Platform};
use crate::config::ConfigFileReddit;
use crate::credentials::Credentials;
use crate::models::{Comment, Item, ItemBase, ItemKind, Post};
use crate::transport;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Default token endpoint host.
pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com";

/// Default API host.
pub const DEFAULT_API_URL: &str = "https://oauth.reddit.com";

/// Base for absolute permalinks.
const PERMALINK_BASE: &str = "https://reddit.com";

/// Token lifetime assumed when the grant omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Tokens are renewed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Reddit connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditSettings {
    /// User agent sent with every request.
    pub user_agent: String,
    /// Host serving the token endpoint.
    pub auth_url: String,
    /// Host serving the authenticated API.
    pub api_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("redsweep/{} (retention cleanup)", env!("CARGO_PKG_VERSION")),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RedditSettings {
    /// Loads settings from config file values.
    #[must_use]
    pub fn from_config(config: &ConfigFileReddit) -> Self {
        let mut settings = Self::default();
        if let Some(user_agent) = &config.user_agent {
            settings.user_agent.clone_from(user_agent);
        }
        if let Some(auth_url) = &config.auth_url {
            settings.auth_url = auth_url.trim_end_matches('/').to_string();
        }
        if let Some(api_url) = &config.api_url {
            settings.api_url = api_url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = config.timeout_secs {
            settings.timeout = Duration::from_secs(secs);
        }
        settings
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("REDSWEEP_REDDIT_USER_AGENT") {
            if !v.trim().is_empty() {
                self.user_agent = v;
            }
        }
        if let Ok(v) = std::env::var("REDSWEEP_REDDIT_TIMEOUT_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.timeout = Duration::from_secs(parsed);
            }
        }
        self
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Me {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    name: String,
    created_utc: f64,
    score: i64,
    subreddit: String,
    permalink: String,
    body: String,
    link_id: String,
    #[serde(default)]
    replies: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PostData {
    name: String,
    created_utc: f64,
    score: i64,
    subreddit: String,
    permalink: String,
    title: String,
    num_comments: u32,
}

#[derive(Debug, Deserialize)]
struct JsonEnvelope {
    json: Option<JsonErrors>,
}

#[derive(Debug, Deserialize)]
struct JsonErrors {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
}

struct AccessToken {
    secret: SecretString,
    expires_at: Instant,
}

impl AccessToken {
    fn new(secret: SecretString, lifetime: Duration) -> Self {
        let now = Instant::now();
        Self {
            secret,
            expires_at: now.checked_add(lifetime).unwrap_or(now),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now.checked_add(TOKEN_REFRESH_MARGIN)
            .is_some_and(|deadline| deadline < self.expires_at)
    }
}

type Grant = Box<dyn Fn() -> Result<AccessToken> + Send + Sync>;

/// Holds the current bearer token and re-runs the grant when it goes stale.
struct TokenCache {
    grant: Grant,
    current: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    fn new(grant: Grant) -> Self {
        Self {
            grant,
            current: Mutex::new(None),
        }
    }

    /// Returns a fresh bearer token, granting a new one when needed.
    fn bearer(&self) -> Result<SecretString> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| Error::operation("reddit_token", "token lock poisoned"))?;
        let fresh = current
            .as_ref()
            .is_some_and(|token| token.is_fresh(Instant::now()));
        if !fresh {
            if current.is_some() {
                info!("Reddit token is about to expire, renewing");
            }
            *current = Some((self.grant)()?);
        }
        current
            .as_ref()
            .map(|token| token.secret.clone())
            .ok_or_else(|| Error::operation("reddit_token", "no token after grant"))
    }

    fn invalidate(&self) -> Result<()> {
        self.current
            .lock()
            .map(|mut current| *current = None)
            .map_err(|_| Error::operation("reddit_token", "token lock poisoned"))
    }

    /// Runs `call` with a bearer token, renewing once if it is rejected.
    fn with_token<T>(&self, call: impl Fn(&SecretString) -> Result<T>) -> Result<T> {
        let token = self.bearer()?;
        match call(&token) {
            Err(Error::Unauthorized(reason)) => {
                warn!(%reason, "Reddit rejected the bearer token, renewing");
                self.invalidate()?;
                call(&self.bearer()?)
            },
            other => other,
        }
    }
}

/// Authenticated Reddit API client.
pub struct RedditClient {
    client: Client,
    settings: RedditSettings,
    tokens: TokenCache,
    username: String,
}

impl std::fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditClient")
            .field("api_url", &self.settings.api_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl RedditClient {
    /// Exchanges `credentials` for a bearer token.
    ///
    /// The credentials are kept so the token can be renewed later.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] when the grant is rejected.
    #[instrument(name = "redsweep.reddit.login", skip_all, fields(username = %credentials.username()))]
    pub fn login(credentials: &Credentials, settings: &RedditSettings) -> Result<Self> {
        let client = transport::build_client(&settings.user_agent, settings.timeout);
        let grant = {
            let client = client.clone();
            let credentials = credentials.clone();
            let auth_url = settings.auth_url.clone();
            Box::new(move || request_token(&client, &credentials, &auth_url)) as Grant
        };
        let tokens = TokenCache::new(grant);
        tokens.bearer()?;

        info!("Authenticated with Reddit");
        Ok(Self {
            client,
            settings: settings.clone(),
            tokens,
            username: credentials.username().to_string(),
        })
    }

    /// Returns the username the client logged in as.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    fn get(&self, path: &str, operation: &str) -> Result<Response> {
        let url = format!("{}{path}", self.settings.api_url);
        self.tokens.with_token(|token| {
            transport::send(
                self.client.get(&url).bearer_auth(token.expose_secret()),
                operation,
            )
        })
    }

    fn post(&self, path: &str, form: &[(&str, &str)], operation: &str) -> Result<Response> {
        let url = format!("{}{path}", self.settings.api_url);
        self.tokens.with_token(|token| {
            transport::send(
                self.client
                    .post(&url)
                    .bearer_auth(token.expose_secret())
                    .form(form),
                operation,
            )
        })
    }

    fn listing(&self, path: &str, operation: &str) -> Result<Listing> {
        self.get(path, operation)?
            .json()
            .map_err(|e| Error::transport(operation, e))
    }

    fn post_form(&self, path: &str, form: &[(&str, &str)], operation: &str) -> Result<()> {
        let body: serde_json::Value = self
            .post(path, form, operation)?
            .json()
            .map_err(|e| Error::transport(operation, e))?;
        check_json_errors(&body)
    }
}

/// Runs the password grant.
fn request_token(client: &Client, credentials: &Credentials, auth_url: &str) -> Result<AccessToken> {
    let response = client
        .post(format!("{auth_url}/api/v1/access_token"))
        .basic_auth(
            credentials.client_id(),
            Some(credentials.client_secret().expose_secret()),
        )
        .form(&[
            ("grant_type", "password"),
            ("username", credentials.username()),
            ("password", credentials.password().expose_secret()),
        ])
        .send()
        .map_err(|e| Error::transport("reddit_token_request", e))?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Unauthorized(format!(
            "token request rejected with status {status}; check the client id and secret"
        )));
    }
    let response = transport::check_status(response)?;
    let token: TokenResponse = response
        .json()
        .map_err(|e| Error::operation("parse_reddit_token", e))?;
    access_token(token)
}

fn access_token(token: TokenResponse) -> Result<AccessToken> {
    let secret = match (token.access_token, token.error) {
        (Some(t), _) if !t.is_empty() => t,
        (_, Some(error)) => {
            return Err(Error::Unauthorized(format!(
                "token grant failed: {error}; check the username and password"
            )));
        },
        _ => return Err(Error::Unauthorized("token response had no access token".to_string())),
    };
    let lifetime = token
        .expires_in
        .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);
    debug!(expires_in = lifetime.as_secs(), "Granted Reddit token");
    Ok(AccessToken::new(SecretString::from(secret), lifetime))
}

impl Platform for RedditClient {
    fn authenticated_user(&self) -> Result<String> {
        let me: Me = self
            .get("/api/v1/me", "reddit_me")?
            .json()
            .map_err(|e| Error::transport("reddit_me", e))?;
        Ok(me.name)
    }

    fn list_page(&self, user: &str, kind: ItemKind, after: Option<&str>, limit: u32) -> Result<Page> {
        let section = match kind {
            ItemKind::Comment => "comments",
            ItemKind::Post => "submitted",
        };
        let mut path = format!("/user/{user}/{section}?sort=new&limit={limit}&raw_json=1");
        if let Some(after) = after {
            path.push_str("&after=");
            path.push_str(after);
        }
        let listing = self.listing(&path, "reddit_listing")?;
        let items = listing
            .data
            .children
            .into_iter()
            .map(parse_thing)
            .collect::<Result<Vec<_>>>()?;
        debug!(kind = %kind, count = items.len(), "Parsed listing page");
        Ok(Page {
            items,
            after: listing.data.after,
        })
    }

    fn fetch(&self, kind: ItemKind, id: &str) -> Result<Item> {
        let fullname = kind.fullname(id);
        let listing = self.listing(&format!("/api/info?id={fullname}&raw_json=1"), "reddit_info")?;
        listing
            .data
            .children
            .into_iter()
            .next()
            .map(parse_thing)
            .transpose()?
            .filter(|item| item.kind() == kind)
            .ok_or(Error::NotFound(fullname))
    }

    fn refresh_reply_count(&self, comment: &Comment) -> Result<u32> {
        let post_id = comment.link_id.trim_start_matches(ItemKind::Post.fullname_prefix());
        let comment_id = comment
            .base
            .id
            .trim_start_matches(ItemKind::Comment.fullname_prefix());
        let listings: Vec<Listing> = self
            .get(
                &format!("/comments/{post_id}/_/{comment_id}?depth=1&raw_json=1"),
                "reddit_refresh",
            )?
            .json()
            .map_err(|e| Error::transport("reddit_refresh", e))?;

        let thing = listings
            .into_iter()
            .nth(1)
            .and_then(|l| l.data.children.into_iter().next())
            .ok_or_else(|| Error::NotFound(comment.base.id.clone()))?;
        let data: CommentData =
            serde_json::from_value(thing.data).map_err(|e| Error::transport("reddit_refresh", e))?;
        Ok(count_replies(&data.replies))
    }

    fn scrub(&self, item: &Item, placeholder: &str) -> Result<()> {
        self.post_form(
            "/api/editusertext",
            &[("api_type", "json"), ("thing_id", item.id()), ("text", placeholder)],
            "reddit_edit",
        )
    }

    fn remove(&self, item: &Item) -> Result<()> {
        self.post_form("/api/del", &[("id", item.id())], "reddit_delete")
    }
}

/// Inspects an `api_type=json` body for `[code, message, field]` errors.
fn check_json_errors(body: &serde_json::Value) -> Result<()> {
    let Ok(envelope) = serde_json::from_value::<JsonEnvelope>(body.clone()) else {
        return Ok(());
    };
    let Some(first) = envelope.json.and_then(|j| j.errors.into_iter().next()) else {
        return Ok(());
    };
    let code = first.first().and_then(|v| v.as_str()).unwrap_or_default();
    let message = first.get(1).and_then(|v| v.as_str()).unwrap_or_default();
    if code == "RATELIMIT" {
        return Err(Error::RateLimited {
            retry_after: parse_ratelimit_message(message),
        });
    }
    Err(Error::Api {
        status: 200,
        message: format!("{code}: {message}"),
    })
}

/// Extracts "try again in N minutes/seconds" from a rate-limit message.
fn parse_ratelimit_message(message: &str) -> Option<Duration> {
    let lower = message.to_lowercase();
    let rest = &lower[lower.find(" in ")? + 4..];
    let mut words = rest.split_whitespace();
    let amount: u64 = words.next()?.parse().ok()?;
    let unit = words.next()?;
    let secs = if unit.starts_with("minute") {
        amount.checked_mul(60)?
    } else if unit.starts_with("second") {
        amount
    } else {
        return None;
    };
    Some(Duration::from_secs(secs).min(transport::MAX_SERVER_DELAY))
}

fn count_replies(replies: &serde_json::Value) -> u32 {
    replies
        .pointer("/data/children")
        .and_then(serde_json::Value::as_array)
        .map_or(0, |children| u32::try_from(children.len()).unwrap_or(u32::MAX))
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp(created_utc: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(created_utc as i64, 0).unwrap_or_default()
}

fn absolute_permalink(permalink: &str) -> String {
    if permalink.starts_with("http") {
        permalink.to_string()
    } else {
        format!("{PERMALINK_BASE}{permalink}")
    }
}

fn parse_thing(thing: Thing) -> Result<Item> {
    match thing.kind.as_str() {
        "t1" => {
            let data: CommentData = serde_json::from_value(thing.data)
                .map_err(|e| Error::transport("parse_reddit_comment", e))?;
            Ok(Item::Comment(Comment {
                base: ItemBase {
                    id: data.name,
                    created_at: timestamp(data.created_utc),
                    score: data.score,
                    subreddit: data.subreddit,
                    permalink: absolute_permalink(&data.permalink),
                },
                body: data.body,
                link_id: data.link_id,
                reply_count: None,
            }))
        },
        "t3" => {
            let data: PostData = serde_json::from_value(thing.data)
                .map_err(|e| Error::transport("parse_reddit_post", e))?;
            Ok(Item::Post(Post {
                base: ItemBase {
                    id: data.name,
                    created_at: timestamp(data.created_utc),
                    score: data.score,
                    subreddit: data.subreddit,
                    permalink: absolute_permalink(&data.permalink),
                },
                title: data.title,
                reply_count: data.num_comments,
            }))
        },
        other => Err(Error::transport(
            "parse_reddit_thing",
            format!("unexpected thing kind '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_comment_thing() {
        let thing = Thing {
            kind: "t1".to_string(),
            data: json!({
                "name": "t1_abc",
                "created_utc": 1_700_000_000.0,
                "score": -2,
                "subreddit": "rust",
                "permalink": "/r/rust/comments/p/_/abc/",
                "body": "hot take",
                "link_id": "t3_p",
                "replies": ""
            }),
        };
        let Item::Comment(c) = parse_thing(thing).unwrap() else {
            panic!("expected comment");
        };
        assert_eq!(c.base.id, "t1_abc");
        assert_eq!(c.base.score, -2);
        assert_eq!(c.base.created_at.timestamp(), 1_700_000_000);
        assert_eq!(c.base.permalink, "https://reddit.com/r/rust/comments/p/_/abc/");
        assert_eq!(c.reply_count, None);
    }

    #[test]
    fn test_parse_post_thing() {
        let thing = Thing {
            kind: "t3".to_string(),
            data: json!({
                "name": "t3_p",
                "created_utc": 1_700_000_000.5,
                "score": 10,
                "subreddit": "rust",
                "permalink": "/r/rust/comments/p/title/",
                "title": "Title",
                "num_comments": 4
            }),
        };
        let item = parse_thing(thing).unwrap();
        assert_eq!(item.kind(), ItemKind::Post);
        assert_eq!(item.text(), "Title");
        assert_eq!(item.reply_count(), Some(4));
    }

    #[test]
    fn test_unknown_thing_kind_is_an_error() {
        let thing = Thing {
            kind: "more".to_string(),
            data: json!({}),
        };
        assert!(parse_thing(thing).is_err());
    }

    #[test]
    fn test_count_replies() {
        assert_eq!(count_replies(&json!("")), 0);
        assert_eq!(
            count_replies(&json!({"kind": "Listing", "data": {"children": [{}, {}]}})),
            2
        );
    }

    #[test]
    fn test_json_errors() {
        assert!(check_json_errors(&json!({})).is_ok());
        assert!(check_json_errors(&json!({"json": {"errors": []}})).is_ok());

        let err = check_json_errors(&json!({"json": {"errors": [
            ["RATELIMIT", "you are doing that too much. try again in 2 minutes.", "ratelimit"]
        ]}}))
        .unwrap_err();
        assert!(matches!(
            err,
            Error::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(120)
        ));

        let err = check_json_errors(&json!({"json": {"errors": [
            ["NOT_AUTHOR", "you can't do that", "thing_id"]
        ]}}))
        .unwrap_err();
        assert!(matches!(err, Error::Api { status: 200, .. }));
    }

    #[test]
    fn test_ratelimit_message_parsing() {
        assert_eq!(
            parse_ratelimit_message("Try again in 9 seconds."),
            Some(Duration::from_secs(9))
        );
        assert_eq!(parse_ratelimit_message("slow down"), None);
    }

    #[test]
    fn test_ratelimit_message_huge_amounts() {
        assert_eq!(
            parse_ratelimit_message(&format!("try again in {} minutes.", u64::MAX)),
            None
        );
        assert_eq!(
            parse_ratelimit_message("try again in 600 minutes."),
            Some(transport::MAX_SERVER_DELAY)
        );
        assert_eq!(
            parse_ratelimit_message(&format!("try again in {} seconds.", u64::MAX)),
            Some(transport::MAX_SERVER_DELAY)
        );
        assert_eq!(parse_ratelimit_message("try again in 99999999999999999999999 seconds."), None);
    }

    fn counting_cache(lifetime: Duration) -> (TokenCache, Arc<AtomicUsize>) {
        let grants = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&grants);
        let cache = TokenCache::new(Box::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AccessToken::new(SecretString::from(format!("token-{n}")), lifetime))
        }));
        (cache, grants)
    }

    #[test]
    fn test_fresh_token_is_reused() {
        let (cache, grants) = counting_cache(DEFAULT_TOKEN_LIFETIME);
        assert_eq!(cache.bearer().unwrap().expose_secret(), "token-1");
        assert_eq!(cache.bearer().unwrap().expose_secret(), "token-1");
        assert_eq!(grants.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expiring_token_is_renewed() {
        let (cache, grants) = counting_cache(DEFAULT_TOKEN_LIFETIME);
        *cache.current.lock().unwrap() = Some(AccessToken::new(
            SecretString::from("old".to_string()),
            TOKEN_REFRESH_MARGIN / 2,
        ));

        assert_eq!(cache.bearer().unwrap().expose_secret(), "token-1");
        assert_eq!(grants.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejected_token_is_renewed_once() {
        let (cache, grants) = counting_cache(DEFAULT_TOKEN_LIFETIME);
        let seen = Mutex::new(Vec::new());

        let result = cache.with_token(|token| {
            let token = token.expose_secret().to_string();
            seen.lock().unwrap().push(token.clone());
            if token == "token-1" {
                Err(Error::Unauthorized("status 401 Unauthorized".to_string()))
            } else {
                Ok(token)
            }
        });

        assert_eq!(result.unwrap(), "token-2");
        assert_eq!(*seen.lock().unwrap(), vec!["token-1", "token-2"]);
        assert_eq!(grants.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_persistent_rejection_is_unauthorized() {
        let (cache, grants) = counting_cache(DEFAULT_TOKEN_LIFETIME);
        let calls = AtomicUsize::new(0);

        let result: Result<()> = cache.with_token(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Unauthorized("status 401 Unauthorized".to_string()))
        });

        assert!(matches!(result, Err(Error::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(grants.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_other_errors_keep_the_token() {
        let (cache, grants) = counting_cache(DEFAULT_TOKEN_LIFETIME);
        let result: Result<()> = cache.with_token(|_| Err(Error::transport("reddit_edit", "timeout")));
        assert!(matches!(result, Err(Error::Transport { .. })));
        assert_eq!(grants.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_token_lifetime_from_grant() {
        let token = access_token(TokenResponse {
            access_token: Some("abc".to_string()),
            expires_in: Some(30),
            error: None,
        })
        .unwrap();
        assert!(!token.is_fresh(Instant::now()));

        let token = access_token(TokenResponse {
            access_token: Some("abc".to_string()),
            expires_in: None,
            error: None,
        })
        .unwrap();
        assert!(token.is_fresh(Instant::now()));

        let err = access_token(TokenResponse {
            access_token: None,
            expires_in: None,
            error: Some("invalid_grant".to_string()),
        })
        .err();
        assert!(matches!(err, Some(Error::Unauthorized(_))));
    }

    #[test]
    fn test_settings_from_config() {
        let file = ConfigFileReddit {
            user_agent: Some("custom/1.0".to_string()),
            auth_url: Some("http://localhost:9000/".to_string()),
            api_url: None,
            timeout_secs: Some(5),
        };
        let settings = RedditSettings::from_config(&file);
        assert_eq!(settings.user_agent, "custom/1.0");
        assert_eq!(settings.auth_url, "http://localhost:9000");
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }
}
