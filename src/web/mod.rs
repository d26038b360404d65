//! JSON web service.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /health` | Liveness probe |
//! | `GET /api/items?limit=N` | Newest comments and posts with their policy decision |
//! | `POST /api/delete` | Retire the selected ids (source tag `web`) |
//! | `POST /api/cleanup` | Policy run with optional rule, threshold and dry-run |
//!
//! The engine is blocking, so every engine call runs under
//! `tokio::task::spawn_blocking`. One async mutex serializes them so two
//! requests never append to the archive logs at the same time.

use crate::config::SweepConfig;
use crate::models::{ItemKind, SourceTag};
use crate::platform::Platform;
use crate::retention::{RetentionPolicy, RetentionRule};
use crate::services::{
    ArchiveConfig, ArchiveSync, CleanupOptions, CleanupOrchestrator, CleanupReport, PreviewItem,
    RetryConfig, SyncOutcome, SyncSettings, SyncedFile,
};
use crate::{Error, ErrorClass};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Default port for `redsweep serve`.
pub const DEFAULT_PORT: u16 = 8080;

/// Default number of items per kind returned by `/api/items`.
pub const DEFAULT_ITEM_LIMIT: usize = 100;

struct Engine {
    platform: Arc<dyn Platform>,
    username: String,
    policy: RetentionPolicy,
    retry: RetryConfig,
    archive: ArchiveConfig,
    sync: SyncSettings,
}

impl Engine {
    fn orchestrator(&self, options: CleanupOptions) -> CleanupOrchestrator<'_> {
        CleanupOrchestrator::new(self.platform.as_ref(), options, self.retry.clone())
            .with_archive(self.archive.clone())
            .with_optional_sync(ArchiveSync::from_settings(&self.sync))
    }
}

/// Shared state for the web routes.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Creates state over an authenticated platform client.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, username: impl Into<String>, config: &SweepConfig) -> Self {
        Self {
            engine: Arc::new(Engine {
                platform,
                username: username.into(),
                policy: config.policy,
                retry: config.retry.clone(),
                archive: config.archive.clone(),
                sync: config.sync.clone(),
            }),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs `f` on the blocking pool, one call at a time.
    async fn blocking<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> crate::Result<T> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| ApiError(Error::operation("engine_task", e)))?
            .map_err(ApiError)
    }
}

/// An engine error rendered as JSON.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    const fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Unauthorized(_) | Error::CredentialsNotFound(_) => StatusCode::UNAUTHORIZED,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            e => match e.class() {
                ErrorClass::ItemFatal => StatusCode::BAD_GATEWAY,
                ErrorClass::Retryable | ErrorClass::RunFatal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), error = %self.0, "Request failed");
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// One item as listed by `/api/items`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ItemView {
    /// Fullname.
    pub id: String,
    /// `comment` or `post`.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Comment body, truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Post title, truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Score.
    pub score: i64,
    /// Community.
    pub subreddit: String,
    /// Creation time as a Unix timestamp.
    pub created_utc: i64,
    /// Creation date, `YYYY-MM-DD`.
    pub created_date: String,
    /// Absolute URL.
    pub permalink: String,
    /// Comment count, posts only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_comments: Option<u32>,
    /// Whether the server policy would retire it; `null` when undecidable without a refresh.
    pub matches_policy: Option<bool>,
}

impl From<PreviewItem> for ItemView {
    fn from(item: PreviewItem) -> Self {
        let (body, title) = match item.kind {
            ItemKind::Comment => (Some(item.text), None),
            ItemKind::Post => (None, Some(item.text)),
        };
        Self {
            id: item.id,
            kind: item.kind,
            body,
            title,
            score: item.score,
            subreddit: item.subreddit,
            created_utc: item.created_at.timestamp(),
            created_date: format_date(item.created_at),
            permalink: item.permalink,
            num_comments: item.num_comments,
            matches_policy: item.matches_policy,
        }
    }
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// `/api/items` response.
#[derive(Debug, Serialize, Default)]
pub struct ItemsResponse {
    /// Comments, newest first.
    pub comments: Vec<ItemView>,
    /// Posts, newest first.
    pub posts: Vec<ItemView>,
}

/// `/api/items` query.
#[derive(Debug, Deserialize, Default)]
pub struct ItemsQuery {
    /// Items per kind.
    pub limit: Option<usize>,
}

/// `/api/delete` request.
#[derive(Debug, Deserialize, Default)]
pub struct DeleteRequest {
    /// Comment ids, bare or fullname.
    #[serde(default)]
    pub comment_ids: Vec<String>,
    /// Post ids, bare or fullname.
    #[serde(default)]
    pub post_ids: Vec<String>,
}

/// `/api/delete` response.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Comments scrubbed and removed.
    pub deleted_comments: usize,
    /// Posts scrubbed and removed.
    pub deleted_posts: usize,
    /// One message per failed item.
    pub errors: Vec<String>,
    /// Uploaded archive logs.
    pub drive_links: Vec<SyncedFile>,
    /// Full sync outcome.
    pub sync: SyncOutcome,
}

impl From<CleanupReport> for DeleteResponse {
    fn from(report: CleanupReport) -> Self {
        let mutated = |kind| report.kind(kind).map_or(0, |k| k.mutated);
        Self {
            deleted_comments: mutated(ItemKind::Comment),
            deleted_posts: mutated(ItemKind::Post),
            errors: report.errors.iter().map(ToString::to_string).collect(),
            drive_links: report.sync.files().to_vec(),
            sync: report.sync,
        }
    }
}

/// `/api/cleanup` request.
#[derive(Debug, Deserialize, Default)]
pub struct CleanupRequest {
    /// Rule name; the server policy's rule when absent.
    pub rule: Option<String>,
    /// Threshold in days; the server policy's when absent.
    pub age_threshold_days: Option<u32>,
    /// Scan and decide only.
    #[serde(default)]
    pub dry_run: bool,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/items", get(list_items))
        .route("/api/delete", post(delete_items))
        .route("/api/cleanup", post(run_cleanup))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            header::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `router(state)` on `port` until the process is stopped.
///
/// # Errors
///
/// Returns an error if the runtime cannot be created or the port cannot be bound.
pub fn serve(state: AppState, port: u16) -> crate::Result<()> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| Error::operation("create_runtime", e))?;
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting web server");

    rt.block_on(async {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::operation("bind", e))?;
        axum::serve(listener, router(state))
            .await
            .map_err(|e| Error::operation("serve", e))
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[instrument(name = "redsweep.web.items", skip(state))]
async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<ItemsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ITEM_LIMIT);
    let items = state
        .blocking(move |engine| {
            engine
                .orchestrator(CleanupOptions::new(engine.policy).with_source(SourceTag::Web))
                .preview(&engine.username, Some(limit))
        })
        .await?;

    let mut response = ItemsResponse::default();
    for item in items {
        match item.kind {
            ItemKind::Comment => response.comments.push(item.into()),
            ItemKind::Post => response.posts.push(item.into()),
        }
    }
    Ok(Json(response))
}

#[instrument(
    name = "redsweep.web.delete",
    skip(state, request),
    fields(comments = request.comment_ids.len(), posts = request.post_ids.len())
)]
async fn delete_items(
    State(state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let ids: Vec<(ItemKind, String)> = request
        .comment_ids
        .into_iter()
        .map(|id| (ItemKind::Comment, id))
        .chain(request.post_ids.into_iter().map(|id| (ItemKind::Post, id)))
        .filter(|(_, id)| !id.trim().is_empty())
        .collect();
    if ids.is_empty() {
        return Err(ApiError(Error::InvalidInput(
            "comment_ids and post_ids are both empty".to_string(),
        )));
    }

    let report = state
        .blocking(move |engine| {
            engine
                .orchestrator(CleanupOptions::new(engine.policy).with_source(SourceTag::Web))
                .delete_by_ids(&engine.username, &ids)
        })
        .await?;
    Ok(Json(report.into()))
}

#[instrument(name = "redsweep.web.cleanup", skip(state, request), fields(dry_run = request.dry_run))]
async fn run_cleanup(
    State(state): State<AppState>,
    Json(request): Json<CleanupRequest>,
) -> Result<Json<CleanupReport>, ApiError> {
    let rule = request
        .rule
        .as_deref()
        .map(str::parse::<RetentionRule>)
        .transpose()
        .map_err(ApiError)?;

    let report = state
        .blocking(move |engine| {
            let mut policy = engine.policy;
            if let Some(rule) = rule {
                policy = policy.with_rule(rule);
            }
            if let Some(days) = request.age_threshold_days {
                policy = policy.with_age_threshold_days(days);
            }
            let options = CleanupOptions::new(policy)
                .with_source(SourceTag::Web)
                .with_dry_run(request.dry_run);
            engine.orchestrator(options).run(&engine.username)
        })
        .await?;
    Ok(Json(report))
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("username", &self.engine.username)
            .finish_non_exhaustive()
    }
}
