//! Shared blocking HTTP plumbing for the Reddit and Drive clients.

use crate::{Error, Result};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::HeaderMap;
use std::time::Duration;

/// Longest error body kept in an error message.
pub const MAX_ERROR_BODY: usize = 300;

/// Upper bound on any server-suggested delay.
pub const MAX_SERVER_DELAY: Duration = Duration::from_secs(900);

/// Builds a blocking client with a user agent and timeout.
pub fn build_client(user_agent: &str, timeout: Duration) -> Client {
    let mut builder = Client::builder().user_agent(user_agent.to_string());
    if !timeout.is_zero() {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build HTTP client: {err}");
        Client::new()
    })
}

/// Sends `request` and maps transport and status failures.
///
/// A request that never gets a response is [`Error::Transport`], which fails
/// only the item being worked on.
pub fn send(request: RequestBuilder, operation: &str) -> Result<Response> {
    let response = request.send().map_err(|e| {
        let error_kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connect"
        } else {
            "request"
        };
        tracing::error!(
            operation,
            error = %e,
            error_kind,
            is_timeout = e.is_timeout(),
            "HTTP request failed"
        );
        Error::transport(operation, format!("{error_kind} error: {e}"))
    })?;
    check_status(response)
}

/// Maps HTTP failures onto the error taxonomy.
///
/// 429 is retryable, 401 is run-fatal, 404 and everything else item-fatal.
pub fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = retry_after(response.headers());
    let body = response.text().unwrap_or_default();
    Err(status_error(status, retry_after, body.trim()))
}

/// Builds the error for a failed status.
pub fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Error {
    let message = truncate(body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED => Error::Unauthorized(format!("status {status}: {message}")),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        _ => Error::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Reads `Retry-After`, falling back to `x-ratelimit-reset`.
///
/// Values are capped at [`MAX_SERVER_DELAY`].
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    ["retry-after", "x-ratelimit-reset"].iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(|delay| delay.min(MAX_SERVER_DELAY))
    })
}

/// Caps `body` at [`MAX_ERROR_BODY`] bytes on a char boundary.
pub fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
