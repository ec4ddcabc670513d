//! Outbound requests to the spreadsheet scripts.
//!
//! Every proxy endpoint and the CLI go through [`fetch_with_retry`], each with
//! its own [`RetryPolicy`]. A per-attempt timeout drops the in-flight request.
//! Dropping the returned future cancels the whole fetch.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Source;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("Google Script returned {}", .status.as_u16())]
    Status {
        status: StatusCode,
        reason: String,
        body: String,
    },

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected content type {content_type:?}")]
    Content { content_type: Option<String>, body: String },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }

    fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            FetchError::Timeout(timeout)
        } else if error.is_decode() {
            FetchError::InvalidJson(error.to_string())
        } else {
            FetchError::Network(error.to_string())
        }
    }
}

// ============================================================================
// Retry policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    /// Same pause before every retry.
    Fixed(Duration),
    /// `step × attempt` after the given attempt.
    Linear(Duration),
}

impl Backoff {
    /// Pause after failed attempt number `attempt` (1-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(step) => step,
            Backoff::Linear(step) => step * attempt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    AnyFailure,
    TimeoutsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: Backoff,
    pub retry_on: RetryOn,
}

impl RetryPolicy {
    pub fn once(timeout: Duration) -> Self {
        Self {
            timeout,
            attempts: 1,
            backoff: Backoff::None,
            retry_on: RetryOn::AnyFailure,
        }
    }

    pub fn for_source(source: Source) -> Self {
        let secs = Duration::from_secs;
        match source {
            Source::Workforce | Source::Sortie => Self::once(secs(15)),
            Source::Attendance => Self {
                timeout: secs(30),
                attempts: 3,
                backoff: Backoff::Linear(secs(3)),
                retry_on: RetryOn::AnyFailure,
            },
            Source::Performance => Self::once(secs(180)),
            Source::Turnover => Self::once(secs(45)),
            Source::Recruitment => Self {
                timeout: secs(35),
                attempts: 3,
                backoff: Backoff::Fixed(secs(1)),
                retry_on: RetryOn::TimeoutsOnly,
            },
            Source::Auth => Self::once(secs(30)),
        }
    }

    /// Policy of the command-line client.
    pub fn client() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            attempts: 3,
            backoff: Backoff::Linear(Duration::from_secs(2)),
            retry_on: RetryOn::AnyFailure,
        }
    }

    fn should_retry(&self, error: &FetchError) -> bool {
        match self.retry_on {
            RetryOn::AnyFailure => true,
            RetryOn::TimeoutsOnly => error.is_timeout(),
        }
    }
}

/// Run `operation` until it succeeds, the policy stops retrying that kind of
/// failure, or the attempts run out. The last error is returned.
pub async fn fetch_with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(policy.timeout)),
        };

        let error = match result {
            Ok(value) => {
                debug!(source = label, attempt, "Fetch succeeded");
                return Ok(value);
            }
            Err(error) => error,
        };

        if attempt >= attempts || !policy.should_retry(&error) {
            return Err(error);
        }

        let delay = policy.backoff.delay(attempt);
        warn!(
            source = label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Fetch failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

// ============================================================================
// Client
// ============================================================================

/// Status and decoded body of a forwarded request. Non-JSON bodies are kept
/// as a string value.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Pooled HTTP client for the spreadsheet scripts.
#[derive(Debug, Clone, Default)]
pub struct SheetClient {
    http: reqwest::Client,
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.map_or(false, |ct| ct.contains("application/json"))
}

impl SheetClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// GET `url` and decode the JSON body.
    pub async fn get_json(&self, url: &str, label: &str, policy: &RetryPolicy) -> Result<Value, FetchError> {
        fetch_with_retry(policy, label, || self.get_once(url, policy.timeout, false)).await
    }

    /// Like [`get_json`](Self::get_json), but refuses a body not labelled
    /// `application/json`.
    pub async fn get_json_strict(&self, url: &str, label: &str, policy: &RetryPolicy) -> Result<Value, FetchError> {
        fetch_with_retry(policy, label, || self.get_once(url, policy.timeout, true)).await
    }

    async fn get_once(&self, url: &str, timeout: Duration, strict: bool) -> Result<Value, FetchError> {
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout))?;

        let status = response.status();
        debug!(%status, url, "Upstream responded");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status,
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        if strict {
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if !is_json(content_type.as_deref()) {
                let body: String = response.text().await.unwrap_or_default().chars().take(200).collect();
                return Err(FetchError::Content { content_type, body });
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::InvalidJson(e.to_string()))
    }

    /// POST `body` as `text/plain` and hand back whatever came back, error
    /// statuses included.
    pub async fn post_text(&self, url: &str, body: String, policy: &RetryPolicy) -> Result<UpstreamResponse, FetchError> {
        fetch_with_retry(policy, "upload", || {
            let body = body.clone();
            async move {
                let response = self
                    .http
                    .post(url)
                    .header(CONTENT_TYPE, "text/plain;charset=utf-8")
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| FetchError::from_reqwest(e, policy.timeout))?;

                let status = response.status();
                let json = is_json(response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()));
                let text = response
                    .text()
                    .await
                    .map_err(|e| FetchError::from_reqwest(e, policy.timeout))?;
                let body = if json {
                    serde_json::from_str(&text).map_err(|e| FetchError::InvalidJson(e.to_string()))?
                } else {
                    Value::String(text)
                };
                Ok(UpstreamResponse { status, body })
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::Router;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick(attempts: u32, retry_on: RetryOn) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            attempts,
            backoff: Backoff::Fixed(Duration::from_millis(1)),
            retry_on,
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_backoff_delays() {
        let step = Duration::from_secs(3);
        assert_eq!(Backoff::Linear(step).delay(2), Duration::from_secs(6));
        assert_eq!(Backoff::Fixed(step).delay(2), step);
        assert_eq!(Backoff::None.delay(5), Duration::ZERO);
    }

    #[test]
    fn test_source_policies() {
        let attendance = RetryPolicy::for_source(Source::Attendance);
        assert_eq!(attendance.attempts, 3);
        assert_eq!(attendance.backoff, Backoff::Linear(Duration::from_secs(3)));
        let recruitment = RetryPolicy::for_source(Source::Recruitment);
        assert_eq!(recruitment.retry_on, RetryOn::TimeoutsOnly);
        assert_eq!(RetryPolicy::for_source(Source::Performance).timeout, Duration::from_secs(180));
        assert_eq!(RetryPolicy::client().attempts, 3);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = &AtomicU32::new(0);
        let result = fetch_with_retry(&quick(3, RetryOn::AnyFailure), "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FetchError::Network("refused".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeouts_only_policy() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = fetch_with_retry(&quick(3, RetryOn::TimeoutsOnly), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Network("reset".into()))
        })
        .await;
        assert!(matches!(result, Err(FetchError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = fetch_with_retry(&quick(3, RetryOn::TimeoutsOnly), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_get_json_status_error() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let url = serve(Router::new().route(
            "/exec",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_GATEWAY, "down")
                }
            }),
        ))
        .await;

        let client = SheetClient::new();
        let err = client
            .get_json(&format!("{url}/exec"), "test", &quick(2, RetryOn::AnyFailure))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Google Script returned 502");
        assert!(matches!(err, FetchError::Status { ref body, .. } if body == "down"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_strict_content_type() {
        let url = serve(
            Router::new()
                .route("/json", get(|| async { axum::Json(serde_json::json!([["EMAIL"]])) }))
                .route(
                    "/html",
                    get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html>").into_response() }),
                ),
        )
        .await;

        let client = SheetClient::new();
        let policy = quick(1, RetryOn::AnyFailure);
        let rows = client.get_json_strict(&format!("{url}/json"), "auth", &policy).await.unwrap();
        assert_eq!(rows, serde_json::json!([["EMAIL"]]));

        let err = client.get_json_strict(&format!("{url}/html"), "auth", &policy).await.unwrap_err();
        assert!(matches!(err, FetchError::Content { content_type: Some(ref ct), .. } if ct == "text/html"));
    }

    #[tokio::test]
    async fn test_post_text_passthrough() {
        let url = serve(Router::new().route(
            "/upload",
            post(|body: String| async move { (StatusCode::ACCEPTED, format!("got {body}")) }),
        ))
        .await;

        let client = SheetClient::new();
        let response = client
            .post_text(&format!("{url}/upload"), "{\"a\":1}".into(), &quick(1, RetryOn::AnyFailure))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert_eq!(response.body, Value::String("got {\"a\":1}".into()));
    }
}
