use super::{CounterError, CounterStore, RateDecision};
use crate::config::{RateLimitConfig, StoreErrorPolicy};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Identifier used when no proxy header names the client.
pub const LOOPBACK_PLACEHOLDER: &str = "127.0.0.1";

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Gate in front of the submission endpoints.
///
/// Holds no counters itself: every decision is one call into the shared
/// `CounterStore`.
pub struct AdmissionFilter {
    store: Arc<dyn CounterStore>,
    enabled: bool,
    capacity: u64,
    window: Duration,
    key_prefix: String,
    paths: Vec<String>,
    on_store_error: StoreErrorPolicy,
}

/// What the filter decided for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Path is not rate limited (or the filter is disabled)
    Bypass,
    Admit(RateDecision),
    Reject(RateDecision),
    /// Counter store failed and policy is fail-open
    AdmitUnchecked,
    /// Counter store failed and policy is fail-closed
    Unavailable,
}

impl AdmissionFilter {
    pub fn new(store: Arc<dyn CounterStore>, cfg: &RateLimitConfig) -> Self {
        Self {
            store,
            enabled: cfg.enabled,
            capacity: cfg.capacity,
            window: cfg.window(),
            key_prefix: cfg.key_prefix.clone(),
            paths: cfg.paths.clone(),
            on_store_error: cfg.on_store_error,
        }
    }

    /// True if requests to `path` go through the counter.
    pub fn applies_to(&self, path: &str) -> bool {
        self.enabled && self.paths.iter().any(|p| p == path)
    }

    /// One increment-and-check for `client`.
    pub async fn check(&self, client: &str) -> Result<RateDecision, CounterError> {
        let key = format!("{}:{}", self.key_prefix, client);
        self.store
            .increment_and_check(&key, self.window, self.capacity)
            .await
    }

    /// Decide on a request by path and resolved client identifier.
    pub async fn admit(&self, path: &str, client: &str) -> Admission {
        if !self.applies_to(path) {
            return Admission::Bypass;
        }

        match self.check(client).await {
            Ok(decision) if decision.admitted => Admission::Admit(decision),
            Ok(decision) => {
                warn!(
                    client = %client,
                    path = %path,
                    limit = decision.limit,
                    reset_at_ms = decision.reset_at_ms,
                    "Rate limit exceeded"
                );
                Admission::Reject(decision)
            }
            Err(e) => match self.on_store_error {
                StoreErrorPolicy::FailOpen => {
                    warn!(error = %e, client = %client, "Counter store failed, admitting request");
                    Admission::AdmitUnchecked
                }
                StoreErrorPolicy::FailClosed => {
                    error!(error = %e, client = %client, "Counter store failed, rejecting request");
                    Admission::Unavailable
                }
            },
        }
    }
}

/// Axum middleware wrapping the whole router.
///
/// Out-of-scope paths and admitted requests continue to `next` unchanged.
pub async fn admission_middleware(
    State(filter): State<Arc<AdmissionFilter>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let client = client_identifier(req.headers());
    let admission = filter.admit(&path, &client).await;
    match admission {
        Admission::Bypass | Admission::Admit(_) | Admission::AdmitUnchecked => {
            next.run(req).await
        }
        Admission::Reject(decision) => too_many_requests(&decision),
        Admission::Unavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Service temporarily unavailable.",
        )
            .into_response(),
    }
}

/// 429 with the informational rate-limit headers.
pub fn too_many_requests(decision: &RateDecision) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            (X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit)),
            (X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining)),
            (X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at_ms)),
        ],
        "Too many requests.",
    )
        .into_response()
}

/// Resolve the client identifier from proxy headers.
///
/// Takes the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// loopback placeholder. Headers are trusted as sent.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    LOOPBACK_PLACEHOLDER.to_string()
}
