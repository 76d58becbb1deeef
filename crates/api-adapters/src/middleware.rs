//! Rate limiting and request metrics.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use domains::DomainError;

use crate::error::ApiError;
use crate::extract::{client_addr, route_label};
use crate::state::AppState;

pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Fixed-window throttle keyed by `<client address>:<route>`.
///
/// A limiter outage lets traffic through: throttling protects resources, the
/// ledger never depends on it.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = format!(
        "{}:{}",
        client_addr(request.headers(), request.extensions(), &state.trusted_proxies),
        route_label(&request)
    );

    let decision = match state.limiter.hit(&key).await {
        Ok(decision) => decision,
        Err(err) => {
            tracing::error!(error = %err, "rate limiter unavailable, request allowed");
            return next.run(request).await;
        }
    };

    if !decision.allowed {
        state.metrics.record_rate_limited();
        tracing::warn!(%key, reset_after = decision.reset_after, "rate limit exceeded");
        let err = DomainError::RateLimitExceeded(format!(
            "too many requests, retry in {}s",
            decision.reset_after
        ));
        let mut response = ApiError(err).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(decision.reset_after));
        response.headers_mut().insert(RATE_LIMIT_REMAINING, HeaderValue::from(0u32));
        return response;
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    response
}

pub async fn track_http(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = route_label(&request);
    let method = request.method().clone();
    let started = Instant::now();

    let response = next.run(request).await;
    state
        .metrics
        .observe_http(method.as_str(), &route, response.status().as_u16(), started.elapsed());
    response
}
