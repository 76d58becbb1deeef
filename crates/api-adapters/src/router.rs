use axum::body::Body;
use axum::http::Request;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, me, notes, points, promo, system};
use crate::middleware::{rate_limit, track_http};
use crate::state::AppState;

/// Builds the full application router.
///
/// `/health` and `/metrics` are open; everything under `/api` is rate limited
/// and requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    // `route_layer` only wraps the routes registered before it.
    Router::new()
        .route("/api/notes/{id}/purchase", post(notes::purchase))
        .route("/api/notes/{id}/quote", get(notes::quote))
        .route("/api/notes/{id}/access", get(notes::access))
        .route("/api/notes/{id}/donate", post(notes::donate))
        .route("/api/promo/redeem", post(promo::redeem))
        .route("/api/points/purchase", post(points::buy))
        .route("/api/points/packages", get(points::packages))
        .route("/api/me/balance", get(me::balance))
        .route("/api/me/transactions", get(me::transactions))
        .route("/api/me/purchases", get(me::purchases))
        .route("/api/admin/promo-codes", post(admin::create_promo_code))
        .route("/api/admin/promo-codes/{code}", get(admin::find_promo_code))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .layer(middleware::from_fn_with_state(state.clone(), track_http))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        request_id = %request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
