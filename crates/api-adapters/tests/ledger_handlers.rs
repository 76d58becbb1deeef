//! Handler behaviour against mocked ports: auth, throttling, status mapping.

use std::net::SocketAddr;
use std::sync::Arc;

use api_adapters::{build_router, AppState};
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use domains::{
    Caller, DomainError, MockAccountRepo, MockIdentityProvider, MockLedgerStore, MockRateLimiter,
    Note, PricingPolicy, PromoError, PurchaseError, RateDecision, SystemClock,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use services::LedgerServices;
use tower::ServiceExt;
use uuid::Uuid;

const TOKEN: &str = "valid-token";

fn app(
    store: MockLedgerStore,
    repo: MockAccountRepo,
    identity: MockIdentityProvider,
    limiter: MockRateLimiter,
) -> Router {
    let services = LedgerServices::new(
        Arc::new(store),
        Arc::new(repo),
        Arc::new(SystemClock),
        PricingPolicy::default(),
    );
    build_router(AppState::new(services, Arc::new(identity), Arc::new(limiter)))
}

fn allow_all() -> MockRateLimiter {
    let mut limiter = MockRateLimiter::new();
    limiter
        .expect_hit()
        .returning(|_| Ok(RateDecision { allowed: true, remaining: 29, reset_after: 60 }));
    limiter
}

fn identity_for(user_id: Uuid) -> MockIdentityProvider {
    let mut identity = MockIdentityProvider::new();
    identity.expect_verify().returning(move |token| {
        if token == TOKEN {
            Ok(Caller { user_id, is_admin: false })
        } else {
            Err(DomainError::Unauthorized("invalid or expired token".into()))
        }
    });
    identity
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn paid_note(owner_id: Uuid) -> Note {
    Note {
        id: Uuid::new_v4(),
        owner_id,
        title: "Organic chemistry flashcards".to_string(),
        price: dec!(10.00),
        is_exclusive: false,
        is_sold: false,
        is_published: true,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn health_needs_no_token() {
    let mut limiter = MockRateLimiter::new();
    limiter.expect_hit().never();
    let app = app(
        MockLedgerStore::new(),
        MockAccountRepo::new(),
        MockIdentityProvider::new(),
        limiter,
    );

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn api_rejects_missing_token() {
    let app = app(
        MockLedgerStore::new(),
        MockAccountRepo::new(),
        MockIdentityProvider::new(),
        allow_all(),
    );

    let response = app
        .oneshot(Request::builder().uri("/api/me/balance").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn throttled_requests_never_reach_handlers() {
    let mut limiter = MockRateLimiter::new();
    limiter
        .expect_hit()
        .withf(|key| key == "198.51.100.4:/api/promo/redeem")
        .returning(|_| Ok(RateDecision { allowed: false, remaining: 0, reset_after: 42 }));
    let mut identity = MockIdentityProvider::new();
    identity.expect_verify().never();
    let mut store = MockLedgerStore::new();
    store.expect_redeem_promo_code().never();

    let app = app(store, MockAccountRepo::new(), identity, limiter);
    let mut request = post_json("/api/promo/redeem", json!({ "code": "WELCOME" }));
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([198, 51, 100, 4], 50_000))));
    // not a trusted proxy, so this is ignored
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.99".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    assert_eq!(json_body(response).await["error"], "rate_limited");
}

#[tokio::test]
async fn limiter_outage_lets_requests_through() {
    let user = Uuid::new_v4();
    let mut limiter = MockRateLimiter::new();
    limiter
        .expect_hit()
        .returning(|_| Err(DomainError::internal("connection refused")));
    let mut repo = MockAccountRepo::new();
    repo.expect_list_purchases().returning(|_| Ok(vec![]));

    let app = app(MockLedgerStore::new(), repo, identity_for(user), limiter);
    let request = Request::builder()
        .uri("/api/me/purchases")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn insufficient_points_maps_to_402() {
    let buyer = Uuid::new_v4();
    let listed = paid_note(Uuid::new_v4());
    let note_id = listed.id;

    let mut repo = MockAccountRepo::new();
    repo.expect_find_note().returning(move |_| Ok(Some(listed.clone())));
    let mut store = MockLedgerStore::new();
    store
        .expect_purchase_note()
        .returning(|_| Err(PurchaseError::InsufficientPoints.into()));

    let app = app(store, repo, identity_for(buyer), allow_all());
    let response = app
        .oneshot(post_json(
            &format!("/api/notes/{note_id}/purchase"),
            json!({ "method": "points" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "29");
    let body = json_body(response).await;
    assert_eq!(body["error"], "insufficient_points");
    assert_eq!(body["message"], "insufficient points");
}

#[tokio::test]
async fn store_failures_are_generic_500s() {
    let listed = paid_note(Uuid::new_v4());
    let note_id = listed.id;

    let mut repo = MockAccountRepo::new();
    repo.expect_find_note().returning(move |_| Ok(Some(listed.clone())));
    let mut store = MockLedgerStore::new();
    store
        .expect_purchase_note()
        .returning(|_| Err(DomainError::internal("could not serialize access")));

    let app = app(store, repo, identity_for(Uuid::new_v4()), allow_all());
    let response = app
        .oneshot(post_json(
            &format!("/api/notes/{note_id}/purchase"),
            json!({ "method": "dollars" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "internal", "message": "operation failed, try again" })
    );
}

#[tokio::test]
async fn malformed_note_id_is_400() {
    let app = app(
        MockLedgerStore::new(),
        MockAccountRepo::new(),
        identity_for(Uuid::new_v4()),
        allow_all(),
    );

    let response = app
        .oneshot(post_json("/api/notes/not-a-uuid/purchase", json!({ "method": "points" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "validation");
}

#[tokio::test]
async fn unknown_payment_method_is_400() {
    let app = app(
        MockLedgerStore::new(),
        MockAccountRepo::new(),
        identity_for(Uuid::new_v4()),
        allow_all(),
    );

    let response = app
        .oneshot(post_json(
            &format!("/api/notes/{}/purchase", Uuid::new_v4()),
            json!({ "method": "crypto" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_redemption_keeps_outcome_shape() {
    let mut store = MockLedgerStore::new();
    store
        .expect_redeem_promo_code()
        .withf(|code, _, _| code == "WELCOME")
        .returning(|_, _, _| Err(PromoError::AlreadyRedeemed.into()));

    let app = app(store, MockAccountRepo::new(), identity_for(Uuid::new_v4()), allow_all());
    let response = app
        .oneshot(post_json("/api/promo/redeem", json!({ "code": " welcome " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        json_body(response).await,
        json!({
            "success": false,
            "message": "You have already redeemed this promo code.",
            "points_received": 0
        })
    );
}

#[tokio::test]
async fn non_admins_cannot_create_promo_codes() {
    let mut store = MockLedgerStore::new();
    store.expect_create_promo_code().never();

    let app = app(store, MockAccountRepo::new(), identity_for(Uuid::new_v4()), allow_all());
    let response = app
        .oneshot(post_json(
            "/api/admin/promo-codes",
            json!({ "code": "LAUNCH", "points_amount": 100 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn metrics_report_ledger_outcomes() {
    let listed = paid_note(Uuid::new_v4());
    let note_id = listed.id;
    let mut repo = MockAccountRepo::new();
    repo.expect_find_note().returning(move |_| Ok(Some(listed.clone())));
    let mut store = MockLedgerStore::new();
    store
        .expect_purchase_note()
        .returning(|_| Err(PurchaseError::ExclusiveAlreadySold.into()));

    let app = app(store, repo, identity_for(Uuid::new_v4()), allow_all());
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/notes/{note_id}/purchase"),
            json!({ "method": "points" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"outcome="exclusive_already_sold""#));
    assert!(text.contains(r#"route="/api/notes/{id}/purchase""#));
}
