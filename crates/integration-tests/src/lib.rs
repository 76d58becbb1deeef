//! # integration-tests
//!
//! Shared harness: the real router over the in-memory ledger and limiter,
//! authenticated with real JWTs.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use api_adapters::{build_router, AppState};
use auth_adapters::JwtIdentityProvider;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use domains::{Note, PricingPolicy, PromoCode, SystemClock, UserAccount};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use services::LedgerServices;
use storage_adapters::{MemoryLedgerStore, MemoryRateLimiter};
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryLedgerStore>,
    pub auth: Arc<JwtIdentityProvider>,
}

/// A seeded account and a bearer token for it.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_rate_limit(10_000, Duration::from_secs(60))
    }

    pub fn with_rate_limit(max_requests: u32, window: Duration) -> Self {
        Self::with_limits(max_requests, window, Vec::new())
    }

    /// Rate limited, with `trusted_proxies` allowed to set `x-forwarded-for`.
    pub fn with_limits(max_requests: u32, window: Duration, trusted_proxies: Vec<IpAddr>) -> Self {
        let store = Arc::new(MemoryLedgerStore::new());
        let auth = Arc::new(JwtIdentityProvider::new(&SecretString::from(TEST_SECRET), 3600));
        let services = LedgerServices::new(
            store.clone(),
            store.clone(),
            Arc::new(SystemClock),
            PricingPolicy::default(),
        );
        let limiter = Arc::new(MemoryRateLimiter::new(max_requests, window));
        let state = AppState::new(services, auth.clone(), limiter).with_trusted_proxies(trusted_proxies);
        let router = build_router(state);
        Self { router, store, auth }
    }

    pub async fn user(&self, username: &str, points: i64) -> TestUser {
        self.account(username, points, false).await
    }

    pub async fn admin(&self) -> TestUser {
        self.account("admin", 0, true).await
    }

    async fn account(&self, username: &str, points: i64, is_admin: bool) -> TestUser {
        let id = Uuid::new_v4();
        self.store
            .insert_user(UserAccount {
                id,
                username: username.to_string(),
                email: format!("{username}@notemart.test"),
                points_balance: points,
                dollar_balance: Decimal::ZERO,
                created_at: Utc::now(),
            })
            .await;
        let token = self.auth.issue(id, is_admin).expect("issue token");
        TestUser { id, token }
    }

    /// A published note listed by `owner`.
    pub async fn note(&self, owner: &TestUser, price: Decimal, is_exclusive: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_note(Note {
                id,
                owner_id: owner.id,
                title: format!("note {id}"),
                price,
                is_exclusive,
                is_sold: false,
                is_published: true,
                created_at: Utc::now(),
            })
            .await;
        id
    }

    pub async fn promo(
        &self,
        code: &str,
        points_amount: i64,
        expires_at: Option<DateTime<Utc>>,
        max_uses: Option<i32>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_promo_code(PromoCode {
                id,
                code: code.to_string(),
                points_amount,
                expires_at,
                max_uses,
                current_uses: 0,
                is_active: true,
                created_at: Utc::now(),
            })
            .await;
        id
    }

    pub async fn get(&self, user: &TestUser, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    pub async fn post(&self, user: &TestUser, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, body)
    }

    pub async fn points(&self, user: &TestUser) -> i64 {
        let (status, body) = self.get(user, "/api/me/balance").await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["points_balance"].as_i64().expect("points_balance")
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
