//! # Ports
//!
//! Any adapter must implement these traits to be wired into the binary.
//!
//! Every `LedgerStore` mutation is one atomic unit: either all of its effects
//! commit or none do. Preconditions that race with other writers (balance,
//! exclusive sold flag, uniqueness) are re-checked inside that unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{LedgerEntry, Note, PaymentMethod, PointsPackage, PromoCode, Purchase, UserAccount};
use crate::pricing::{DonationSplit, Quote};

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub buyer_id: Uuid,
    pub note_id: Uuid,
    pub quote: Quote,
}

/// Enough for the caller to update its view without re-fetching.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    pub purchase_id: Uuid,
    pub note_id: Uuid,
    pub new_points_balance: i64,
    pub payment_method: PaymentMethod,
    pub amount_charged: Decimal,
    pub points_deducted: i64,
    pub is_exclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromoGrant {
    pub promo_code_id: Uuid,
    pub code: String,
    pub points_received: i64,
    pub new_points_balance: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DonationRequest {
    pub donor_id: Uuid,
    pub recipient_id: Uuid,
    pub note_id: Uuid,
    pub split: DonationSplit,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonationReceipt {
    pub donation_id: Uuid,
    pub new_points_balance: i64,
    pub points_sent: i64,
    pub points_received: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopUpRequest {
    pub user_id: Uuid,
    pub package: PointsPackage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopUpReceipt {
    pub new_points_balance: i64,
    pub points_added: i64,
    pub amount_paid: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPromoCode {
    pub code: String,
    pub points_amount: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
}

/// Transactional balance mutations.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Debits the buyer (points path), credits the seller the full list price,
    /// writes both ledger rows and the purchase record, and flips `is_sold` for
    /// exclusive notes.
    async fn purchase_note(&self, request: &PurchaseRequest) -> Result<PurchaseReceipt>;

    /// `code` must already be normalised. `now` decides expiry.
    async fn redeem_promo_code(&self, code: &str, user_id: Uuid, now: DateTime<Utc>) -> Result<PromoGrant>;

    async fn donate(&self, request: &DonationRequest) -> Result<DonationReceipt>;

    async fn top_up_points(&self, request: &TopUpRequest) -> Result<TopUpReceipt>;

    async fn create_promo_code(&self, promo: &NewPromoCode) -> Result<PromoCode>;
}

/// Read-side lookups. None of these change balances.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AccountRepo: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>>;
    async fn find_note(&self, id: Uuid) -> Result<Option<Note>>;
    async fn find_purchase(&self, buyer_id: Uuid, note_id: Uuid) -> Result<Option<Purchase>>;
    async fn list_purchases(&self, buyer_id: Uuid) -> Result<Vec<Purchase>>;
    /// Newest first.
    async fn list_entries(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>>;
    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds until the current window resets.
    pub reset_after: u64,
}

/// Fixed-window request counter keyed by client address and route.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn hit(&self, key: &str) -> Result<RateDecision>;
}

/// The authenticated caller behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub is_admin: bool,
}

/// Identity contract: turns a bearer credential into a caller.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    fn verify(&self, token: &str) -> Result<Caller>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
