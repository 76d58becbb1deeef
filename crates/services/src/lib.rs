//! # services
//!
//! Use cases for the points ledger. Each service validates caller input, prices
//! the operation with the configured [`PricingPolicy`], and hands a single
//! atomic command to the [`LedgerStore`].

pub mod access;
pub mod account;
pub mod donation;
pub mod points;
pub mod promo;
pub mod purchase;

use std::sync::Arc;

use domains::{AccountRepo, Clock, DomainError, LedgerStore, PricingPolicy};

pub use access::AccessService;
pub use account::{AccountService, Balance};
pub use donation::DonationService;
pub use points::PointsService;
pub use promo::{normalize_code, PromoService, RedemptionOutcome};
pub use purchase::PurchaseService;

/// All services sharing one store, repo, clock and pricing policy.
#[derive(Clone)]
pub struct LedgerServices {
    pub purchases: PurchaseService,
    pub promos: PromoService,
    pub donations: DonationService,
    pub points: PointsService,
    pub access: AccessService,
    pub accounts: AccountService,
}

impl LedgerServices {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accounts: Arc<dyn AccountRepo>,
        clock: Arc<dyn Clock>,
        pricing: PricingPolicy,
    ) -> Self {
        let pricing = Arc::new(pricing);
        Self {
            purchases: PurchaseService::new(store.clone(), accounts.clone(), pricing.clone()),
            promos: PromoService::new(store.clone(), accounts.clone(), clock),
            donations: DonationService::new(store.clone(), accounts.clone(), pricing.clone()),
            points: PointsService::new(store, pricing),
            access: AccessService::new(accounts.clone()),
            accounts: AccountService::new(accounts),
        }
    }
}

/// Precondition failures are expected traffic; store failures are not.
pub(crate) fn log_failure(operation: &'static str, err: &DomainError) {
    match err {
        DomainError::Internal(detail) => {
            tracing::error!(operation, error = %detail, "ledger store failure")
        }
        other => tracing::warn!(operation, code = other.code(), "ledger operation rejected"),
    }
}
