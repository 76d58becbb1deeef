//! Promo code redemption and administration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{
    AccountRepo, Caller, Clock, DomainError, LedgerStore, NewPromoCode, PromoCode, PromoError,
    PromoGrant, Result,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::log_failure;

const MIN_CODE_LEN: usize = 3;
const MAX_CODE_LEN: usize = 32;

/// Trims and upper-cases `raw`, then checks it is a plausible code.
///
/// Codes are 3 to 32 characters of `A-Z`, `0-9`, `_` and `-`.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    let plausible = (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-');
    plausible.then_some(code)
}

/// The `{success, message, points_received}` shape clients render directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionOutcome {
    pub success: bool,
    pub message: String,
    pub points_received: i64,
}

impl RedemptionOutcome {
    pub fn from_result(result: &Result<PromoGrant>) -> Self {
        match result {
            Ok(grant) => Self {
                success: true,
                message: format!("Redeemed {} for {} points.", grant.code, grant.points_received),
                points_received: grant.points_received,
            },
            Err(err) => Self {
                success: false,
                message: err.public_message(),
                points_received: 0,
            },
        }
    }
}

#[derive(Clone)]
pub struct PromoService {
    store: Arc<dyn LedgerStore>,
    accounts: Arc<dyn AccountRepo>,
    clock: Arc<dyn Clock>,
}

impl PromoService {
    pub fn new(store: Arc<dyn LedgerStore>, accounts: Arc<dyn AccountRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { store, accounts, clock }
    }

    /// Admin-only: current state of a code, usage counter included.
    pub async fn find(&self, caller: Caller, raw_code: &str) -> Result<PromoCode> {
        if !caller.is_admin {
            return Err(DomainError::Forbidden("only admins can inspect promo codes".into()));
        }
        let code = normalize_code(raw_code).ok_or(PromoError::InvalidCode)?;
        self.accounts
            .find_promo_code(&code)
            .await?
            .ok_or_else(|| DomainError::not_found("PromoCode", &code))
    }

    /// Redeems `raw_code` for `user_id`. At most one success per (code, user).
    #[instrument(skip_all, fields(user = %user_id))]
    pub async fn redeem(&self, user_id: Uuid, raw_code: &str) -> Result<PromoGrant> {
        let result = self.try_redeem(user_id, raw_code).await;
        match &result {
            Ok(grant) => info!(
                code = %grant.code,
                points = grant.points_received,
                "promo code redeemed"
            ),
            Err(err) => log_failure("redeem_promo_code", err),
        }
        result
    }

    async fn try_redeem(&self, user_id: Uuid, raw_code: &str) -> Result<PromoGrant> {
        if raw_code.trim().is_empty() {
            return Err(DomainError::Validation("promo code is required".into()));
        }
        // A malformed code can never match a stored one.
        let code = normalize_code(raw_code).ok_or(PromoError::InvalidCode)?;
        self.store.redeem_promo_code(&code, user_id, self.clock.now()).await
    }

    /// Admin-only: registers a new code.
    #[instrument(skip_all, fields(admin = %caller.user_id))]
    pub async fn create(
        &self,
        caller: Caller,
        raw_code: &str,
        points_amount: i64,
        expires_at: Option<DateTime<Utc>>,
        max_uses: Option<i32>,
    ) -> Result<PromoCode> {
        if !caller.is_admin {
            return Err(DomainError::Forbidden("only admins can create promo codes".into()));
        }
        let code = normalize_code(raw_code).ok_or_else(|| {
            DomainError::Validation(format!(
                "code must be {MIN_CODE_LEN}-{MAX_CODE_LEN} characters of A-Z, 0-9, '_' or '-'"
            ))
        })?;
        if points_amount <= 0 {
            return Err(DomainError::Validation("points_amount must be positive".into()));
        }
        if max_uses.is_some_and(|max| max <= 0) {
            return Err(DomainError::Validation("max_uses must be positive".into()));
        }
        if expires_at.is_some_and(|at| at <= self.clock.now()) {
            return Err(DomainError::Validation("expires_at must be in the future".into()));
        }

        let promo = self
            .store
            .create_promo_code(&NewPromoCode { code, points_amount, expires_at, max_uses })
            .await?;
        info!(code = %promo.code, points = promo.points_amount, "promo code created");
        Ok(promo)
    }
}
