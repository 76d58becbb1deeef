//! Read-only views of a user's balances and history.

use std::sync::Arc;

use domains::{AccountRepo, DomainError, LedgerEntry, Purchase, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

const MAX_PAGE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub user_id: Uuid,
    pub points_balance: i64,
    pub dollar_balance: Decimal,
}

#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountRepo>,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountRepo>) -> Self {
        Self { accounts }
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Balance> {
        let user = self
            .accounts
            .find_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("User", user_id))?;
        Ok(Balance {
            user_id,
            points_balance: user.points_balance,
            dollar_balance: user.dollar_balance,
        })
    }

    /// Ledger entries newest first. `limit` is clamped to 1..=100.
    pub async fn ledger(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>> {
        let limit = limit.clamp(1, MAX_PAGE);
        let offset = offset.max(0);
        self.accounts.list_entries(user_id, limit, offset).await
    }

    pub async fn purchases(&self, user_id: Uuid) -> Result<Vec<Purchase>> {
        self.accounts.list_purchases(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::MockAccountRepo;

    #[tokio::test]
    async fn ledger_page_is_clamped() {
        let mut accounts = MockAccountRepo::new();
        accounts
            .expect_list_entries()
            .withf(|_, limit, offset| *limit == 100 && *offset == 0)
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));

        let service = AccountService::new(Arc::new(accounts));
        let entries = service.ledger(Uuid::new_v4(), 5_000, -3).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn unknown_user_has_no_balance() {
        let mut accounts = MockAccountRepo::new();
        accounts.expect_find_user().returning(|_| Ok(None));

        let err = AccountService::new(Arc::new(accounts))
            .balance(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(..)));
    }
}
