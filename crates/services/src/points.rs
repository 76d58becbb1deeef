//! Points top-ups through the mock payment path.

use std::sync::Arc;

use domains::{DomainError, LedgerStore, PointsPackage, PricingPolicy, Result, TopUpReceipt, TopUpRequest};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::log_failure;

#[derive(Clone)]
pub struct PointsService {
    store: Arc<dyn LedgerStore>,
    pricing: Arc<PricingPolicy>,
}

impl PointsService {
    pub fn new(store: Arc<dyn LedgerStore>, pricing: Arc<PricingPolicy>) -> Self {
        Self { store, pricing }
    }

    pub fn packages(&self) -> &[PointsPackage] {
        &self.pricing.packages
    }

    /// Credits the package's points and records a `points_purchase` entry.
    /// No payment provider is contacted.
    #[instrument(skip(self))]
    pub async fn buy(&self, user_id: Uuid, package_id: &str) -> Result<TopUpReceipt> {
        let Some(package) = self.pricing.package(package_id) else {
            return Err(DomainError::Validation(format!("unknown points package '{package_id}'")));
        };

        let result = self
            .store
            .top_up_points(&TopUpRequest { user_id, package: package.clone() })
            .await;
        match &result {
            Ok(receipt) => info!(
                package = %package.id,
                points = receipt.points_added,
                paid = %receipt.amount_paid,
                "points purchased"
            ),
            Err(err) => log_failure("top_up_points", err),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::MockLedgerStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn buys_configured_package() {
        let mut store = MockLedgerStore::new();
        store
            .expect_top_up_points()
            .withf(|req| req.package.id == "value" && req.package.points == 1_100)
            .times(1)
            .returning(|req| {
                Ok(TopUpReceipt {
                    new_points_balance: req.package.points,
                    points_added: req.package.points,
                    amount_paid: req.package.price,
                })
            });

        let service = PointsService::new(Arc::new(store), Arc::new(PricingPolicy::default()));
        let receipt = service.buy(Uuid::new_v4(), "value").await.unwrap();
        assert_eq!(receipt.points_added, 1_100);
        assert_eq!(receipt.amount_paid, dec!(10.00));
    }

    #[tokio::test]
    async fn unknown_package_never_reaches_store() {
        let mut store = MockLedgerStore::new();
        store.expect_top_up_points().never();

        let service = PointsService::new(Arc::new(store), Arc::new(PricingPolicy::default()));
        let err = service.buy(Uuid::new_v4(), "whale").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(service.packages().len(), 3);
    }
}
