//! # Pricing
//!
//! Pure money math shared by the services and the store adapters: how many
//! points a note costs, what the buyer is charged, and how a tip is split
//! between author and platform.

use crate::errors::{DomainError, Result};
use crate::models::{PaymentMethod, PointsPackage};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Highest list price a note may carry.
pub fn max_note_price() -> Decimal {
    Decimal::new(99_999, 2)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub points_per_dollar: i64,
    /// Discount applied when paying with points, in whole percent.
    pub points_discount_percent: u32,
    /// Platform cut of every tip, in whole percent.
    pub donation_fee_percent: u32,
    pub donation_presets: Vec<i64>,
    pub packages: Vec<PointsPackage>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            points_per_dollar: 100,
            points_discount_percent: 5,
            donation_fee_percent: 30,
            donation_presets: vec![10, 50, 100, 500],
            packages: vec![
                PointsPackage { id: "starter".into(), points: 500, price: Decimal::new(500, 2) },
                PointsPackage { id: "value".into(), points: 1_100, price: Decimal::new(1_000, 2) },
                PointsPackage { id: "pro".into(), points: 6_000, price: Decimal::new(5_000, 2) },
            ],
        }
    }
}

/// What a single purchase will cost, computed before the store is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub method: PaymentMethod,
    /// Undiscounted list price; always what the seller is credited.
    pub dollar_price: Decimal,
    /// Dollar-equivalent actually charged to the buyer.
    pub amount_charged: Decimal,
    /// Points deducted from the buyer, zero on the dollar path.
    pub points_cost: i64,
}

/// Gross tip, the author's net share, and the platform fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DonationSplit {
    pub gross: i64,
    pub net: i64,
    pub fee: i64,
}

impl PricingPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.points_per_dollar <= 0 {
            return Err(DomainError::Validation("points_per_dollar must be positive".into()));
        }
        if self.points_discount_percent >= 100 || self.donation_fee_percent >= 100 {
            return Err(DomainError::Validation("percentages must be below 100".into()));
        }
        if self.donation_presets.is_empty() || self.donation_presets.iter().any(|p| *p <= 0) {
            return Err(DomainError::Validation("donation presets must be positive".into()));
        }
        if let Some(preset) = self.donation_presets.iter().find(|p| self.split_donation(**p).net <= 0) {
            return Err(DomainError::Validation(format!(
                "donation preset {preset} leaves the author nothing after the fee"
            )));
        }
        for (i, package) in self.packages.iter().enumerate() {
            if package.points <= 0 || package.price <= Decimal::ZERO {
                return Err(DomainError::Validation(format!("package '{}' is empty", package.id)));
            }
            if self.packages[..i].iter().any(|p| p.id == package.id) {
                return Err(DomainError::Validation(format!("duplicate package '{}'", package.id)));
            }
        }
        Ok(())
    }

    /// Prices a note for `method`.
    ///
    /// Points path: `ceil(price * (1 - discount) * points_per_dollar)` points,
    /// and the discounted dollar amount (rounded to cents) as the charge.
    /// Dollar path: the list price, no points.
    pub fn quote(&self, price: Decimal, method: PaymentMethod) -> Result<Quote> {
        if price.is_sign_negative() || price > max_note_price() {
            return Err(DomainError::Validation(format!("price {price} is out of range")));
        }

        match method {
            PaymentMethod::Dollars => Ok(Quote {
                method,
                dollar_price: price,
                amount_charged: price,
                points_cost: 0,
            }),
            PaymentMethod::Points => {
                let keep = Decimal::from(100 - self.points_discount_percent) / Decimal::from(100);
                let discounted = price * keep;
                let points_cost = (discounted * Decimal::from(self.points_per_dollar))
                    .ceil()
                    .to_i64()
                    .ok_or_else(|| DomainError::Validation("points cost overflow".into()))?;
                Ok(Quote {
                    method,
                    dollar_price: price,
                    amount_charged: discounted.round_dp(2),
                    points_cost,
                })
            }
        }
    }

    pub fn is_allowed_donation(&self, points: i64) -> bool {
        self.donation_presets.contains(&points)
    }

    /// `net = floor(points * (1 - fee))`; the remainder is the platform fee.
    pub fn split_donation(&self, points: i64) -> DonationSplit {
        let keep = i64::from(100 - self.donation_fee_percent);
        let net = points * keep / 100;
        DonationSplit { gross: points, net, fee: points - net }
    }

    pub fn package(&self, id: &str) -> Option<&PointsPackage> {
        self.packages.iter().find(|p| p.id == id)
    }
}
