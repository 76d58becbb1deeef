//! # Domain Models
//!
//! These structs represent the ledger entities of the note marketplace.
//! Balances only change through the store operations declared in `ports`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A marketplace user and their two balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Spendable in-app points. Never negative.
    pub points_balance: i64,
    /// Seller earnings in dollars, two fraction digits. Never negative.
    pub dollar_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A note listed on the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// List price in dollars, 0 to 999.99. Zero means free.
    pub price: Decimal,
    /// Exclusive notes can be sold at most once.
    pub is_exclusive: bool,
    /// Only meaningful when `is_exclusive`; flips false to true exactly once.
    pub is_sold: bool,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn is_free(&self) -> bool {
        self.price.is_zero()
    }

    /// Still purchasable by someone who has not bought it yet.
    pub fn is_on_market(&self) -> bool {
        self.is_published && !(self.is_exclusive && self.is_sold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Points,
    Dollars,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Dollars => "dollars",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "points" => Ok(Self::Points),
            "dollars" => Ok(Self::Dollars),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// Ownership record for a bought note. Unique per (buyer, note).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub note_id: Uuid,
    pub price_paid: Decimal,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

/// Closed set of balance-affecting event kinds written to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    PointsPurchase,
    NoteBoughtPoints,
    NoteBoughtDollars,
    NoteSale,
    PromoCodeRedemption,
    DonationSent,
    DonationReceived,
    /// Audit-only row for the platform's cut of a donation.
    DonationFee,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 8] = [
        Self::PointsPurchase,
        Self::NoteBoughtPoints,
        Self::NoteBoughtDollars,
        Self::NoteSale,
        Self::PromoCodeRedemption,
        Self::DonationSent,
        Self::DonationReceived,
        Self::DonationFee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PointsPurchase => "points_purchase",
            Self::NoteBoughtPoints => "note_bought_points",
            Self::NoteBoughtDollars => "note_bought_dollars",
            Self::NoteSale => "note_sale",
            Self::PromoCodeRedemption => "promo_code_redemption",
            Self::DonationSent => "donation_sent",
            Self::DonationReceived => "donation_received",
            Self::DonationFee => "donation_fee",
        }
    }

    /// Buyer-side kind for a note purchase paid with `method`.
    pub fn bought_with(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Points => Self::NoteBoughtPoints,
            PaymentMethod::Dollars => Self::NoteBoughtDollars,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown transaction kind '{s}'"))
    }
}

/// Append-only ledger row. Never updated or deleted once written.
///
/// Only one of `amount` (dollars) and `points_amount` is meaningful for a given
/// kind; the other is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub points_amount: i64,
    pub note_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(user_id: Uuid, kind: TransactionKind, amount: Decimal, points_amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            points_amount,
            note_id: None,
            description: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_note(mut self, note_id: Uuid) -> Self {
        self.note_id = Some(note_id);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A one-time points grant redeemable by code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: Uuid,
    /// Normalised (trimmed, upper-case) code string. Unique.
    pub code: String,
    pub points_amount: i64,
    /// `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// `None` is unlimited.
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.current_uses >= max)
    }
}

/// Marks that `user_id` used `promo_code_id`. Unique per (code, user).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoRedemption {
    pub id: Uuid,
    pub promo_code_id: Uuid,
    pub user_id: Uuid,
    pub redeemed_at: DateTime<Utc>,
}

/// A point tip from a reader to a free note's author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: Uuid,
    pub donor_id: Uuid,
    pub recipient_id: Uuid,
    pub note_id: Uuid,
    /// Gross points taken from the donor.
    pub points_amount: i64,
    /// Net points credited after the platform fee.
    pub points_received: i64,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A mock-payment points package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsPackage {
    pub id: String,
    pub points: i64,
    pub price: Decimal,
}
