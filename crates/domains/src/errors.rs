//! # DomainError
//!
//! Centralized error handling for the ledger.
//! Precondition failures keep their own enums so callers can map each one to an
//! actionable message; store failures collapse into `Internal`.

use thiserror::Error;

/// Rejections raised by `purchase_note`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseError {
    #[error("note not found")]
    NoteNotFound,
    #[error("you already own this note")]
    AlreadyPurchased,
    #[error("this exclusive note is no longer available")]
    ExclusiveAlreadySold,
    #[error("insufficient points")]
    InsufficientPoints,
}

/// Rejections raised by `redeem_promo_code`, in validation order.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoError {
    #[error("Invalid promo code.")]
    InvalidCode,
    #[error("This promo code is no longer active.")]
    Inactive,
    #[error("This promo code has expired.")]
    Expired,
    #[error("This promo code has reached its maximum usage limit.")]
    UsageCapReached,
    #[error("You have already redeemed this promo code.")]
    AlreadyRedeemed,
}

/// Rejections raised by `donate`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationError {
    #[error("you cannot tip your own note")]
    SelfDonation,
    #[error("tips are only accepted on free notes")]
    NotFree,
    #[error("insufficient points")]
    InsufficientPoints,
    #[error("note not found")]
    NoteNotFound,
    #[error("tip amount is not one of the allowed presets")]
    InvalidAmount,
}

/// The primary error type for all ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Purchase(#[from] PurchaseError),

    #[error(transparent)]
    Promo(#[from] PromoError),

    #[error(transparent)]
    Donation(#[from] DonationError),

    /// Resource not found (e.g., User, Note)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Malformed input, rejected before the store is touched
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (e.g., non-admin creating promo codes)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource already exists (e.g., duplicate promo code)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded
    #[error("too many requests: {0}")]
    RateLimitExceeded(String),

    /// Infrastructure failure (e.g., DB down, Redis timeout)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound(entity.to_string(), id.to_string())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    /// Text safe to show the caller. Store failures never leak their detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "operation failed, try again".to_string(),
            other => other.to_string(),
        }
    }

    /// Stable machine-readable code for API bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Purchase(PurchaseError::NoteNotFound) => "note_not_found",
            Self::Purchase(PurchaseError::AlreadyPurchased) => "already_purchased",
            Self::Purchase(PurchaseError::ExclusiveAlreadySold) => "exclusive_already_sold",
            Self::Purchase(PurchaseError::InsufficientPoints) => "insufficient_points",
            Self::Promo(PromoError::InvalidCode) => "invalid_code",
            Self::Promo(PromoError::Inactive) => "inactive",
            Self::Promo(PromoError::Expired) => "expired",
            Self::Promo(PromoError::UsageCapReached) => "usage_cap_reached",
            Self::Promo(PromoError::AlreadyRedeemed) => "already_redeemed",
            Self::Donation(DonationError::SelfDonation) => "self_donation",
            Self::Donation(DonationError::NotFree) => "not_free",
            Self::Donation(DonationError::InsufficientPoints) => "insufficient_points",
            Self::Donation(DonationError::NoteNotFound) => "note_not_found",
            Self::Donation(DonationError::InvalidAmount) => "invalid_amount",
            Self::NotFound(..) => "not_found",
            Self::Validation(_) => "validation",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::RateLimitExceeded(_) => "rate_limited",
            Self::Internal(_) => "internal",
        }
    }
}

/// A specialized Result type for ledger logic.
pub type Result<T> = std::result::Result<T, DomainError>;
