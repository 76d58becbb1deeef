//! HTTP error bodies and the mapping from domain failures.
//!
//! Bodies are `{ "error": code, "message": text }`. Store failures are logged
//! where they happen; here they only become a generic 500.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::{DomainError, DonationError, PromoError, PurchaseError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError(pub DomainError);

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

pub fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Purchase(PurchaseError::NoteNotFound)
        | DomainError::Donation(DonationError::NoteNotFound)
        | DomainError::NotFound(..) => StatusCode::NOT_FOUND,

        DomainError::Purchase(PurchaseError::InsufficientPoints)
        | DomainError::Donation(DonationError::InsufficientPoints) => StatusCode::PAYMENT_REQUIRED,

        DomainError::Purchase(PurchaseError::AlreadyPurchased | PurchaseError::ExclusiveAlreadySold)
        | DomainError::Promo(
            PromoError::Inactive
            | PromoError::Expired
            | PromoError::UsageCapReached
            | PromoError::AlreadyRedeemed,
        )
        | DomainError::Conflict(_) => StatusCode::CONFLICT,

        DomainError::Promo(PromoError::InvalidCode)
        | DomainError::Donation(
            DonationError::SelfDonation | DonationError::NotFree | DonationError::InvalidAmount,
        )
        | DomainError::Validation(_) => StatusCode::BAD_REQUEST,

        DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody { error: self.0.code(), message: self.0.public_message() }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DomainError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(DomainError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(DomainError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
