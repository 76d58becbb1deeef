use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use domains::{DonationReceipt, PaymentMethod, PurchaseReceipt, Quote};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::extract::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    pub method: PaymentMethod,
}

pub async fn purchase(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    note_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<PurchaseBody>, JsonRejection>,
) -> ApiResult<Json<PurchaseReceipt>> {
    let Path(note_id) = note_id?;
    let Json(body) = body?;

    let result = state.services.purchases.purchase(caller.user_id, note_id, body.method).await;
    state.metrics.record_outcome("purchase_note", &result);
    Ok(Json(result?))
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub method: PaymentMethod,
}

/// Checkout preview: what `method` would cost right now.
pub async fn quote(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    note_id: Result<Path<Uuid>, PathRejection>,
    params: Result<Query<QuoteParams>, QueryRejection>,
) -> ApiResult<Json<Quote>> {
    let Path(note_id) = note_id?;
    let Query(params) = params?;
    Ok(Json(state.services.purchases.quote(note_id, params.method).await?))
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub note_id: Uuid,
    pub can_access: bool,
}

pub async fn access(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    note_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<AccessResponse>> {
    let Path(note_id) = note_id?;
    let can_access = state.services.access.can_access(caller.user_id, note_id).await?;
    Ok(Json(AccessResponse { note_id, can_access }))
}

#[derive(Debug, Deserialize)]
pub struct DonateBody {
    pub points: i64,
    #[serde(default)]
    pub recipient_id: Option<Uuid>,
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn donate(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    note_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DonateBody>, JsonRejection>,
) -> ApiResult<Json<DonationReceipt>> {
    let Path(note_id) = note_id?;
    let Json(body) = body?;

    let result = state
        .services
        .donations
        .donate(caller.user_id, note_id, body.points, body.recipient_id, body.message)
        .await;
    state.metrics.record_outcome("donate", &result);
    Ok(Json(result?))
}
