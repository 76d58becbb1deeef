use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use domains::PromoCode;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extract::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewPromoBody {
    pub code: String,
    pub points_amount: i64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_uses: Option<i32>,
}

pub async fn create_promo_code(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    body: Result<Json<NewPromoBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PromoCode>)> {
    let Json(body) = body?;

    let result = state
        .services
        .promos
        .create(caller, &body.code, body.points_amount, body.expires_at, body.max_uses)
        .await;
    state.metrics.record_outcome("create_promo_code", &result);
    Ok((StatusCode::CREATED, Json(result?)))
}

pub async fn find_promo_code(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    code: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<PromoCode>> {
    let Path(code) = code?;
    Ok(Json(state.services.promos.find(caller, &code).await?))
}
