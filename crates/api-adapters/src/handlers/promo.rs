use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use services::RedemptionOutcome;

use crate::error::{status_for, ApiResult};
use crate::extract::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    pub code: String,
}

/// Always answers with the `{success, message, points_received}` outcome; the
/// status code carries the failure class.
pub async fn redeem(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    body: Result<Json<RedeemBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RedemptionOutcome>)> {
    let Json(body) = body?;

    let result = state.services.promos.redeem(caller.user_id, &body.code).await;
    state.metrics.record_outcome("redeem_promo_code", &result);
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(err) => status_for(err),
    };
    Ok((status, Json(RedemptionOutcome::from_result(&result))))
}
