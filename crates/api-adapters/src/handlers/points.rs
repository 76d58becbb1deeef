use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use domains::{PointsPackage, TopUpReceipt};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::extract::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BuyPointsBody {
    pub package_id: String,
}

pub async fn buy(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    body: Result<Json<BuyPointsBody>, JsonRejection>,
) -> ApiResult<Json<TopUpReceipt>> {
    let Json(body) = body?;

    let result = state.services.points.buy(caller.user_id, &body.package_id).await;
    state.metrics.record_outcome("buy_points", &result);
    Ok(Json(result?))
}

#[derive(Debug, Serialize)]
pub struct Catalogue {
    pub packages: Vec<PointsPackage>,
    pub donation_presets: Vec<i64>,
}

pub async fn packages(State(state): State<AppState>, AuthUser(_): AuthUser) -> Json<Catalogue> {
    Json(Catalogue {
        packages: state.services.points.packages().to_vec(),
        donation_presets: state.services.donations.presets().to_vec(),
    })
}
