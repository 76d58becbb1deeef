use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use domains::{LedgerEntry, Purchase};
use serde::Deserialize;
use services::Balance;

use crate::error::ApiResult;
use crate::extract::AuthUser;
use crate::state::AppState;

const DEFAULT_PAGE: i64 = 20;

pub async fn balance(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> ApiResult<Json<Balance>> {
    Ok(Json(state.services.accounts.balance(caller.user_id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn transactions(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    page: Result<Query<Page>, QueryRejection>,
) -> ApiResult<Json<Vec<LedgerEntry>>> {
    let Query(page) = page?;
    let entries = state
        .services
        .accounts
        .ledger(caller.user_id, page.limit.unwrap_or(DEFAULT_PAGE), page.offset.unwrap_or(0))
        .await?;
    Ok(Json(entries))
}

pub async fn purchases(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> ApiResult<Json<Vec<Purchase>>> {
    Ok(Json(state.services.accounts.purchases(caller.user_id).await?))
}
