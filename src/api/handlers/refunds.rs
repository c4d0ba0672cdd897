use axum::{
    extract::{Extension, Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{BankInfo, RefundRequest},
    error::Result,
};

pub async fn list_mine(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<RefundRequest>>> {
    let refunds = state.service_context.refund_workflow
        .list_for_user(user.id())
        .await?;

    Ok(Json(refunds))
}

pub async fn submit_bank_info(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(bank): Json<BankInfo>,
) -> Result<Json<RefundRequest>> {
    let refund = state.service_context.refund_workflow
        .submit_bank_info(id, user.id(), bank)
        .await?;

    Ok(Json(refund))
}
