use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::state::AppState,
    domain::{RefundDecision, RefundRequest, RefundStatus},
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct RefundQuery {
    #[serde(default = "default_status")]
    status: RefundStatus,
}

fn default_status() -> RefundStatus {
    RefundStatus::Submitted
}

pub async fn list_refunds(
    State(state): State<AppState>,
    Query(query): Query<RefundQuery>,
) -> Result<Json<Vec<RefundRequest>>> {
    let refunds = state.service_context.refund_workflow
        .list_by_status(query.status)
        .await?;

    Ok(Json(refunds))
}

pub async fn decide_refund(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(decision): Json<RefundDecision>,
) -> Result<Json<RefundRequest>> {
    let refund = state.service_context.refund_workflow
        .decide(id, decision)
        .await?;

    Ok(Json(refund))
}
