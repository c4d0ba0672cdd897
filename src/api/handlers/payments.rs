use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    auth::Role,
    domain::{InitiatePayment, Payment, PaymentType, RefundActor, RefundRequest, WebhookOutcome},
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub target_id: Uuid,
    pub payment_type: PaymentType,
    #[serde(default)]
    pub slot_ids: Vec<Uuid>,
    #[serde(default)]
    pub captcha_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

pub async fn checkout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Payment>)> {
    user.require(Role::Learner)?;

    if !state.captcha.verify(&request.captcha_token).await? {
        return Err(AppError::BadRequest("Captcha verification failed".to_string()));
    }

    let payment = state.service_context.payment_ledger
        .initiate(InitiatePayment {
            user_id: user.id(),
            target_id: request.target_id,
            payment_type: request.payment_type,
            slot_ids: request.slot_ids,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn list_mine(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Payment>>> {
    let payments = state.service_context.payment_ledger
        .list_payments(user.id())
        .await?;

    Ok(Json(payments))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>> {
    let payment = state.service_context.payment_ledger.get_payment(id).await?;

    let visible = payment.user_id == user.id()
        || payment.tutor_id == Some(user.id())
        || user.claims.is_admin();
    if !visible {
        return Err(AppError::Forbidden);
    }

    Ok(Json(payment))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>> {
    let payment = state.service_context.payment_ledger
        .cancel_pending(id, user.id())
        .await?;

    Ok(Json(payment))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<(StatusCode, Json<RefundRequest>)> {
    let ledger = &state.service_context.payment_ledger;
    let payment = ledger.get_payment(id).await?;

    let actor = if payment.tutor_id == Some(user.id()) {
        RefundActor::Tutor(user.id())
    } else {
        RefundActor::Learner(user.id())
    };

    let reason = if request.reason.trim().is_empty() {
        "Booking rejected".to_string()
    } else {
        request.reason
    };

    let refund = ledger.refund_paid_booking(id, actor, &reason).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

/// Provider callback. Unauthenticated; trust comes from the signature.
pub async fn webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>> {
    let outcome = match state.service_context.payment_ledger.apply_webhook(&body).await {
        Ok(outcome) => outcome,
        // Acknowledged so the provider stops redelivering
        Err(e @ (AppError::PaymentNotFound(_) | AppError::InvalidStateTransition { .. })) => {
            tracing::error!("Webhook acknowledged without effect: {}", e);
            WebhookOutcome::Ignored
        }
        Err(AppError::Validation(msg)) => return Err(AppError::BadRequest(msg)),
        Err(e) => return Err(e),
    };

    tracing::debug!("Webhook handled: {:?}", outcome);

    Ok(Json(json!({
        "code": "00",
        "desc": "success",
        "outcome": outcome,
    })))
}
