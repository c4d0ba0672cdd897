use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Plan overlaps existing {weekday} window {start}-{end}")]
    OverlapConflict {
        plan_id: Uuid,
        weekday: String,
        start: String,
        end: String,
    },

    #[error("Tutor already has plans on {max} distinct weekdays")]
    WeeklyDayLimitExceeded { max: u32 },

    #[error("Slot no longer available")]
    SlotUnavailable { slot_ids: Vec<Uuid> },

    #[error("Plan has booked slots")]
    PlanHasBookedSlots,

    #[error("Too many cancelled payments, try again later")]
    TooManyCancellations,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Payment not found for order code {0}")]
    PaymentNotFound(i64),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Timed out waiting for lock")]
    LockTimeout,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Integration error: {0}")]
    Integration(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("External service error: {0}")]
    External(String),
}

impl AppError {
    /// Stable numeric code clients can branch on.
    pub fn code(&self) -> u32 {
        match self {
            AppError::BadRequest(_) => 1000,
            AppError::Validation(_) => 1001,
            AppError::Unauthorized => 1100,
            AppError::Forbidden => 1101,
            AppError::NotFound(_) => 1200,
            AppError::PaymentNotFound(_) => 1201,
            AppError::Conflict(_) => 2000,
            AppError::OverlapConflict { .. } => 2001,
            AppError::WeeklyDayLimitExceeded { .. } => 2002,
            AppError::SlotUnavailable { .. } => 2003,
            AppError::PlanHasBookedSlots => 2004,
            AppError::TooManyCancellations => 2005,
            AppError::InvalidState(_) => 2006,
            AppError::InvalidSignature => 3000,
            AppError::InvalidStateTransition { .. } => 3001,
            AppError::LockTimeout => 4000,
            AppError::Database(_) => 4001,
            AppError::ServiceUnavailable(_) => 4002,
            AppError::Internal(_) => 4003,
            AppError::External(_) => 5000,
            AppError::Integration(_) => 5001,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyCancellations => StatusCode::TOO_MANY_REQUESTS,
            AppError::Conflict(_)
            | AppError::OverlapConflict { .. }
            | AppError::WeeklyDayLimitExceeded { .. }
            | AppError::SlotUnavailable { .. }
            | AppError::PlanHasBookedSlots
            | AppError::InvalidState(_)
            | AppError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            AppError::LockTimeout
            | AppError::ServiceUnavailable(_)
            | AppError::Integration(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::External(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Transient failures a caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::LockTimeout | AppError::Database(_) | AppError::ServiceUnavailable(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match self {
            AppError::Database(ref msg) => {
                tracing::error!("Database error: {}", msg);
                "Database error occurred".to_string()
            }
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Integration(ref msg) => {
                tracing::error!("Integration error: {}", msg);
                msg.clone()
            }
            AppError::External(ref msg) => {
                tracing::error!("External service error: {}", msg);
                msg.clone()
            }
            ref other => other.to_string(),
        };

        let mut body = json!({
            "code": code,
            "error": message,
        });

        // Callers re-select slots or fix their window from these details
        match self {
            AppError::SlotUnavailable { ref slot_ids } => {
                body["slot_ids"] = json!(slot_ids);
            }
            AppError::OverlapConflict { plan_id, ref weekday, ref start, ref end } => {
                body["conflict"] = json!({
                    "plan_id": plan_id,
                    "weekday": weekday,
                    "start_time": start,
                    "end_time": end,
                });
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
