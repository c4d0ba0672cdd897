use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_code: i64,
    pub user_id: Uuid,
    pub tutor_id: Option<Uuid>,
    pub target_id: Uuid,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub status: PaymentStatus,
    pub reservation_id: Option<Uuid>,
    /// Number of slots reserved at checkout; zero for course payments.
    pub slot_count: i32,
    pub checkout_url: Option<String>,
    pub description: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
    Expired,
    Failed,
    Refund,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Cancelled => "Cancelled",
            PaymentStatus::Expired => "Expired",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refund => "Refund",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Paid" => Ok(PaymentStatus::Paid),
            "Cancelled" => Ok(PaymentStatus::Cancelled),
            "Expired" => Ok(PaymentStatus::Expired),
            "Failed" => Ok(PaymentStatus::Failed),
            "Refund" => Ok(PaymentStatus::Refund),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Whether `next` is a legal single step from this status.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (
                PaymentStatus::Pending,
                PaymentStatus::Paid
                    | PaymentStatus::Cancelled
                    | PaymentStatus::Expired
                    | PaymentStatus::Failed
            ) | (PaymentStatus::Paid, PaymentStatus::Refund)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentType {
    Course,
    Booking,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Course => "Course",
            PaymentType::Booking => "Booking",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Course" => Ok(PaymentType::Course),
            "Booking" => Ok(PaymentType::Booking),
            _ => Err(AppError::Database(format!("Invalid payment type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePayment {
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub payment_type: PaymentType,
    #[serde(default)]
    pub slot_ids: Vec<Uuid>,
}

/// What a webhook call did, for logging and the acknowledgement body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WebhookOutcome {
    Applied(PaymentStatus),
    Duplicate,
    LatePaymentRefunded,
    /// Acknowledged without effect: unknown order or contradicting status.
    Ignored,
}

/// Who asked for a paid booking to be reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundActor {
    Tutor(Uuid),
    Learner(Uuid),
}
