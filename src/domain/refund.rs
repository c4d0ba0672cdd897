use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundRequest {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub tutor_id: Option<Uuid>,
    pub user_id: Uuid,
    pub refund_amount: i64,
    pub reason: String,
    pub bank_name: Option<String>,
    pub account_owner: Option<String>,
    pub account_number: Option<String>,
    pub admin_note: Option<String>,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RefundStatus {
    Pending,
    Submitted,
    Approved,
    Rejected,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "Pending",
            RefundStatus::Submitted => "Submitted",
            RefundStatus::Approved => "Approved",
            RefundStatus::Rejected => "Rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(RefundStatus::Pending),
            "Submitted" => Ok(RefundStatus::Submitted),
            "Approved" => Ok(RefundStatus::Approved),
            "Rejected" => Ok(RefundStatus::Rejected),
            _ => Err(AppError::Database(format!("Invalid refund status: {}", s))),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RefundStatus::Pending | RefundStatus::Submitted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BankInfo {
    #[validate(length(min = 1, max = 120))]
    pub bank_name: String,
    #[validate(length(min = 1, max = 120))]
    pub account_owner: String,
    #[validate(length(min = 4, max = 34))]
    pub account_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundDecision {
    pub approve: bool,
    #[serde(default)]
    pub admin_note: Option<String>,
}
