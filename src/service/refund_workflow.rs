use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    domain::{BankInfo, Payment, RefundDecision, RefundRequest, RefundStatus},
    error::{AppError, Result},
    integrations::{IntegrationEvent, IntegrationManager},
    repository::SqliteRefundRepository,
};

pub struct RefundWorkflow {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    integrations: Arc<IntegrationManager>,
}

impl RefundWorkflow {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, integrations: Arc<IntegrationManager>) -> Self {
        Self { pool, clock, integrations }
    }

    /// Opens a full refund for the payment inside the caller's transaction.
    /// If one is already active for the payment it is returned instead.
    pub async fn open_automatic(
        &self,
        conn: &mut SqliteConnection,
        payment: &Payment,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundRequest> {
        if let Some(existing) = SqliteRefundRepository::find_active_for_payment(&mut *conn, payment.id).await? {
            tracing::debug!("Refund {} already open for payment {}", existing.id, payment.id);
            return Ok(existing);
        }

        let refund = RefundRequest {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            tutor_id: payment.tutor_id,
            user_id: payment.user_id,
            refund_amount: payment.amount,
            reason: reason.to_string(),
            bank_name: None,
            account_owner: None,
            account_number: None,
            admin_note: None,
            status: RefundStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        SqliteRefundRepository::insert(&mut *conn, &refund).await?;
        tracing::info!(
            "Opened refund {} for payment {} ({}): {}",
            refund.id,
            payment.id,
            refund.refund_amount,
            reason
        );

        Ok(refund)
    }

    pub async fn submit_bank_info(&self, refund_id: Uuid, user_id: Uuid, bank: BankInfo) -> Result<RefundRequest> {
        bank.validate()?;

        let refund = self.get(refund_id).await?;
        if refund.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        let now = self.clock.now();
        let mut conn = self.pool.acquire().await?;
        if !SqliteRefundRepository::submit_bank_info(&mut conn, refund_id, &bank, now).await? {
            let current = self.find(&mut conn, refund_id).await?;
            return Err(AppError::InvalidState(format!(
                "Refund is {}, bank details can only be added while Pending",
                current.status.as_str()
            )));
        }

        let updated = self.find(&mut conn, refund_id).await?;
        drop(conn);

        self.integrations.dispatch(IntegrationEvent::RefundUpdated(updated.clone()));
        Ok(updated)
    }

    pub async fn decide(&self, refund_id: Uuid, decision: RefundDecision) -> Result<RefundRequest> {
        let outcome = if decision.approve {
            RefundStatus::Approved
        } else {
            RefundStatus::Rejected
        };

        let now = self.clock.now();
        let mut conn = self.pool.acquire().await?;
        let applied = SqliteRefundRepository::decide(
            &mut conn,
            refund_id,
            outcome,
            decision.admin_note.as_deref(),
            now,
        )
        .await?;

        let updated = self.find(&mut conn, refund_id).await?;
        drop(conn);

        if !applied {
            return Err(AppError::InvalidState(format!(
                "Refund is {}, only Submitted refunds can be decided",
                updated.status.as_str()
            )));
        }

        tracing::info!("Refund {} {}", refund_id, outcome.as_str());
        self.integrations.dispatch(IntegrationEvent::RefundUpdated(updated.clone()));
        Ok(updated)
    }

    pub async fn get(&self, refund_id: Uuid) -> Result<RefundRequest> {
        let mut conn = self.pool.acquire().await?;
        self.find(&mut conn, refund_id).await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefundRequest>> {
        let mut conn = self.pool.acquire().await?;
        SqliteRefundRepository::list_by_user(&mut conn, user_id).await
    }

    pub async fn list_by_status(&self, status: RefundStatus) -> Result<Vec<RefundRequest>> {
        let mut conn = self.pool.acquire().await?;
        SqliteRefundRepository::list_by_status(&mut conn, status).await
    }

    async fn find(&self, conn: &mut SqliteConnection, refund_id: Uuid) -> Result<RefundRequest> {
        SqliteRefundRepository::find_by_id(conn, refund_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Refund request not found".to_string()))
    }
}
