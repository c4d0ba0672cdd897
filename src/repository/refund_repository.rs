use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use crate::{
    domain::{BankInfo, RefundRequest, RefundStatus},
    error::{AppError, Result},
};

#[derive(FromRow)]
struct RefundRow {
    id: String,
    payment_id: String,
    tutor_id: Option<String>,
    user_id: String,
    refund_amount: i64,
    reason: String,
    bank_name: Option<String>,
    account_owner: Option<String>,
    account_number: Option<String>,
    admin_note: Option<String>,
    status: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteRefundRepository;

impl SqliteRefundRepository {
    fn row_to_refund(row: RefundRow) -> Result<RefundRequest> {
        let tutor_id = row.tutor_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(RefundRequest {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            payment_id: Uuid::parse_str(&row.payment_id).map_err(|e| AppError::Database(e.to_string()))?,
            tutor_id,
            user_id: Uuid::parse_str(&row.user_id).map_err(|e| AppError::Database(e.to_string()))?,
            refund_amount: row.refund_amount,
            reason: row.reason,
            bank_name: row.bank_name,
            account_owner: row.account_owner,
            account_number: row.account_number,
            admin_note: row.admin_note,
            status: RefundStatus::parse(&row.status)?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    pub async fn insert(conn: &mut SqliteConnection, refund: &RefundRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refund_requests (
                id, payment_id, tutor_id, user_id, refund_amount, reason,
                bank_name, account_owner, account_number, admin_note,
                status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(refund.id.to_string())
        .bind(refund.payment_id.to_string())
        .bind(refund.tutor_id.map(|id| id.to_string()))
        .bind(refund.user_id.to_string())
        .bind(refund.refund_amount)
        .bind(&refund.reason)
        .bind(&refund.bank_name)
        .bind(&refund.account_owner)
        .bind(&refund.account_number)
        .bind(&refund.admin_note)
        .bind(refund.status.as_str())
        .bind(refund.created_at.naive_utc())
        .bind(refund.updated_at.naive_utc())
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<RefundRequest>> {
        let row = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT id, payment_id, tutor_id, user_id, refund_amount, reason,
                   bank_name, account_owner, account_number, admin_note,
                   status, created_at, updated_at
            FROM refund_requests
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_refund).transpose()
    }

    pub async fn find_active_for_payment(
        conn: &mut SqliteConnection,
        payment_id: Uuid,
    ) -> Result<Option<RefundRequest>> {
        let row = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT id, payment_id, tutor_id, user_id, refund_amount, reason,
                   bank_name, account_owner, account_number, admin_note,
                   status, created_at, updated_at
            FROM refund_requests
            WHERE payment_id = ? AND status IN ('Pending', 'Submitted')
            "#
        )
        .bind(payment_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_refund).transpose()
    }

    /// Most recent refund for the payment in any status.
    pub async fn find_latest_for_payment(
        conn: &mut SqliteConnection,
        payment_id: Uuid,
    ) -> Result<Option<RefundRequest>> {
        let row = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT id, payment_id, tutor_id, user_id, refund_amount, reason,
                   bank_name, account_owner, account_number, admin_note,
                   status, created_at, updated_at
            FROM refund_requests
            WHERE payment_id = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#
        )
        .bind(payment_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_refund).transpose()
    }

    pub async fn list_by_user(conn: &mut SqliteConnection, user_id: Uuid) -> Result<Vec<RefundRequest>> {
        let rows = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT id, payment_id, tutor_id, user_id, refund_amount, reason,
                   bank_name, account_owner, account_number, admin_note,
                   status, created_at, updated_at
            FROM refund_requests
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#
        )
        .bind(user_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_refund)
            .collect()
    }

    pub async fn list_by_status(
        conn: &mut SqliteConnection,
        status: RefundStatus,
    ) -> Result<Vec<RefundRequest>> {
        let rows = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT id, payment_id, tutor_id, user_id, refund_amount, reason,
                   bank_name, account_owner, account_number, admin_note,
                   status, created_at, updated_at
            FROM refund_requests
            WHERE status = ?
            ORDER BY created_at ASC
            "#
        )
        .bind(status.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_refund)
            .collect()
    }

    /// Pending -> Submitted with the learner's bank details.
    pub async fn submit_bank_info(
        conn: &mut SqliteConnection,
        id: Uuid,
        bank: &BankInfo,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refund_requests
            SET bank_name = ?, account_owner = ?, account_number = ?,
                status = 'Submitted', updated_at = ?
            WHERE id = ? AND status = 'Pending'
            "#
        )
        .bind(&bank.bank_name)
        .bind(&bank.account_owner)
        .bind(&bank.account_number)
        .bind(now.naive_utc())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Submitted -> Approved | Rejected.
    pub async fn decide(
        conn: &mut SqliteConnection,
        id: Uuid,
        outcome: RefundStatus,
        admin_note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refund_requests
            SET status = ?, admin_note = ?, updated_at = ?
            WHERE id = ? AND status = 'Submitted'
            "#
        )
        .bind(outcome.as_str())
        .bind(admin_note)
        .bind(now.naive_utc())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
