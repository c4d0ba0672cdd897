use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use crate::{
    domain::{Payment, PaymentStatus, PaymentType},
    error::{AppError, Result},
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    order_code: i64,
    user_id: String,
    tutor_id: Option<String>,
    target_id: String,
    payment_type: String,
    amount: i64,
    status: String,
    reservation_id: Option<String>,
    slot_count: i32,
    checkout_url: Option<String>,
    description: String,
    paid_at: Option<NaiveDateTime>,
    closed_at: Option<NaiveDateTime>,
    expires_at: NaiveDateTime,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Storage for payment rows. Status changes only go through `transition`,
/// a compare-and-set on the current status.
pub struct SqlitePaymentRepository;

impl SqlitePaymentRepository {
    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        let parse = |s: &str| Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()));

        Ok(Payment {
            id: parse(row.id.as_str())?,
            order_code: row.order_code,
            user_id: parse(row.user_id.as_str())?,
            tutor_id: row.tutor_id.as_deref().map(parse).transpose()?,
            target_id: parse(row.target_id.as_str())?,
            payment_type: PaymentType::parse(&row.payment_type)?,
            amount: row.amount,
            status: PaymentStatus::parse(&row.status)?,
            reservation_id: row.reservation_id.as_deref().map(parse).transpose()?,
            slot_count: row.slot_count,
            checkout_url: row.checkout_url,
            description: row.description,
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            closed_at: row.closed_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            expires_at: DateTime::from_naive_utc_and_offset(row.expires_at, Utc),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    pub async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_code, user_id, tutor_id, target_id, payment_type,
                amount, status, reservation_id, slot_count, checkout_url, description,
                paid_at, closed_at, expires_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(payment.id.to_string())
        .bind(payment.order_code)
        .bind(payment.user_id.to_string())
        .bind(payment.tutor_id.map(|id| id.to_string()))
        .bind(payment.target_id.to_string())
        .bind(payment.payment_type.as_str())
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(payment.reservation_id.map(|id| id.to_string()))
        .bind(payment.slot_count)
        .bind(&payment.checkout_url)
        .bind(&payment.description)
        .bind(payment.paid_at.map(|dt| dt.naive_utc()))
        .bind(payment.closed_at.map(|dt| dt.naive_utc()))
        .bind(payment.expires_at.naive_utc())
        .bind(payment.created_at.naive_utc())
        .bind(payment.updated_at.naive_utc())
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, order_code, user_id, tutor_id, target_id, payment_type,
                   amount, status, reservation_id, slot_count, checkout_url, description,
                   paid_at, closed_at, expires_at, created_at, updated_at
            FROM payments
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }

    pub async fn find_by_order_code(
        conn: &mut SqliteConnection,
        order_code: i64,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, order_code, user_id, tutor_id, target_id, payment_type,
                   amount, status, reservation_id, slot_count, checkout_url, description,
                   paid_at, closed_at, expires_at, created_at, updated_at
            FROM payments
            WHERE order_code = ?
            "#
        )
        .bind(order_code)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }

    pub async fn order_code_exists(conn: &mut SqliteConnection, order_code: i64) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM payments WHERE order_code = ?"
        )
        .bind(order_code)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count > 0)
    }

    pub async fn list_by_user(conn: &mut SqliteConnection, user_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, order_code, user_id, tutor_id, target_id, payment_type,
                   amount, status, reservation_id, slot_count, checkout_url, description,
                   paid_at, closed_at, expires_at, created_at, updated_at
            FROM payments
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#
        )
        .bind(user_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_payment)
            .collect()
    }

    /// Pending payments whose deadline has passed, oldest first.
    pub async fn list_stale_pending(
        conn: &mut SqliteConnection,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, order_code, user_id, tutor_id, target_id, payment_type,
                   amount, status, reservation_id, slot_count, checkout_url, description,
                   paid_at, closed_at, expires_at, created_at, updated_at
            FROM payments
            WHERE status = 'Pending' AND expires_at <= ?
            ORDER BY expires_at ASC
            LIMIT ?
            "#
        )
        .bind(now.naive_utc())
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_payment)
            .collect()
    }

    /// Cancelled or expired payments by this user on this target that closed
    /// after `since`.
    pub async fn count_abandoned(
        conn: &mut SqliteConnection,
        user_id: Uuid,
        target_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM payments
            WHERE user_id = ? AND target_id = ?
              AND status IN ('Cancelled', 'Expired')
              AND closed_at > ?
            "#
        )
        .bind(user_id.to_string())
        .bind(target_id.to_string())
        .bind(since.naive_utc())
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    /// Moves the payment from `from` to `to` only if it is still in `from`.
    /// Returns false when another writer got there first.
    pub async fn transition(
        conn: &mut SqliteConnection,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let paid_at = (to == PaymentStatus::Paid).then(|| now.naive_utc());
        let closed_at = matches!(
            to,
            PaymentStatus::Cancelled | PaymentStatus::Failed | PaymentStatus::Expired
        )
        .then(|| now.naive_utc());

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?,
                paid_at = COALESCE(?, paid_at),
                closed_at = COALESCE(?, closed_at),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#
        )
        .bind(to.as_str())
        .bind(paid_at)
        .bind(closed_at)
        .bind(now.naive_utc())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn set_checkout_url(
        conn: &mut SqliteConnection,
        id: Uuid,
        checkout_url: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE payments SET checkout_url = ?, updated_at = ? WHERE id = ?")
            .bind(checkout_url)
            .bind(now.naive_utc())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Bumps `updated_at` so a transaction takes the write lock before it
    /// reads anything else.
    pub async fn touch(conn: &mut SqliteConnection, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE payments SET updated_at = ? WHERE id = ?")
            .bind(now.naive_utc())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
