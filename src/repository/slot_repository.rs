use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use crate::{
    domain::{Slot, SlotState},
    error::{AppError, Result},
};

#[derive(FromRow)]
struct SlotRow {
    id: String,
    plan_id: String,
    slot_index: i32,
    start_time: NaiveTime,
    end_time: NaiveTime,
    state: String,
    reservation_id: Option<String>,
    lock_expires_at: Option<NaiveDateTime>,
    updated_at: NaiveDateTime,
}

/// Storage for slot rows. Only `SlotAllocator` and plan materialisation
/// write through this type.
pub struct SqliteSlotRepository;

impl SqliteSlotRepository {
    fn row_to_slot(row: SlotRow) -> Result<Slot> {
        let reservation_id = row.reservation_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Slot {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            plan_id: Uuid::parse_str(&row.plan_id).map_err(|e| AppError::Database(e.to_string()))?,
            slot_index: row.slot_index,
            start_time: row.start_time,
            end_time: row.end_time,
            state: SlotState::parse(&row.state)?,
            reservation_id,
            lock_expires_at: row.lock_expires_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    pub async fn insert_for_plan(
        conn: &mut SqliteConnection,
        plan_id: Uuid,
        bounds: &[(i32, NaiveTime, NaiveTime)],
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>> {
        let mut slots = Vec::with_capacity(bounds.len());

        for &(slot_index, start_time, end_time) in bounds {
            let slot = Slot {
                id: Uuid::new_v4(),
                plan_id,
                slot_index,
                start_time,
                end_time,
                state: SlotState::Open,
                reservation_id: None,
                lock_expires_at: None,
                updated_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO slots (id, plan_id, slot_index, start_time, end_time, state, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#
            )
            .bind(slot.id.to_string())
            .bind(plan_id.to_string())
            .bind(slot_index)
            .bind(start_time)
            .bind(end_time)
            .bind(SlotState::Open.as_str())
            .bind(now.naive_utc())
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

            slots.push(slot);
        }

        Ok(slots)
    }

    /// Deletes the plan's slots nobody holds: Open ones and lapsed locks.
    pub async fn delete_unheld(
        conn: &mut SqliteConnection,
        plan_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM slots
            WHERE plan_id = ?
              AND (state = 'Open' OR (state = 'Locked' AND lock_expires_at <= ?))
            "#
        )
        .bind(plan_id.to_string())
        .bind(now.naive_utc())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_booked(conn: &mut SqliteConnection, plan_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM slots WHERE plan_id = ? AND state = 'Booked'"
        )
        .bind(plan_id.to_string())
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    /// Booked slots plus slots under a live reservation lock.
    pub async fn count_held(
        conn: &mut SqliteConnection,
        plan_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM slots
            WHERE plan_id = ?
              AND (state = 'Booked' OR (state = 'Locked' AND lock_expires_at > ?))
            "#
        )
        .bind(plan_id.to_string())
        .bind(now.naive_utc())
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Slot>> {
        let row = sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT id, plan_id, slot_index, start_time, end_time, state,
                   reservation_id, lock_expires_at, updated_at
            FROM slots
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_slot).transpose()
    }

    pub async fn list_by_plan(conn: &mut SqliteConnection, plan_id: Uuid) -> Result<Vec<Slot>> {
        let rows = sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT id, plan_id, slot_index, start_time, end_time, state,
                   reservation_id, lock_expires_at, updated_at
            FROM slots
            WHERE plan_id = ?
            ORDER BY slot_index ASC
            "#
        )
        .bind(plan_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_slot)
            .collect()
    }

    /// Compare-and-set Open -> Locked. Matches only a slot that is free (or
    /// whose lock has lapsed) on an active plan; returns whether it was taken.
    pub async fn try_lock(
        conn: &mut SqliteConnection,
        slot_id: Uuid,
        reservation_id: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET state = 'Locked', reservation_id = ?, lock_expires_at = ?, updated_at = ?
            WHERE id = ?
              AND (state = 'Open' OR (state = 'Locked' AND lock_expires_at <= ?))
              AND plan_id IN (SELECT id FROM booking_plans WHERE active = 1)
            "#
        )
        .bind(reservation_id.to_string())
        .bind(expires_at.naive_utc())
        .bind(now.naive_utc())
        .bind(slot_id.to_string())
        .bind(now.naive_utc())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Locked|Booked -> Booked for every slot still held by the reservation.
    pub async fn book_reservation(
        conn: &mut SqliteConnection,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET state = 'Booked', lock_expires_at = NULL, updated_at = ?
            WHERE reservation_id = ? AND state IN ('Locked', 'Booked')
            "#
        )
        .bind(now.naive_utc())
        .bind(reservation_id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn release_reservation(
        conn: &mut SqliteConnection,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET state = 'Open', reservation_id = NULL, lock_expires_at = NULL, updated_at = ?
            WHERE reservation_id = ?
            "#
        )
        .bind(now.naive_utc())
        .bind(reservation_id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Returns lapsed locks to the pool unless their payment already went
    /// through.
    pub async fn release_expired(conn: &mut SqliteConnection, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET state = 'Open', reservation_id = NULL, lock_expires_at = NULL, updated_at = ?
            WHERE state = 'Locked'
              AND lock_expires_at <= ?
              AND reservation_id NOT IN (
                  SELECT reservation_id FROM payments
                  WHERE status = 'Paid' AND reservation_id IS NOT NULL
              )
            "#
        )
        .bind(now.naive_utc())
        .bind(now.naive_utc())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}
