use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use crate::{
    domain::{BookingPlan, Weekday},
    error::{AppError, Result},
};

#[derive(FromRow)]
struct PlanRow {
    id: String,
    tutor_id: String,
    weekday: String,
    start_time: NaiveTime,
    end_time: NaiveTime,
    slot_duration_minutes: i32,
    price_per_hour: i64,
    meeting_url: String,
    active: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqlitePlanRepository;

impl SqlitePlanRepository {
    fn row_to_plan(row: PlanRow) -> Result<BookingPlan> {
        Ok(BookingPlan {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            tutor_id: Uuid::parse_str(&row.tutor_id).map_err(|e| AppError::Database(e.to_string()))?,
            weekday: Weekday::parse(&row.weekday)?,
            start_time: row.start_time,
            end_time: row.end_time,
            slot_duration_minutes: row.slot_duration_minutes,
            price_per_hour: row.price_per_hour,
            meeting_url: row.meeting_url,
            active: row.active != 0,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    /// Upserts the tutor's lock row. Run as the first statement of a
    /// plan-mutating transaction so it takes the database write lock before
    /// any validation read.
    pub async fn touch_schedule_lock(
        conn: &mut SqliteConnection,
        tutor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schedule_locks (tutor_id, touched_at)
            VALUES (?, ?)
            ON CONFLICT (tutor_id) DO UPDATE SET touched_at = excluded.touched_at
            "#
        )
        .bind(tutor_id.to_string())
        .bind(now.naive_utc())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert(conn: &mut SqliteConnection, plan: &BookingPlan) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO booking_plans (
                id, tutor_id, weekday, start_time, end_time,
                slot_duration_minutes, price_per_hour, meeting_url,
                active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(plan.id.to_string())
        .bind(plan.tutor_id.to_string())
        .bind(plan.weekday.as_str())
        .bind(plan.start_time)
        .bind(plan.end_time)
        .bind(plan.slot_duration_minutes)
        .bind(plan.price_per_hour)
        .bind(&plan.meeting_url)
        .bind(if plan.active { 1i32 } else { 0i32 })
        .bind(plan.created_at.naive_utc())
        .bind(plan.updated_at.naive_utc())
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn update(conn: &mut SqliteConnection, plan: &BookingPlan) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE booking_plans
            SET start_time = ?, end_time = ?, slot_duration_minutes = ?,
                price_per_hour = ?, meeting_url = ?, active = ?, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(plan.start_time)
        .bind(plan.end_time)
        .bind(plan.slot_duration_minutes)
        .bind(plan.price_per_hour)
        .bind(&plan.meeting_url)
        .bind(if plan.active { 1i32 } else { 0i32 })
        .bind(plan.updated_at.naive_utc())
        .bind(plan.id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<BookingPlan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, tutor_id, weekday, start_time, end_time,
                   slot_duration_minutes, price_per_hour, meeting_url,
                   active, created_at, updated_at
            FROM booking_plans
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_plan).transpose()
    }

    pub async fn list_active_for_weekday(
        conn: &mut SqliteConnection,
        tutor_id: Uuid,
        weekday: Weekday,
    ) -> Result<Vec<BookingPlan>> {
        let rows = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, tutor_id, weekday, start_time, end_time,
                   slot_duration_minutes, price_per_hour, meeting_url,
                   active, created_at, updated_at
            FROM booking_plans
            WHERE tutor_id = ? AND weekday = ? AND active = 1
            ORDER BY start_time ASC
            "#
        )
        .bind(tutor_id.to_string())
        .bind(weekday.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_plan)
            .collect()
    }

    /// Distinct weekdays on which the tutor has at least one active plan.
    pub async fn active_weekdays(conn: &mut SqliteConnection, tutor_id: Uuid) -> Result<Vec<Weekday>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT weekday FROM booking_plans WHERE tutor_id = ? AND active = 1"
        )
        .bind(tutor_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter()
            .map(|(weekday,)| Weekday::parse(weekday))
            .collect()
    }

    pub async fn list_by_tutor(
        conn: &mut SqliteConnection,
        tutor_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<BookingPlan>> {
        let rows = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, tutor_id, weekday, start_time, end_time,
                   slot_duration_minutes, price_per_hour, meeting_url,
                   active, created_at, updated_at
            FROM booking_plans
            WHERE tutor_id = ? AND (active = 1 OR ?)
            ORDER BY weekday, start_time ASC
            "#
        )
        .bind(tutor_id.to_string())
        .bind(include_inactive)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_plan)
            .collect()
    }
}
