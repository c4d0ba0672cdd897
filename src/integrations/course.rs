use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct CourseOffer {
    pub title: String,
    pub price: i64,
}

/// The course catalogue, owned elsewhere. The ledger only needs a price
/// before checkout and an enrolment once the payment clears.
#[async_trait]
pub trait CourseGateway: Send + Sync {
    async fn find_offer(&self, course_id: Uuid) -> Result<Option<CourseOffer>>;

    /// Idempotent: enrolling twice for the same course and user is a no-op.
    async fn enroll(
        &self,
        course_id: Uuid,
        user_id: Uuid,
        payment_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

pub struct SqliteCourseGateway {
    pool: SqlitePool,
}

impl SqliteCourseGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseGateway for SqliteCourseGateway {
    async fn find_offer(&self, course_id: Uuid) -> Result<Option<CourseOffer>> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT title, price FROM courses WHERE id = ?"
        )
        .bind(course_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(title, price)| CourseOffer { title, price }))
    }

    async fn enroll(
        &self,
        course_id: Uuid,
        user_id: Uuid,
        payment_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO enrollments (course_id, user_id, payment_id, enrolled_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (course_id, user_id) DO NOTHING
            "#
        )
        .bind(course_id.to_string())
        .bind(user_id.to_string())
        .bind(payment_id.to_string())
        .bind(at.naive_utc())
        .execute(&self.pool)
        .await?;

        tracing::info!("Enrolled user {} in course {}", user_id, course_id);
        Ok(())
    }
}
