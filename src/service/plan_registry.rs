use std::sync::Arc;

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    config::BookingConfig,
    domain::{BookingPlan, CreatePlanRequest, PlanWindow, UpdatePlanRequest, Weekday},
    error::{AppError, Result},
    repository::{SqlitePlanRepository, SqliteSlotRepository},
    service::locks::{plan_key, tutor_key, LockManager},
};

/// Tutors' weekly availability windows and the slots they expand into.
pub struct PlanRegistry {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    locks: Arc<LockManager>,
    max_working_days: u32,
}

impl PlanRegistry {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        locks: Arc<LockManager>,
        booking: &BookingConfig,
    ) -> Self {
        Self {
            pool,
            clock,
            locks,
            max_working_days: booking.max_working_days,
        }
    }

    pub async fn create_plan(&self, tutor_id: Uuid, request: CreatePlanRequest) -> Result<BookingPlan> {
        request.validate()?;
        let window = PlanWindow::new(request.start_time, request.end_time, request.slot_duration_minutes)?;

        let _guard = self.locks
            .acquire([plan_key(tutor_id, request.weekday), tutor_key(tutor_id)])
            .await?;

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;
        SqlitePlanRepository::touch_schedule_lock(&mut tx, tutor_id, now).await?;

        self.check_overlap(&mut tx, tutor_id, request.weekday, &window, None).await?;
        self.check_day_cap(&mut tx, tutor_id, request.weekday).await?;

        let plan = BookingPlan {
            id: Uuid::new_v4(),
            tutor_id,
            weekday: request.weekday,
            start_time: window.start_time,
            end_time: window.end_time,
            slot_duration_minutes: window.slot_duration_minutes,
            price_per_hour: request.price_per_hour,
            meeting_url: request.meeting_url,
            active: true,
            created_at: now,
            updated_at: now,
        };

        SqlitePlanRepository::insert(&mut tx, &plan).await?;
        let slots = SqliteSlotRepository::insert_for_plan(&mut tx, plan.id, &window.slot_bounds(), now).await?;
        tx.commit().await?;

        tracing::info!(
            "Tutor {} created {} plan {} {}-{} with {} slots",
            tutor_id,
            plan.weekday.as_str(),
            plan.id,
            plan.start_time,
            plan.end_time,
            slots.len()
        );

        Ok(plan)
    }

    /// Changes times, duration, price or link. Refused while any slot is
    /// booked or under a live reservation; slots are rebuilt afterwards.
    pub async fn update_plan(
        &self,
        plan_id: Uuid,
        tutor_id: Uuid,
        request: UpdatePlanRequest,
    ) -> Result<BookingPlan> {
        request.validate()?;

        let existing = self.get_plan(plan_id).await?;
        if existing.tutor_id != tutor_id {
            return Err(AppError::Forbidden);
        }

        let _guard = self.locks
            .acquire([plan_key(tutor_id, existing.weekday), tutor_key(tutor_id)])
            .await?;

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;
        SqlitePlanRepository::touch_schedule_lock(&mut tx, tutor_id, now).await?;

        // Re-read under the lock
        let mut plan = SqlitePlanRepository::find_by_id(&mut tx, plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        if !plan.active {
            return Err(AppError::InvalidState("Plan is inactive".to_string()));
        }
        if SqliteSlotRepository::count_held(&mut tx, plan_id, now).await? > 0 {
            return Err(AppError::PlanHasBookedSlots);
        }

        let window = PlanWindow::new(
            request.start_time.unwrap_or(plan.start_time),
            request.end_time.unwrap_or(plan.end_time),
            request.slot_duration_minutes.unwrap_or(plan.slot_duration_minutes),
        )?;
        self.check_overlap(&mut tx, tutor_id, plan.weekday, &window, Some(plan_id)).await?;

        plan.start_time = window.start_time;
        plan.end_time = window.end_time;
        plan.slot_duration_minutes = window.slot_duration_minutes;
        if let Some(price) = request.price_per_hour {
            plan.price_per_hour = price;
        }
        if let Some(url) = request.meeting_url {
            plan.meeting_url = url;
        }
        plan.updated_at = now;

        SqlitePlanRepository::update(&mut tx, &plan).await?;
        SqliteSlotRepository::delete_unheld(&mut tx, plan_id, now).await?;
        SqliteSlotRepository::insert_for_plan(&mut tx, plan_id, &window.slot_bounds(), now).await?;
        tx.commit().await?;

        tracing::info!("Tutor {} updated plan {}", tutor_id, plan_id);
        Ok(plan)
    }

    /// Soft-deletes the plan. Open slots go away; live reservations are left
    /// to complete or lapse. Repeating the call is a no-op.
    pub async fn deactivate_plan(&self, plan_id: Uuid, tutor_id: Uuid) -> Result<BookingPlan> {
        let existing = self.get_plan(plan_id).await?;
        if existing.tutor_id != tutor_id {
            return Err(AppError::Forbidden);
        }

        let _guard = self.locks
            .acquire([plan_key(tutor_id, existing.weekday), tutor_key(tutor_id)])
            .await?;

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;
        SqlitePlanRepository::touch_schedule_lock(&mut tx, tutor_id, now).await?;

        let mut plan = SqlitePlanRepository::find_by_id(&mut tx, plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        if !plan.active {
            tracing::debug!("Plan {} already inactive", plan_id);
            return Ok(plan);
        }
        if SqliteSlotRepository::count_booked(&mut tx, plan_id).await? > 0 {
            return Err(AppError::PlanHasBookedSlots);
        }

        plan.active = false;
        plan.updated_at = now;
        SqlitePlanRepository::update(&mut tx, &plan).await?;
        let removed = SqliteSlotRepository::delete_unheld(&mut tx, plan_id, now).await?;
        tx.commit().await?;

        tracing::info!("Tutor {} deactivated plan {} ({} open slots removed)", tutor_id, plan_id, removed);
        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> Result<BookingPlan> {
        let mut conn = self.pool.acquire().await?;
        SqlitePlanRepository::find_by_id(&mut conn, plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
    }

    pub async fn list_plans(&self, tutor_id: Uuid, include_inactive: bool) -> Result<Vec<BookingPlan>> {
        let mut conn = self.pool.acquire().await?;
        SqlitePlanRepository::list_by_tutor(&mut conn, tutor_id, include_inactive).await
    }

    async fn check_overlap(
        &self,
        conn: &mut SqliteConnection,
        tutor_id: Uuid,
        weekday: Weekday,
        window: &PlanWindow,
        ignore: Option<Uuid>,
    ) -> Result<()> {
        let existing = SqlitePlanRepository::list_active_for_weekday(&mut *conn, tutor_id, weekday).await?;

        let conflict = existing
            .iter()
            .filter(|plan| Some(plan.id) != ignore)
            .find(|plan| plan.overlaps(window.start_time, window.end_time));

        match conflict {
            Some(plan) => {
                tracing::debug!(
                    "Plan {}-{} for tutor {} overlaps {}",
                    window.start_time,
                    window.end_time,
                    tutor_id,
                    plan.id
                );
                Err(AppError::OverlapConflict {
                    plan_id: plan.id,
                    weekday: weekday.as_str().to_string(),
                    start: plan.start_time.format("%H:%M").to_string(),
                    end: plan.end_time.format("%H:%M").to_string(),
                })
            }
            None => Ok(()),
        }
    }

    async fn check_day_cap(&self, conn: &mut SqliteConnection, tutor_id: Uuid, weekday: Weekday) -> Result<()> {
        let days = SqlitePlanRepository::active_weekdays(&mut *conn, tutor_id).await?;

        if !days.contains(&weekday) && days.len() as u32 >= self.max_working_days {
            return Err(AppError::WeeklyDayLimitExceeded { max: self.max_working_days });
        }

        Ok(())
    }
}
