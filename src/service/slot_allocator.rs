use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    clock::Clock,
    domain::{ReservationHandle, Slot},
    error::{AppError, Result},
    repository::SqliteSlotRepository,
    service::locks::slot_key,
};

/// Owns slot state: reservation locks, confirmation and release.
///
/// The mutating calls take a connection so the payment ledger can run them
/// inside its own transaction; a failed `reserve` leaves partial locks that
/// vanish when the caller's transaction rolls back.
pub struct SlotAllocator {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SlotAllocator {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Sorted, de-duplicated slot ids.
    pub fn canonical_ids(slot_ids: &[Uuid]) -> Vec<Uuid> {
        let mut ids = slot_ids.to_vec();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Keyed-lock names to hold around a reservation of these slots.
    pub fn reservation_keys(slot_ids: &[Uuid]) -> Vec<String> {
        Self::canonical_ids(slot_ids)
            .into_iter()
            .map(slot_key)
            .collect()
    }

    pub async fn reserve(
        &self,
        conn: &mut SqliteConnection,
        slot_ids: &[Uuid],
        requester_id: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<ReservationHandle> {
        let ids = Self::canonical_ids(slot_ids);
        if ids.is_empty() {
            return Err(AppError::Validation("At least one slot is required".to_string()));
        }

        let reservation_id = Uuid::new_v4();
        let mut unavailable = Vec::new();

        for &slot_id in &ids {
            if !SqliteSlotRepository::try_lock(&mut *conn, slot_id, reservation_id, now, expires_at).await? {
                unavailable.push(slot_id);
            }
        }

        if !unavailable.is_empty() {
            tracing::debug!(
                "Reservation for {} failed, {} of {} slots unavailable",
                requester_id,
                unavailable.len(),
                ids.len()
            );
            return Err(AppError::SlotUnavailable { slot_ids: unavailable });
        }

        tracing::debug!(
            "Reserved {} slots for {} under {} until {}",
            ids.len(),
            requester_id,
            reservation_id,
            expires_at
        );

        Ok(ReservationHandle {
            id: reservation_id,
            slot_ids: ids,
            expires_at,
        })
    }

    /// Books every slot still held by the reservation. Safe to repeat.
    /// Returns how many slots the reservation holds afterwards.
    pub async fn confirm(
        &self,
        conn: &mut SqliteConnection,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let booked = SqliteSlotRepository::book_reservation(&mut *conn, reservation_id, now).await?;
        Ok(booked as usize)
    }

    /// Returns every slot held by the reservation to Open. Safe to repeat.
    pub async fn release(
        &self,
        conn: &mut SqliteConnection,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let released = SqliteSlotRepository::release_reservation(&mut *conn, reservation_id, now).await?;
        if released > 0 {
            tracing::debug!("Released {} slots of reservation {}", released, reservation_id);
        }
        Ok(released as usize)
    }

    pub async fn release_expired_locks(&self) -> Result<u64> {
        let now = self.clock.now();
        let mut conn = self.pool.acquire().await?;
        let released = SqliteSlotRepository::release_expired(&mut conn, now).await?;

        if released > 0 {
            tracing::info!("Released {} lapsed slot locks", released);
        }

        Ok(released)
    }

    pub async fn list_slots(&self, plan_id: Uuid) -> Result<Vec<Slot>> {
        let now = self.clock.now();
        let mut conn = self.pool.acquire().await?;
        let slots = SqliteSlotRepository::list_by_plan(&mut conn, plan_id).await?;

        Ok(slots.into_iter().map(|slot| slot.as_seen_at(now)).collect())
    }

    /// Slots in the order requested; unknown ids are skipped.
    pub async fn find_slots(&self, conn: &mut SqliteConnection, slot_ids: &[Uuid]) -> Result<Vec<Slot>> {
        let now = self.clock.now();
        let mut slots = Vec::with_capacity(slot_ids.len());

        for &id in slot_ids {
            if let Some(slot) = SqliteSlotRepository::find_by_id(&mut *conn, id).await? {
                slots.push(slot.as_seen_at(now));
            }
        }

        Ok(slots)
    }
}
