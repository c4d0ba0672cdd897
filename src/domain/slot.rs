use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub slot_index: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub state: SlotState,
    pub reservation_id: Option<Uuid>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// State as seen by readers at `now`: a lapsed lock counts as Open even
    /// before the sweeper has run.
    pub fn effective_state(&self, now: DateTime<Utc>) -> SlotState {
        match (self.state, self.lock_expires_at) {
            (SlotState::Locked, Some(expires_at)) if expires_at <= now => SlotState::Open,
            (state, _) => state,
        }
    }

    /// Copy with the lazy expiry applied, for handing to callers.
    pub fn as_seen_at(mut self, now: DateTime<Utc>) -> Self {
        if self.effective_state(now) != self.state {
            self.state = SlotState::Open;
            self.reservation_id = None;
            self.lock_expires_at = None;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SlotState {
    Open,
    Locked,
    Booked,
}

impl SlotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotState::Open => "Open",
            SlotState::Locked => "Locked",
            SlotState::Booked => "Booked",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Open" => Ok(SlotState::Open),
            "Locked" => Ok(SlotState::Locked),
            "Booked" => Ok(SlotState::Booked),
            _ => Err(AppError::Database(format!("Invalid slot state: {}", s))),
        }
    }
}

/// Correlates a batch of locked slots with the payment created alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationHandle {
    pub id: Uuid,
    pub slot_ids: Vec<Uuid>,
    pub expires_at: DateTime<Utc>,
}
