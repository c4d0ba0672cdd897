use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingPlan {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub price_per_hour: i64,
    pub meeting_url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingPlan {
    /// Half-open interval test: touching windows do not overlap.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        windows_overlap(self.start_time, self.end_time, start, end)
    }

    /// Price of a single slot, rounded down to the currency unit.
    pub fn slot_price(&self) -> i64 {
        self.price_per_hour * i64::from(self.slot_duration_minutes) / 60
    }
}

pub fn windows_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    !(a_end <= b_start || a_start >= b_end)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|day| day.as_str() == s)
            .ok_or_else(|| AppError::Database(format!("Invalid weekday: {}", s)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePlanRequest {
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[validate(range(min = 1, max = 480))]
    pub slot_duration_minutes: i32,
    #[validate(range(min = 1))]
    pub price_per_hour: i64,
    #[validate(url)]
    pub meeting_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct UpdatePlanRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    #[validate(range(min = 1, max = 480))]
    pub slot_duration_minutes: Option<i32>,
    #[validate(range(min = 1))]
    pub price_per_hour: Option<i64>,
    #[validate(url)]
    pub meeting_url: Option<String>,
}

/// Validated time layout of a plan: the window and how it splits into slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
}

impl PlanWindow {
    pub fn new(start_time: NaiveTime, end_time: NaiveTime, slot_duration_minutes: i32) -> Result<Self> {
        if start_time >= end_time {
            return Err(AppError::Validation(
                "start_time must be before end_time".to_string(),
            ));
        }
        if slot_duration_minutes <= 0 {
            return Err(AppError::Validation(
                "slot_duration_minutes must be positive".to_string(),
            ));
        }

        let window = Self { start_time, end_time, slot_duration_minutes };
        if window.slot_count() == 0 {
            return Err(AppError::Validation(format!(
                "window {}-{} is shorter than one {} minute slot",
                start_time, end_time, slot_duration_minutes
            )));
        }

        Ok(window)
    }

    pub fn slot_count(&self) -> i32 {
        let minutes = (self.end_time - self.start_time).num_minutes();
        (minutes / i64::from(self.slot_duration_minutes)) as i32
    }

    /// `(index, start, end)` of every whole slot in the window; a trailing
    /// remainder shorter than one slot is not bookable.
    pub fn slot_bounds(&self) -> Vec<(i32, NaiveTime, NaiveTime)> {
        let step = chrono::Duration::minutes(i64::from(self.slot_duration_minutes));
        (0..self.slot_count())
            .map(|index| {
                let start = self.start_time + step * index;
                (index, start, start + step)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_adjacent_windows_do_not_overlap() {
        assert!(!windows_overlap(t(9, 0), t(10, 0), t(10, 0), t(11, 0)));
        assert!(!windows_overlap(t(10, 0), t(11, 0), t(9, 0), t(10, 0)));
    }

    #[test]
    fn test_nested_and_partial_windows_overlap() {
        assert!(windows_overlap(t(9, 0), t(12, 0), t(10, 0), t(11, 0)));
        assert!(windows_overlap(t(9, 0), t(10, 0), t(9, 30), t(10, 30)));
        assert!(windows_overlap(t(9, 0), t(10, 0), t(9, 0), t(10, 0)));
    }

    #[test]
    fn test_window_splits_into_slots() {
        let window = PlanWindow::new(t(9, 0), t(10, 0), 30).unwrap();
        assert_eq!(
            window.slot_bounds(),
            vec![(0, t(9, 0), t(9, 30)), (1, t(9, 30), t(10, 0))]
        );
    }

    #[test]
    fn test_trailing_remainder_is_dropped() {
        let window = PlanWindow::new(t(9, 0), t(10, 10), 30).unwrap();
        assert_eq!(window.slot_count(), 2);
    }

    #[test]
    fn test_invalid_windows_are_rejected() {
        assert!(matches!(PlanWindow::new(t(10, 0), t(9, 0), 30), Err(AppError::Validation(_))));
        assert!(matches!(PlanWindow::new(t(9, 0), t(9, 0), 30), Err(AppError::Validation(_))));
        assert!(matches!(PlanWindow::new(t(9, 0), t(9, 20), 30), Err(AppError::Validation(_))));
        assert!(matches!(PlanWindow::new(t(9, 0), t(10, 0), 0), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_weekday_round_trips_through_label() {
        for day in Weekday::ALL {
            assert_eq!(Weekday::parse(day.as_str()).unwrap(), day);
        }
        assert!(Weekday::parse("Funday").is_err());
    }
}
