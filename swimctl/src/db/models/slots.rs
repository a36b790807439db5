//! Database models for recurring class slots and per-date closures.

use crate::types::{CourseId, SlotId};
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone)]
pub struct ClassSlotCreateDBRequest {
    pub course_id: CourseId,
    pub weekday: String,
    pub time_label: String,
    pub max_persons: i32,
    pub enabled: bool,
    pub admin_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClassSlotUpdateDBRequest {
    pub weekday: Option<String>,
    pub time_label: Option<String>,
    pub max_persons: Option<i32>,
    pub enabled: Option<bool>,
    pub admin_only: Option<bool>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClassSlotDBResponse {
    pub id: SlotId,
    pub course_id: CourseId,
    pub weekday: String,
    pub time_label: String,
    pub max_persons: i32,
    pub enabled: bool,
    pub admin_only: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SlotClosureDBResponse {
    pub id: i64,
    pub slot_id: SlotId,
    pub closure_date: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Occupancy of one slot on one date, as counted from active reservations.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SlotOccupancyDBResponse {
    pub slot_id: SlotId,
    pub occupancy: i64,
}

/// A slot annotated with its occupancy and closure state for one date.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SlotAvailabilityDBResponse {
    #[sqlx(flatten)]
    pub slot: ClassSlotDBResponse,
    pub occupancy: i64,
    pub closed: bool,
    pub closure_description: Option<String>,
}

impl SlotAvailabilityDBResponse {
    /// Seats left on this date. Closures zero availability outright.
    pub fn available_seats(&self) -> i64 {
        if self.closed {
            return 0;
        }
        (i64::from(self.slot.max_persons) - self.occupancy).max(0)
    }
}
