//! API request/response models for class slots and availability.

use crate::db::models::slots::{ClassSlotDBResponse, SlotAvailabilityDBResponse, SlotClosureDBResponse};
use crate::types::{CourseId, SlotId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SlotCreate {
    pub course_id: CourseId,
    /// Lowercase weekday name, e.g. "monday"
    pub weekday: String,
    pub time_label: String,
    pub max_persons: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub admin_only: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct SlotUpdate {
    pub weekday: Option<String>,
    pub time_label: Option<String>,
    pub max_persons: Option<i32>,
    pub enabled: Option<bool>,
    pub admin_only: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SlotResponse {
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

impl From<ClassSlotDBResponse> for SlotResponse {
    fn from(db: ClassSlotDBResponse) -> Self {
        Self {
            id: db.id,
            course_id: db.course_id,
            weekday: db.weekday,
            time_label: db.time_label,
            max_persons: db.max_persons,
            enabled: db.enabled,
            admin_only: db.admin_only,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// One bookable slot on one date, with seats left and any closure note.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SlotAvailabilityResponse {
    #[serde(flatten)]
    pub slot: SlotResponse,
    pub occupancy: i64,
    pub available_seats: i64,
    pub closed: bool,
    /// Closure description, surfaced as the availability note
    pub note: Option<String>,
}

impl From<SlotAvailabilityDBResponse> for SlotAvailabilityResponse {
    fn from(db: SlotAvailabilityDBResponse) -> Self {
        let available_seats = db.available_seats();
        Self {
            slot: db.slot.into(),
            occupancy: db.occupancy,
            available_seats,
            closed: db.closed,
            note: db.closure_description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClosureCreate {
    pub closure_date: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClosureResponse {
    pub id: i64,
    pub slot_id: SlotId,
    pub closure_date: NaiveDate,
    pub description: Option<String>,
}

impl From<SlotClosureDBResponse> for ClosureResponse {
    fn from(db: SlotClosureDBResponse) -> Self {
        Self {
            id: db.id,
            slot_id: db.slot_id,
            closure_date: db.closure_date,
            description: db.description,
        }
    }
}

/// Query parameters for the availability listing
#[derive(Debug, Deserialize, utoipa::IntoParams, ToSchema)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub course_id: Option<CourseId>,
}

/// Query parameters for listing slots
#[derive(Debug, Deserialize, utoipa::IntoParams, ToSchema)]
pub struct ListSlotsQuery {
    pub course_id: Option<CourseId>,
    #[serde(default)]
    pub include_disabled: bool,
}
