//! Database models for class reservations.

use crate::types::{CourseId, ReservationId, SlotId};
use chrono::{DateTime, NaiveDate, Utc};

/// Row inserted when a booking is admitted.
#[derive(Debug, Clone)]
pub struct ReservationCreateDBRequest {
    pub student_refer: String,
    pub slot_id: SlotId,
    pub class_date: NaiveDate,
    pub time_label: String,
    pub course_id: CourseId,
    pub entitlement_refer: Option<String>,
    pub free: bool,
    pub created_by: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservationDBResponse {
    pub id: ReservationId,
    pub student_refer: String,
    pub slot_id: SlotId,
    pub class_date: NaiveDate,
    pub time_label: String,
    pub course_id: CourseId,
    pub entitlement_refer: Option<String>,
    pub free: bool,
    pub checked_in: bool,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reservation joined with student and payment context for admin class lists.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRowDBResponse {
    pub id: ReservationId,
    pub student_refer: String,
    pub slot_id: SlotId,
    pub class_date: NaiveDate,
    pub time_label: String,
    pub course_id: CourseId,
    pub entitlement_refer: Option<String>,
    pub free: bool,
    pub checked_in: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub level: Option<String>,
    pub short_note: Option<String>,
    /// Entitlement state backing this booking, when it still exists. Used to
    /// compute payment warnings in class lists.
    pub entitlement_paid: Option<bool>,
    pub entitlement_trial: Option<bool>,
    pub entitlement_kind: Option<crate::api::models::entitlements::EntitlementKind>,
    pub entitlement_remaining: Option<i32>,
    pub entitlement_expiry: Option<NaiveDate>,
}
