//! API request/response models for bookings.

use crate::db::handlers::reservations::RejectReason;
use crate::db::models::reservations::{BookingRowDBResponse, ReservationDBResponse};
use crate::api::models::entitlements::EntitlementKind;
use crate::types::{CourseId, ReservationId, SlotId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A booking admission request.
///
/// The slot identity is supplied redundantly (slot id plus course, weekday,
/// and time label); admission rejects when they disagree rather than trust
/// one side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingRequest {
    pub student_refer: String,
    pub slot_id: SlotId,
    pub class_date: NaiveDate,
    pub time_label: String,
    pub course_id: CourseId,
    pub weekday: String,
    #[serde(default)]
    pub free: bool,
}

/// Machine-readable rejection category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    DuplicateBooking,
    ClassNotFound,
    ClassFull,
    NoEntitlement,
    EntitlementExpired,
    NoCreditsRemaining,
}

/// Outcome of an admission attempt. Rejections are results, not errors:
/// the HTTP request itself succeeds and carries the reason.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingOutcome {
    pub admitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<RejectCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub over_capacity: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<ReservationResponse>,
}

impl BookingOutcome {
    pub fn admitted(reservation: ReservationResponse, over_capacity: bool) -> Self {
        Self {
            admitted: true,
            reason: None,
            reason_code: None,
            over_capacity: over_capacity.then_some(true),
            reservation: Some(reservation),
        }
    }

    pub fn rejected(reason: &RejectReason) -> Self {
        Self {
            admitted: false,
            reason: Some(reject_message(reason)),
            reason_code: Some(reject_code(reason)),
            over_capacity: None,
            reservation: None,
        }
    }
}

fn reject_code(reason: &RejectReason) -> RejectCode {
    match reason {
        RejectReason::DuplicateBooking => RejectCode::DuplicateBooking,
        RejectReason::ClassNotFound => RejectCode::ClassNotFound,
        RejectReason::ClassFull => RejectCode::ClassFull,
        RejectReason::NoEntitlement => RejectCode::NoEntitlement,
        RejectReason::EntitlementExpired { .. } => RejectCode::EntitlementExpired,
        RejectReason::NoCreditsRemaining => RejectCode::NoCreditsRemaining,
    }
}

fn reject_message(reason: &RejectReason) -> String {
    match reason {
        RejectReason::DuplicateBooking => "Already booked a class on this date".to_string(),
        RejectReason::ClassNotFound => "No class found".to_string(),
        RejectReason::ClassFull => "Sorry, this class is full".to_string(),
        RejectReason::NoEntitlement => "No course found for this student".to_string(),
        RejectReason::EntitlementExpired { expiry: None } => "Sorry, your course has expired".to_string(),
        RejectReason::EntitlementExpired { expiry: Some(expiry) } => {
            format!("Sorry, your course expires on {}", expiry.format("%d/%m/%Y"))
        }
        RejectReason::NoCreditsRemaining => "Sorry, no credits remaining on your course".to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationResponse {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReservationDBResponse> for ReservationResponse {
    fn from(db: ReservationDBResponse) -> Self {
        Self {
            id: db.id,
            student_refer: db.student_refer,
            slot_id: db.slot_id,
            class_date: db.class_date,
            time_label: db.time_label,
            course_id: db.course_id,
            entitlement_refer: db.entitlement_refer,
            free: db.free,
            checked_in: db.checked_in,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// One row of the admin class list for a date.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingRowResponse {
    pub id: ReservationId,
    pub student_refer: String,
    pub slot_id: SlotId,
    pub time_label: String,
    pub course_id: CourseId,
    /// Full name with a "(pay)" suffix when payment needs chasing
    pub display_name: String,
    pub nickname: Option<String>,
    pub age: Option<String>,
    pub level: Option<String>,
    pub short_note: Option<String>,
    pub free: bool,
    pub checked_in: bool,
    pub pay_warning: bool,
}

impl BookingRowResponse {
    pub fn from_db(db: BookingRowDBResponse, today: NaiveDate) -> Self {
        let pay_warning = payment_needs_chasing(&db);
        let mut display_name = [&db.first_name, &db.last_name]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        if pay_warning {
            display_name.push_str(" (pay)");
        }
        let age = db
            .date_of_birth
            .map(|dob| crate::api::models::students::age_string(dob, today));
        Self {
            id: db.id,
            student_refer: db.student_refer,
            slot_id: db.slot_id,
            time_label: db.time_label,
            course_id: db.course_id,
            display_name,
            nickname: db.nickname,
            age,
            level: db.level,
            short_note: db.short_note,
            free: db.free,
            checked_in: db.checked_in,
            pay_warning,
        }
    }
}

/// Flag a booking whose entitlement is unpaid, out of credits, or past its
/// expiry on the class date. Free bookings and orphaned entitlement refs
/// never warn.
fn payment_needs_chasing(row: &BookingRowDBResponse) -> bool {
    if row.free || row.entitlement_refer.is_none() {
        return false;
    }
    if row.entitlement_trial == Some(true) {
        return false;
    }
    if row.entitlement_paid == Some(false) {
        return true;
    }
    if row.entitlement_kind == Some(EntitlementKind::Counted) && row.entitlement_remaining == Some(0) {
        return true;
    }
    if let Some(expiry) = row.entitlement_expiry {
        if row.class_date > expiry {
            return true;
        }
    }
    false
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckInRequest {
    pub checked_in: bool,
}

/// Query parameters for the class list
#[derive(Debug, Deserialize, utoipa::IntoParams, ToSchema)]
pub struct BookingListQuery {
    pub date: NaiveDate,
}

/// Outcome of a cancellation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelResponse {
    pub cancelled: bool,
    pub credit_restored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_message_formats_day_month_year() {
        let reason = RejectReason::EntitlementExpired {
            expiry: NaiveDate::from_ymd_opt(2024, 1, 10),
        };
        let outcome = BookingOutcome::rejected(&reason);
        assert!(!outcome.admitted);
        assert!(outcome.reason.unwrap().contains("10/01/2024"));
        assert_eq!(outcome.reason_code, Some(RejectCode::EntitlementExpired));
    }
}
