//! Common type definitions shared across the crate.
//!
//! Two identifier families exist side by side:
//!
//! - Surrogate keys (`UserId`, `SlotId`, ...) are plain database identifiers.
//! - Refer codes (`ReferCode`) are the human-readable `TYPE-YYYYMMDD-NNNN`
//!   identifiers produced by the reference number generator. Students and
//!   entitlements are addressed by refer code everywhere outside the database.

use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type FamilyId = i64;
pub type CourseId = i64;
pub type SlotId = i64;
pub type ReservationId = i64;
pub type HolidayId = i64;

/// Human-readable date+sequence identifier, e.g. `S-20240115-0001`.
pub type ReferCode = String;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
