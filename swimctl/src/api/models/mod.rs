//! API request/response models.
//!
//! These are the wire types: deserialized from request bodies and query
//! strings, serialized into responses, and annotated with `ToSchema` for the
//! OpenAPI document. Database models convert into them at the handler
//! boundary.

pub mod bookings;
pub mod courses;
pub mod dashboard;
pub mod entitlements;
pub mod holidays;
pub mod slots;
pub mod students;
pub mod users;
