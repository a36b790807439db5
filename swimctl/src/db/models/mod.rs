//! Database record models matching table schemas.
//!
//! Struct definitions that correspond directly to database table rows. These
//! models are used by repositories to return query results and accept
//! insertion/update data. They derive `sqlx::FromRow` so the runtime query API
//! can hydrate them without a live database at compile time.
//!
//! Database models are distinct from API models so the storage and API
//! representations can evolve independently; conversions live on the API side.

pub mod courses;
pub mod entitlements;
pub mod holidays;
pub mod reservations;
pub mod slots;
pub mod students;
pub mod users;
