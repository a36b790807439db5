//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection or transaction, provides
//! strongly-typed operations for one entity, and returns domain models from
//! [`crate::db::models`]. Multi-statement sequences always run inside an
//! explicit transaction opened by the repository itself.
//!
//! # Available Repositories
//!
//! - [`Users`]: accounts, families, and the login audit trail
//! - [`Students`]: student records and pending registrations
//! - [`Courses`]: the course catalog
//! - [`ClassSlots`]: recurring slots, closures, and the capacity index
//! - [`Entitlements`]: the course credit ledger
//! - [`Reservations`]: the booking admission machine
//! - [`Holidays`]: display-only holiday markers
//! - [`ReferGenerator`]: sequential per-type per-day refer codes

pub mod courses;
pub mod entitlements;
pub mod holidays;
pub mod refer;
pub mod repository;
pub mod reservations;
pub mod slots;
pub mod students;
pub mod users;

pub use courses::Courses;
pub use entitlements::Entitlements;
pub use holidays::Holidays;
pub use refer::ReferGenerator;
pub use repository::Repository;
pub use reservations::Reservations;
pub use slots::ClassSlots;
pub use students::Students;
pub use users::Users;
