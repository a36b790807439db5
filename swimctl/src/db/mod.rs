//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//! It follows the Repository pattern to provide clean abstractions over
//! database operations.
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations for each entity
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! Repositories work over `&mut PgConnection` so they compose with
//! transactions: create the repository from a transaction when a sequence
//! must be atomic. The booking admission machine opens its own SERIALIZABLE
//! transaction internally.
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded through
//! [`crate::MIGRATOR`].

pub mod errors;
pub mod handlers;
pub mod models;
