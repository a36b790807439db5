//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): login, registration, logout,
//!   password change
//! - **Bookings** (`/api/v1/bookings/*`): admission, reschedule, cancel,
//!   class lists, check-in
//! - **Students** (`/api/v1/students/*`): student records, pending
//!   registrations and approval
//! - **Catalog** (`/api/v1/courses/*`, `/api/v1/slots/*`): courses, slots,
//!   closures, availability
//! - **Entitlements** (`/api/v1/entitlements/*`): the credit ledger surface
//! - **Holidays / Dashboard** (`/api/v1/holidays`, `/api/v1/dashboard`)
//!
//! All endpoints are documented with OpenAPI annotations via `utoipa`; the
//! rendered document is served at `/docs`.

pub mod handlers;
pub mod models;
