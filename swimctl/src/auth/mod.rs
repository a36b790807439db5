//! Authentication and authorization.
//!
//! Sessions are stateless HS256 JWTs carrying the user id, username, role,
//! and a unique token id (`jti`). Logout writes the token id into a
//! server-side revocation set which the middleware consults on every
//! request, so a revoked token dies before its natural expiry.
//!
//! - [`password`]: Argon2id hashing and verification
//! - [`session`]: token creation and verification
//! - [`revocation`]: the persisted revocation set
//! - [`middleware`]: axum layer resolving [`CurrentUser`] into extensions
//!
//! [`CurrentUser`]: crate::api::models::users::CurrentUser

pub mod middleware;
pub mod password;
pub mod revocation;
pub mod session;

pub use session::{SessionClaims, create_session_token, verify_session_token};
