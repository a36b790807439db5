//! Axum route handlers.
//!
//! Handlers stay thin: resolve the caller, check the role policy, delegate
//! to a repository, convert to API models. Booking admission additionally
//! fans out its notification side effect.

pub mod auth;
pub mod bookings;
pub mod courses;
pub mod dashboard;
pub mod entitlements;
pub mod holidays;
pub mod slots;
pub mod students;
pub mod users;

use crate::{
    AppState,
    api::models::users::CurrentUser,
    db::models::users::FamilyDBResponse,
    errors::{Error, Result},
};

/// Managers and admins only.
pub(crate) fn require_manage(user: &CurrentUser, resource: &str) -> Result<()> {
    if user.role.can_manage() {
        Ok(())
    } else {
        Err(Error::Forbidden {
            action: "manage".to_string(),
            resource: resource.to_string(),
        })
    }
}

/// Any staff role (manager, admin, coach).
pub(crate) fn require_staff(user: &CurrentUser, resource: &str) -> Result<()> {
    if user.role.is_staff() {
        Ok(())
    } else {
        Err(Error::Forbidden {
            action: "view".to_string(),
            resource: resource.to_string(),
        })
    }
}

/// The family owned by a customer caller. Staff callers have none.
pub(crate) async fn family_for_customer(state: &AppState, user: &CurrentUser) -> Result<FamilyDBResponse> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let family = crate::db::handlers::Users::new(&mut conn)
        .family_for_user(user.id)
        .await?
        .ok_or_else(|| Error::Forbidden {
            action: "access".to_string(),
            resource: "family records".to_string(),
        })?;
    Ok(family)
}
