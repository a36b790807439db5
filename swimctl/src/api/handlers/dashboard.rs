//! Admin dashboard counters.

use axum::{Json, extract::State};
use chrono::Utc;
use tracing::instrument;

use crate::{
    AppState,
    api::handlers::require_staff,
    api::models::dashboard::DashboardResponse,
    api::models::users::CurrentUser,
    errors::{Error, Result},
};

/// Headline counts for the admin landing page.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard counters", body = DashboardResponse),
        (status = 403, description = "Not permitted"),
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
#[instrument(skip_all)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<DashboardResponse>> {
    require_staff(&user, "the dashboard")?;

    let today = Utc::now().date_naive();

    let (students,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM students WHERE NOT deleted")
        .fetch_one(&state.db)
        .await
        .map_err(|e| Error::Database(e.into()))?;

    let (active_entitlements,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM entitlements WHERE NOT finished")
            .fetch_one(&state.db)
            .await
            .map_err(|e| Error::Database(e.into()))?;

    let (todays_bookings,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM reservations WHERE class_date = $1")
            .bind(today)
            .fetch_one(&state.db)
            .await
            .map_err(|e| Error::Database(e.into()))?;

    let (pending_students,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_students")
        .fetch_one(&state.db)
        .await
        .map_err(|e| Error::Database(e.into()))?;

    Ok(Json(DashboardResponse {
        students,
        active_entitlements,
        todays_bookings,
        pending_students,
    }))
}
