//! Holiday marker handlers. Display-only: holidays never block bookings.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::instrument;

use crate::{
    AppState,
    api::handlers::require_manage,
    api::models::holidays::{HolidayCreate, HolidayResponse, ListHolidaysQuery},
    api::models::users::CurrentUser,
    db::{handlers::Holidays, models::holidays::HolidayCreateDBRequest},
    errors::{Error, Result},
    types::HolidayId,
};

/// Declare a holiday.
#[utoipa::path(
    post,
    path = "/holidays",
    request_body = HolidayCreate,
    responses(
        (status = 201, description = "Holiday declared", body = HolidayResponse),
        (status = 403, description = "Not permitted"),
    ),
    security(("bearer_auth" = [])),
    tag = "holidays"
)]
#[instrument(skip_all, fields(date = %request.holiday_date))]
pub async fn create_holiday(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<HolidayCreate>,
) -> Result<(StatusCode, Json<HolidayResponse>)> {
    require_manage(&user, "holidays")?;

    let create = HolidayCreateDBRequest {
        holiday_date: request.holiday_date,
        description: request.description,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let holiday = Holidays::new(&mut conn).create(&create).await?;
    Ok((StatusCode::CREATED, Json(holiday.into())))
}

/// List holidays, optionally bounded by a date range.
#[utoipa::path(
    get,
    path = "/holidays",
    params(ListHolidaysQuery),
    responses(
        (status = 200, description = "Holidays", body = Vec<HolidayResponse>),
    ),
    security(("bearer_auth" = [])),
    tag = "holidays"
)]
#[instrument(skip_all)]
pub async fn list_holidays(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<ListHolidaysQuery>,
) -> Result<Json<Vec<HolidayResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let holidays = Holidays::new(&mut conn).list(query.from, query.to).await?;
    Ok(Json(holidays.into_iter().map(Into::into).collect()))
}

/// Remove a holiday marker.
#[utoipa::path(
    delete,
    path = "/holidays/{id}",
    params(("id" = i64, Path, description = "Holiday id")),
    responses(
        (status = 204, description = "Holiday removed"),
        (status = 404, description = "No such holiday"),
    ),
    security(("bearer_auth" = [])),
    tag = "holidays"
)]
#[instrument(skip_all, fields(id = id))]
pub async fn delete_holiday(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<HolidayId>,
) -> Result<StatusCode> {
    require_manage(&user, "holidays")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = Holidays::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound {
            resource: "holiday".to_string(),
            id: id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}
