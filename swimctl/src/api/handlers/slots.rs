//! Class slot handlers: slot CRUD, closures, and availability.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use tracing::instrument;

use crate::{
    AppState,
    api::handlers::require_manage,
    api::models::slots::{
        AvailabilityQuery, ClosureCreate, ClosureResponse, ListSlotsQuery, SlotAvailabilityResponse,
        SlotCreate, SlotResponse, SlotUpdate,
    },
    api::models::users::CurrentUser,
    db::{
        handlers::{ClassSlots, Repository, slots::SlotFilter},
        models::slots::{ClassSlotCreateDBRequest, ClassSlotUpdateDBRequest},
    },
    errors::{Error, Result},
    types::SlotId,
};

const WEEKDAYS: [&str; 7] = [
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

fn validate_weekday(weekday: &str) -> Result<()> {
    if WEEKDAYS.contains(&weekday) {
        Ok(())
    } else {
        Err(Error::BadRequest {
            message: format!("Unknown weekday '{weekday}'"),
        })
    }
}

/// Create a recurring class slot.
#[utoipa::path(
    post,
    path = "/slots",
    request_body = SlotCreate,
    responses(
        (status = 201, description = "Slot created", body = SlotResponse),
        (status = 400, description = "Invalid weekday or capacity"),
        (status = 403, description = "Not permitted"),
    ),
    security(("bearer_auth" = [])),
    tag = "slots"
)]
#[instrument(skip_all, fields(course = request.course_id, weekday = %request.weekday, time = %request.time_label))]
pub async fn create_slot(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<SlotCreate>,
) -> Result<(StatusCode, Json<SlotResponse>)> {
    require_manage(&user, "slots")?;
    validate_weekday(&request.weekday)?;
    if request.max_persons < 1 {
        return Err(Error::BadRequest {
            message: "Capacity must be at least 1".to_string(),
        });
    }

    let create = ClassSlotCreateDBRequest {
        course_id: request.course_id,
        weekday: request.weekday,
        time_label: request.time_label,
        max_persons: request.max_persons,
        enabled: request.enabled,
        admin_only: request.admin_only,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let slot = ClassSlots::new(&mut conn).create(&create).await?;
    Ok((StatusCode::CREATED, Json(slot.into())))
}

/// List slots.
#[utoipa::path(
    get,
    path = "/slots",
    params(ListSlotsQuery),
    responses(
        (status = 200, description = "Slots", body = Vec<SlotResponse>),
    ),
    security(("bearer_auth" = [])),
    tag = "slots"
)]
#[instrument(skip_all)]
pub async fn list_slots(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListSlotsQuery>,
) -> Result<Json<Vec<SlotResponse>>> {
    let filter = SlotFilter {
        course_id: query.course_id,
        include_disabled: query.include_disabled && user.role.is_staff(),
        include_admin_only: user.role.is_staff(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let slots = ClassSlots::new(&mut conn).list(&filter).await?;
    Ok(Json(slots.into_iter().map(Into::into).collect()))
}

/// Fetch one slot.
#[utoipa::path(
    get,
    path = "/slots/{id}",
    params(("id" = i64, Path, description = "Slot id")),
    responses(
        (status = 200, description = "Slot", body = SlotResponse),
        (status = 404, description = "No such slot"),
    ),
    security(("bearer_auth" = [])),
    tag = "slots"
)]
#[instrument(skip_all, fields(id = id))]
pub async fn get_slot(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<SlotId>,
) -> Result<Json<SlotResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let slot = ClassSlots::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "slot".to_string(),
            id: id.to_string(),
        })?;
    Ok(Json(slot.into()))
}

/// Update a slot.
#[utoipa::path(
    patch,
    path = "/slots/{id}",
    params(("id" = i64, Path, description = "Slot id")),
    request_body = SlotUpdate,
    responses(
        (status = 200, description = "Updated slot", body = SlotResponse),
        (status = 404, description = "No such slot"),
    ),
    security(("bearer_auth" = [])),
    tag = "slots"
)]
#[instrument(skip_all, fields(id = id))]
pub async fn update_slot(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<SlotId>,
    Json(request): Json<SlotUpdate>,
) -> Result<Json<SlotResponse>> {
    require_manage(&user, "slots")?;
    if let Some(weekday) = &request.weekday {
        validate_weekday(weekday)?;
    }

    let update = ClassSlotUpdateDBRequest {
        weekday: request.weekday,
        time_label: request.time_label,
        max_persons: request.max_persons,
        enabled: request.enabled,
        admin_only: request.admin_only,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let slot = ClassSlots::new(&mut conn).update(id, &update).await?;
    Ok(Json(slot.into()))
}

/// Delete a slot.
#[utoipa::path(
    delete,
    path = "/slots/{id}",
    params(("id" = i64, Path, description = "Slot id")),
    responses(
        (status = 204, description = "Slot deleted"),
        (status = 404, description = "No such slot"),
    ),
    security(("bearer_auth" = [])),
    tag = "slots"
)]
#[instrument(skip_all, fields(id = id))]
pub async fn delete_slot(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<SlotId>,
) -> Result<StatusCode> {
    require_manage(&user, "slots")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = ClassSlots::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound {
            resource: "slot".to_string(),
            id: id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Bookable slots for a date, annotated with seats left and closures.
///
/// This is the screen customers book from: admin-only slots are hidden from
/// them, and a closed slot shows zero seats with the closure note attached.
#[utoipa::path(
    get,
    path = "/slots/availability",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Availability for the date", body = Vec<SlotAvailabilityResponse>),
    ),
    security(("bearer_auth" = [])),
    tag = "slots"
)]
#[instrument(skip_all, fields(date = %query.date))]
pub async fn availability(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<SlotAvailabilityResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let slots = ClassSlots::new(&mut conn)
        .visible_slots(query.date, query.course_id, user.role.is_staff())
        .await?;
    Ok(Json(slots.into_iter().map(Into::into).collect()))
}

/// Close a slot for one date (maintenance, events).
#[utoipa::path(
    post,
    path = "/slots/{id}/closures",
    params(("id" = i64, Path, description = "Slot id")),
    request_body = ClosureCreate,
    responses(
        (status = 201, description = "Closure declared", body = ClosureResponse),
        (status = 409, description = "Already closed on that date"),
    ),
    security(("bearer_auth" = [])),
    tag = "slots"
)]
#[instrument(skip_all, fields(id = id, date = %request.closure_date))]
pub async fn add_closure(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<SlotId>,
    Json(request): Json<ClosureCreate>,
) -> Result<(StatusCode, Json<ClosureResponse>)> {
    require_manage(&user, "slot closures")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let closure = ClassSlots::new(&mut conn)
        .add_closure(id, request.closure_date, request.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(closure.into())))
}

/// Reopen a slot on a date.
#[utoipa::path(
    delete,
    path = "/slots/{id}/closures/{date}",
    params(
        ("id" = i64, Path, description = "Slot id"),
        ("date" = String, Path, description = "Closure date (YYYY-MM-DD)"),
    ),
    responses(
        (status = 204, description = "Closure removed"),
        (status = 404, description = "No closure on that date"),
    ),
    security(("bearer_auth" = [])),
    tag = "slots"
)]
#[instrument(skip_all, fields(id = id, date = %date))]
pub async fn remove_closure(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, date)): Path<(SlotId, NaiveDate)>,
) -> Result<StatusCode> {
    require_manage(&user, "slot closures")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let removed = ClassSlots::new(&mut conn).remove_closure(id, date).await?;
    if !removed {
        return Err(Error::NotFound {
            resource: "closure".to_string(),
            id: format!("{id}/{date}"),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::models::courses::{CourseCreate, CourseResponse};
    use crate::api::models::slots::{ClosureCreate, SlotAvailabilityResponse, SlotCreate, SlotResponse};
    use crate::test_utils::*;
    use sqlx::PgPool;

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn closure_zeroes_availability_and_carries_the_note(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        let course: CourseResponse = server
            .post("/api/v1/courses")
            .authorization_bearer(&token)
            .json(&CourseCreate {
                name: "Learn to Swim".to_string(),
                short_name: "LTS".to_string(),
                refer_code: "LTS".to_string(),
                enabled: true,
            })
            .await
            .json();
        let slot: SlotResponse = server
            .post("/api/v1/slots")
            .authorization_bearer(&token)
            .json(&SlotCreate {
                course_id: course.id,
                weekday: "monday".to_string(),
                time_label: "10:00".to_string(),
                max_persons: 5,
                enabled: true,
                admin_only: false,
            })
            .await
            .json();

        // 2030-01-07 is a Monday
        let open: Vec<SlotAvailabilityResponse> = server
            .get("/api/v1/slots/availability?date=2030-01-07")
            .authorization_bearer(&token)
            .await
            .json();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].available_seats, 5);
        assert!(!open[0].closed);

        server
            .post(&format!("/api/v1/slots/{}/closures", slot.id))
            .authorization_bearer(&token)
            .json(&ClosureCreate {
                closure_date: chrono::NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
                description: Some("Pool maintenance".to_string()),
            })
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let closed: Vec<SlotAvailabilityResponse> = server
            .get("/api/v1/slots/availability?date=2030-01-07")
            .authorization_bearer(&token)
            .await
            .json();
        assert!(closed[0].closed);
        assert_eq!(closed[0].available_seats, 0);
        assert_eq!(closed[0].note.as_deref(), Some("Pool maintenance"));

        // A Tuesday shows nothing for a Monday slot
        let off_day: Vec<SlotAvailabilityResponse> = server
            .get("/api/v1/slots/availability?date=2030-01-08")
            .authorization_bearer(&token)
            .await
            .json();
        assert!(off_day.is_empty());
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn slot_creation_rejects_bad_weekday(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        let course: CourseResponse = server
            .post("/api/v1/courses")
            .authorization_bearer(&token)
            .json(&CourseCreate {
                name: "Learn to Swim".to_string(),
                short_name: "LTS".to_string(),
                refer_code: "LTS".to_string(),
                enabled: true,
            })
            .await
            .json();

        let response = server
            .post("/api/v1/slots")
            .authorization_bearer(&token)
            .json(&SlotCreate {
                course_id: course.id,
                weekday: "someday".to_string(),
                time_label: "10:00".to_string(),
                max_persons: 5,
                enabled: true,
                admin_only: false,
            })
            .await;
        response.assert_status_bad_request();
    }
}
