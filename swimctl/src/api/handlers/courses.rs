//! Course catalog handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use crate::{
    AppState,
    api::handlers::require_manage,
    api::models::courses::{CourseCreate, CourseResponse, CourseUpdate},
    api::models::users::CurrentUser,
    db::{
        handlers::{Courses, Repository, courses::CourseFilter},
        models::courses::{CourseCreateDBRequest, CourseUpdateDBRequest},
    },
    errors::{Error, Result},
    types::CourseId,
};

/// Query parameters for listing courses
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListCoursesQuery {
    #[serde(default)]
    pub include_disabled: bool,
}

/// Create a course.
#[utoipa::path(
    post,
    path = "/courses",
    request_body = CourseCreate,
    responses(
        (status = 201, description = "Course created", body = CourseResponse),
        (status = 403, description = "Not permitted"),
        (status = 409, description = "Refer code already in use"),
    ),
    security(("bearer_auth" = [])),
    tag = "courses"
)]
#[instrument(skip_all, fields(name = %request.name))]
pub async fn create_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CourseCreate>,
) -> Result<(StatusCode, Json<CourseResponse>)> {
    require_manage(&user, "courses")?;

    let create = CourseCreateDBRequest {
        name: request.name,
        short_name: request.short_name,
        refer_code: request.refer_code,
        enabled: request.enabled,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let course = Courses::new(&mut conn).create(&create).await?;
    Ok((StatusCode::CREATED, Json(course.into())))
}

/// List courses. Disabled courses are hidden unless asked for.
#[utoipa::path(
    get,
    path = "/courses",
    params(ListCoursesQuery),
    responses(
        (status = 200, description = "Courses", body = Vec<CourseResponse>),
    ),
    security(("bearer_auth" = [])),
    tag = "courses"
)]
#[instrument(skip_all)]
pub async fn list_courses(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListCoursesQuery>,
) -> Result<Json<Vec<CourseResponse>>> {
    // Only staff may see disabled courses
    let include_disabled = query.include_disabled && user.role.is_staff();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let courses = Courses::new(&mut conn)
        .list(&CourseFilter { include_disabled })
        .await?;
    Ok(Json(courses.into_iter().map(Into::into).collect()))
}

/// Fetch one course.
#[utoipa::path(
    get,
    path = "/courses/{id}",
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course", body = CourseResponse),
        (status = 404, description = "No such course"),
    ),
    security(("bearer_auth" = [])),
    tag = "courses"
)]
#[instrument(skip_all, fields(id = id))]
pub async fn get_course(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<CourseId>,
) -> Result<Json<CourseResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let course = Courses::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "course".to_string(),
            id: id.to_string(),
        })?;
    Ok(Json(course.into()))
}

/// Update a course.
#[utoipa::path(
    patch,
    path = "/courses/{id}",
    params(("id" = i64, Path, description = "Course id")),
    request_body = CourseUpdate,
    responses(
        (status = 200, description = "Updated course", body = CourseResponse),
        (status = 404, description = "No such course"),
    ),
    security(("bearer_auth" = [])),
    tag = "courses"
)]
#[instrument(skip_all, fields(id = id))]
pub async fn update_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<CourseId>,
    Json(request): Json<CourseUpdate>,
) -> Result<Json<CourseResponse>> {
    require_manage(&user, "courses")?;

    let update = CourseUpdateDBRequest {
        name: request.name,
        short_name: request.short_name,
        refer_code: request.refer_code,
        enabled: request.enabled,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let course = Courses::new(&mut conn).update(id, &update).await?;
    Ok(Json(course.into()))
}

/// Delete a course. Fails while slots or entitlements still reference it.
#[utoipa::path(
    delete,
    path = "/courses/{id}",
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 204, description = "Course deleted"),
        (status = 400, description = "Course still referenced"),
        (status = 404, description = "No such course"),
    ),
    security(("bearer_auth" = [])),
    tag = "courses"
)]
#[instrument(skip_all, fields(id = id))]
pub async fn delete_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<CourseId>,
) -> Result<StatusCode> {
    require_manage(&user, "courses")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = Courses::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound {
            resource: "course".to_string(),
            id: id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}
