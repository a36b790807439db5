//! Student record handlers, including the pending-registration queue.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::instrument;

use crate::{
    AppState,
    api::handlers::{family_for_customer, require_manage},
    api::models::students::{
        ListStudentsQuery, PendingStudentCreate, PendingStudentResponse, StudentCreate,
        StudentResponse, StudentUpdate,
    },
    api::models::users::CurrentUser,
    db::{
        handlers::{Repository, Students, students::StudentFilter},
        models::students::{
            PendingStudentCreateDBRequest, StudentCreateDBRequest, StudentUpdateDBRequest,
        },
    },
    errors::{Error, Result},
};

/// Create a student record directly (staff only).
#[utoipa::path(
    post,
    path = "/students",
    request_body = StudentCreate,
    responses(
        (status = 201, description = "Student created", body = StudentResponse),
        (status = 403, description = "Not permitted"),
    ),
    security(("bearer_auth" = [])),
    tag = "students"
)]
#[instrument(skip_all)]
pub async fn create_student(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<StudentCreate>,
) -> Result<(StatusCode, Json<StudentResponse>)> {
    require_manage(&user, "students")?;

    let create = StudentCreateDBRequest {
        family_id: request.family_id,
        first_name: request.first_name,
        middle_name: request.middle_name,
        last_name: request.last_name,
        nickname: request.nickname,
        gender: request.gender,
        date_of_birth: request.date_of_birth,
        school: request.school,
        level: request.level,
        short_note: request.short_note,
        created_by: Some(user.username.clone()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let student = Students::new(&mut conn).create(&create).await?;

    tracing::info!(refer = %student.refer, "student created");
    Ok((StatusCode::CREATED, Json(student.into())))
}

/// List students. Customers see only their own family.
#[utoipa::path(
    get,
    path = "/students",
    params(ListStudentsQuery),
    responses(
        (status = 200, description = "Students", body = Vec<StudentResponse>),
    ),
    security(("bearer_auth" = [])),
    tag = "students"
)]
#[instrument(skip_all)]
pub async fn list_students(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListStudentsQuery>,
) -> Result<Json<Vec<StudentResponse>>> {
    let filter = if user.role.is_staff() {
        StudentFilter {
            family_id: query.family_id,
            include_deleted: query.include_deleted,
            search: query.search,
        }
    } else {
        let family = family_for_customer(&state, &user).await?;
        StudentFilter {
            family_id: Some(family.id),
            include_deleted: false,
            search: query.search,
        }
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let students = Students::new(&mut conn).list(&filter).await?;
    Ok(Json(students.into_iter().map(Into::into).collect()))
}

/// Fetch one student.
#[utoipa::path(
    get,
    path = "/students/{refer}",
    params(("refer" = String, Path, description = "Student refer")),
    responses(
        (status = 200, description = "Student", body = StudentResponse),
        (status = 404, description = "No such student"),
    ),
    security(("bearer_auth" = [])),
    tag = "students"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn get_student(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
) -> Result<Json<StudentResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let student = Students::new(&mut conn)
        .get_by_id(refer.clone())
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "student".to_string(),
            id: refer.clone(),
        })?;
    drop(conn);

    if !user.role.is_staff() {
        let family = family_for_customer(&state, &user).await?;
        if student.family_id != Some(family.id) {
            return Err(Error::Forbidden {
                action: "view".to_string(),
                resource: "students outside your family".to_string(),
            });
        }
    }
    Ok(Json(student.into()))
}

/// Update a student record. Only present fields change; an explicit null
/// clears the entitlement references.
#[utoipa::path(
    patch,
    path = "/students/{refer}",
    params(("refer" = String, Path, description = "Student refer")),
    request_body = StudentUpdate,
    responses(
        (status = 200, description = "Updated student", body = StudentResponse),
        (status = 404, description = "No such student"),
    ),
    security(("bearer_auth" = [])),
    tag = "students"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn update_student(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
    Json(request): Json<StudentUpdate>,
) -> Result<Json<StudentResponse>> {
    require_manage(&user, "students")?;

    let update = StudentUpdateDBRequest {
        family_id: request.family_id,
        first_name: request.first_name,
        middle_name: request.middle_name,
        last_name: request.last_name,
        nickname: request.nickname,
        gender: request.gender,
        date_of_birth: request.date_of_birth,
        school: request.school,
        level: request.level,
        short_note: request.short_note,
        primary_entitlement: request.primary_entitlement,
        secondary_entitlement: request.secondary_entitlement,
        updated_by: Some(user.username.clone()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let student = Students::new(&mut conn).update(refer, &update).await?;
    Ok(Json(student.into()))
}

/// Soft-delete a student record.
#[utoipa::path(
    delete,
    path = "/students/{refer}",
    params(("refer" = String, Path, description = "Student refer")),
    responses(
        (status = 204, description = "Student deleted"),
        (status = 404, description = "No such student"),
    ),
    security(("bearer_auth" = [])),
    tag = "students"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn delete_student(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
) -> Result<StatusCode> {
    require_manage(&user, "students")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = Students::new(&mut conn).delete(refer.clone()).await?;
    if !deleted {
        return Err(Error::NotFound {
            resource: "student".to_string(),
            id: refer,
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Register a student for approval (customer self-service).
#[utoipa::path(
    post,
    path = "/students/pending",
    request_body = PendingStudentCreate,
    responses(
        (status = 201, description = "Registration staged", body = PendingStudentResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "students"
)]
#[instrument(skip_all)]
pub async fn register_pending_student(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<PendingStudentCreate>,
) -> Result<(StatusCode, Json<PendingStudentResponse>)> {
    let family = family_for_customer(&state, &user).await?;

    let create = PendingStudentCreateDBRequest {
        family_id: family.id,
        first_name: request.first_name,
        middle_name: request.middle_name,
        last_name: request.last_name,
        nickname: request.nickname,
        gender: request.gender,
        date_of_birth: request.date_of_birth,
        school: request.school,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let pending = Students::new(&mut conn).create_pending(&create).await?;

    tracing::info!(refer = %pending.refer, family_id = family.id, "pending student registered");
    Ok((StatusCode::CREATED, Json(pending.into())))
}

/// List pending registrations. Customers see only their own family's.
#[utoipa::path(
    get,
    path = "/students/pending",
    responses(
        (status = 200, description = "Pending registrations", body = Vec<PendingStudentResponse>),
    ),
    security(("bearer_auth" = [])),
    tag = "students"
)]
#[instrument(skip_all)]
pub async fn list_pending_students(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<PendingStudentResponse>>> {
    let family_id = if user.role.is_staff() {
        None
    } else {
        Some(family_for_customer(&state, &user).await?.id)
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let pending = Students::new(&mut conn).list_pending(family_id).await?;
    Ok(Json(pending.into_iter().map(Into::into).collect()))
}

/// Promote a pending registration into a full student record.
#[utoipa::path(
    post,
    path = "/students/pending/{refer}/approve",
    params(("refer" = String, Path, description = "Pending refer (TMP-...)")),
    responses(
        (status = 201, description = "Student created from registration", body = StudentResponse),
        (status = 404, description = "No such pending registration"),
    ),
    security(("bearer_auth" = [])),
    tag = "students"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn approve_pending_student(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
) -> Result<(StatusCode, Json<StudentResponse>)> {
    require_manage(&user, "pending registrations")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let student = Students::new(&mut conn)
        .approve_pending(&refer, &user.username)
        .await?;

    tracing::info!(pending = %refer, refer = %student.refer, "pending student approved");
    Ok((StatusCode::CREATED, Json(student.into())))
}

/// Discard a pending registration.
#[utoipa::path(
    delete,
    path = "/students/pending/{refer}",
    params(("refer" = String, Path, description = "Pending refer (TMP-...)")),
    responses(
        (status = 204, description = "Registration discarded"),
        (status = 404, description = "No such pending registration"),
    ),
    security(("bearer_auth" = [])),
    tag = "students"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn reject_pending_student(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
) -> Result<StatusCode> {
    require_manage(&user, "pending registrations")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let rejected = Students::new(&mut conn).reject_pending(&refer).await?;
    if !rejected {
        return Err(Error::NotFound {
            resource: "pending student".to_string(),
            id: refer,
        });
    }
    Ok(StatusCode::NO_CONTENT)
}
