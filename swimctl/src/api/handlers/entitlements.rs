//! Entitlement ledger handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::instrument;

use crate::{
    AppState,
    api::handlers::{family_for_customer, require_manage},
    api::models::entitlements::{
        EntitlementCreate, EntitlementKind, EntitlementPayRequest, EntitlementResponse,
        EntitlementUpdate, ListEntitlementsQuery,
    },
    api::models::users::CurrentUser,
    db::{
        handlers::{Entitlements, Repository, Students, entitlements::EntitlementFilter},
        models::entitlements::{EntitlementCreateDBRequest, EntitlementUpdateDBRequest},
    },
    errors::{Error, Result},
};

fn validate_owners(kind: &EntitlementKind, owners: &[String]) -> Result<()> {
    if owners.is_empty() {
        return Err(Error::BadRequest {
            message: "An entitlement needs at least one owning student".to_string(),
        });
    }
    if *kind == EntitlementKind::Monthly && owners.len() > 1 {
        return Err(Error::BadRequest {
            message: "Monthly entitlements cannot be shared by more than one student".to_string(),
        });
    }
    Ok(())
}

/// Create an entitlement for one or more students.
#[utoipa::path(
    post,
    path = "/entitlements",
    request_body = EntitlementCreate,
    responses(
        (status = 201, description = "Entitlement created", body = EntitlementResponse),
        (status = 400, description = "Invalid owners for the kind"),
        (status = 403, description = "Not permitted"),
    ),
    security(("bearer_auth" = [])),
    tag = "entitlements"
)]
#[instrument(skip_all, fields(course = request.course_id, kind = ?request.kind))]
pub async fn create_entitlement(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<EntitlementCreate>,
) -> Result<(StatusCode, Json<EntitlementResponse>)> {
    require_manage(&user, "entitlements")?;
    validate_owners(&request.kind, &request.owners)?;
    if request.period_months < 1 {
        return Err(Error::BadRequest {
            message: "Validity period must be at least one month".to_string(),
        });
    }

    let create = EntitlementCreateDBRequest {
        course_id: request.course_id,
        kind: request.kind,
        remaining: request.remaining,
        period_months: request.period_months,
        start_date: request.start_date,
        expiry_date: request.expiry_date,
        paid: request.paid,
        paid_at: request.paid_at,
        slip_reference: request.slip_reference,
        trial: request.trial,
        owners: request.owners,
        created_by: Some(user.username.clone()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let entitlement = Entitlements::new(&mut conn).create(&create).await?;

    tracing::info!(refer = %entitlement.entitlement.refer, "entitlement created");
    Ok((StatusCode::CREATED, Json(entitlement.into())))
}

/// List entitlements. Customers see only those owned by their family's
/// students.
#[utoipa::path(
    get,
    path = "/entitlements",
    params(ListEntitlementsQuery),
    responses(
        (status = 200, description = "Entitlements", body = Vec<EntitlementResponse>),
    ),
    security(("bearer_auth" = [])),
    tag = "entitlements"
)]
#[instrument(skip_all)]
pub async fn list_entitlements(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListEntitlementsQuery>,
) -> Result<Json<Vec<EntitlementResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if user.role.is_staff() {
        let filter = EntitlementFilter {
            student_refer: query.student_refer,
            course_id: query.course_id,
            include_finished: query.include_finished,
            unpaid_only: query.unpaid_only,
        };
        let entitlements = Entitlements::new(&mut conn).list(&filter).await?;
        return Ok(Json(entitlements.into_iter().map(Into::into).collect()));
    }

    // Customers: union over their family's students, deduplicated on refer
    drop(conn);
    let family = family_for_customer(&state, &user).await?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let students = Students::new(&mut conn)
        .list(&crate::db::handlers::students::StudentFilter {
            family_id: Some(family.id),
            ..Default::default()
        })
        .await?;

    let mut seen = std::collections::HashSet::new();
    let mut results = Vec::new();
    for student in students {
        let filter = EntitlementFilter {
            student_refer: Some(student.refer),
            course_id: query.course_id,
            include_finished: query.include_finished,
            unpaid_only: false,
        };
        for entitlement in Entitlements::new(&mut conn).list(&filter).await? {
            if seen.insert(entitlement.entitlement.refer.clone()) {
                results.push(entitlement.into());
            }
        }
    }
    Ok(Json(results))
}

/// Fetch one entitlement with its owners.
#[utoipa::path(
    get,
    path = "/entitlements/{refer}",
    params(("refer" = String, Path, description = "Entitlement refer")),
    responses(
        (status = 200, description = "Entitlement", body = EntitlementResponse),
        (status = 404, description = "No such entitlement"),
    ),
    security(("bearer_auth" = [])),
    tag = "entitlements"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn get_entitlement(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
) -> Result<Json<EntitlementResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let entitlement = Entitlements::new(&mut conn)
        .get_by_id(refer.clone())
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "entitlement".to_string(),
            id: refer.clone(),
        })?;
    drop(conn);

    if !user.role.is_staff() {
        let family = family_for_customer(&state, &user).await?;
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut owned = false;
        for owner in &entitlement.owners {
            if let Some(student) = Students::new(&mut conn).get_by_id(owner.clone()).await? {
                if student.family_id == Some(family.id) {
                    owned = true;
                    break;
                }
            }
        }
        if !owned {
            return Err(Error::Forbidden {
                action: "view".to_string(),
                resource: "entitlements outside your family".to_string(),
            });
        }
    }
    Ok(Json(entitlement.into()))
}

/// Update entitlement fields or owners.
#[utoipa::path(
    patch,
    path = "/entitlements/{refer}",
    params(("refer" = String, Path, description = "Entitlement refer")),
    request_body = EntitlementUpdate,
    responses(
        (status = 200, description = "Updated entitlement", body = EntitlementResponse),
        (status = 404, description = "No such entitlement"),
    ),
    security(("bearer_auth" = [])),
    tag = "entitlements"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn update_entitlement(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
    Json(request): Json<EntitlementUpdate>,
) -> Result<Json<EntitlementResponse>> {
    require_manage(&user, "entitlements")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if let Some(owners) = &request.owners {
        let existing = Entitlements::new(&mut conn)
            .get_row(&refer)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "entitlement".to_string(),
                id: refer.clone(),
            })?;
        validate_owners(&existing.kind, owners)?;
    }

    let update = EntitlementUpdateDBRequest {
        remaining: request.remaining,
        period_months: request.period_months,
        start_date: request.start_date,
        expiry_date: request.expiry_date,
        paid: request.paid,
        paid_at: request.paid_at,
        slip_reference: request.slip_reference,
        owners: request.owners,
    };

    let entitlement = Entitlements::new(&mut conn).update(refer, &update).await?;
    Ok(Json(entitlement.into()))
}

/// Record payment against an entitlement.
#[utoipa::path(
    post,
    path = "/entitlements/{refer}/pay",
    params(("refer" = String, Path, description = "Entitlement refer")),
    request_body = EntitlementPayRequest,
    responses(
        (status = 200, description = "Payment recorded", body = EntitlementResponse),
        (status = 404, description = "No such entitlement"),
    ),
    security(("bearer_auth" = [])),
    tag = "entitlements"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn pay_entitlement(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
    Json(request): Json<EntitlementPayRequest>,
) -> Result<Json<EntitlementResponse>> {
    require_manage(&user, "entitlements")?;

    let paid_at = request.paid_at.unwrap_or_else(|| Utc::now().date_naive());

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut ledger = Entitlements::new(&mut conn);
    ledger
        .mark_paid(&refer, paid_at, request.slip_reference.as_deref())
        .await?;
    let entitlement = ledger.get_by_id(refer.clone()).await?.ok_or_else(|| Error::NotFound {
        resource: "entitlement".to_string(),
        id: refer,
    })?;
    Ok(Json(entitlement.into()))
}

/// Mark a monthly entitlement as finished, detaching student references.
#[utoipa::path(
    post,
    path = "/entitlements/{refer}/finish",
    params(("refer" = String, Path, description = "Entitlement refer")),
    responses(
        (status = 200, description = "Entitlement finished", body = EntitlementResponse),
        (status = 404, description = "No such monthly entitlement"),
    ),
    security(("bearer_auth" = [])),
    tag = "entitlements"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn finish_entitlement(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
) -> Result<Json<EntitlementResponse>> {
    require_manage(&user, "entitlements")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut ledger = Entitlements::new(&mut conn);
    ledger.finish(&refer).await?;
    let entitlement = ledger.get_by_id(refer.clone()).await?.ok_or_else(|| Error::NotFound {
        resource: "entitlement".to_string(),
        id: refer,
    })?;

    tracing::info!(refer = %entitlement.entitlement.refer, "entitlement finished");
    Ok(Json(entitlement.into()))
}

/// Archive and delete an entitlement. The record moves to history; student
/// references and owner rows go with it.
#[utoipa::path(
    delete,
    path = "/entitlements/{refer}",
    params(("refer" = String, Path, description = "Entitlement refer")),
    responses(
        (status = 204, description = "Entitlement archived and deleted"),
        (status = 404, description = "No such entitlement"),
    ),
    security(("bearer_auth" = [])),
    tag = "entitlements"
)]
#[instrument(skip_all, fields(refer = %refer))]
pub async fn delete_entitlement(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
) -> Result<StatusCode> {
    require_manage(&user, "entitlements")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = Entitlements::new(&mut conn)
        .archive_and_delete(&refer, &user.username)
        .await?;
    if !deleted {
        return Err(Error::NotFound {
            resource: "entitlement".to_string(),
            id: refer,
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::models::courses::{CourseCreate, CourseResponse};
    use crate::api::models::entitlements::{EntitlementCreate, EntitlementKind, EntitlementResponse};
    use crate::test_utils::*;
    use sqlx::PgPool;

    async fn create_course(server: &axum_test::TestServer, token: &str) -> CourseResponse {
        server
            .post("/api/v1/courses")
            .authorization_bearer(token)
            .json(&CourseCreate {
                name: "Learn to Swim".to_string(),
                short_name: "LTS".to_string(),
                refer_code: "LTS".to_string(),
                enabled: true,
            })
            .await
            .json()
    }

    fn entitlement(course_id: crate::types::CourseId, kind: EntitlementKind, owners: Vec<&str>) -> EntitlementCreate {
        EntitlementCreate {
            course_id,
            kind,
            remaining: 8,
            period_months: 3,
            start_date: None,
            expiry_date: None,
            paid: false,
            paid_at: None,
            slip_reference: None,
            trial: false,
            owners: owners.into_iter().map(String::from).collect(),
        }
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn monthly_entitlements_cannot_be_shared(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;
        let course = create_course(&server, &token).await;

        let response = server
            .post("/api/v1/entitlements")
            .authorization_bearer(&token)
            .json(&entitlement(course.id, EntitlementKind::Monthly, vec!["S-20240101-0001", "S-20240101-0002"]))
            .await;
        response.assert_status_bad_request();
        assert!(
            response
                .text()
                .contains("Monthly entitlements cannot be shared by more than one student")
        );

        let empty = server
            .post("/api/v1/entitlements")
            .authorization_bearer(&token)
            .json(&entitlement(course.id, EntitlementKind::Counted, vec![]))
            .await;
        empty.assert_status_bad_request();
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn refer_codes_take_the_course_prefix(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;
        let course = create_course(&server, &token).await;

        // Owner must exist before it can be attached
        let student: crate::api::models::students::StudentResponse = server
            .post("/api/v1/students")
            .authorization_bearer(&token)
            .json(&crate::api::models::students::StudentCreate {
                family_id: None,
                first_name: Some("Mina".to_string()),
                middle_name: None,
                last_name: None,
                nickname: None,
                gender: None,
                date_of_birth: None,
                school: None,
                level: None,
                short_note: None,
            })
            .await
            .json();

        let created: EntitlementResponse = server
            .post("/api/v1/entitlements")
            .authorization_bearer(&token)
            .json(&entitlement(course.id, EntitlementKind::Counted, vec![&student.refer]))
            .await
            .json();
        assert!(created.refer.starts_with("LTS-"));
        assert_eq!(created.owners, vec![student.refer]);
    }
}
