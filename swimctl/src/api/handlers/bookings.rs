//! Booking handlers: admission, reschedule, cancellation, class lists.
//!
//! Rejections from the admission machine come back as a structured
//! [`BookingOutcome`] with HTTP 200; only failures of the request itself
//! (auth, missing resources, database races) surface as errors.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use tracing::instrument;

use crate::{
    AppState,
    api::handlers::{family_for_customer, require_staff},
    api::models::bookings::{
        BookingListQuery, BookingOutcome, BookingRequest, BookingRowResponse, CancelResponse,
        CheckInRequest, ReservationResponse,
    },
    api::models::users::CurrentUser,
    db::{
        handlers::{
            Courses, Repository, Reservations, Students,
            reservations::{AdmissionOutcome, AdmissionRequest, CancelOutcome},
        },
        models::reservations::ReservationDBResponse,
    },
    errors::{Error, Result},
    notifications::BookingNotification,
    types::ReservationId,
};

/// Staff may touch any student; customers only students of their own family.
async fn authorize_student(state: &AppState, user: &CurrentUser, student_refer: &str) -> Result<()> {
    if user.role.is_staff() {
        return Ok(());
    }
    let family = family_for_customer(state, user).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let student = Students::new(&mut conn)
        .get_by_id(student_refer.to_string())
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "student".to_string(),
            id: student_refer.to_string(),
        })?;

    if student.family_id != Some(family.id) {
        return Err(Error::Forbidden {
            action: "book for".to_string(),
            resource: "students outside your family".to_string(),
        });
    }
    Ok(())
}

/// Render and queue the webhook summary for an admitted booking. Lookup
/// failures only cost the notification, never the booking.
async fn notify_booking(
    state: &AppState,
    reservation: &ReservationDBResponse,
    actor: &str,
    rescheduled: bool,
) {
    let context = async {
        let mut conn = state.db.acquire().await?;
        let course = Courses::new(&mut conn).get_by_id(reservation.course_id).await?;
        let student = Students::new(&mut conn)
            .get_by_id(reservation.student_refer.clone())
            .await?;
        Ok::<_, crate::db::errors::DbError>((course, student))
    }
    .await;

    match context {
        Ok((Some(course), Some(student))) => {
            state.notifications.send(BookingNotification {
                course_short_name: course.short_name,
                student_name: student.full_name(),
                nickname: student.nickname.clone(),
                class_date: reservation.class_date,
                time_label: reservation.time_label.clone(),
                actor: actor.to_string(),
                rescheduled,
            });
        }
        Ok(_) => {
            tracing::warn!(reservation = reservation.id, "notification context missing, skipping");
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to load notification context");
        }
    }
}

/// Book a student into a class slot on a date.
#[utoipa::path(
    post,
    path = "/bookings",
    request_body = BookingRequest,
    responses(
        (status = 200, description = "Admission outcome (admitted or rejected)", body = BookingOutcome),
        (status = 403, description = "Not permitted to book for this student"),
        (status = 409, description = "Lost a race with a concurrent booking, retry"),
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
#[instrument(skip_all, fields(student = %request.student_refer, slot = request.slot_id, date = %request.class_date))]
pub async fn create_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<BookingRequest>,
) -> Result<Json<BookingOutcome>> {
    authorize_student(&state, &user, &request.student_refer).await?;
    if request.free && !user.role.can_manage() {
        return Err(Error::Forbidden {
            action: "create".to_string(),
            resource: "free bookings".to_string(),
        });
    }

    let admission = AdmissionRequest {
        student_refer: request.student_refer,
        slot_id: request.slot_id,
        class_date: request.class_date,
        time_label: request.time_label,
        course_id: request.course_id,
        weekday: request.weekday,
        free: request.free,
        admin_override: user.role.can_manage(),
        created_by: user.username.clone(),
        today: Utc::now().date_naive(),
        existing_reservation: None,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let outcome = Reservations::new(&mut conn).admit(&admission).await?;

    match outcome {
        AdmissionOutcome::Admitted { reservation, over_capacity } => {
            if !reservation.free {
                notify_booking(&state, &reservation, &user.username, false).await;
            }
            Ok(Json(BookingOutcome::admitted(reservation.into(), over_capacity)))
        }
        AdmissionOutcome::Rejected(reason) => Ok(Json(BookingOutcome::rejected(&reason))),
    }
}

/// Move an existing booking to a different slot or date.
///
/// Runs the same admission machine with the current reservation excluded
/// from the duplicate and capacity checks; no credit is consumed.
#[utoipa::path(
    patch,
    path = "/bookings/{id}",
    params(("id" = i64, Path, description = "Reservation id")),
    request_body = BookingRequest,
    responses(
        (status = 200, description = "Admission outcome for the new slot", body = BookingOutcome),
        (status = 400, description = "Reschedule changes the student or the course"),
        (status = 404, description = "No such reservation"),
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
#[instrument(skip_all, fields(reservation = id, slot = request.slot_id, date = %request.class_date))]
pub async fn reschedule_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ReservationId>,
    Json(request): Json<BookingRequest>,
) -> Result<Json<BookingOutcome>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let existing = Reservations::new(&mut conn)
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "reservation".to_string(),
            id: id.to_string(),
        })?;
    drop(conn);

    authorize_student(&state, &user, &existing.student_refer).await?;
    if request.student_refer != existing.student_refer {
        return Err(Error::BadRequest {
            message: "A reschedule cannot change the student".to_string(),
        });
    }
    // The consumed credit belongs to this course's entitlement; moving the
    // booking to another course would detach it from what was paid for
    if request.course_id != existing.course_id {
        return Err(Error::BadRequest {
            message: "A reschedule cannot change the course".to_string(),
        });
    }

    let admission = AdmissionRequest {
        student_refer: existing.student_refer.clone(),
        slot_id: request.slot_id,
        class_date: request.class_date,
        time_label: request.time_label,
        course_id: request.course_id,
        weekday: request.weekday,
        free: existing.free,
        admin_override: user.role.can_manage(),
        created_by: user.username.clone(),
        today: Utc::now().date_naive(),
        existing_reservation: Some(id),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let outcome = Reservations::new(&mut conn).admit(&admission).await?;

    match outcome {
        AdmissionOutcome::Admitted { reservation, over_capacity } => {
            if !reservation.free {
                notify_booking(&state, &reservation, &user.username, true).await;
            }
            Ok(Json(BookingOutcome::admitted(reservation.into(), over_capacity)))
        }
        AdmissionOutcome::Rejected(reason) => Ok(Json(BookingOutcome::rejected(&reason))),
    }
}

/// Cancel a booking, restoring its credit where one was consumed.
#[utoipa::path(
    delete,
    path = "/bookings/{id}",
    params(("id" = i64, Path, description = "Reservation id")),
    responses(
        (status = 200, description = "Cancellation outcome", body = CancelResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
#[instrument(skip_all, fields(reservation = id))]
pub async fn cancel_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<CancelResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let existing = Reservations::new(&mut conn).get(id).await?;

    // Cancelling a booking that is already gone is a result, not an error
    let Some(existing) = existing else {
        return Ok(Json(CancelResponse {
            cancelled: false,
            credit_restored: false,
            reason: Some("No booking found".to_string()),
        }));
    };
    drop(conn);

    authorize_student(&state, &user, &existing.student_refer).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let outcome = Reservations::new(&mut conn).cancel(id, &user.username).await?;

    match outcome {
        CancelOutcome::Cancelled { credit_restored } => Ok(Json(CancelResponse {
            cancelled: true,
            credit_restored,
            reason: None,
        })),
        CancelOutcome::NotFound => Ok(Json(CancelResponse {
            cancelled: false,
            credit_restored: false,
            reason: Some("No booking found".to_string()),
        })),
    }
}

/// Fetch one reservation.
#[utoipa::path(
    get,
    path = "/bookings/{id}",
    params(("id" = i64, Path, description = "Reservation id")),
    responses(
        (status = 200, description = "Reservation", body = ReservationResponse),
        (status = 404, description = "No such reservation"),
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
#[instrument(skip_all, fields(reservation = id))]
pub async fn get_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let reservation = Reservations::new(&mut conn)
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "reservation".to_string(),
            id: id.to_string(),
        })?;
    drop(conn);

    authorize_student(&state, &user, &reservation.student_refer).await?;
    Ok(Json(reservation.into()))
}

/// The class list for one date, with payment warnings (staff only).
#[utoipa::path(
    get,
    path = "/bookings",
    params(BookingListQuery),
    responses(
        (status = 200, description = "Bookings for the date", body = Vec<BookingRowResponse>),
        (status = 403, description = "Not permitted"),
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
#[instrument(skip_all, fields(date = %query.date))]
pub async fn list_bookings(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Vec<BookingRowResponse>>> {
    require_staff(&user, "bookings")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let rows = Reservations::new(&mut conn).bookings_for_date(query.date).await?;

    let today = Utc::now().date_naive();
    Ok(Json(
        rows.into_iter()
            .map(|row| BookingRowResponse::from_db(row, today))
            .collect(),
    ))
}

/// A student's upcoming bookings, soonest first.
#[utoipa::path(
    get,
    path = "/students/{refer}/bookings",
    params(("refer" = String, Path, description = "Student refer")),
    responses(
        (status = 200, description = "Upcoming reservations", body = Vec<ReservationResponse>),
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
#[instrument(skip_all, fields(student = %refer))]
pub async fn list_student_bookings(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(refer): Path<String>,
) -> Result<Json<Vec<ReservationResponse>>> {
    authorize_student(&state, &user, &refer).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let rows = Reservations::new(&mut conn)
        .upcoming_for_student(&refer, Utc::now().date_naive())
        .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Flip the attendance flag on a booking (staff only).
#[utoipa::path(
    post,
    path = "/bookings/{id}/check-in",
    params(("id" = i64, Path, description = "Reservation id")),
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Updated reservation", body = ReservationResponse),
        (status = 404, description = "No such reservation"),
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
#[instrument(skip_all, fields(reservation = id, checked_in = request.checked_in))]
pub async fn check_in(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ReservationId>,
    Json(request): Json<CheckInRequest>,
) -> Result<Json<ReservationResponse>> {
    require_staff(&user, "check-ins")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let reservation = Reservations::new(&mut conn)
        .set_checked_in(id, request.checked_in, &user.username)
        .await?;
    Ok(Json(reservation.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::bookings::{
        BookingOutcome, BookingRequest, CancelResponse, RejectCode, ReservationResponse,
    };
    use crate::api::models::courses::{CourseCreate, CourseResponse};
    use crate::api::models::entitlements::{EntitlementCreate, EntitlementKind, EntitlementResponse};
    use crate::api::models::slots::{SlotCreate, SlotResponse};
    use crate::api::models::students::{
        PendingStudentCreate, PendingStudentResponse, StudentCreate, StudentResponse,
    };
    use crate::test_utils::*;
    use crate::types::{CourseId, SlotId};
    use axum_test::TestServer;
    use chrono::NaiveDate;
    use sqlx::PgPool;

    // A Monday well in the future, so bookings are always "upcoming"
    fn class_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    async fn create_catalog(server: &TestServer, token: &str) -> (CourseId, SlotId) {
        let course: CourseResponse = server
            .post("/api/v1/courses")
            .authorization_bearer(token)
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
            .authorization_bearer(token)
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
        (course.id, slot.id)
    }

    async fn create_student(server: &TestServer, token: &str, first_name: &str) -> String {
        let student: StudentResponse = server
            .post("/api/v1/students")
            .authorization_bearer(token)
            .json(&StudentCreate {
                family_id: None,
                first_name: Some(first_name.to_string()),
                middle_name: None,
                last_name: Some("Chai".to_string()),
                nickname: None,
                gender: None,
                date_of_birth: None,
                school: None,
                level: None,
                short_note: None,
            })
            .await
            .json();
        student.refer
    }

    async fn create_entitlement(
        server: &TestServer,
        token: &str,
        course_id: CourseId,
        owner: &str,
        remaining: i32,
    ) -> String {
        let entitlement: EntitlementResponse = server
            .post("/api/v1/entitlements")
            .authorization_bearer(token)
            .json(&EntitlementCreate {
                course_id,
                kind: EntitlementKind::Counted,
                remaining,
                period_months: 12,
                start_date: NaiveDate::from_ymd_opt(2029, 12, 1),
                expiry_date: NaiveDate::from_ymd_opt(2031, 1, 1),
                paid: true,
                paid_at: None,
                slip_reference: None,
                trial: false,
                owners: vec![owner.to_string()],
            })
            .await
            .json();
        entitlement.refer
    }

    fn booking(student_refer: &str, slot_id: SlotId, course_id: CourseId) -> BookingRequest {
        BookingRequest {
            student_refer: student_refer.to_string(),
            slot_id,
            class_date: class_date(),
            time_label: "10:00".to_string(),
            course_id,
            weekday: "monday".to_string(),
            free: false,
        }
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn book_duplicate_and_cancel_through_the_api(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        let (course_id, slot_id) = create_catalog(&server, &token).await;
        let student = create_student(&server, &token, "Mina").await;
        create_entitlement(&server, &token, course_id, &student, 4).await;

        let response = server
            .post("/api/v1/bookings")
            .authorization_bearer(&token)
            .json(&booking(&student, slot_id, course_id))
            .await;
        response.assert_status_ok();
        let outcome: BookingOutcome = response.json();
        assert!(outcome.admitted);
        let reservation = outcome.reservation.unwrap();
        assert_eq!(reservation.student_refer, student);

        // Same student, same date: structured rejection, still HTTP 200
        let duplicate: BookingOutcome = server
            .post("/api/v1/bookings")
            .authorization_bearer(&token)
            .json(&booking(&student, slot_id, course_id))
            .await
            .json();
        assert!(!duplicate.admitted);
        assert_eq!(duplicate.reason_code, Some(RejectCode::DuplicateBooking));

        let cancelled: CancelResponse = server
            .delete(&format!("/api/v1/bookings/{}", reservation.id))
            .authorization_bearer(&token)
            .await
            .json();
        assert!(cancelled.cancelled);
        assert!(cancelled.credit_restored);

        // Gone already: a result, not an error
        let again: CancelResponse = server
            .delete(&format!("/api/v1/bookings/{}", reservation.id))
            .authorization_bearer(&token)
            .await
            .json();
        assert!(!again.cancelled);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn customer_books_own_family_student_end_to_end(pool: PgPool) {
        let server = create_test_app(pool).await;
        let admin_token = login_as_admin(&server).await;
        let (course_id, slot_id) = create_catalog(&server, &admin_token).await;

        // Customer self-registers and stages a student for approval
        let registered = server
            .post("/authentication/register")
            .json(&serde_json::json!({
                "username": "parent1",
                "password": "parent1-password",
            }))
            .await;
        registered.assert_status(axum::http::StatusCode::CREATED);
        let customer_token = login(&server, "parent1", "parent1-password").await;

        let pending: PendingStudentResponse = server
            .post("/api/v1/students/pending")
            .authorization_bearer(&customer_token)
            .json(&PendingStudentCreate {
                first_name: Some("Mina".to_string()),
                middle_name: None,
                last_name: Some("Chai".to_string()),
                nickname: Some("Mimi".to_string()),
                gender: None,
                date_of_birth: None,
                school: None,
            })
            .await
            .json();
        assert!(pending.refer.starts_with("TMP-"));

        let student: StudentResponse = server
            .post(&format!("/api/v1/students/pending/{}/approve", pending.refer))
            .authorization_bearer(&admin_token)
            .await
            .json();
        assert!(student.refer.starts_with("S-"));

        create_entitlement(&server, &admin_token, course_id, &student.refer, 4).await;

        let outcome: BookingOutcome = server
            .post("/api/v1/bookings")
            .authorization_bearer(&customer_token)
            .json(&booking(&student.refer, slot_id, course_id))
            .await
            .json();
        assert!(outcome.admitted);

        // The booking shows up under the student
        let upcoming: Vec<ReservationResponse> = server
            .get(&format!("/api/v1/students/{}/bookings", student.refer))
            .authorization_bearer(&customer_token)
            .await
            .json();
        assert_eq!(upcoming.len(), 1);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn reschedule_cannot_move_across_courses(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        let (course_id, slot_id) = create_catalog(&server, &token).await;
        let student = create_student(&server, &token, "Mina").await;
        create_entitlement(&server, &token, course_id, &student, 4).await;

        let outcome: BookingOutcome = server
            .post("/api/v1/bookings")
            .authorization_bearer(&token)
            .json(&booking(&student, slot_id, course_id))
            .await
            .json();
        let reservation = outcome.reservation.unwrap();

        // A second course with its own Monday slot
        let other_course: CourseResponse = server
            .post("/api/v1/courses")
            .authorization_bearer(&token)
            .json(&CourseCreate {
                name: "Stroke Clinic".to_string(),
                short_name: "SC".to_string(),
                refer_code: "SC".to_string(),
                enabled: true,
            })
            .await
            .json();
        let other_slot: SlotResponse = server
            .post("/api/v1/slots")
            .authorization_bearer(&token)
            .json(&SlotCreate {
                course_id: other_course.id,
                weekday: "monday".to_string(),
                time_label: "11:00".to_string(),
                max_persons: 5,
                enabled: true,
                admin_only: false,
            })
            .await
            .json();

        let mut moved = booking(&student, other_slot.id, other_course.id);
        moved.time_label = "11:00".to_string();
        let response = server
            .patch(&format!("/api/v1/bookings/{}", reservation.id))
            .authorization_bearer(&token)
            .json(&moved)
            .await;
        response.assert_status_bad_request();
        assert!(response.text().contains("cannot change the course"));

        // The reservation is untouched
        let unchanged: ReservationResponse = server
            .get(&format!("/api/v1/bookings/{}", reservation.id))
            .authorization_bearer(&token)
            .await
            .json();
        assert_eq!(unchanged.course_id, course_id);
        assert_eq!(unchanged.slot_id, slot_id);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn customers_cannot_book_outside_their_family_or_for_free(pool: PgPool) {
        let server = create_test_app(pool).await;
        let admin_token = login_as_admin(&server).await;
        let (course_id, slot_id) = create_catalog(&server, &admin_token).await;

        // A student with no family attached
        let orphan = create_student(&server, &admin_token, "Somchai").await;

        server
            .post("/authentication/register")
            .json(&serde_json::json!({
                "username": "parent2",
                "password": "parent2-password",
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
        let customer_token = login(&server, "parent2", "parent2-password").await;

        let response = server
            .post("/api/v1/bookings")
            .authorization_bearer(&customer_token)
            .json(&booking(&orphan, slot_id, course_id))
            .await;
        response.assert_status_forbidden();

        // Free bookings are an admin affordance
        let mut free_request = booking(&orphan, slot_id, course_id);
        free_request.free = true;
        let free_response = server
            .post("/api/v1/bookings")
            .authorization_bearer(&customer_token)
            .json(&free_request)
            .await;
        free_response.assert_status_forbidden();
    }
}
