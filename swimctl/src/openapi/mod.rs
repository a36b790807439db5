//! OpenAPI documentation for the booking API.
//!
//! The full document aggregates every handler's `#[utoipa::path]` annotation
//! and is served interactively at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Bearer-token security scheme shared by all authenticated endpoints.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "bearer_auth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token from `POST /authentication/login`:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "swimctl",
        description = "Swim school booking service: students, entitlements, class slots, and the booking admission API."
    ),
    servers(
        (url = "/api/v1", description = "Booking API server")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::register,
        api::handlers::auth::change_password,
        api::handlers::users::create_user,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::students::create_student,
        api::handlers::students::list_students,
        api::handlers::students::get_student,
        api::handlers::students::update_student,
        api::handlers::students::delete_student,
        api::handlers::students::register_pending_student,
        api::handlers::students::list_pending_students,
        api::handlers::students::approve_pending_student,
        api::handlers::students::reject_pending_student,
        api::handlers::courses::create_course,
        api::handlers::courses::list_courses,
        api::handlers::courses::get_course,
        api::handlers::courses::update_course,
        api::handlers::courses::delete_course,
        api::handlers::slots::create_slot,
        api::handlers::slots::list_slots,
        api::handlers::slots::get_slot,
        api::handlers::slots::update_slot,
        api::handlers::slots::delete_slot,
        api::handlers::slots::availability,
        api::handlers::slots::add_closure,
        api::handlers::slots::remove_closure,
        api::handlers::entitlements::create_entitlement,
        api::handlers::entitlements::list_entitlements,
        api::handlers::entitlements::get_entitlement,
        api::handlers::entitlements::update_entitlement,
        api::handlers::entitlements::pay_entitlement,
        api::handlers::entitlements::finish_entitlement,
        api::handlers::entitlements::delete_entitlement,
        api::handlers::bookings::create_booking,
        api::handlers::bookings::reschedule_booking,
        api::handlers::bookings::cancel_booking,
        api::handlers::bookings::get_booking,
        api::handlers::bookings::list_bookings,
        api::handlers::bookings::list_student_bookings,
        api::handlers::bookings::check_in,
        api::handlers::holidays::create_holiday,
        api::handlers::holidays::list_holidays,
        api::handlers::holidays::delete_holiday,
        api::handlers::dashboard::dashboard,
    ),
    components(
        schemas(
            api::models::users::Role,
            api::models::users::UserCreate,
            api::models::users::UserUpdate,
            api::models::users::UserResponse,
            api::models::users::CurrentUser,
            api::models::users::LoginRequest,
            api::models::users::LoginResponse,
            api::models::users::ChangePasswordRequest,
            api::models::users::RegisterRequest,
            api::models::students::StudentCreate,
            api::models::students::StudentUpdate,
            api::models::students::StudentResponse,
            api::models::students::PendingStudentCreate,
            api::models::students::PendingStudentResponse,
            api::models::courses::CourseCreate,
            api::models::courses::CourseUpdate,
            api::models::courses::CourseResponse,
            api::models::slots::SlotCreate,
            api::models::slots::SlotUpdate,
            api::models::slots::SlotResponse,
            api::models::slots::SlotAvailabilityResponse,
            api::models::slots::ClosureCreate,
            api::models::slots::ClosureResponse,
            api::models::entitlements::EntitlementKind,
            api::models::entitlements::EntitlementCreate,
            api::models::entitlements::EntitlementUpdate,
            api::models::entitlements::EntitlementPayRequest,
            api::models::entitlements::EntitlementResponse,
            api::models::bookings::BookingRequest,
            api::models::bookings::BookingOutcome,
            api::models::bookings::RejectCode,
            api::models::bookings::ReservationResponse,
            api::models::bookings::BookingRowResponse,
            api::models::bookings::CheckInRequest,
            api::models::bookings::CancelResponse,
            api::models::holidays::HolidayCreate,
            api::models::holidays::HolidayResponse,
            api::models::dashboard::DashboardResponse,
        )
    ),
    tags(
        (name = "authentication", description = "Sessions and account access"),
        (name = "users", description = "Account management"),
        (name = "students", description = "Student records and pending registrations"),
        (name = "courses", description = "Course catalog"),
        (name = "slots", description = "Class slots, closures, and availability"),
        (name = "entitlements", description = "The course credit ledger"),
        (name = "bookings", description = "Booking admission, reschedule, and cancellation"),
        (name = "holidays", description = "Display-only holiday markers"),
        (name = "dashboard", description = "Admin dashboard counters"),
    )
)]
pub struct ApiDoc;
