//! # swimctl: Swim School Booking Service
//!
//! `swimctl` is the backend for a class-based swim school: it manages the
//! course catalog, recurring class slots, student records, course
//! entitlements (the credit ledger), and the booking flow that ties them all
//! together. It exposes a RESTful API for both the admin desk and customer
//! self-service.
//!
//! ## Overview
//!
//! The heart of the system is the **booking admission machine**
//! ([`db::handlers::Reservations`]): every booking request walks a fixed
//! sequence of checks — duplicate-per-day, slot capacity, entitlement
//! validity, credit balance — inside one SERIALIZABLE transaction, and either
//! commits a reservation or comes back with a structured rejection. Admins
//! can book past capacity (with a warning); customers cannot. Rejections are
//! results, not errors: the API returns HTTP 200 with the reason attached.
//!
//! Around that core sit the supporting surfaces:
//!
//! - **Entitlements** are pre-purchased course access: `monthly` (unlimited
//!   attendance inside a validity window) or `counted` (a fixed number of
//!   credits, one consumed per booking, restored on cancellation). The
//!   validity window anchors lazily on first booking.
//! - **Class slots** are recurring weekly sessions with a capacity; one-off
//!   closures zero a slot's availability for a date.
//! - **Students** carry human-readable sequential refer codes
//!   (`S-YYYYMMDD-0001`), generated race-free through an upsert counter.
//!   Customers register students into a pending queue that staff approve.
//! - **Accounts** are role-based (manager, admin, coach, customer); customer
//!   accounts own a family, and may only see and book for its students.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use swimctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = swimctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     swimctl::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module: YAML file plus `SWIMCTL_`-prefixed environment
//! variables, with `DATABASE_URL` honored directly.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod notifications;
mod openapi;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::models::users::Role,
    auth::password,
    config::CorsOrigin,
    db::handlers::{Repository, Users},
    db::models::users::UserCreateDBRequest,
    notifications::NotificationSender,
    openapi::ApiDoc,
};
use axum::http::HeaderValue;
use axum::{
    Router, http,
    routing::{delete, get, patch, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{CourseId, FamilyId, HolidayId, ReservationId, SlotId, UserId};

/// Embedded database migrations, also referenced by `#[sqlx::test]` fixtures.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub notifications: NotificationSender,
}

/// Create or refresh the initial admin account.
///
/// Idempotent: creates the account on first start, updates the password on
/// later starts when one is configured. Called during application startup so
/// a fresh deployment is never locked out.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(username: &str, password: Option<&str>, db: &PgPool) -> anyhow::Result<UserId> {
    let password_hash = match password {
        Some(pwd) => password::hash_string(pwd).map_err(|e| anyhow::anyhow!("Failed to hash admin password: {e}"))?,
        None => {
            anyhow::bail!("admin_password is required to provision the initial admin account");
        }
    };

    let mut tx = db.begin().await?;
    let mut users = Users::new(&mut tx);

    if let Some(existing) = users
        .get_by_username(username)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to check existing admin: {e}"))?
    {
        users
            .update_password(existing.id, &password_hash)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to update admin password: {e}"))?;
        tx.commit().await?;
        return Ok(existing.id);
    }

    let created = users
        .create(&UserCreateDBRequest {
            username: username.to_string(),
            password_hash,
            first_name: None,
            last_name: None,
            email: None,
            mobile_no: None,
            role: Role::Manager,
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create admin user: {e}"))?;

    tx.commit().await?;
    info!(username, "initial admin account created");
    Ok(created.id)
}

/// Connect to PostgreSQL using the configured pool settings and run
/// migrations.
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(settings.acquire_timeout_secs))
        .connect(&config.database.url)
        .await?;

    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.cors.allow_credentials)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// Authentication routes live at the root; everything else is nested under
/// `/api/v1`. Interactive API documentation is served at `/docs`.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    // Authentication routes (at root level)
    let auth_routes = Router::new()
        .route("/authentication/login", post(api::handlers::auth::login))
        .route("/authentication/logout", post(api::handlers::auth::logout))
        .route("/authentication/register", post(api::handlers::auth::register))
        .route("/authentication/password-change", post(api::handlers::auth::change_password))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/dashboard", get(api::handlers::dashboard::dashboard))
        // User management
        .route("/users", get(api::handlers::users::list_users))
        .route("/users", post(api::handlers::users::create_user))
        .route("/users/{id}", get(api::handlers::users::get_user))
        .route("/users/{id}", patch(api::handlers::users::update_user))
        .route("/users/{id}", delete(api::handlers::users::delete_user))
        // Students and the pending-registration queue. Literal segments
        // before parameterized ones so /students/pending wins.
        .route("/students", get(api::handlers::students::list_students))
        .route("/students", post(api::handlers::students::create_student))
        .route("/students/pending", get(api::handlers::students::list_pending_students))
        .route("/students/pending", post(api::handlers::students::register_pending_student))
        .route(
            "/students/pending/{refer}/approve",
            post(api::handlers::students::approve_pending_student),
        )
        .route(
            "/students/pending/{refer}",
            delete(api::handlers::students::reject_pending_student),
        )
        .route("/students/{refer}", get(api::handlers::students::get_student))
        .route("/students/{refer}", patch(api::handlers::students::update_student))
        .route("/students/{refer}", delete(api::handlers::students::delete_student))
        .route("/students/{refer}/bookings", get(api::handlers::bookings::list_student_bookings))
        // Course catalog
        .route("/courses", get(api::handlers::courses::list_courses))
        .route("/courses", post(api::handlers::courses::create_course))
        .route("/courses/{id}", get(api::handlers::courses::get_course))
        .route("/courses/{id}", patch(api::handlers::courses::update_course))
        .route("/courses/{id}", delete(api::handlers::courses::delete_course))
        // Class slots, availability, closures
        .route("/slots", get(api::handlers::slots::list_slots))
        .route("/slots", post(api::handlers::slots::create_slot))
        .route("/slots/availability", get(api::handlers::slots::availability))
        .route("/slots/{id}", get(api::handlers::slots::get_slot))
        .route("/slots/{id}", patch(api::handlers::slots::update_slot))
        .route("/slots/{id}", delete(api::handlers::slots::delete_slot))
        .route("/slots/{id}/closures", post(api::handlers::slots::add_closure))
        .route("/slots/{id}/closures/{date}", delete(api::handlers::slots::remove_closure))
        // Entitlement ledger
        .route("/entitlements", get(api::handlers::entitlements::list_entitlements))
        .route("/entitlements", post(api::handlers::entitlements::create_entitlement))
        .route("/entitlements/{refer}", get(api::handlers::entitlements::get_entitlement))
        .route("/entitlements/{refer}", patch(api::handlers::entitlements::update_entitlement))
        .route("/entitlements/{refer}", delete(api::handlers::entitlements::delete_entitlement))
        .route("/entitlements/{refer}/pay", post(api::handlers::entitlements::pay_entitlement))
        .route("/entitlements/{refer}/finish", post(api::handlers::entitlements::finish_entitlement))
        // Bookings
        .route("/bookings", get(api::handlers::bookings::list_bookings))
        .route("/bookings", post(api::handlers::bookings::create_booking))
        .route("/bookings/{id}", get(api::handlers::bookings::get_booking))
        .route("/bookings/{id}", patch(api::handlers::bookings::reschedule_booking))
        .route("/bookings/{id}", delete(api::handlers::bookings::cancel_booking))
        .route("/bookings/{id}/check-in", post(api::handlers::bookings::check_in))
        // Holidays
        .route("/holidays", get(api::handlers::holidays::list_holidays))
        .route("/holidays", post(api::handlers::holidays::create_holiday))
        .route("/holidays/{id}", delete(api::handlers::holidays::delete_holiday))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;

    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The running service: router, state, and the notification dispatcher.
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    notification_task: Option<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl Application {
    /// Create a new application instance with all resources initialized.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = setup_database(&config).await?;
        Self::new_with_pool(config, pool).await
    }

    /// Create an application over an existing pool (used by tests, where the
    /// pool comes from the test fixture and migrations have already run).
    pub async fn new_with_pool(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        debug!("Starting booking service with configuration: {:#?}", config);

        create_initial_admin_user(&config.admin_username, config.admin_password.as_deref(), &pool).await?;

        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let (notifications, notification_task) =
            notifications::spawn_dispatcher(&config.notifications, shutdown_token.clone());

        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .notifications(notifications)
            .build();

        let router = build_router(&state)?;

        Ok(Self {
            router,
            config,
            pool,
            notification_task,
            shutdown_token,
        })
    }

    /// Convert the application into a test server (for tests).
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application until the shutdown future resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Booking service listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Stop the notification dispatcher and let it drain its queue
        self.shutdown_token.cancel();
        if let Some(task) = self.notification_task {
            let _ = task.await;
        }

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::create_initial_admin_user;
    use crate::api::models::users::{LoginRequest, LoginResponse, Role};
    use crate::db::handlers::Users;
    use crate::test_utils::*;
    use sqlx::PgPool;

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn initial_admin_is_idempotent(pool: PgPool) {
        let first = create_initial_admin_user("frontdesk", Some("first-password"), &pool)
            .await
            .unwrap();
        let second = create_initial_admin_user("frontdesk", Some("rotated-password"), &pool)
            .await
            .unwrap();
        assert_eq!(first, second);

        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn)
            .get_by_username("frontdesk")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role, Role::Manager);
        assert!(crate::auth::password::verify_string("rotated-password", &user.password_hash).unwrap());
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn healthz_and_docs_are_served(pool: PgPool) {
        let server = create_test_app(pool).await;

        let health = server.get("/healthz").await;
        health.assert_status_ok();
        assert_eq!(health.text(), "OK");

        let docs = server.get("/docs").await;
        docs.assert_status_ok();
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn login_and_authenticated_request_flow(pool: PgPool) {
        let server = create_test_app(pool).await;

        let response = server
            .post("/authentication/login")
            .json(&LoginRequest {
                username: TEST_ADMIN_USERNAME.to_string(),
                password: TEST_ADMIN_PASSWORD.to_string(),
            })
            .await;
        response.assert_status_ok();
        let login: LoginResponse = response.json();
        assert_eq!(login.user.role, Role::Manager);

        let dashboard = server
            .get("/api/v1/dashboard")
            .authorization_bearer(&login.token)
            .await;
        dashboard.assert_status_ok();

        // No token: turned away at the extractor
        let unauthorized = server.get("/api/v1/dashboard").await;
        unauthorized.assert_status_unauthorized();
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn logout_revokes_the_session(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        server
            .post("/authentication/logout")
            .authorization_bearer(&token)
            .await
            .assert_status(axum::http::StatusCode::NO_CONTENT);

        let after = server
            .get("/api/v1/dashboard")
            .authorization_bearer(&token)
            .await;
        after.assert_status_unauthorized();
    }
}
