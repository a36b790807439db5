//! Shared helpers for integration tests.

use axum_test::TestServer;
use sqlx::PgPool;

use crate::api::models::users::{LoginRequest, LoginResponse, Role, UserCreate, UserResponse};

pub const TEST_ADMIN_USERNAME: &str = "test-admin";
pub const TEST_ADMIN_PASSWORD: &str = "test-admin-password";

/// A config suitable for tests: known admin credentials, fixed JWT secret,
/// cheap password hashing, notifications off.
pub fn create_test_config() -> crate::config::Config {
    let mut config = crate::config::Config::default();
    config.admin_username = TEST_ADMIN_USERNAME.to_string();
    config.admin_password = Some(TEST_ADMIN_PASSWORD.to_string());
    config.secret_key = Some("test-secret-key-for-jwt".to_string());
    config.notifications.enabled = false;
    // Keep test hashing fast; production defaults are much heavier
    config.auth.password.argon2_memory_kib = 1024;
    config.auth.password.argon2_iterations = 1;
    config
}

/// Spin up the full application over the test pool and return a test server.
pub async fn create_test_app(pool: PgPool) -> TestServer {
    let config = create_test_config();
    let app = crate::Application::new_with_pool(config, pool)
        .await
        .expect("Failed to create application");
    app.into_test_server()
}

/// Log in as the seeded test admin and return the bearer token.
pub async fn login_as_admin(server: &TestServer) -> String {
    login(server, TEST_ADMIN_USERNAME, TEST_ADMIN_PASSWORD).await
}

pub async fn login(server: &TestServer, username: &str, password: &str) -> String {
    let response = server
        .post("/authentication/login")
        .json(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await;
    response.assert_status_ok();
    let login: LoginResponse = response.json();
    login.token
}

/// Create a user through the API (as the admin) and return it with a login
/// token for the new account.
pub async fn create_user_with_token(
    server: &TestServer,
    admin_token: &str,
    username: &str,
    password: &str,
    role: Role,
) -> (UserResponse, String) {
    let response = server
        .post("/api/v1/users")
        .authorization_bearer(admin_token)
        .json(&UserCreate {
            username: username.to_string(),
            password: password.to_string(),
            first_name: None,
            last_name: None,
            email: None,
            mobile_no: None,
            role,
        })
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let user: UserResponse = response.json();
    let token = login(server, username, password).await;
    (user, token)
}
