//! Authentication handlers: login, logout, registration, password change.

use axum::{Json, extract::State, http::StatusCode};
use tracing::instrument;

use crate::{
    AppState,
    api::models::users::{
        ChangePasswordRequest, CurrentUser, LoginRequest, LoginResponse, RegisterRequest, Role,
        UserCreate, UserResponse,
    },
    auth::{
        create_session_token,
        password::{self, Argon2Params},
        revocation,
        session::SessionClaims,
    },
    db::{
        handlers::{Repository, Users},
        models::users::UserCreateDBRequest,
    },
    errors::{Error, Result},
};

fn validate_password(state: &AppState, candidate: &str) -> Result<()> {
    let rules = &state.config.auth.password;
    if candidate.len() < rules.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", rules.min_length),
        });
    }
    if candidate.len() > rules.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at most {} characters", rules.max_length),
        });
    }
    Ok(())
}

async fn hash_password(state: &AppState, plain: String) -> Result<String> {
    let params = Argon2Params::from(&state.config.auth.password);
    tokio::task::spawn_blocking(move || password::hash_string_with_params(&plain, Some(params)))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("hash password: {e}"),
        })?
}

/// Authenticate with username and password, returning a session token.
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "authentication"
)]
#[instrument(skip_all, fields(username = %request.username))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let user = Users::new(&mut conn).get_by_username(&request.username).await?;

    // Same response for unknown user and wrong password
    let invalid = || Error::Unauthenticated {
        message: Some("Invalid username or password".to_string()),
    };
    let user = user.ok_or_else(invalid)?;

    let hash = user.password_hash.clone();
    let password = request.password;
    let verified = tokio::task::spawn_blocking(move || password::verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("verify password: {e}"),
        })??;
    if !verified {
        return Err(invalid());
    }

    Users::new(&mut conn).record_login(&user.username).await?;

    let current = CurrentUser::from(user.clone());
    let token = create_session_token(&current, &state.config)?;

    tracing::info!(username = %user.username, role = ?user.role, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

/// Log out the current session by revoking its token.
#[utoipa::path(
    post,
    path = "/authentication/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "authentication"
)]
#[instrument(skip_all, fields(username = %claims.username))]
pub async fn logout(State(state): State<AppState>, claims: SessionClaims) -> Result<StatusCode> {
    revocation::revoke(&state.db, claims.jti, claims.expires_at()).await?;
    tracing::info!(username = %claims.username, "session logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// Self-register a customer account.
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = LoginResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Registration disabled"),
        (status = 409, description = "Username already taken"),
    ),
    tag = "authentication"
)]
#[instrument(skip_all, fields(username = %request.username))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>)> {
    if !state.config.auth.allow_registration {
        return Err(Error::Forbidden {
            action: "register".to_string(),
            resource: "accounts".to_string(),
        });
    }
    if request.username.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Username must not be empty".to_string(),
        });
    }
    validate_password(&state, &request.password)?;

    let password_hash = hash_password(&state, request.password.clone()).await?;
    let create = UserCreateDBRequest::from_api(
        UserCreate {
            username: request.username,
            password: String::new(), // never stored; the hash travels separately
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            mobile_no: request.mobile_no,
            role: Role::Customer,
        },
        password_hash,
    );

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn).create(&create).await?;

    let current = CurrentUser::from(user.clone());
    let token = create_session_token(&current, &state.config)?;

    tracing::info!(username = %user.username, "customer registered");
    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// Change the caller's own password.
#[utoipa::path(
    post,
    path = "/authentication/password-change",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = UserResponse),
        (status = 400, description = "New password rejected"),
        (status = 401, description = "Old password incorrect"),
    ),
    security(("bearer_auth" = [])),
    tag = "authentication"
)]
#[instrument(skip_all, fields(username = %user.username))]
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<UserResponse>> {
    validate_password(&state, &request.new_password)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let stored = Users::new(&mut conn)
        .get_by_id(user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "user".to_string(),
            id: user.id.to_string(),
        })?;

    let hash = stored.password_hash.clone();
    let old_password = request.old_password;
    let verified = tokio::task::spawn_blocking(move || password::verify_string(&old_password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("verify password: {e}"),
        })??;
    if !verified {
        return Err(Error::Unauthenticated {
            message: Some("Old password is incorrect".to_string()),
        });
    }

    let new_hash = hash_password(&state, request.new_password).await?;
    Users::new(&mut conn).update_password(user.id, &new_hash).await?;

    tracing::info!(username = %user.username, "password changed");
    Ok(Json(stored.into()))
}
