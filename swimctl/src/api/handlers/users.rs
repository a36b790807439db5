//! User account management handlers (staff only).

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::instrument;

use crate::{
    AppState,
    api::handlers::require_manage,
    api::models::users::{CurrentUser, ListUsersQuery, UserCreate, UserResponse, UserUpdate},
    auth::password::{self, Argon2Params},
    db::{
        handlers::{Repository, Users, users::UserFilter},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    errors::{Error, Result},
    types::UserId,
};

/// Create a user account with an explicit role.
#[utoipa::path(
    post,
    path = "/users",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 403, description = "Not permitted"),
        (status = 409, description = "Username already taken"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
#[instrument(skip_all, fields(username = %request.username, role = ?request.role))]
pub async fn create_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    require_manage(&user, "users")?;

    let rules = &state.config.auth.password;
    if request.password.len() < rules.min_length || request.password.len() > rules.max_length {
        return Err(Error::BadRequest {
            message: format!(
                "Password must be between {} and {} characters",
                rules.min_length, rules.max_length
            ),
        });
    }

    let params = Argon2Params::from(rules);
    let plain = request.password.clone();
    let password_hash =
        tokio::task::spawn_blocking(move || password::hash_string_with_params(&plain, Some(params)))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("hash password: {e}"),
            })??;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let created = Users::new(&mut conn)
        .create(&UserCreateDBRequest::from_api(request, password_hash))
        .await?;

    tracing::info!(username = %created.username, "user created");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// List user accounts.
#[utoipa::path(
    get,
    path = "/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Users", body = Vec<UserResponse>),
        (status = 403, description = "Not permitted"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>> {
    require_manage(&user, "users")?;

    let mut filter = UserFilter::new(query.skip.unwrap_or(0), query.limit.unwrap_or(100));
    if let Some(role) = query.role {
        filter = filter.with_role(role);
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let users = Users::new(&mut conn).list(&filter).await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// Fetch one user account.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "No such user"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
#[instrument(skip_all, fields(id = %id))]
pub async fn get_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<UserResponse>> {
    // Anyone may read their own record; staff may read all
    if id != user.id {
        require_manage(&user, "users")?;
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let found = Users::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "user".to_string(),
            id: id.to_string(),
        })?;
    Ok(Json(found.into()))
}

/// Update profile fields or role.
#[utoipa::path(
    patch,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 404, description = "No such user"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
#[instrument(skip_all, fields(id = %id))]
pub async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
    Json(request): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    require_manage(&user, "users")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let updated = Users::new(&mut conn)
        .update(id, &UserUpdateDBRequest::from(request))
        .await?;
    Ok(Json(updated.into()))
}

/// Delete a user account.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "No such user"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
#[instrument(skip_all, fields(id = %id))]
pub async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<StatusCode> {
    require_manage(&user, "users")?;
    if id == user.id {
        return Err(Error::BadRequest {
            message: "Cannot delete your own account".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = Users::new(&mut conn).delete(id).await?;
    if !deleted {
        return Err(Error::NotFound {
            resource: "user".to_string(),
            id: id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}
