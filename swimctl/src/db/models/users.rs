//! Database models for user accounts and families.

use crate::api::models::users::{Role, UserCreate, UserUpdate};
use crate::types::{FamilyId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile_no: Option<String>,
    pub role: Role,
}

impl UserCreateDBRequest {
    /// Build a create request from the API payload and an already-computed
    /// password hash. Hashing is the caller's job (it runs on a blocking
    /// thread, not inside the repository).
    pub fn from_api(api: UserCreate, password_hash: String) -> Self {
        Self {
            username: api.username,
            password_hash,
            first_name: api.first_name,
            last_name: api.last_name,
            email: api.email,
            mobile_no: api.mobile_no,
            role: api.role,
        }
    }
}

/// Database request for updating a user
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile_no: Option<String>,
    pub role: Option<Role>,
    pub password_hash: Option<String>,
}

impl From<UserUpdate> for UserUpdateDBRequest {
    fn from(update: UserUpdate) -> Self {
        Self {
            first_name: update.first_name,
            last_name: update.last_name,
            email: update.email,
            mobile_no: update.mobile_no,
            role: update.role,
            password_hash: None, // Password changes go through a dedicated path
        }
    }
}

/// Database response for a user
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile_no: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database response for a family record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FamilyDBResponse {
    pub id: FamilyId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}
