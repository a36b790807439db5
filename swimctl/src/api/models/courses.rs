//! API request/response models for the course catalog.

use crate::db::models::courses::CourseDBResponse;
use crate::types::CourseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseCreate {
    pub name: String,
    pub short_name: String,
    /// Prefix for entitlement refer codes generated under this course
    pub refer_code: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CourseUpdate {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub refer_code: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseResponse {
    pub id: CourseId,
    pub name: String,
    pub short_name: String,
    pub refer_code: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CourseDBResponse> for CourseResponse {
    fn from(db: CourseDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            short_name: db.short_name,
            refer_code: db.refer_code,
            enabled: db.enabled,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
