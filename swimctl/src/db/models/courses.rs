//! Database models for the course catalog.

use crate::types::CourseId;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct CourseCreateDBRequest {
    pub name: String,
    pub short_name: String,
    pub refer_code: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CourseUpdateDBRequest {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub refer_code: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CourseDBResponse {
    pub id: CourseId,
    pub name: String,
    pub short_name: String,
    pub refer_code: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
