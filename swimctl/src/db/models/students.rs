//! Database models for students and pending registrations.

use crate::types::FamilyId;
use chrono::{DateTime, NaiveDate, Utc};

/// Database request for creating a student. The refer code is generated by
/// the repository, not supplied by the caller.
#[derive(Debug, Clone)]
pub struct StudentCreateDBRequest {
    pub family_id: Option<FamilyId>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub school: Option<String>,
    pub level: Option<String>,
    pub short_note: Option<String>,
    pub created_by: Option<String>,
}

/// Database request for updating a student
#[derive(Debug, Clone, Default)]
pub struct StudentUpdateDBRequest {
    pub family_id: Option<FamilyId>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub school: Option<String>,
    pub level: Option<String>,
    pub short_note: Option<String>,
    pub primary_entitlement: Option<Option<String>>,
    pub secondary_entitlement: Option<Option<String>>,
    pub updated_by: Option<String>,
}

/// Database response for a student
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudentDBResponse {
    pub refer: String,
    pub family_id: Option<FamilyId>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub school: Option<String>,
    pub level: Option<String>,
    pub short_note: Option<String>,
    pub primary_entitlement: Option<String>,
    pub secondary_entitlement: Option<String>,
    pub deleted: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentDBResponse {
    /// Full display name, skipping empty parts.
    pub fn full_name(&self) -> String {
        [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Database request for a self-service registration awaiting approval
#[derive(Debug, Clone)]
pub struct PendingStudentCreateDBRequest {
    pub family_id: FamilyId,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub school: Option<String>,
}

/// Database response for a pending registration
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingStudentDBResponse {
    pub refer: String,
    pub family_id: FamilyId,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub school: Option<String>,
    pub created_at: DateTime<Utc>,
}
