//! API request/response models for students and pending registrations.

use crate::db::models::students::{PendingStudentDBResponse, StudentDBResponse};
use crate::types::FamilyId;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Age rendered as "years.months", e.g. "5.3" for five years three months.
pub fn age_string(date_of_birth: NaiveDate, today: NaiveDate) -> String {
    let mut years = today.year() - date_of_birth.year();
    let mut months = today.month() as i32 - date_of_birth.month() as i32;
    if today.day() < date_of_birth.day() {
        months -= 1;
    }
    if months < 0 {
        years -= 1;
        months += 12;
    }
    format!("{}.{}", years.max(0), months.max(0))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudentCreate {
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
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct StudentUpdate {
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
    /// Present-and-null clears the reference; absent leaves it alone
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub primary_entitlement: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub secondary_entitlement: Option<Option<String>>,
}

/// Distinguishes a field that is present-and-null from one that is absent.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudentResponse {
    pub refer: String,
    pub family_id: Option<FamilyId>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    /// Rendered "years.months", when the date of birth is known
    pub age: Option<String>,
    pub school: Option<String>,
    pub level: Option<String>,
    pub short_note: Option<String>,
    pub primary_entitlement: Option<String>,
    pub secondary_entitlement: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StudentDBResponse> for StudentResponse {
    fn from(db: StudentDBResponse) -> Self {
        let age = db.date_of_birth.map(|dob| age_string(dob, Utc::now().date_naive()));
        Self {
            refer: db.refer,
            family_id: db.family_id,
            first_name: db.first_name,
            middle_name: db.middle_name,
            last_name: db.last_name,
            nickname: db.nickname,
            gender: db.gender,
            date_of_birth: db.date_of_birth,
            age,
            school: db.school,
            level: db.level,
            short_note: db.short_note,
            primary_entitlement: db.primary_entitlement,
            secondary_entitlement: db.secondary_entitlement,
            deleted: db.deleted,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Customer self-service registration payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingStudentCreate {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub school: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingStudentResponse {
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

impl From<PendingStudentDBResponse> for PendingStudentResponse {
    fn from(db: PendingStudentDBResponse) -> Self {
        Self {
            refer: db.refer,
            family_id: db.family_id,
            first_name: db.first_name,
            middle_name: db.middle_name,
            last_name: db.last_name,
            nickname: db.nickname,
            gender: db.gender,
            date_of_birth: db.date_of_birth,
            school: db.school,
            created_at: db.created_at,
        }
    }
}

/// Query parameters for listing students
#[derive(Debug, Deserialize, utoipa::IntoParams, ToSchema)]
pub struct ListStudentsQuery {
    pub family_id: Option<FamilyId>,
    #[serde(default)]
    pub include_deleted: bool,
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_renders_years_and_months() {
        let dob = NaiveDate::from_ymd_opt(2018, 6, 15).unwrap();
        assert_eq!(age_string(dob, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()), "5.7");
        // A day short of the month boundary
        assert_eq!(age_string(dob, NaiveDate::from_ymd_opt(2024, 1, 14).unwrap()), "5.6");
        // Birthday itself
        assert_eq!(age_string(dob, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()), "6.0");
    }
}
