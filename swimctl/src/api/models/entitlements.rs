//! API request/response models for entitlements.

use crate::db::models::entitlements::EntitlementWithOwnersDBResponse;
use crate::types::CourseId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How an entitlement meters attendance.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(type_name = "entitlement_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntitlementKind {
    /// Unlimited attendance inside the validity window; `remaining` is ignored
    Monthly,
    /// A fixed number of credits, one consumed per booking
    Counted,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntitlementCreate {
    pub course_id: CourseId,
    pub kind: EntitlementKind,
    #[serde(default)]
    pub remaining: i32,
    /// Validity period in calendar months, anchored on first booking
    pub period_months: i32,
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub paid: bool,
    pub paid_at: Option<NaiveDate>,
    pub slip_reference: Option<String>,
    #[serde(default)]
    pub trial: bool,
    /// Student refers sharing this entitlement, in display order
    pub owners: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct EntitlementUpdate {
    pub remaining: Option<i32>,
    pub period_months: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub paid: Option<bool>,
    pub paid_at: Option<NaiveDate>,
    pub slip_reference: Option<String>,
    pub owners: Option<Vec<String>>,
}

/// Payment confirmation payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntitlementPayRequest {
    pub paid_at: Option<NaiveDate>,
    pub slip_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntitlementResponse {
    pub refer: String,
    pub course_id: CourseId,
    pub kind: EntitlementKind,
    pub remaining: i32,
    pub period_months: i32,
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub paid: bool,
    pub paid_at: Option<NaiveDate>,
    pub slip_reference: Option<String>,
    pub trial: bool,
    pub finished: bool,
    pub owners: Vec<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EntitlementWithOwnersDBResponse> for EntitlementResponse {
    fn from(db: EntitlementWithOwnersDBResponse) -> Self {
        let e = db.entitlement;
        Self {
            refer: e.refer,
            course_id: e.course_id,
            kind: e.kind,
            remaining: e.remaining,
            period_months: e.period_months,
            start_date: e.start_date,
            expiry_date: e.expiry_date,
            paid: e.paid,
            paid_at: e.paid_at,
            slip_reference: e.slip_reference,
            trial: e.trial,
            finished: e.finished,
            owners: db.owners,
            created_by: e.created_by,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

/// Query parameters for listing entitlements
#[derive(Debug, Deserialize, utoipa::IntoParams, ToSchema)]
pub struct ListEntitlementsQuery {
    pub student_refer: Option<String>,
    pub course_id: Option<CourseId>,
    #[serde(default)]
    pub include_finished: bool,
    #[serde(default)]
    pub unpaid_only: bool,
}
