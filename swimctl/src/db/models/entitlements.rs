//! Database models for entitlements and the credit ledger.

use crate::api::models::entitlements::EntitlementKind;
use crate::types::CourseId;
use chrono::{DateTime, NaiveDate, Utc};

/// Database request for creating an entitlement. The refer code is generated
/// by the repository from the course's refer prefix.
#[derive(Debug, Clone)]
pub struct EntitlementCreateDBRequest {
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
    /// Student refer codes sharing this entitlement, in display order.
    pub owners: Vec<String>,
    pub created_by: Option<String>,
}

/// Database request for updating an entitlement
#[derive(Debug, Clone, Default)]
pub struct EntitlementUpdateDBRequest {
    pub remaining: Option<i32>,
    pub period_months: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub paid: Option<bool>,
    pub paid_at: Option<NaiveDate>,
    pub slip_reference: Option<String>,
    pub owners: Option<Vec<String>>,
}

/// Database response for an entitlement row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntitlementDBResponse {
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
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntitlementDBResponse {
    pub fn is_monthly(&self) -> bool {
        matches!(self.kind, EntitlementKind::Monthly)
    }
}

/// Entitlement row with its owners aggregated in position order.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntitlementWithOwnersDBResponse {
    #[sqlx(flatten)]
    pub entitlement: EntitlementDBResponse,
    pub owners: Vec<String>,
}
