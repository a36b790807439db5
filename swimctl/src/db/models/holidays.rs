//! Database models for display-only holiday markers.

use crate::types::HolidayId;
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone)]
pub struct HolidayCreateDBRequest {
    pub holiday_date: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HolidayDBResponse {
    pub id: HolidayId,
    pub holiday_date: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
