//! API request/response models for holidays.

use crate::db::models::holidays::HolidayDBResponse;
use crate::types::HolidayId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HolidayCreate {
    pub holiday_date: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HolidayResponse {
    pub id: HolidayId,
    pub holiday_date: NaiveDate,
    pub description: Option<String>,
}

impl From<HolidayDBResponse> for HolidayResponse {
    fn from(db: HolidayDBResponse) -> Self {
        Self {
            id: db.id,
            holiday_date: db.holiday_date,
            description: db.description,
        }
    }
}

/// Query parameters for listing holidays
#[derive(Debug, Deserialize, utoipa::IntoParams, ToSchema)]
pub struct ListHolidaysQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}
