//! Database repository for holiday markers.
//!
//! Holidays are display-only: the booking UI shows them, admission logic
//! never consults them.

use crate::db::{
    errors::Result,
    models::holidays::{HolidayCreateDBRequest, HolidayDBResponse},
};
use crate::types::HolidayId;
use chrono::NaiveDate;
use sqlx::PgConnection;
use tracing::instrument;

pub struct Holidays<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Holidays<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(date = %request.holiday_date), err)]
    pub async fn create(&mut self, request: &HolidayCreateDBRequest) -> Result<HolidayDBResponse> {
        let holiday = sqlx::query_as::<_, HolidayDBResponse>(
            "INSERT INTO holidays (holiday_date, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(request.holiday_date)
        .bind(&request.description)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(holiday)
    }

    /// Holidays inside an inclusive date range, soonest first.
    #[instrument(skip(self), err)]
    pub async fn list(&mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Vec<HolidayDBResponse>> {
        let holidays = sqlx::query_as::<_, HolidayDBResponse>(
            r#"
            SELECT * FROM holidays
            WHERE ($1::DATE IS NULL OR holiday_date >= $1)
              AND ($2::DATE IS NULL OR holiday_date <= $2)
            ORDER BY holiday_date
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(holidays)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: HolidayId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM holidays WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
