//! Sequential reference number generation.
//!
//! Refer codes look like `S-20240115-0001`: an uppercase type prefix, the
//! date, and a per-type per-day running number. The counter lives in the
//! `refer_counters` table and is advanced with a single upsert so concurrent
//! callers can never observe the same value.

use crate::db::errors::Result;
use crate::types::ReferCode;
use chrono::{NaiveDate, Utc};
use sqlx::PgConnection;
use tracing::instrument;

pub struct ReferGenerator<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ReferGenerator<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Generate the next refer code for `refer_type`, dated today.
    pub async fn generate(&mut self, refer_type: &str) -> Result<ReferCode> {
        let today = Utc::now().date_naive();
        self.generate_on(refer_type, today).await
    }

    /// Generate the next refer code for `refer_type` on a specific date.
    ///
    /// The increment is one atomic statement, never read-then-write.
    #[instrument(skip(self), err)]
    pub async fn generate_on(&mut self, refer_type: &str, date: NaiveDate) -> Result<ReferCode> {
        let (running,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO refer_counters (refer_type, refer_date, running)
            VALUES ($1, $2, 1)
            ON CONFLICT (refer_type, refer_date)
            DO UPDATE SET running = refer_counters.running + 1
            RETURNING running
            "#,
        )
        .bind(refer_type)
        .bind(date)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(format!("{}-{}-{:04}", refer_type.to_uppercase(), date.format("%Y%m%d"), running))
    }
}
