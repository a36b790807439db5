//! Database repository for class slots, closures, and the capacity index.
//!
//! Capacity questions are always asked per (slot, date): the configured
//! `max_persons` of the recurring slot against the count of reservations
//! already taken for that date, with per-date closures zeroing availability.

use crate::types::{CourseId, SlotId};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::slots::{
        ClassSlotCreateDBRequest, ClassSlotDBResponse, ClassSlotUpdateDBRequest,
        SlotAvailabilityDBResponse, SlotClosureDBResponse,
    },
};
use chrono::{Datelike, NaiveDate};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;

/// Lowercase weekday name used in the `class_slots.weekday` column.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "monday",
        chrono::Weekday::Tue => "tuesday",
        chrono::Weekday::Wed => "wednesday",
        chrono::Weekday::Thu => "thursday",
        chrono::Weekday::Fri => "friday",
        chrono::Weekday::Sat => "saturday",
        chrono::Weekday::Sun => "sunday",
    }
}

/// Filter for listing slots
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub course_id: Option<CourseId>,
    pub include_disabled: bool,
    pub include_admin_only: bool,
}

pub struct ClassSlots<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ClassSlots<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Count reservations already taken for a slot on a date.
    #[instrument(skip(self), err)]
    pub async fn current_occupancy(&mut self, slot_id: SlotId, date: NaiveDate) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM reservations WHERE slot_id = $1 AND class_date = $2",
        )
        .bind(slot_id)
        .bind(date)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Whether a slot has no seats left on a date.
    ///
    /// How fullness is acted on is the caller's policy: self-service booking
    /// rejects, admin booking proceeds with an over-capacity annotation.
    pub async fn is_full(&mut self, slot: &ClassSlotDBResponse, date: NaiveDate) -> Result<bool> {
        let occupancy = self.current_occupancy(slot.id, date).await?;
        Ok(occupancy >= i64::from(slot.max_persons))
    }

    /// Slots visible for booking on a date, each annotated with occupancy and
    /// any closure. Admin-only slots are hidden unless `include_admin_only`.
    #[instrument(skip(self), err)]
    pub async fn visible_slots(
        &mut self,
        date: NaiveDate,
        course_id: Option<CourseId>,
        include_admin_only: bool,
    ) -> Result<Vec<SlotAvailabilityDBResponse>> {
        let slots = sqlx::query_as::<_, SlotAvailabilityDBResponse>(
            r#"
            SELECT
                s.*,
                COALESCE(r.occupancy, 0) AS occupancy,
                (c.id IS NOT NULL) AS closed,
                c.description AS closure_description
            FROM class_slots s
            LEFT JOIN (
                SELECT slot_id, COUNT(*) AS occupancy
                FROM reservations
                WHERE class_date = $1
                GROUP BY slot_id
            ) r ON r.slot_id = s.id
            LEFT JOIN slot_closures c ON c.slot_id = s.id AND c.closure_date = $1
            WHERE s.enabled
              AND s.weekday = $2
              AND ($3::BIGINT IS NULL OR s.course_id = $3)
              AND ($4 OR NOT s.admin_only)
            ORDER BY s.time_label, s.id
            "#,
        )
        .bind(date)
        .bind(weekday_name(date))
        .bind(course_id)
        .bind(include_admin_only)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(slots)
    }

    /// The closure for a slot on a date, if one was declared.
    #[instrument(skip(self), err)]
    pub async fn closure_on(&mut self, slot_id: SlotId, date: NaiveDate) -> Result<Option<SlotClosureDBResponse>> {
        let closure = sqlx::query_as::<_, SlotClosureDBResponse>(
            "SELECT * FROM slot_closures WHERE slot_id = $1 AND closure_date = $2",
        )
        .bind(slot_id)
        .bind(date)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(closure)
    }

    #[instrument(skip(self), err)]
    pub async fn add_closure(
        &mut self,
        slot_id: SlotId,
        date: NaiveDate,
        description: Option<&str>,
    ) -> Result<SlotClosureDBResponse> {
        let closure = sqlx::query_as::<_, SlotClosureDBResponse>(
            r#"
            INSERT INTO slot_closures (slot_id, closure_date, description)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(slot_id)
        .bind(date)
        .bind(description)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(closure)
    }

    #[instrument(skip(self), err)]
    pub async fn remove_closure(&mut self, slot_id: SlotId, date: NaiveDate) -> Result<bool> {
        let result = sqlx::query("DELETE FROM slot_closures WHERE slot_id = $1 AND closure_date = $2")
            .bind(slot_id)
            .bind(date)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for ClassSlots<'c> {
    type CreateRequest = ClassSlotCreateDBRequest;
    type UpdateRequest = ClassSlotUpdateDBRequest;
    type Response = ClassSlotDBResponse;
    type Id = SlotId;
    type Filter = SlotFilter;

    #[instrument(skip(self, request), fields(course_id = request.course_id, weekday = %request.weekday), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let slot = sqlx::query_as::<_, ClassSlotDBResponse>(
            r#"
            INSERT INTO class_slots (course_id, weekday, time_label, max_persons, enabled, admin_only)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.course_id)
        .bind(&request.weekday)
        .bind(&request.time_label)
        .bind(request.max_persons)
        .bind(request.enabled)
        .bind(request.admin_only)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(slot)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let slot = sqlx::query_as::<_, ClassSlotDBResponse>("SELECT * FROM class_slots WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(slot)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let slots = sqlx::query_as::<_, ClassSlotDBResponse>("SELECT * FROM class_slots WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(slots.into_iter().map(|s| (s.id, s)).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let slots = sqlx::query_as::<_, ClassSlotDBResponse>(
            r#"
            SELECT * FROM class_slots
            WHERE ($1::BIGINT IS NULL OR course_id = $1)
              AND ($2 OR enabled)
              AND ($3 OR NOT admin_only)
            ORDER BY course_id, weekday, time_label
            "#,
        )
        .bind(filter.course_id)
        .bind(filter.include_disabled)
        .bind(filter.include_admin_only)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(slots)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM class_slots WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let slot = sqlx::query_as::<_, ClassSlotDBResponse>(
            r#"
            UPDATE class_slots SET
                weekday = COALESCE($2, weekday),
                time_label = COALESCE($3, time_label),
                max_persons = COALESCE($4, max_persons),
                enabled = COALESCE($5, enabled),
                admin_only = COALESCE($6, admin_only),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.weekday)
        .bind(&request.time_label)
        .bind(request.max_persons)
        .bind(request.enabled)
        .bind(request.admin_only)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(slot)
    }
}
