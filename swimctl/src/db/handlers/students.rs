//! Database repository for students and pending registrations.
//!
//! Self-service registrations are staged in `pending_students` under a `TMP-`
//! refer. Approval promotes them into `students` under a fresh `S-` refer;
//! the temporary refer is never reused for the full record.

use crate::db::{
    errors::{DbError, Result},
    handlers::{refer::ReferGenerator, repository::Repository},
    models::students::{
        PendingStudentCreateDBRequest, PendingStudentDBResponse, StudentCreateDBRequest,
        StudentDBResponse, StudentUpdateDBRequest,
    },
};
use crate::types::FamilyId;
use sqlx::{Connection, PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;

/// Refer type prefixes for students.
const STUDENT_REFER_TYPE: &str = "S";
const PENDING_REFER_TYPE: &str = "TMP";

/// Filter for listing students
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub family_id: Option<FamilyId>,
    pub include_deleted: bool,
    /// Case-insensitive substring match on refer, names, or nickname
    pub search: Option<String>,
}

pub struct Students<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Students<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Stage a self-service registration for admin approval.
    #[instrument(skip(self, request), fields(family_id = request.family_id), err)]
    pub async fn create_pending(
        &mut self,
        request: &PendingStudentCreateDBRequest,
    ) -> Result<PendingStudentDBResponse> {
        let mut tx = self.db.begin().await?;
        let refer = ReferGenerator::new(&mut *tx).generate(PENDING_REFER_TYPE).await?;

        let pending = sqlx::query_as::<_, PendingStudentDBResponse>(
            r#"
            INSERT INTO pending_students
                (refer, family_id, first_name, middle_name, last_name, nickname, gender, date_of_birth, school)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&refer)
        .bind(request.family_id)
        .bind(&request.first_name)
        .bind(&request.middle_name)
        .bind(&request.last_name)
        .bind(&request.nickname)
        .bind(&request.gender)
        .bind(&request.date_of_birth)
        .bind(&request.school)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(pending)
    }

    #[instrument(skip(self), err)]
    pub async fn list_pending(&mut self, family_id: Option<FamilyId>) -> Result<Vec<PendingStudentDBResponse>> {
        let pending = sqlx::query_as::<_, PendingStudentDBResponse>(
            r#"
            SELECT * FROM pending_students
            WHERE ($1::BIGINT IS NULL OR family_id = $1)
            ORDER BY created_at
            "#,
        )
        .bind(family_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(pending)
    }

    /// Promote a pending registration into a full student record.
    ///
    /// The promoted record gets a fresh `S-` refer; the pending row is
    /// removed in the same transaction.
    #[instrument(skip(self), fields(pending_refer = %pending_refer), err)]
    pub async fn approve_pending(
        &mut self,
        pending_refer: &str,
        approved_by: &str,
    ) -> Result<StudentDBResponse> {
        let mut tx = self.db.begin().await?;

        let pending = sqlx::query_as::<_, PendingStudentDBResponse>(
            "SELECT * FROM pending_students WHERE refer = $1",
        )
        .bind(pending_refer)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

        let refer = ReferGenerator::new(&mut *tx).generate(STUDENT_REFER_TYPE).await?;

        let student = sqlx::query_as::<_, StudentDBResponse>(
            r#"
            INSERT INTO students
                (refer, family_id, first_name, middle_name, last_name, nickname, gender, date_of_birth, school, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&refer)
        .bind(pending.family_id)
        .bind(&pending.first_name)
        .bind(&pending.middle_name)
        .bind(&pending.last_name)
        .bind(&pending.nickname)
        .bind(&pending.gender)
        .bind(&pending.date_of_birth)
        .bind(&pending.school)
        .bind(approved_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pending_students WHERE refer = $1")
            .bind(pending_refer)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(student)
    }

    /// Discard a pending registration without promoting it.
    #[instrument(skip(self), err)]
    pub async fn reject_pending(&mut self, pending_refer: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pending_students WHERE refer = $1")
            .bind(pending_refer)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Students<'c> {
    type CreateRequest = StudentCreateDBRequest;
    type UpdateRequest = StudentUpdateDBRequest;
    type Response = StudentDBResponse;
    type Id = String;
    type Filter = StudentFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;
        let refer = ReferGenerator::new(&mut *tx).generate(STUDENT_REFER_TYPE).await?;

        let student = sqlx::query_as::<_, StudentDBResponse>(
            r#"
            INSERT INTO students
                (refer, family_id, first_name, middle_name, last_name, nickname, gender,
                 date_of_birth, school, level, short_note, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&refer)
        .bind(request.family_id)
        .bind(&request.first_name)
        .bind(&request.middle_name)
        .bind(&request.last_name)
        .bind(&request.nickname)
        .bind(&request.gender)
        .bind(&request.date_of_birth)
        .bind(&request.school)
        .bind(&request.level)
        .bind(&request.short_note)
        .bind(&request.created_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(student)
    }

    #[instrument(skip(self), fields(refer = %id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let student = sqlx::query_as::<_, StudentDBResponse>("SELECT * FROM students WHERE refer = $1")
            .bind(&id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(student)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let students = sqlx::query_as::<_, StudentDBResponse>("SELECT * FROM students WHERE refer = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(students.into_iter().map(|s| (s.refer.clone(), s)).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let pattern = filter.search.as_ref().map(|s| format!("%{s}%"));
        let students = sqlx::query_as::<_, StudentDBResponse>(
            r#"
            SELECT * FROM students
            WHERE ($1::BIGINT IS NULL OR family_id = $1)
              AND ($2 OR NOT deleted)
              AND ($3::TEXT IS NULL
                   OR refer ILIKE $3
                   OR first_name ILIKE $3
                   OR last_name ILIKE $3
                   OR nickname ILIKE $3)
            ORDER BY refer
            "#,
        )
        .bind(filter.family_id)
        .bind(filter.include_deleted)
        .bind(&pattern)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(students)
    }

    /// Soft delete: the record is flagged, never removed, so historical
    /// reservations keep their student reference.
    #[instrument(skip(self), fields(refer = %id), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("UPDATE students SET deleted = TRUE, updated_at = NOW() WHERE refer = $1")
            .bind(&id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(refer = %id), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut qb = QueryBuilder::new("UPDATE students SET updated_at = NOW()");

        macro_rules! set_if_some {
            ($field:literal, $value:expr) => {
                if let Some(value) = $value {
                    qb.push(concat!(", ", $field, " = ")).push_bind(value);
                }
            };
        }

        set_if_some!("family_id", request.family_id);
        set_if_some!("first_name", &request.first_name);
        set_if_some!("middle_name", &request.middle_name);
        set_if_some!("last_name", &request.last_name);
        set_if_some!("nickname", &request.nickname);
        set_if_some!("gender", &request.gender);
        set_if_some!("date_of_birth", request.date_of_birth);
        set_if_some!("school", &request.school);
        set_if_some!("level", &request.level);
        set_if_some!("short_note", &request.short_note);
        // Double options: outer Some means "set", inner None means "clear"
        set_if_some!("primary_entitlement", &request.primary_entitlement);
        set_if_some!("secondary_entitlement", &request.secondary_entitlement);
        set_if_some!("updated_by", &request.updated_by);

        qb.push(" WHERE refer = ").push_bind(&id).push(" RETURNING *");

        let student = qb
            .build_query_as::<StudentDBResponse>()
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;
        Ok(student)
    }
}
