//! Database repository for entitlements: the course credit ledger.
//!
//! An entitlement is a purchased right to attend classes of one course. The
//! ledger tracks remaining credits (counted kinds only), the validity window,
//! and which students share the entitlement. Credit movement is always a
//! single conditional UPDATE so a committed sequence can never drive
//! `remaining` negative.

use crate::api::models::entitlements::EntitlementKind;
use crate::db::{
    errors::{DbError, Result},
    handlers::{refer::ReferGenerator, repository::Repository},
    models::entitlements::{
        EntitlementCreateDBRequest, EntitlementDBResponse, EntitlementUpdateDBRequest,
        EntitlementWithOwnersDBResponse,
    },
};
use crate::types::CourseId;
use chrono::{Months, NaiveDate};
use sqlx::{Connection, PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;

const WITH_OWNERS_QUERY: &str = r#"
    SELECT
        e.*,
        COALESCE(
            array_agg(o.student_refer ORDER BY o.position)
                FILTER (WHERE o.student_refer IS NOT NULL),
            '{}'
        ) AS owners
    FROM entitlements e
    LEFT JOIN entitlement_owners o ON o.entitlement_refer = e.refer
"#;

/// Filter for listing entitlements
#[derive(Debug, Clone, Default)]
pub struct EntitlementFilter {
    pub student_refer: Option<String>,
    pub course_id: Option<CourseId>,
    pub include_finished: bool,
    pub unpaid_only: bool,
}

/// Result of a credit movement.
#[derive(Debug, Clone, PartialEq)]
pub enum CreditOutcome {
    /// One credit moved; the new balance is attached
    Applied { remaining: i32 },
    /// Monthly or trial entitlements carry no countable credits
    Skipped,
    /// A consume found no credit left to take
    Insufficient,
}

/// Result of the validity-window check run before a booking is admitted.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryCheck {
    /// The target date falls inside the validity window
    Valid,
    /// First use: the window was just anchored to the reference date
    Anchored { start: NaiveDate, expiry: NaiveDate },
    /// The whole entitlement lapsed (today is already past expiry)
    Lapsed,
    /// The entitlement is still live but the target date is past expiry
    BeyondExpiry { expiry: NaiveDate },
}

pub struct Entitlements<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Entitlements<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Plain row fetch without the owners aggregate.
    #[instrument(skip(self), err)]
    pub async fn get_row(&mut self, refer: &str) -> Result<Option<EntitlementDBResponse>> {
        let row = sqlx::query_as::<_, EntitlementDBResponse>("SELECT * FROM entitlements WHERE refer = $1")
            .bind(refer)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(row)
    }

    /// Resolve the entitlement a student would book this course against:
    /// the most recently created unfinished one they own.
    #[instrument(skip(self), err)]
    pub async fn active_for_student_course(
        &mut self,
        student_refer: &str,
        course_id: CourseId,
    ) -> Result<Option<EntitlementDBResponse>> {
        let row = sqlx::query_as::<_, EntitlementDBResponse>(
            r#"
            SELECT e.*
            FROM entitlements e
            JOIN entitlement_owners o ON o.entitlement_refer = e.refer
            WHERE o.student_refer = $1 AND e.course_id = $2 AND NOT e.finished
            ORDER BY e.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(student_refer)
        .bind(course_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(row)
    }

    /// Check the validity window against a target class date, anchoring the
    /// window on first use.
    ///
    /// On first use the start date becomes `reference_date` and expiry lands
    /// `period_months` calendar months later. Once anchored the window is
    /// immutable. Trial entitlements skip the check entirely. Monthly and
    /// counted kinds are treated alike here.
    #[instrument(skip(self), err)]
    pub async fn ensure_expiry(
        &mut self,
        refer: &str,
        reference_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<ExpiryCheck> {
        let entitlement = self.get_row(refer).await?.ok_or(DbError::NotFound)?;

        if entitlement.trial {
            return Ok(ExpiryCheck::Valid);
        }

        let Some(expiry) = entitlement.expiry_date else {
            // First use anchors the window to the booked date
            let expiry = add_months(reference_date, entitlement.period_months);
            sqlx::query(
                r#"
                UPDATE entitlements
                SET start_date = $2, expiry_date = $3, updated_at = NOW()
                WHERE refer = $1 AND expiry_date IS NULL
                "#,
            )
            .bind(refer)
            .bind(reference_date)
            .bind(expiry)
            .execute(&mut *self.db)
            .await?;
            return Ok(ExpiryCheck::Anchored { start: reference_date, expiry });
        };

        if today > expiry {
            return Ok(ExpiryCheck::Lapsed);
        }
        if reference_date > expiry {
            return Ok(ExpiryCheck::BeyondExpiry { expiry });
        }
        Ok(ExpiryCheck::Valid)
    }

    /// Take one credit. No-op for Monthly and trial entitlements.
    #[instrument(skip(self), err)]
    pub async fn consume_credit(&mut self, refer: &str) -> Result<CreditOutcome> {
        let entitlement = self.get_row(refer).await?.ok_or(DbError::NotFound)?;
        if entitlement.is_monthly() || entitlement.trial {
            return Ok(CreditOutcome::Skipped);
        }

        let updated: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE entitlements
            SET remaining = remaining - 1, updated_at = NOW()
            WHERE refer = $1 AND remaining > 0
            RETURNING remaining
            "#,
        )
        .bind(refer)
        .fetch_optional(&mut *self.db)
        .await?;

        match updated {
            Some((remaining,)) => Ok(CreditOutcome::Applied { remaining }),
            None => Ok(CreditOutcome::Insufficient),
        }
    }

    /// Give one credit back. No-op for Monthly and trial entitlements.
    #[instrument(skip(self), err)]
    pub async fn restore_credit(&mut self, refer: &str) -> Result<CreditOutcome> {
        let entitlement = self.get_row(refer).await?.ok_or(DbError::NotFound)?;
        if entitlement.is_monthly() || entitlement.trial {
            return Ok(CreditOutcome::Skipped);
        }

        let (remaining,): (i32,) = sqlx::query_as(
            r#"
            UPDATE entitlements
            SET remaining = remaining + 1, updated_at = NOW()
            WHERE refer = $1
            RETURNING remaining
            "#,
        )
        .bind(refer)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(CreditOutcome::Applied { remaining })
    }

    /// Mark a monthly entitlement finished and detach it from its students.
    ///
    /// Counted entitlements cannot be finished; they simply run out.
    #[instrument(skip(self), err)]
    pub async fn finish(&mut self, refer: &str) -> Result<EntitlementDBResponse> {
        let mut tx = self.db.begin().await?;

        let entitlement = sqlx::query_as::<_, EntitlementDBResponse>(
            r#"
            UPDATE entitlements
            SET finished = TRUE, updated_at = NOW()
            WHERE refer = $1 AND kind = 'monthly'
            RETURNING *
            "#,
        )
        .bind(refer)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

        detach_student_refs(&mut tx, refer).await?;
        tx.commit().await?;
        Ok(entitlement)
    }

    /// Update payment state.
    #[instrument(skip(self), err)]
    pub async fn mark_paid(
        &mut self,
        refer: &str,
        paid_at: NaiveDate,
        slip_reference: Option<&str>,
    ) -> Result<EntitlementDBResponse> {
        let entitlement = sqlx::query_as::<_, EntitlementDBResponse>(
            r#"
            UPDATE entitlements
            SET paid = TRUE, paid_at = $2, slip_reference = $3, updated_at = NOW()
            WHERE refer = $1
            RETURNING *
            "#,
        )
        .bind(refer)
        .bind(paid_at)
        .bind(slip_reference)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(entitlement)
    }

    /// Copy the entitlement into history, detach student references, and
    /// remove it. Owner rows go with it via cascade.
    #[instrument(skip(self), err)]
    pub async fn archive_and_delete(&mut self, refer: &str, deleted_by: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let copied = sqlx::query(
            r#"
            INSERT INTO entitlement_history
                (refer, course_id, kind, remaining, period_months, start_date, expiry_date,
                 paid, paid_at, slip_reference, trial, finished, created_by, created_at, deleted_by)
            SELECT refer, course_id, kind, remaining, period_months, start_date, expiry_date,
                   paid, paid_at, slip_reference, trial, finished, created_by, created_at, $2
            FROM entitlements
            WHERE refer = $1
            "#,
        )
        .bind(refer)
        .bind(deleted_by)
        .execute(&mut *tx)
        .await?;

        if copied.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        detach_student_refs(&mut tx, refer).await?;

        sqlx::query("DELETE FROM entitlements WHERE refer = $1")
            .bind(refer)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

/// Clear primary/secondary references pointing at an entitlement.
async fn detach_student_refs(tx: &mut sqlx::PgTransaction<'_>, refer: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE students SET
            primary_entitlement = CASE WHEN primary_entitlement = $1 THEN NULL ELSE primary_entitlement END,
            secondary_entitlement = CASE WHEN secondary_entitlement = $1 THEN NULL ELSE secondary_entitlement END,
            updated_at = NOW()
        WHERE primary_entitlement = $1 OR secondary_entitlement = $1
        "#,
    )
    .bind(refer)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn replace_owners(tx: &mut sqlx::PgTransaction<'_>, refer: &str, owners: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM entitlement_owners WHERE entitlement_refer = $1")
        .bind(refer)
        .execute(&mut **tx)
        .await?;

    for (position, student_refer) in owners.iter().enumerate() {
        sqlx::query(
            "INSERT INTO entitlement_owners (entitlement_refer, student_refer, position) VALUES ($1, $2, $3)",
        )
        .bind(refer)
        .bind(student_refer)
        .bind(position as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Expiry lands this many calendar months after the anchor date.
fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    date.checked_add_months(Months::new(months.max(0) as u32)).unwrap_or(date)
}

#[async_trait::async_trait]
impl<'c> Repository for Entitlements<'c> {
    type CreateRequest = EntitlementCreateDBRequest;
    type UpdateRequest = EntitlementUpdateDBRequest;
    type Response = EntitlementWithOwnersDBResponse;
    type Id = String;
    type Filter = EntitlementFilter;

    #[instrument(skip(self, request), fields(course_id = request.course_id), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        // The refer prefix comes from the course catalog
        let (refer_code,): (String,) = sqlx::query_as("SELECT refer_code FROM courses WHERE id = $1")
            .bind(request.course_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        let refer = ReferGenerator::new(&mut *tx).generate(&refer_code).await?;

        sqlx::query(
            r#"
            INSERT INTO entitlements
                (refer, course_id, kind, remaining, period_months, start_date, expiry_date,
                 paid, paid_at, slip_reference, trial, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&refer)
        .bind(request.course_id)
        .bind(&request.kind)
        .bind(request.remaining)
        .bind(request.period_months)
        .bind(request.start_date)
        .bind(request.expiry_date)
        .bind(request.paid)
        .bind(request.paid_at)
        .bind(&request.slip_reference)
        .bind(request.trial)
        .bind(&request.created_by)
        .execute(&mut *tx)
        .await?;

        replace_owners(&mut tx, &refer, &request.owners).await?;

        let entitlement = fetch_with_owners(&mut tx, &refer).await?.ok_or(DbError::NotFound)?;
        tx.commit().await?;
        Ok(entitlement)
    }

    #[instrument(skip(self), fields(refer = %id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let entitlement = sqlx::query_as::<_, EntitlementWithOwnersDBResponse>(
            &format!("{WITH_OWNERS_QUERY} WHERE e.refer = $1 GROUP BY e.refer"),
        )
        .bind(&id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(entitlement)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let entitlements = sqlx::query_as::<_, EntitlementWithOwnersDBResponse>(
            &format!("{WITH_OWNERS_QUERY} WHERE e.refer = ANY($1) GROUP BY e.refer"),
        )
        .bind(&ids)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(entitlements
            .into_iter()
            .map(|e| (e.entitlement.refer.clone(), e))
            .collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let entitlements = sqlx::query_as::<_, EntitlementWithOwnersDBResponse>(
            &format!(
                r#"
                {WITH_OWNERS_QUERY}
                WHERE ($1::TEXT IS NULL
                       OR e.refer IN (SELECT entitlement_refer FROM entitlement_owners WHERE student_refer = $1))
                  AND ($2::BIGINT IS NULL OR e.course_id = $2)
                  AND ($3 OR NOT e.finished)
                  AND (NOT $4 OR NOT e.paid)
                GROUP BY e.refer
                ORDER BY e.created_at DESC
                "#
            ),
        )
        .bind(&filter.student_refer)
        .bind(filter.course_id)
        .bind(filter.include_finished)
        .bind(filter.unpaid_only)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(entitlements)
    }

    /// Trait-level delete archives under an unattributed actor. Handlers use
    /// [`Entitlements::archive_and_delete`] directly to stamp the deleter.
    #[instrument(skip(self), fields(refer = %id), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        self.archive_and_delete(&id, "system").await
    }

    #[instrument(skip(self, request), fields(refer = %id), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let mut qb = QueryBuilder::new("UPDATE entitlements SET updated_at = NOW()");

        macro_rules! set_if_some {
            ($field:literal, $value:expr) => {
                if let Some(value) = $value {
                    qb.push(concat!(", ", $field, " = ")).push_bind(value);
                }
            };
        }

        set_if_some!("remaining", request.remaining);
        set_if_some!("period_months", request.period_months);
        set_if_some!("start_date", request.start_date);
        set_if_some!("expiry_date", request.expiry_date);
        set_if_some!("paid", request.paid);
        set_if_some!("paid_at", request.paid_at);
        set_if_some!("slip_reference", &request.slip_reference);

        qb.push(" WHERE refer = ").push_bind(&id);

        let result = qb.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DbError::NotFound);
        }

        if let Some(owners) = &request.owners {
            replace_owners(&mut tx, &id, owners).await?;
        }

        let entitlement = fetch_with_owners(&mut tx, &id).await?.ok_or(DbError::NotFound)?;
        tx.commit().await?;
        Ok(entitlement)
    }
}

async fn fetch_with_owners(
    tx: &mut sqlx::PgTransaction<'_>,
    refer: &str,
) -> Result<Option<EntitlementWithOwnersDBResponse>> {
    let entitlement = sqlx::query_as::<_, EntitlementWithOwnersDBResponse>(
        &format!("{WITH_OWNERS_QUERY} WHERE e.refer = $1 GROUP BY e.refer"),
    )
    .bind(refer)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(entitlement)
}

impl EntitlementDBResponse {
    /// Monthly and trial entitlements always have credit; counted ones need a
    /// positive balance.
    pub fn has_remaining_credit(&self) -> bool {
        self.is_monthly() || self.trial || self.remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::courses::CourseCreateDBRequest;
    use crate::db::handlers::courses::Courses;
    use sqlx::PgPool;

    async fn seed_course(conn: &mut PgConnection) -> CourseId {
        Courses::new(conn)
            .create(&CourseCreateDBRequest {
                name: "Learn to Swim".to_string(),
                short_name: "LTS".to_string(),
                refer_code: "LS".to_string(),
                enabled: true,
            })
            .await
            .unwrap()
            .id
    }

    fn counted(course_id: CourseId, remaining: i32) -> EntitlementCreateDBRequest {
        EntitlementCreateDBRequest {
            course_id,
            kind: EntitlementKind::Counted,
            remaining,
            period_months: 3,
            start_date: None,
            expiry_date: None,
            paid: false,
            paid_at: None,
            slip_reference: None,
            trial: false,
            owners: vec![],
            created_by: Some("admin".to_string()),
        }
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn refer_uses_course_prefix(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let course_id = seed_course(&mut conn).await;

        let created = Entitlements::new(&mut conn).create(&counted(course_id, 10)).await.unwrap();
        assert!(created.entitlement.refer.starts_with("LS-"));
        assert!(created.entitlement.refer.ends_with("-0001"));
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn consume_and_restore_are_exact_inverses(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let course_id = seed_course(&mut conn).await;
        let refer = Entitlements::new(&mut conn)
            .create(&counted(course_id, 1))
            .await
            .unwrap()
            .entitlement
            .refer;

        let mut ledger = Entitlements::new(&mut conn);
        assert_eq!(ledger.consume_credit(&refer).await.unwrap(), CreditOutcome::Applied { remaining: 0 });
        assert_eq!(ledger.consume_credit(&refer).await.unwrap(), CreditOutcome::Insufficient);
        assert_eq!(ledger.restore_credit(&refer).await.unwrap(), CreditOutcome::Applied { remaining: 1 });
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn monthly_never_touches_remaining(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let course_id = seed_course(&mut conn).await;
        let refer = Entitlements::new(&mut conn)
            .create(&EntitlementCreateDBRequest {
                kind: EntitlementKind::Monthly,
                remaining: 0,
                ..counted(course_id, 0)
            })
            .await
            .unwrap()
            .entitlement
            .refer;

        let mut ledger = Entitlements::new(&mut conn);
        assert_eq!(ledger.consume_credit(&refer).await.unwrap(), CreditOutcome::Skipped);
        assert_eq!(ledger.restore_credit(&refer).await.unwrap(), CreditOutcome::Skipped);

        let row = ledger.get_row(&refer).await.unwrap().unwrap();
        assert_eq!(row.remaining, 0);
        assert!(row.has_remaining_credit());
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn trial_never_touches_remaining(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let course_id = seed_course(&mut conn).await;
        let refer = Entitlements::new(&mut conn)
            .create(&EntitlementCreateDBRequest {
                trial: true,
                ..counted(course_id, 0)
            })
            .await
            .unwrap()
            .entitlement
            .refer;

        let mut ledger = Entitlements::new(&mut conn);
        assert_eq!(ledger.consume_credit(&refer).await.unwrap(), CreditOutcome::Skipped);
        assert_eq!(ledger.restore_credit(&refer).await.unwrap(), CreditOutcome::Skipped);

        let row = ledger.get_row(&refer).await.unwrap().unwrap();
        assert_eq!(row.remaining, 0);
        assert!(row.has_remaining_credit());
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn ensure_expiry_anchors_then_enforces(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let course_id = seed_course(&mut conn).await;
        let refer = Entitlements::new(&mut conn)
            .create(&counted(course_id, 10))
            .await
            .unwrap()
            .entitlement
            .refer;

        let mut ledger = Entitlements::new(&mut conn);
        let first_class = NaiveDate::from_ymd_opt(2023, 10, 10).unwrap();

        let check = ledger.ensure_expiry(&refer, first_class, first_class).await.unwrap();
        assert_eq!(
            check,
            ExpiryCheck::Anchored {
                start: first_class,
                expiry: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            }
        );

        // Inside the window
        let inside = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(ledger.ensure_expiry(&refer, inside, inside).await.unwrap(), ExpiryCheck::Valid);

        // Target date past expiry while the entitlement is still live
        let beyond = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            ledger.ensure_expiry(&refer, beyond, today).await.unwrap(),
            ExpiryCheck::BeyondExpiry { expiry: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap() }
        );

        // Today already past expiry
        let late_today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(
            ledger.ensure_expiry(&refer, late_today, late_today).await.unwrap(),
            ExpiryCheck::Lapsed
        );
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn delete_copies_to_history_first(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let course_id = seed_course(&mut conn).await;
        let refer = Entitlements::new(&mut conn)
            .create(&counted(course_id, 4))
            .await
            .unwrap()
            .entitlement
            .refer;

        let mut ledger = Entitlements::new(&mut conn);
        assert!(ledger.archive_and_delete(&refer, "admin").await.unwrap());
        assert!(ledger.get_row(&refer).await.unwrap().is_none());

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM entitlement_history WHERE refer = $1 AND deleted_by = 'admin'")
                .bind(&refer)
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(count, 1);

        // Deleting again reports false, not an error
        assert!(!Entitlements::new(&mut conn).archive_and_delete(&refer, "admin").await.unwrap());
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn only_monthly_can_finish(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let course_id = seed_course(&mut conn).await;

        let counted_refer = Entitlements::new(&mut conn)
            .create(&counted(course_id, 4))
            .await
            .unwrap()
            .entitlement
            .refer;
        let err = Entitlements::new(&mut conn).finish(&counted_refer).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));

        let monthly_refer = Entitlements::new(&mut conn)
            .create(&EntitlementCreateDBRequest {
                kind: EntitlementKind::Monthly,
                ..counted(course_id, 0)
            })
            .await
            .unwrap()
            .entitlement
            .refer;
        let finished = Entitlements::new(&mut conn).finish(&monthly_refer).await.unwrap();
        assert!(finished.finished);
    }
}
