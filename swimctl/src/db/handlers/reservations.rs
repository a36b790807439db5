//! Database repository for reservations and the booking admission machine.
//!
//! Admission walks a fixed sequence of checks — duplicate, capacity,
//! entitlement validity, credit — and either commits a reservation or
//! rejects with a structured reason. The whole walk runs inside one
//! SERIALIZABLE transaction so two concurrent admissions for the same
//! (student, date) or (slot, date) can never both pass their checks; the
//! loser surfaces as [`DbError::SerializationFailure`] and nothing commits.
//!
//! This repository deliberately does not implement the generic `Repository`
//! trait: creating a reservation IS the admission machine, and updates only
//! exist as reschedules through the same machine.

use crate::db::{
    errors::{DbError, Result},
    handlers::{
        entitlements::{CreditOutcome, Entitlements, ExpiryCheck},
        slots::weekday_name,
    },
    models::{
        reservations::{BookingRowDBResponse, ReservationCreateDBRequest, ReservationDBResponse},
        slots::ClassSlotDBResponse,
    },
};
use crate::types::{CourseId, ReservationId, SlotId};
use chrono::NaiveDate;
use sqlx::{Connection, PgConnection, PgTransaction};
use tracing::instrument;

/// Everything the admission machine needs to decide one booking.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub student_refer: String,
    pub slot_id: SlotId,
    pub class_date: NaiveDate,
    pub time_label: String,
    pub course_id: CourseId,
    pub weekday: String,
    pub free: bool,
    /// Admin bookings treat a full class as advisory, not a rejection
    pub admin_override: bool,
    pub created_by: String,
    /// Today as seen by the caller; kept out of the machine for testability
    pub today: NaiveDate,
    /// Set on reschedule: this reservation is excluded from duplicate and
    /// capacity counts and updated in place instead of inserted
    pub existing_reservation: Option<ReservationId>,
}

/// Why a booking was turned away. These are outcomes, not errors: the
/// request itself succeeded and the caller gets the reason back.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// The student already holds a reservation on this date
    DuplicateBooking,
    /// No enabled slot matches the requested (slot, course, weekday, time)
    ClassNotFound,
    /// No seats left (self-service only; admins proceed with a warning)
    ClassFull,
    /// The student owns no unfinished entitlement for this course
    NoEntitlement,
    /// Validity window violated. `expiry` is set when the entitlement is
    /// still live but the target date falls past it
    EntitlementExpired { expiry: Option<NaiveDate> },
    /// Counted entitlement with nothing left to consume
    NoCreditsRemaining,
}

#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    Admitted {
        reservation: ReservationDBResponse,
        /// Admin booked past capacity (or into a closure)
        over_capacity: bool,
    },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Cancelled { credit_restored: bool },
    /// Nothing to cancel. A structured result, not an error.
    NotFound,
}

pub struct Reservations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Reservations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Run the admission machine for one booking request.
    ///
    /// All checks and the final insert/update happen in a single
    /// SERIALIZABLE transaction; rejections roll back anything done on the
    /// way (including an expiry anchor written by the validity check).
    #[instrument(
        skip(self, request),
        fields(
            student = %request.student_refer,
            slot = request.slot_id,
            date = %request.class_date,
            free = request.free,
            reschedule = request.existing_reservation.is_some(),
        ),
        err
    )]
    pub async fn admit(&mut self, request: &AdmissionRequest) -> Result<AdmissionOutcome> {
        let mut tx = self.db.begin().await?;
        // Must be the first statement in the transaction
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let outcome = Self::admit_in_tx(&mut tx, request).await?;

        match &outcome {
            AdmissionOutcome::Admitted { .. } => tx.commit().await?,
            AdmissionOutcome::Rejected(reason) => {
                tracing::info!(?reason, student = %request.student_refer, "booking rejected");
                tx.rollback().await?;
            }
        }
        Ok(outcome)
    }

    async fn admit_in_tx(
        tx: &mut PgTransaction<'_>,
        request: &AdmissionRequest,
    ) -> Result<AdmissionOutcome> {
        use AdmissionOutcome::Rejected;

        // 1. Slot lookup: the requested identity must match a bookable slot
        let slot = sqlx::query_as::<_, ClassSlotDBResponse>(
            "SELECT * FROM class_slots WHERE id = $1 AND enabled",
        )
        .bind(request.slot_id)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(slot) = slot else {
            return Ok(Rejected(RejectReason::ClassNotFound));
        };
        let identity_matches = slot.course_id == request.course_id
            && slot.time_label == request.time_label
            && slot.weekday == request.weekday
            && weekday_name(request.class_date) == slot.weekday;
        if !identity_matches || (slot.admin_only && !request.admin_override) {
            return Ok(Rejected(RejectReason::ClassNotFound));
        }

        // 2. Duplicate: one reservation per student per day, whatever the slot
        let duplicate: Option<(ReservationId,)> = sqlx::query_as(
            r#"
            SELECT id FROM reservations
            WHERE student_refer = $1 AND class_date = $2 AND ($3::BIGINT IS NULL OR id != $3)
            "#,
        )
        .bind(&request.student_refer)
        .bind(request.class_date)
        .bind(request.existing_reservation)
        .fetch_optional(&mut **tx)
        .await?;
        if duplicate.is_some() {
            return Ok(Rejected(RejectReason::DuplicateBooking));
        }

        // 3. Capacity: a closure zeroes the effective maximum for the date
        let closed: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM slot_closures WHERE slot_id = $1 AND closure_date = $2")
                .bind(request.slot_id)
                .bind(request.class_date)
                .fetch_optional(&mut **tx)
                .await?;
        let effective_max = if closed.is_some() { 0 } else { i64::from(slot.max_persons) };

        let (occupancy,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM reservations
            WHERE slot_id = $1 AND class_date = $2 AND ($3::BIGINT IS NULL OR id != $3)
            "#,
        )
        .bind(request.slot_id)
        .bind(request.class_date)
        .bind(request.existing_reservation)
        .fetch_one(&mut **tx)
        .await?;

        let over_capacity = occupancy >= effective_max;
        if over_capacity && !request.admin_override {
            return Ok(Rejected(RejectReason::ClassFull));
        }

        // 4. Entitlement: skipped entirely on the free path
        let entitlement_refer = if request.free {
            None
        } else {
            let mut ledger = Entitlements::new(&mut **tx);
            let Some(entitlement) = ledger
                .active_for_student_course(&request.student_refer, request.course_id)
                .await?
            else {
                return Ok(Rejected(RejectReason::NoEntitlement));
            };

            match ledger
                .ensure_expiry(&entitlement.refer, request.class_date, request.today)
                .await?
            {
                ExpiryCheck::Valid | ExpiryCheck::Anchored { .. } => {}
                ExpiryCheck::Lapsed => {
                    return Ok(Rejected(RejectReason::EntitlementExpired { expiry: None }));
                }
                ExpiryCheck::BeyondExpiry { expiry } => {
                    return Ok(Rejected(RejectReason::EntitlementExpired { expiry: Some(expiry) }));
                }
            }

            // 5a. Consume on create only; a reschedule keeps its credit
            if request.existing_reservation.is_none() {
                match ledger.consume_credit(&entitlement.refer).await? {
                    CreditOutcome::Applied { .. } | CreditOutcome::Skipped => {}
                    CreditOutcome::Insufficient => {
                        return Ok(Rejected(RejectReason::NoCreditsRemaining));
                    }
                }
            }
            Some(entitlement.refer)
        };

        // 5b. Persist
        let reservation = match request.existing_reservation {
            None => {
                let create = ReservationCreateDBRequest {
                    student_refer: request.student_refer.clone(),
                    slot_id: request.slot_id,
                    class_date: request.class_date,
                    time_label: request.time_label.clone(),
                    course_id: request.course_id,
                    entitlement_refer,
                    free: request.free,
                    created_by: request.created_by.clone(),
                };
                insert_reservation(tx, &create).await?
            }
            Some(id) => {
                sqlx::query_as::<_, ReservationDBResponse>(
                    r#"
                    UPDATE reservations SET
                        slot_id = $2, class_date = $3, time_label = $4, course_id = $5,
                        updated_by = $6, updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(request.slot_id)
                .bind(request.class_date)
                .bind(&request.time_label)
                .bind(request.course_id)
                .bind(&request.created_by)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or(DbError::NotFound)?
            }
        };

        Ok(AdmissionOutcome::Admitted { reservation, over_capacity })
    }

    /// Delete a reservation and restore its credit (unless free or trial).
    ///
    /// Must not fail when the backing entitlement has since been deleted;
    /// the reservation still goes away, the credit is simply gone with it.
    #[instrument(skip(self), err)]
    pub async fn cancel(&mut self, id: ReservationId, _cancelled_by: &str) -> Result<CancelOutcome> {
        let mut tx = self.db.begin().await?;

        let reservation = sqlx::query_as::<_, ReservationDBResponse>(
            "DELETE FROM reservations WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(reservation) = reservation else {
            tx.rollback().await?;
            return Ok(CancelOutcome::NotFound);
        };

        let mut credit_restored = false;
        if !reservation.free {
            if let Some(refer) = &reservation.entitlement_refer {
                match Entitlements::new(&mut *tx).restore_credit(refer).await {
                    Ok(CreditOutcome::Applied { .. }) => credit_restored = true,
                    Ok(CreditOutcome::Skipped | CreditOutcome::Insufficient) => {}
                    // Entitlement deleted since booking: cancel anyway
                    Err(DbError::NotFound) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        tx.commit().await?;
        Ok(CancelOutcome::Cancelled { credit_restored })
    }

    #[instrument(skip(self), err)]
    pub async fn get(&mut self, id: ReservationId) -> Result<Option<ReservationDBResponse>> {
        let reservation =
            sqlx::query_as::<_, ReservationDBResponse>("SELECT * FROM reservations WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.db)
                .await?;
        Ok(reservation)
    }

    /// Class list for one date, joined with student and payment context.
    #[instrument(skip(self), err)]
    pub async fn bookings_for_date(&mut self, date: NaiveDate) -> Result<Vec<BookingRowDBResponse>> {
        let rows = sqlx::query_as::<_, BookingRowDBResponse>(
            r#"
            SELECT
                r.id, r.student_refer, r.slot_id, r.class_date, r.time_label, r.course_id,
                r.entitlement_refer, r.free, r.checked_in,
                s.first_name, s.last_name, s.nickname, s.date_of_birth, s.level, s.short_note,
                e.paid AS entitlement_paid,
                e.trial AS entitlement_trial,
                e.kind AS entitlement_kind,
                e.remaining AS entitlement_remaining,
                e.expiry_date AS entitlement_expiry
            FROM reservations r
            JOIN students s ON s.refer = r.student_refer
            LEFT JOIN entitlements e ON e.refer = r.entitlement_refer
            WHERE r.class_date = $1
            ORDER BY r.time_label, r.id
            "#,
        )
        .bind(date)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    /// A student's reservations from a date onward, soonest first.
    #[instrument(skip(self), err)]
    pub async fn upcoming_for_student(
        &mut self,
        student_refer: &str,
        from_date: NaiveDate,
    ) -> Result<Vec<ReservationDBResponse>> {
        let rows = sqlx::query_as::<_, ReservationDBResponse>(
            r#"
            SELECT * FROM reservations
            WHERE student_refer = $1 AND class_date >= $2
            ORDER BY class_date, time_label
            "#,
        )
        .bind(student_refer)
        .bind(from_date)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    /// Flip the attendance flag.
    #[instrument(skip(self), err)]
    pub async fn set_checked_in(
        &mut self,
        id: ReservationId,
        checked_in: bool,
        updated_by: &str,
    ) -> Result<ReservationDBResponse> {
        let reservation = sqlx::query_as::<_, ReservationDBResponse>(
            r#"
            UPDATE reservations
            SET checked_in = $2, updated_by = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(checked_in)
        .bind(updated_by)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(reservation)
    }
}

async fn insert_reservation(
    tx: &mut PgTransaction<'_>,
    request: &ReservationCreateDBRequest,
) -> Result<ReservationDBResponse> {
    let reservation = sqlx::query_as::<_, ReservationDBResponse>(
        r#"
        INSERT INTO reservations
            (student_refer, slot_id, class_date, time_label, course_id, entitlement_refer, free, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(&request.student_refer)
    .bind(request.slot_id)
    .bind(request.class_date)
    .bind(&request.time_label)
    .bind(request.course_id)
    .bind(&request.entitlement_refer)
    .bind(request.free)
    .bind(&request.created_by)
    .fetch_one(&mut **tx)
    .await?;
    Ok(reservation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::entitlements::EntitlementKind;
    use crate::db::handlers::{
        courses::Courses,
        repository::Repository,
        slots::ClassSlots,
        students::Students,
    };
    use crate::db::models::{
        courses::CourseCreateDBRequest,
        entitlements::EntitlementCreateDBRequest,
        slots::ClassSlotCreateDBRequest,
        students::StudentCreateDBRequest,
    };
    use sqlx::PgPool;

    struct Fixture {
        course_id: CourseId,
        slot_id: SlotId,
        student_refer: String,
        entitlement_refer: String,
    }

    /// Monday 2024-01-15, slot capacity 5, counted entitlement with 10 credits.
    async fn seed(pool: &PgPool, remaining: i32) -> Fixture {
        let mut conn = pool.acquire().await.unwrap();

        let course_id = Courses::new(&mut conn)
            .create(&CourseCreateDBRequest {
                name: "Learn to Swim".to_string(),
                short_name: "LTS".to_string(),
                refer_code: "LS".to_string(),
                enabled: true,
            })
            .await
            .unwrap()
            .id;

        let slot_id = ClassSlots::new(&mut conn)
            .create(&ClassSlotCreateDBRequest {
                course_id,
                weekday: "monday".to_string(),
                time_label: "10:00".to_string(),
                max_persons: 5,
                enabled: true,
                admin_only: false,
            })
            .await
            .unwrap()
            .id;

        let student_refer = Students::new(&mut conn)
            .create(&StudentCreateDBRequest {
                family_id: None,
                first_name: Some("Mina".to_string()),
                middle_name: None,
                last_name: Some("Chai".to_string()),
                nickname: Some("Mimi".to_string()),
                gender: None,
                date_of_birth: None,
                school: None,
                level: None,
                short_note: None,
                created_by: Some("admin".to_string()),
            })
            .await
            .unwrap()
            .refer;

        let entitlement_refer = Entitlements::new(&mut conn)
            .create(&EntitlementCreateDBRequest {
                course_id,
                kind: EntitlementKind::Counted,
                remaining,
                period_months: 3,
                start_date: None,
                expiry_date: None,
                paid: true,
                paid_at: None,
                slip_reference: None,
                trial: false,
                owners: vec![student_refer.clone()],
                created_by: Some("admin".to_string()),
            })
            .await
            .unwrap()
            .entitlement
            .refer;

        Fixture { course_id, slot_id, student_refer, entitlement_refer }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn request(fixture: &Fixture) -> AdmissionRequest {
        AdmissionRequest {
            student_refer: fixture.student_refer.clone(),
            slot_id: fixture.slot_id,
            class_date: monday(),
            time_label: "10:00".to_string(),
            course_id: fixture.course_id,
            weekday: "monday".to_string(),
            free: false,
            admin_override: false,
            created_by: "parent1".to_string(),
            today: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            existing_reservation: None,
        }
    }

    async fn admit(pool: &PgPool, request: &AdmissionRequest) -> AdmissionOutcome {
        let mut conn = pool.acquire().await.unwrap();
        Reservations::new(&mut conn).admit(request).await.unwrap()
    }

    fn assert_rejected(outcome: AdmissionOutcome, reason: RejectReason) {
        match outcome {
            AdmissionOutcome::Rejected(actual) => assert_eq!(actual, reason),
            AdmissionOutcome::Admitted { .. } => panic!("expected rejection {reason:?}"),
        }
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn admits_and_consumes_one_credit(pool: PgPool) {
        let fixture = seed(&pool, 10).await;
        let outcome = admit(&pool, &request(&fixture)).await;

        let AdmissionOutcome::Admitted { reservation, over_capacity } = outcome else {
            panic!("expected admission");
        };
        assert!(!over_capacity);
        assert_eq!(reservation.entitlement_refer.as_deref(), Some(fixture.entitlement_refer.as_str()));

        let mut conn = pool.acquire().await.unwrap();
        let entitlement = Entitlements::new(&mut conn)
            .get_row(&fixture.entitlement_refer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entitlement.remaining, 9);
        // First use anchored the validity window to the class date
        assert_eq!(entitlement.start_date, Some(monday()));
        assert_eq!(entitlement.expiry_date, NaiveDate::from_ymd_opt(2024, 4, 15));
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn second_booking_same_day_is_duplicate(pool: PgPool) {
        let fixture = seed(&pool, 10).await;
        admit(&pool, &request(&fixture)).await;

        // Even into a different slot on the same day
        let mut conn = pool.acquire().await.unwrap();
        let other_slot = ClassSlots::new(&mut conn)
            .create(&ClassSlotCreateDBRequest {
                course_id: fixture.course_id,
                weekday: "monday".to_string(),
                time_label: "11:00".to_string(),
                max_persons: 5,
                enabled: true,
                admin_only: false,
            })
            .await
            .unwrap();
        drop(conn);

        let mut second = request(&fixture);
        second.slot_id = other_slot.id;
        second.time_label = "11:00".to_string();
        assert_rejected(admit(&pool, &second).await, RejectReason::DuplicateBooking);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn full_class_rejects_self_service_but_warns_admin(pool: PgPool) {
        let fixture = seed(&pool, 10).await;

        // Fill all 5 seats with separate students sharing the entitlement course
        let mut conn = pool.acquire().await.unwrap();
        for n in 0..5 {
            let student = Students::new(&mut conn)
                .create(&StudentCreateDBRequest {
                    family_id: None,
                    first_name: Some(format!("Filler{n}")),
                    middle_name: None,
                    last_name: None,
                    nickname: None,
                    gender: None,
                    date_of_birth: None,
                    school: None,
                    level: None,
                    short_note: None,
                    created_by: Some("admin".to_string()),
                })
                .await
                .unwrap();
            let mut filler = request(&fixture);
            filler.student_refer = student.refer;
            filler.free = true; // skip entitlement plumbing for fillers
            let outcome = Reservations::new(&mut conn).admit(&filler).await.unwrap();
            assert!(matches!(outcome, AdmissionOutcome::Admitted { .. }));
        }
        drop(conn);

        assert_rejected(admit(&pool, &request(&fixture)).await, RejectReason::ClassFull);

        let mut admin_request = request(&fixture);
        admin_request.admin_override = true;
        let AdmissionOutcome::Admitted { over_capacity, .. } = admit(&pool, &admin_request).await else {
            panic!("admin booking should admit past capacity");
        };
        assert!(over_capacity);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn credit_exhaustion_rejects_then_cancel_restores(pool: PgPool) {
        let fixture = seed(&pool, 1).await;

        let AdmissionOutcome::Admitted { reservation, .. } = admit(&pool, &request(&fixture)).await else {
            panic!("expected admission");
        };

        // remaining is now 0: a booking on another day runs out of credit
        let mut next_week = request(&fixture);
        next_week.class_date = NaiveDate::from_ymd_opt(2024, 1, 22).unwrap();
        assert_rejected(admit(&pool, &next_week).await, RejectReason::NoCreditsRemaining);

        // cancelling the first booking restores the credit to 1
        let mut conn = pool.acquire().await.unwrap();
        let outcome = Reservations::new(&mut conn).cancel(reservation.id, "admin").await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled { credit_restored: true });

        let entitlement = Entitlements::new(&mut conn)
            .get_row(&fixture.entitlement_refer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entitlement.remaining, 1);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn cancel_missing_reservation_is_a_result_not_an_error(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let outcome = Reservations::new(&mut conn).cancel(999, "admin").await.unwrap();
        assert_eq!(outcome, CancelOutcome::NotFound);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn expired_entitlement_rejects_with_expiry_date(pool: PgPool) {
        let fixture = seed(&pool, 10).await;

        // Anchor the window so expiry is 2024-01-10
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("UPDATE entitlements SET start_date = $2, expiry_date = $3 WHERE refer = $1")
            .bind(&fixture.entitlement_refer)
            .bind(NaiveDate::from_ymd_opt(2023, 10, 10).unwrap())
            .bind(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        // Booking 2024-01-15 while today is before expiry: date beyond window
        let mut beyond = request(&fixture);
        beyond.today = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_rejected(
            admit(&pool, &beyond).await,
            RejectReason::EntitlementExpired { expiry: NaiveDate::from_ymd_opt(2024, 1, 10) },
        );

        // Today past expiry: the whole entitlement lapsed
        let mut lapsed = request(&fixture);
        lapsed.today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_rejected(admit(&pool, &lapsed).await, RejectReason::EntitlementExpired { expiry: None });
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn free_booking_skips_entitlement_checks(pool: PgPool) {
        let fixture = seed(&pool, 0).await; // no credits at all

        let mut free = request(&fixture);
        free.free = true;
        let AdmissionOutcome::Admitted { reservation, .. } = admit(&pool, &free).await else {
            panic!("free booking should admit without credits");
        };
        assert!(reservation.free);
        assert!(reservation.entitlement_refer.is_none());
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn reschedule_excludes_itself_and_keeps_credit(pool: PgPool) {
        let fixture = seed(&pool, 5).await;

        let AdmissionOutcome::Admitted { reservation, .. } = admit(&pool, &request(&fixture)).await else {
            panic!("expected admission");
        };

        // Move to the following Monday through the same machine
        let mut reschedule = request(&fixture);
        reschedule.class_date = NaiveDate::from_ymd_opt(2024, 1, 22).unwrap();
        reschedule.existing_reservation = Some(reservation.id);
        let AdmissionOutcome::Admitted { reservation: moved, .. } = admit(&pool, &reschedule).await else {
            panic!("reschedule should admit");
        };
        assert_eq!(moved.id, reservation.id);
        assert_eq!(moved.class_date, reschedule.class_date);

        // No second credit was taken
        let mut conn = pool.acquire().await.unwrap();
        let entitlement = Entitlements::new(&mut conn)
            .get_row(&fixture.entitlement_refer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entitlement.remaining, 4);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn closure_zeroes_availability(pool: PgPool) {
        let fixture = seed(&pool, 10).await;

        let mut conn = pool.acquire().await.unwrap();
        ClassSlots::new(&mut conn)
            .add_closure(fixture.slot_id, monday(), Some("pool maintenance"))
            .await
            .unwrap();
        drop(conn);

        assert_rejected(admit(&pool, &request(&fixture)).await, RejectReason::ClassFull);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn unknown_slot_identity_is_class_not_found(pool: PgPool) {
        let fixture = seed(&pool, 10).await;

        let mut wrong_time = request(&fixture);
        wrong_time.time_label = "23:00".to_string();
        assert_rejected(admit(&pool, &wrong_time).await, RejectReason::ClassNotFound);

        let mut wrong_day = request(&fixture);
        wrong_day.class_date = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(); // a Tuesday
        assert_rejected(admit(&pool, &wrong_day).await, RejectReason::ClassNotFound);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn student_without_entitlement_is_rejected(pool: PgPool) {
        let fixture = seed(&pool, 10).await;

        let mut conn = pool.acquire().await.unwrap();
        let outsider = Students::new(&mut conn)
            .create(&StudentCreateDBRequest {
                family_id: None,
                first_name: Some("Somchai".to_string()),
                middle_name: None,
                last_name: None,
                nickname: None,
                gender: None,
                date_of_birth: None,
                school: None,
                level: None,
                short_note: None,
                created_by: Some("admin".to_string()),
            })
            .await
            .unwrap()
            .refer;
        drop(conn);

        let mut uncovered = request(&fixture);
        uncovered.student_refer = outsider;
        assert_rejected(admit(&pool, &uncovered).await, RejectReason::NoEntitlement);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn trial_entitlement_keeps_its_balance_through_book_and_cancel(pool: PgPool) {
        let fixture = seed(&pool, 3).await;

        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("UPDATE entitlements SET trial = TRUE WHERE refer = $1")
            .bind(&fixture.entitlement_refer)
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let AdmissionOutcome::Admitted { reservation, .. } = admit(&pool, &request(&fixture)).await else {
            panic!("trial booking should admit");
        };
        assert_eq!(
            reservation.entitlement_refer.as_deref(),
            Some(fixture.entitlement_refer.as_str())
        );

        let mut conn = pool.acquire().await.unwrap();
        let entitlement = Entitlements::new(&mut conn)
            .get_row(&fixture.entitlement_refer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entitlement.remaining, 3);

        // Cancelling a trial booking restores nothing either
        let outcome = Reservations::new(&mut conn).cancel(reservation.id, "admin").await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled { credit_restored: false });

        let entitlement = Entitlements::new(&mut conn)
            .get_row(&fixture.entitlement_refer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entitlement.remaining, 3);
    }

    #[test_log::test(sqlx::test(migrator = "crate::MIGRATOR"))]
    async fn concurrent_admissions_never_both_take_the_last_seat(pool: PgPool) {
        let fixture = seed(&pool, 10).await;

        // A one-seat slot, contested by two different students
        let mut conn = pool.acquire().await.unwrap();
        let slot = ClassSlots::new(&mut conn)
            .create(&ClassSlotCreateDBRequest {
                course_id: fixture.course_id,
                weekday: "monday".to_string(),
                time_label: "12:00".to_string(),
                max_persons: 1,
                enabled: true,
                admin_only: false,
            })
            .await
            .unwrap();
        let rival = Students::new(&mut conn)
            .create(&StudentCreateDBRequest {
                family_id: None,
                first_name: Some("Somchai".to_string()),
                middle_name: None,
                last_name: None,
                nickname: None,
                gender: None,
                date_of_birth: None,
                school: None,
                level: None,
                short_note: None,
                created_by: Some("admin".to_string()),
            })
            .await
            .unwrap()
            .refer;
        drop(conn);

        let mut first = request(&fixture);
        first.slot_id = slot.id;
        first.time_label = "12:00".to_string();
        first.free = true; // isolate the capacity race from the ledger
        let mut second = first.clone();
        second.student_refer = rival;

        let (a, b) = tokio::join!(
            async {
                let mut conn = pool.acquire().await.unwrap();
                Reservations::new(&mut conn).admit(&first).await
            },
            async {
                let mut conn = pool.acquire().await.unwrap();
                Reservations::new(&mut conn).admit(&second).await
            },
        );

        let results = [a, b];
        let admitted = results
            .iter()
            .filter(|outcome| matches!(outcome, Ok(AdmissionOutcome::Admitted { .. })))
            .count();
        assert_eq!(admitted, 1, "exactly one admission may take the last seat: {results:?}");

        // The loser either saw the winner's row (full) or lost the
        // serialization race; it never errors with anything else
        for outcome in results {
            match outcome {
                Ok(AdmissionOutcome::Admitted { .. }) => {}
                Ok(AdmissionOutcome::Rejected(reason)) => {
                    assert_eq!(reason, RejectReason::ClassFull);
                }
                Err(err) => assert!(matches!(err, DbError::SerializationFailure), "{err:?}"),
            }
        }

        let mut conn = pool.acquire().await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reservations WHERE slot_id = $1")
            .bind(slot.id)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
