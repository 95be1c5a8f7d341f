//! Bulk class removal, counter reconciliation and package expiry warnings
//!
//! Shared by the admin routes and the scheduler service.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::mailer::{Email, Mailer};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::insert_notification;
use crate::models::notification::kind;

/// Which classes a bulk delete touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassScope {
    All,
    /// Classes dated strictly before the given day
    Before(NaiveDate),
    One(Uuid),
}

/// What a bulk delete removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionSummary {
    pub classes: u64,
    pub bookings: u64,
    pub waitlist_entries: u64,
    pub refunded_credits: i64,
}

/// Last day that is purged: `today - retention_days`, exclusive
pub fn retention_cutoff(today: NaiveDate, retention_days: i64) -> NaiveDate {
    today - Duration::days(retention_days)
}

/// Delete classes with their waitlist and booking rows
///
/// Confirmed bookings on classes dated `today` or later give their credit back
/// to the owner's active package first.
pub async fn delete_classes(
    pool: &PgPool,
    scope: ClassScope,
    today: NaiveDate,
) -> Result<DeletionSummary> {
    let mut tx = pool.begin().await?;

    let ids: Vec<Uuid> = match scope {
        ClassScope::All => {
            sqlx::query_scalar("SELECT id FROM classes FOR UPDATE")
                .fetch_all(&mut *tx)
                .await?
        }
        ClassScope::Before(cutoff) => {
            sqlx::query_scalar("SELECT id FROM classes WHERE date < $1 FOR UPDATE")
                .bind(cutoff)
                .fetch_all(&mut *tx)
                .await?
        }
        ClassScope::One(id) => {
            sqlx::query_scalar("SELECT id FROM classes WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?
        }
    };

    if ids.is_empty() {
        tx.commit().await?;
        return Ok(DeletionSummary::default());
    }

    let refunded_credits: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM bookings b
        JOIN classes c ON c.id = b.class_id
        WHERE b.class_id = ANY($1) AND b.status = 'confirmed' AND c.date >= $2
        "#,
    )
    .bind(&ids)
    .bind(today)
    .fetch_one(&mut *tx)
    .await?;

    if refunded_credits > 0 {
        sqlx::query(
            r#"
            WITH refunds AS (
                SELECT b.user_id, COUNT(*)::INT AS credits
                FROM bookings b
                JOIN classes c ON c.id = b.class_id
                WHERE b.class_id = ANY($1) AND b.status = 'confirmed' AND c.date >= $2
                GROUP BY b.user_id
            )
            UPDATE packages p
            SET classes_remaining = LEAST(p.classes_remaining + r.credits, p.total_classes)
            FROM refunds r
            WHERE p.user_id = r.user_id AND p.active
            "#,
        )
        .bind(&ids)
        .bind(today)
        .execute(&mut *tx)
        .await?;
    }

    let waitlist_entries = sqlx::query("DELETE FROM waitlist WHERE class_id = ANY($1)")
        .bind(&ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let bookings = sqlx::query("DELETE FROM bookings WHERE class_id = ANY($1)")
        .bind(&ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let classes = sqlx::query("DELETE FROM classes WHERE id = ANY($1)")
        .bind(&ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    let summary = DeletionSummary {
        classes,
        bookings,
        waitlist_entries,
        refunded_credits,
    };
    info!("Deleted classes ({:?}): {:?}", scope, summary);

    Ok(summary)
}

/// Remove classes older than the retention period
pub async fn purge_past_classes(
    pool: &PgPool,
    today: NaiveDate,
    retention_days: i64,
) -> Result<DeletionSummary> {
    let cutoff = retention_cutoff(today, retention_days);
    debug!("Purging classes dated before {}", cutoff);
    delete_classes(pool, ClassScope::Before(cutoff), today).await
}

/// Reset `current_bookings` to the live booking count
///
/// Limited to `class_ids` when given. Returns how many counters had drifted.
pub async fn reconcile_class_counters(pool: &PgPool, class_ids: Option<&[Uuid]>) -> Result<u64> {
    let fixed = sqlx::query(
        r#"
        UPDATE classes c
        SET current_bookings = counts.live
        FROM (
            SELECT cl.id, COUNT(b.id)::INT AS live
            FROM classes cl
            LEFT JOIN bookings b ON b.class_id = cl.id AND b.status <> 'cancelled'
            WHERE $1::UUID[] IS NULL OR cl.id = ANY($1)
            GROUP BY cl.id
        ) counts
        WHERE c.id = counts.id AND c.current_bookings <> counts.live
        "#,
    )
    .bind(class_ids.map(|ids| ids.to_vec()))
    .execute(pool)
    .await?
    .rows_affected();

    if fixed > 0 {
        info!("Reconciled {} class booking counters", fixed);
    }

    Ok(fixed)
}

/// Warn holders of packages ending within `warning_days`
///
/// Each package is warned once; `expiry_notified_at` is cleared again when an
/// admin moves the end date.
pub async fn notify_expiring_packages(
    pool: &PgPool,
    mailer: &Mailer,
    now: DateTime<Utc>,
    warning_days: i64,
) -> Result<usize> {
    let horizon = now + Duration::days(warning_days);
    let mut tx = pool.begin().await?;

    let rows = sqlx::query(
        r#"
        SELECT p.id, p.user_id, p.name AS package_name, p.classes_remaining, p.end_date,
               u.name AS user_name, u.email
        FROM packages p
        JOIN users u ON u.id = p.user_id
        WHERE p.active
          AND p.expiry_notified_at IS NULL
          AND p.end_date >= $1
          AND p.end_date <= $2
        FOR UPDATE OF p SKIP LOCKED
        "#,
    )
    .bind(now)
    .bind(horizon)
    .fetch_all(&mut *tx)
    .await?;

    let mut emails = Vec::with_capacity(rows.len());
    for row in &rows {
        let package_id: Uuid = row.get("id");
        let user_id: Uuid = row.get("user_id");
        let package_name: String = row.get("package_name");
        let remaining: i32 = row.get("classes_remaining");
        let end_date: DateTime<Utc> = row.get("end_date");
        let user_name: String = row.get("user_name");
        let email: String = row.get("email");

        let message = format!(
            "Your package '{}' expires on {} with {} classes remaining",
            package_name,
            end_date.format("%Y-%m-%d"),
            remaining
        );
        insert_notification(&mut tx, user_id, kind::PACKAGE_EXPIRING, &message).await?;

        sqlx::query("UPDATE packages SET expiry_notified_at = $1 WHERE id = $2")
            .bind(now)
            .bind(package_id)
            .execute(&mut *tx)
            .await?;

        emails.push(Email::new(
            email,
            "Your package is about to expire",
            format!("Hi {}, {}.", user_name, message),
        ));
    }

    tx.commit().await?;

    for email in &emails {
        mailer.send_best_effort(email).await;
    }

    if !emails.is_empty() {
        info!("Sent {} package expiry warnings", emails.len());
    }

    Ok(emails.len())
}
