//! Cancellation engine: release a seat and refund paid bookings

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use common::mailer::{Email, Mailer};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    Actor, BOOKING_COLUMNS, EngineError, EngineResult, decode_error, describe_class,
    email_booking_owner, fetch_contact, insert_notification, messages,
};
use crate::{
    calendar,
    models::{Booking, BookingStatus, notification::kind},
};

/// When clients may still cancel
#[derive(Debug, Clone, Copy)]
pub struct CancellationPolicy {
    /// Minimum notice before class start
    pub window: Duration,
    /// Studio wall clock offset used to read class dates and times
    pub utc_offset: FixedOffset,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            window: Duration::hours(8),
            utc_offset: FixedOffset::east_opt(0).expect("zero offset is valid"),
        }
    }
}

/// Booking fields the cancellation checks read
#[derive(Debug, Clone)]
pub struct BookingSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub status: BookingStatus,
    pub class_name: String,
    pub class_date: NaiveDate,
    pub class_time: String,
}

/// `class_start - now >= window`; exactly on the boundary is still allowed
pub fn cancellation_allowed(
    class_start: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    class_start - now >= window
}

/// Check a cancellation request against status, ownership and notice period
pub fn check_cancellation(
    booking: &BookingSnapshot,
    actor: Actor,
    now: DateTime<Utc>,
    policy: &CancellationPolicy,
) -> EngineResult<()> {
    if booking.status == BookingStatus::Cancelled {
        return Err(EngineError::NotFound(messages::BOOKING_NOT_FOUND.to_string()));
    }
    if !booking.status.is_cancellable() {
        return Err(EngineError::InvalidState(format!(
            "A {} booking can no longer be cancelled",
            booking.status
        )));
    }
    if !actor.is_admin && actor.id != booking.user_id {
        return Err(EngineError::Forbidden(messages::NOT_BOOKING_OWNER.to_string()));
    }
    if actor.is_admin {
        return Ok(());
    }

    let start = calendar::class_start(booking.class_date, &booking.class_time, policy.utc_offset)
        .ok_or_else(|| {
            EngineError::InvalidState(format!(
                "Class time '{}' is not recognised",
                booking.class_time
            ))
        })?;

    if !cancellation_allowed(start, now, policy.window) {
        return Err(EngineError::Rejected(format!(
            "Cancellations are only allowed at least {} hours before class",
            policy.window.num_hours()
        )));
    }

    Ok(())
}

/// Cancels bookings for clients and admins
#[derive(Clone)]
pub struct CancellationEngine {
    pool: PgPool,
    mailer: Mailer,
    policy: CancellationPolicy,
}

impl CancellationEngine {
    pub fn new(pool: PgPool, mailer: Mailer, policy: CancellationPolicy) -> Self {
        Self {
            pool,
            mailer,
            policy,
        }
    }

    /// Cancel the live booking `user_id` holds on `class_id`
    pub async fn cancel_for_class(
        &self,
        class_id: Uuid,
        user_id: Uuid,
        actor: Actor,
    ) -> EngineResult<Booking> {
        let booking_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM bookings
            WHERE class_id = $1 AND user_id = $2 AND status <> 'cancelled'
            "#,
        )
        .bind(class_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let booking_id = booking_id
            .ok_or_else(|| EngineError::NotFound(messages::BOOKING_NOT_FOUND.to_string()))?;

        self.cancel(booking_id, actor).await
    }

    /// Cancel a booking by id
    pub async fn cancel(&self, booking_id: Uuid, actor: Actor) -> EngineResult<Booking> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT b.id, b.user_id, b.class_id, b.status,
                   c.name AS class_name, c.date AS class_date, c.time AS class_time
            FROM bookings b
            JOIN classes c ON c.id = b.class_id
            WHERE b.id = $1
            FOR UPDATE OF b
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| EngineError::NotFound(messages::BOOKING_NOT_FOUND.to_string()))?;

        let snapshot = BookingSnapshot {
            id: row.get("id"),
            user_id: row.get("user_id"),
            class_id: row.get("class_id"),
            status: row
                .get::<String, _>("status")
                .parse()
                .map_err(decode_error)?,
            class_name: row.get("class_name"),
            class_date: row.get("class_date"),
            class_time: row.get("class_time"),
        };

        check_cancellation(&snapshot, actor, now, &self.policy)?;

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings SET status = 'cancelled', updated_at = NOW() \
             WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(snapshot.id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE classes SET current_bookings = GREATEST(current_bookings - 1, 0) WHERE id = $1",
        )
        .bind(snapshot.class_id)
        .execute(&mut *tx)
        .await?;

        if snapshot.status.is_refundable() {
            let refunded = sqlx::query(
                r#"
                UPDATE packages
                SET classes_remaining = LEAST(classes_remaining + 1, total_classes)
                WHERE id = (
                    SELECT id FROM packages
                    WHERE user_id = $1 AND active
                    ORDER BY end_date DESC
                    LIMIT 1
                )
                "#,
            )
            .bind(snapshot.user_id)
            .execute(&mut *tx)
            .await?;

            if refunded.rows_affected() == 0 {
                warn!(
                    "No active package to refund for user {} (booking {})",
                    snapshot.user_id, snapshot.id
                );
            }
        }

        let (owner_name, owner_email) = fetch_contact(&mut tx, snapshot.user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(messages::USER_NOT_FOUND.to_string()))?;
        let description =
            describe_class(&snapshot.class_name, snapshot.class_date, &snapshot.class_time);

        if actor.is_admin && actor.id != snapshot.user_id {
            insert_notification(
                &mut tx,
                snapshot.user_id,
                kind::BOOKING_REMOVED,
                &format!("The studio removed your booking for {}", description),
            )
            .await?;
        } else {
            let admin_ids: Vec<Uuid> =
                sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin'")
                    .fetch_all(&mut *tx)
                    .await?;

            let message = format!(
                "{} cancelled their booking for {} at {}",
                owner_name,
                description,
                now.with_timezone(&self.policy.utc_offset).format("%Y-%m-%d %H:%M")
            );
            for admin_id in admin_ids {
                insert_notification(&mut tx, admin_id, kind::BOOKING_CANCELLED, &message).await?;
            }
        }

        tx.commit().await?;

        info!(
            "Booking {} cancelled by {} (refunded: {})",
            snapshot.id,
            actor.id,
            snapshot.status.is_refundable()
        );

        let email = Email::new(
            owner_email,
            "Booking cancelled",
            format!(
                "Hi {}, your booking for {} has been cancelled.",
                owner_name, description
            ),
        );
        email_booking_owner(&self.pool, &self.mailer, snapshot.id, email).await;

        Ok(booking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: BookingStatus, owner: Uuid) -> BookingSnapshot {
        BookingSnapshot {
            id: Uuid::new_v4(),
            user_id: owner,
            class_id: Uuid::new_v4(),
            status,
            class_name: "Reformer".to_string(),
            class_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            class_time: "18:00".to_string(),
        }
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn client(id: Uuid) -> Actor {
        Actor {
            id,
            is_admin: false,
        }
    }

    #[test]
    fn test_window_boundary() {
        let start = at("2026-10-20T18:00:00Z");
        let window = Duration::hours(8);
        // 8h00m before class: allowed
        assert!(cancellation_allowed(start, at("2026-10-20T10:00:00Z"), window));
        // 7h59m before class: rejected
        assert!(!cancellation_allowed(start, at("2026-10-20T10:01:00Z"), window));
        assert!(!cancellation_allowed(start, at("2026-10-20T19:00:00Z"), window));
    }

    #[test]
    fn test_owner_cancels_with_enough_notice() {
        let owner = Uuid::new_v4();
        let booking = snapshot(BookingStatus::Confirmed, owner);
        let result = check_cancellation(
            &booking,
            client(owner),
            at("2026-10-20T10:00:00Z"),
            &CancellationPolicy::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_owner_rejected_inside_window() {
        let owner = Uuid::new_v4();
        let booking = snapshot(BookingStatus::Confirmed, owner);
        let result = check_cancellation(
            &booking,
            client(owner),
            at("2026-10-20T10:01:00Z"),
            &CancellationPolicy::default(),
        );
        assert!(matches!(result, Err(EngineError::Rejected(_))));
    }

    #[test]
    fn test_window_respects_studio_offset() {
        // 18:00 at UTC+2 is 16:00Z, so 08:00Z is exactly 8h before
        let owner = Uuid::new_v4();
        let booking = snapshot(BookingStatus::Confirmed, owner);
        let policy = CancellationPolicy {
            utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
            ..CancellationPolicy::default()
        };
        let last_chance = at("2026-10-20T08:00:00Z");
        let too_late = at("2026-10-20T08:01:00Z");
        assert!(check_cancellation(&booking, client(owner), last_chance, &policy).is_ok());
        assert!(check_cancellation(&booking, client(owner), too_late, &policy).is_err());
    }

    #[test]
    fn test_admin_bypasses_window_and_ownership() {
        let booking = snapshot(BookingStatus::PreAdded, Uuid::new_v4());
        let admin = Actor {
            id: Uuid::new_v4(),
            is_admin: true,
        };
        let result = check_cancellation(
            &booking,
            admin,
            at("2026-10-20T17:59:00Z"),
            &CancellationPolicy::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_other_client_is_forbidden() {
        let booking = snapshot(BookingStatus::Confirmed, Uuid::new_v4());
        let result = check_cancellation(
            &booking,
            client(Uuid::new_v4()),
            at("2026-10-19T10:00:00Z"),
            &CancellationPolicy::default(),
        );
        assert!(matches!(result, Err(EngineError::Forbidden(_))));
    }

    #[test]
    fn test_cancelled_and_attended_bookings_cannot_be_cancelled() {
        let owner = Uuid::new_v4();
        let now = at("2026-10-19T10:00:00Z");
        let policy = CancellationPolicy::default();

        let cancelled = snapshot(BookingStatus::Cancelled, owner);
        assert!(matches!(
            check_cancellation(&cancelled, client(owner), now, &policy),
            Err(EngineError::NotFound(_))
        ));

        let completed = snapshot(BookingStatus::Completed, owner);
        assert!(matches!(
            check_cancellation(&completed, client(owner), now, &policy),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn test_unparseable_class_time_is_invalid_state_for_clients() {
        let owner = Uuid::new_v4();
        let mut booking = snapshot(BookingStatus::Confirmed, owner);
        booking.class_time = "after lunch".to_string();
        let result = check_cancellation(
            &booking,
            client(owner),
            at("2026-10-19T10:00:00Z"),
            &CancellationPolicy::default(),
        );
        assert!(matches!(result, Err(EngineError::InvalidState(_))));
    }
}
