//! Booking, cancellation and waitlist engines
//!
//! Each engine operation runs as one database transaction: preconditions are
//! read and checked first (first failure wins), then the mutation is applied
//! with conditional updates whose affected-row counts re-check capacity and
//! package balance, so concurrent requests cannot oversubscribe a class or
//! overspend a package. Emails go out after commit and never fail the call.

use chrono::{DateTime, Utc};
use common::mailer::{Email, Mailer};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Class, Package};

pub mod booking;
pub mod cancellation;
pub mod waitlist;

pub use booking::BookingEngine;
pub use cancellation::{CancellationEngine, CancellationPolicy};
pub use waitlist::WaitlistEngine;

/// Outcome of a rejected engine operation
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    /// Duplicate booking or waitlist entry
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidState(String),

    /// The class has no free seat; the caller may join the waitlist instead
    #[error("{0}")]
    Capacity(String),

    /// Outside the cancellation window
    #[error("{0}")]
    Rejected(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// User-facing messages shared by the engines
pub mod messages {
    pub const CLASS_NOT_FOUND: &str = "Class not found";
    pub const USER_NOT_FOUND: &str = "User not found";
    pub const BOOKING_NOT_FOUND: &str = "Booking not found";
    pub const CLASS_DISABLED: &str = "Class is not available for booking";
    pub const ALREADY_BOOKED: &str = "You have already booked this class";
    pub const ALREADY_WAITLISTED: &str = "You are already on the waitlist for this class";
    pub const CLASS_FULL: &str = "Class is full";
    pub const NO_ACTIVE_PACKAGE: &str = "No active package with remaining classes";
    pub const NOT_BOOKING_OWNER: &str = "You can only cancel your own bookings";
    pub const NOT_ON_WAITLIST: &str = "You are not on the waitlist for this class";
}

/// Who is performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub is_admin: bool,
}

pub(crate) const CLASS_COLUMNS: &str =
    "id, name, date, day_of_week, time, capacity, current_bookings, enabled, created_at";

pub(crate) const BOOKING_COLUMNS: &str =
    "id, user_id, class_id, status, notified, created_at, updated_at";

pub(crate) const PACKAGE_COLUMNS: &str = "id, user_id, name, total_classes, classes_remaining, \
     start_date, end_date, active, expiry_notified_at, created_at";

/// What is known about a (user, class) pair before anything is mutated
#[derive(Debug, Clone)]
pub struct SeatContext {
    pub class: Option<Class>,
    pub has_booking: bool,
    pub on_waitlist: bool,
    /// The user's active package, latest expiry first
    pub package: Option<Package>,
}

impl SeatContext {
    /// Read the pair's state inside the caller's transaction
    ///
    /// With `lock_class` the class row is held `FOR UPDATE` until commit, which
    /// serializes waitlist position assignment per class.
    pub(crate) async fn load(
        conn: &mut PgConnection,
        user_id: Uuid,
        class_id: Uuid,
        lock_class: bool,
    ) -> sqlx::Result<Self> {
        let class_sql = if lock_class {
            format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1 FOR UPDATE")
        } else {
            format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1")
        };

        let class = sqlx::query_as::<_, Class>(&class_sql)
            .bind(class_id)
            .fetch_optional(&mut *conn)
            .await?;

        if class.is_none() {
            return Ok(Self {
                class,
                has_booking: false,
                on_waitlist: false,
                package: None,
            });
        }

        let has_booking: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bookings
                WHERE user_id = $1 AND class_id = $2 AND status <> 'cancelled'
            )
            "#,
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_one(&mut *conn)
        .await?;

        let on_waitlist: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM waitlist WHERE user_id = $1 AND class_id = $2)",
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_one(&mut *conn)
        .await?;

        let package = active_package(&mut *conn, user_id).await?;

        Ok(Self {
            class,
            has_booking,
            on_waitlist,
            package,
        })
    }
}

/// The user's active package, preferring the one that expires last
pub(crate) async fn active_package(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> sqlx::Result<Option<Package>> {
    sqlx::query_as::<_, Package>(&format!(
        "SELECT {PACKAGE_COLUMNS} FROM packages \
         WHERE user_id = $1 AND active \
         ORDER BY end_date DESC LIMIT 1"
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

/// Name and email of a user, if the user exists
pub(crate) async fn fetch_contact(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> sqlx::Result<Option<(String, String)>> {
    sqlx::query_as::<_, (String, String)>("SELECT name, email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

pub(crate) async fn insert_notification(
    conn: &mut PgConnection,
    user_id: Uuid,
    kind: &str,
    message: &str,
) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO notifications (id, user_id, type, message) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind)
        .bind(message)
        .execute(conn)
        .await?;

    Ok(())
}

/// Remove a waitlist entry and close the gap it leaves
///
/// Returns the removed position. The position uniqueness constraint is
/// deferred, so the shift can pass through transient duplicates.
pub(crate) async fn remove_waitlist_entry(
    conn: &mut PgConnection,
    user_id: Uuid,
    class_id: Uuid,
) -> sqlx::Result<Option<i32>> {
    let removed: Option<i32> = sqlx::query_scalar(
        "DELETE FROM waitlist WHERE user_id = $1 AND class_id = $2 RETURNING position",
    )
    .bind(user_id)
    .bind(class_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(position) = removed {
        sqlx::query(
            "UPDATE waitlist SET position = position - 1 WHERE class_id = $1 AND position > $2",
        )
        .bind(class_id)
        .bind(position)
        .execute(&mut *conn)
        .await?;
    }

    Ok(removed)
}

/// Send a booking email and record delivery on the booking
pub(crate) async fn email_booking_owner(
    pool: &PgPool,
    mailer: &Mailer,
    booking_id: Uuid,
    email: Email,
) {
    match mailer.send(&email).await {
        Ok(()) => {
            if let Err(e) = sqlx::query("UPDATE bookings SET notified = TRUE WHERE id = $1")
                .bind(booking_id)
                .execute(pool)
                .await
            {
                warn!("Failed to flag booking {} as notified: {}", booking_id, e);
            }
        }
        Err(e) => warn!(
            "Failed to send '{}' email to {}: {}",
            email.subject, email.to, e
        ),
    }
}

/// Human-readable "Pilates on 2026-10-20 at 18:00"
pub(crate) fn describe_class(name: &str, date: impl std::fmt::Display, time: &str) -> String {
    format!("{} on {} at {}", name, date, time)
}

/// Rejects a stored status the platform does not know
pub(crate) fn decode_error(e: crate::models::UnknownVariant) -> EngineError {
    EngineError::Database(sqlx::Error::Decode(Box::new(e)))
}

/// Whether `package` can pay for a class at `now`
pub(crate) fn usable_package(package: Option<&Package>, now: DateTime<Utc>) -> Option<&Package> {
    package.filter(|p| p.is_usable(now))
}
