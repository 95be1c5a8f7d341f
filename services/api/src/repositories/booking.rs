//! Booking read and attendance queries

use anyhow::Result;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::engine::BOOKING_COLUMNS;
use crate::models::{Booking, BookingStatus, BookingWithClass};

#[derive(Clone)]
pub struct BookingRepository {
    pool: PgPool,
}

impl BookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A user's bookings with class details, soonest class first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<BookingWithClass>> {
        let rows = sqlx::query(
            r#"
            SELECT b.id, b.user_id, b.class_id, b.status, b.notified, b.created_at, b.updated_at,
                   c.name AS class_name, c.date AS class_date, c.time AS class_time
            FROM bookings b
            JOIN classes c ON c.id = b.class_id
            WHERE b.user_id = $1
            ORDER BY c.date ASC, c.time ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            bookings.push(BookingWithClass {
                booking: Booking::from_row(&row)?,
                class_name: row.get("class_name"),
                class_date: row.get("class_date"),
                class_time: row.get("class_time"),
            });
        }

        Ok(bookings)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    /// Record attendance on a live booking; `None` if it is cancelled or missing
    pub async fn set_attendance(&self, id: Uuid, attended: bool) -> Result<Option<Booking>> {
        let status = attendance_status(attended);
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status <> 'cancelled' \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }
}

pub fn attendance_status(attended: bool) -> BookingStatus {
    if attended {
        BookingStatus::Completed
    } else {
        BookingStatus::NoShow
    }
}
