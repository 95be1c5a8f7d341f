//! Repositories for database operations

use anyhow::Result;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::engine::{CLASS_COLUMNS, remove_waitlist_entry};
use crate::models::{User, user::ClientSummary};

pub mod booking;
pub mod class;
pub mod notification;
pub mod package;
pub mod setting;

pub use booking::BookingRepository;
pub use class::ClassRepository;
pub use notification::NotificationRepository;
pub use package::PackageRepository;
pub use setting::SettingRepository;

const USER_COLUMNS: &str = "id, name, email, role, approved, created_at";

/// User repository for database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// All non-admin users with their active package summary
    pub async fn list_clients(&self) -> Result<Vec<ClientSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.email, u.approved, u.created_at,
                   p.name AS package_name, p.classes_remaining, p.end_date AS package_end_date,
                   (
                       SELECT COUNT(*)
                       FROM bookings b
                       JOIN classes c ON c.id = b.class_id
                       WHERE b.user_id = u.id
                         AND b.status IN ('confirmed', 'pre_added')
                         AND c.date >= CURRENT_DATE
                   ) AS upcoming_bookings
            FROM users u
            LEFT JOIN LATERAL (
                SELECT name, classes_remaining, end_date
                FROM packages
                WHERE user_id = u.id AND active
                ORDER BY end_date DESC
                LIMIT 1
            ) p ON TRUE
            WHERE u.role = 'user'
            ORDER BY u.approved ASC, u.name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let clients = rows
            .into_iter()
            .map(|row| ClientSummary {
                id: row.get("id"),
                name: row.get("name"),
                email: row.get("email"),
                approved: row.get("approved"),
                created_at: row.get("created_at"),
                package_name: row.get("package_name"),
                classes_remaining: row.get("classes_remaining"),
                package_end_date: row.get("package_end_date"),
                upcoming_bookings: row.get("upcoming_bookings"),
            })
            .collect();

        Ok(clients)
    }

    /// Approve a pending account
    pub async fn approve(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET approved = TRUE, updated_at = NOW() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Delete a user and everything that references them
    ///
    /// Seats held by live bookings are released and waitlists behind the user
    /// close up, all in one transaction. Returns false if the user is unknown.
    pub async fn delete_cascade(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Ok(false);
        }

        // Lock every class the user touches before changing counters or positions
        let class_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM classes
            WHERE id IN (
                SELECT class_id FROM bookings WHERE user_id = $1
                UNION
                SELECT class_id FROM waitlist WHERE user_id = $1
            )
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE classes c
            SET current_bookings = GREATEST(c.current_bookings - held.seats, 0)
            FROM (
                SELECT class_id, COUNT(*)::INT AS seats
                FROM bookings
                WHERE user_id = $1 AND status <> 'cancelled'
                GROUP BY class_id
            ) held
            WHERE c.id = held.class_id
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        for class_id in &class_ids {
            remove_waitlist_entry(&mut tx, id, *class_id).await?;
        }

        for statement in [
            "DELETE FROM bookings WHERE user_id = $1",
            "DELETE FROM notifications WHERE user_id = $1",
            "DELETE FROM package_renewals WHERE user_id = $1",
            "DELETE FROM packages WHERE user_id = $1",
            "DELETE FROM users WHERE id = $1",
        ] {
            sqlx::query(statement).bind(id).execute(&mut *tx).await?;
        }

        tx.commit().await?;

        info!(
            "Deleted user {} (touched {} classes)",
            id,
            class_ids.len()
        );

        Ok(true)
    }
}

/// Columns for class rows joined under the alias `c`
pub(crate) fn qualified_class_columns() -> String {
    CLASS_COLUMNS
        .split(", ")
        .map(|column| format!("c.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_class_columns() {
        let columns = qualified_class_columns();
        assert!(columns.starts_with("c.id, c.name, c.date"));
        assert!(columns.ends_with("c.created_at"));
        assert_eq!(columns.split(", ").count(), CLASS_COLUMNS.split(", ").count());
    }
}
