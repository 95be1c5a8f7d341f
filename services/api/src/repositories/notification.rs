//! In-app notifications

use anyhow::Result;
use common::mailer::{Email, Mailer};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::engine::{describe_class, insert_notification};
use crate::models::{Class, Notification, notification::kind};

#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A user's notifications, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, type, message, read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    /// Mark one of the user's notifications read; false if it is not theirs
    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result =
            sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND NOT read")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// Message everyone holding a live booking on `class`; returns how many were notified
    pub async fn notify_class(
        &self,
        mailer: &Mailer,
        class: &Class,
        message: &str,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT DISTINCT u.id, u.name, u.email
            FROM bookings b
            JOIN users u ON u.id = b.user_id
            WHERE b.class_id = $1 AND b.status <> 'cancelled'
            "#,
        )
        .bind(class.id)
        .fetch_all(&mut *tx)
        .await?;

        let subject = format!(
            "Update for {}",
            describe_class(&class.name, class.date, &class.time)
        );
        let mut emails = Vec::with_capacity(rows.len());
        for row in &rows {
            let user_id: Uuid = row.get("id");
            let name: String = row.get("name");
            let email: String = row.get("email");

            insert_notification(&mut tx, user_id, kind::CLASS_MESSAGE, message).await?;
            emails.push(Email::new(email, subject.clone(), format!("Hi {}, {}", name, message)));
        }

        tx.commit().await?;

        for email in &emails {
            mailer.send_best_effort(email).await;
        }

        info!("Sent class message for {} to {} users", class.id, emails.len());

        Ok(emails.len())
    }
}
