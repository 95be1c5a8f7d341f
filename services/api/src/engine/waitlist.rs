//! Waitlist engine: gapless per-class queues

use chrono::{DateTime, Utc};
use common::database::is_unique_violation;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{
    Actor, CLASS_COLUMNS, EngineError, EngineResult, SeatContext, describe_class,
    insert_notification, messages, remove_waitlist_entry, usable_package,
};
use crate::models::{
    Class, UserWaitlistStatus, WaitlistEntry, WaitlistView, notification::kind,
    waitlist::WaitlistMember,
};

/// Check a waitlist join; capacity is not a precondition
pub fn check_waitlist(ctx: &SeatContext, now: DateTime<Utc>) -> EngineResult<&Class> {
    let class = ctx
        .class
        .as_ref()
        .ok_or_else(|| EngineError::NotFound(messages::CLASS_NOT_FOUND.to_string()))?;

    if !class.enabled {
        return Err(EngineError::InvalidState(messages::CLASS_DISABLED.to_string()));
    }
    if ctx.has_booking {
        return Err(EngineError::Conflict(messages::ALREADY_BOOKED.to_string()));
    }
    if ctx.on_waitlist {
        return Err(EngineError::Conflict(messages::ALREADY_WAITLISTED.to_string()));
    }
    if usable_package(ctx.package.as_ref(), now).is_none() {
        return Err(EngineError::InvalidState(messages::NO_ACTIVE_PACKAGE.to_string()));
    }

    Ok(class)
}

/// Position after the current last place; an empty queue reports 0
pub fn next_position(current_max: i32) -> i32 {
    current_max + 1
}

#[derive(Clone)]
pub struct WaitlistEngine {
    pool: PgPool,
}

impl WaitlistEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append `user_id` to the class waitlist
    pub async fn join(&self, user_id: Uuid, class_id: Uuid) -> EngineResult<WaitlistEntry> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let ctx = SeatContext::load(&mut tx, user_id, class_id, true).await?;
        let class = check_waitlist(&ctx, now)?;

        let current_max: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), 0) FROM waitlist WHERE class_id = $1",
        )
        .bind(class_id)
        .fetch_one(&mut *tx)
        .await?;
        let position = next_position(current_max);

        let entry = sqlx::query_as::<_, WaitlistEntry>(
            r#"
            INSERT INTO waitlist (id, user_id, class_id, position)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, class_id, position, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(class_id)
        .bind(position)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                EngineError::Conflict(messages::ALREADY_WAITLISTED.to_string())
            } else {
                EngineError::Database(e)
            }
        })?;

        insert_notification(
            &mut tx,
            user_id,
            kind::WAITLIST_JOINED,
            &format!(
                "You joined the waitlist for {} at position {}",
                describe_class(&class.name, class.date, &class.time),
                position
            ),
        )
        .await?;

        tx.commit().await?;

        info!(
            "User {} joined waitlist for class {} at position {}",
            user_id, class_id, position
        );

        Ok(entry)
    }

    /// The waitlist as `actor` may see it
    pub async fn view(&self, class_id: Uuid, actor: Actor) -> EngineResult<WaitlistView> {
        let class = sqlx::query_as::<_, Class>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1"
        ))
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await?
        .filter(|c| c.enabled || actor.is_admin)
        .ok_or_else(|| EngineError::NotFound(messages::CLASS_NOT_FOUND.to_string()))?;

        let user_waitlist_status = sqlx::query_as::<_, (i32, DateTime<Utc>)>(
            "SELECT position, created_at FROM waitlist WHERE class_id = $1 AND user_id = $2",
        )
        .bind(class_id)
        .bind(actor.id)
        .fetch_optional(&self.pool)
        .await?
        .map(|(position, joined_at)| UserWaitlistStatus {
            position,
            joined_at,
        });

        let waitlist_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM waitlist WHERE class_id = $1")
                .bind(class_id)
                .fetch_one(&self.pool)
                .await?;

        let waitlist_entries = if actor.is_admin {
            let members = sqlx::query_as::<_, WaitlistMember>(
                r#"
                SELECT w.id, w.user_id, u.name, u.email, w.position, w.created_at
                FROM waitlist w
                JOIN users u ON u.id = w.user_id
                WHERE w.class_id = $1
                ORDER BY w.position ASC
                "#,
            )
            .bind(class_id)
            .fetch_all(&self.pool)
            .await?;
            Some(members)
        } else {
            None
        };

        Ok(WaitlistView {
            class,
            user_waitlist_status,
            waitlist_count,
            waitlist_entries,
        })
    }

    /// Leave a waitlist and close the gap behind
    pub async fn leave(&self, user_id: Uuid, class_id: Uuid) -> EngineResult<i32> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM classes WHERE id = $1 FOR UPDATE")
                .bind(class_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(EngineError::NotFound(messages::CLASS_NOT_FOUND.to_string()));
        }

        let position = remove_waitlist_entry(&mut tx, user_id, class_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(messages::NOT_ON_WAITLIST.to_string()))?;

        tx.commit().await?;

        info!(
            "User {} left waitlist for class {} from position {}",
            user_id, class_id, position
        );

        Ok(position)
    }
}
