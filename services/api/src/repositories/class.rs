//! Class calendar repository

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use super::qualified_class_columns;
use crate::calendar;
use crate::engine::CLASS_COLUMNS;
use crate::maintenance;
use crate::models::{
    Class,
    class::{ClassListing, RosterEntry, UpdateClassRequest},
};

/// Fields of a new class, already validated
#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub date: NaiveDate,
    /// Canonical `HH:MM`
    pub time: String,
    pub capacity: i32,
    pub enabled: bool,
}

#[derive(Clone)]
pub struct ClassRepository {
    pool: PgPool,
}

impl ClassRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Classes between `from` and `to` inclusive, with what `user_id` holds on each
    ///
    /// Non-admins only see enabled classes. Counters that disagree with the
    /// live booking count are corrected before returning.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        include_disabled: bool,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ClassListing>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {columns},
                   (SELECT COUNT(*) FROM bookings b
                    WHERE b.class_id = c.id AND b.status <> 'cancelled') AS live_bookings,
                   EXISTS(SELECT 1 FROM bookings b
                          WHERE b.class_id = c.id AND b.user_id = $3
                            AND b.status <> 'cancelled') AS is_booked,
                   (SELECT w.position FROM waitlist w
                    WHERE w.class_id = c.id AND w.user_id = $3) AS waitlist_position
            FROM classes c
            WHERE c.date BETWEEN $1 AND $2 AND ($4 OR c.enabled)
            ORDER BY c.date, c.time
            "#,
            columns = qualified_class_columns()
        ))
        .bind(from)
        .bind(to)
        .bind(user_id)
        .bind(include_disabled)
        .fetch_all(&self.pool)
        .await?;

        let mut drifted = Vec::new();
        let mut listings = Vec::with_capacity(rows.len());
        for row in rows {
            let mut class = Class::from_row(&row)?;
            let live = i32::try_from(row.get::<i64, _>("live_bookings"))?;
            if live != class.current_bookings {
                warn!(
                    "Class {} counter drifted: stored {}, live {}",
                    class.id, class.current_bookings, live
                );
                drifted.push(class.id);
                class.current_bookings = live;
            }

            listings.push(ClassListing {
                available_spots: class.available_spots(),
                is_booked: row.get("is_booked"),
                waitlist_position: row.get("waitlist_position"),
                class,
            });
        }

        if !drifted.is_empty() {
            maintenance::reconcile_class_counters(&self.pool, Some(&drifted)).await?;
        }

        Ok(listings)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Class>> {
        let class = sqlx::query_as::<_, Class>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(class)
    }

    /// Insert a class; `None` when the (date, time) slot is taken
    pub async fn create(&self, new: &NewClass) -> Result<Option<Class>> {
        let class = sqlx::query_as::<_, Class>(&format!(
            "INSERT INTO classes (id, name, date, day_of_week, time, capacity, enabled) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (date, time) DO NOTHING \
             RETURNING {CLASS_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(new.date)
        .bind(calendar::day_of_week_label(new.date))
        .bind(&new.time)
        .bind(new.capacity)
        .bind(new.enabled)
        .fetch_optional(&self.pool)
        .await?;

        Ok(class)
    }

    /// Apply a partial update; `time` must already be canonical
    ///
    /// A clash with another class's (date, time) surfaces as the database's
    /// unique violation.
    pub async fn update(
        &self,
        id: Uuid,
        changes: &UpdateClassRequest,
    ) -> sqlx::Result<Option<Class>> {
        sqlx::query_as::<_, Class>(&format!(
            "UPDATE classes SET \
                 name = COALESCE($2, name), \
                 date = COALESCE($3, date), \
                 day_of_week = COALESCE($4, day_of_week), \
                 time = COALESCE($5, time), \
                 capacity = COALESCE($6, capacity), \
                 enabled = COALESCE($7, enabled) \
             WHERE id = $1 \
             RETURNING {CLASS_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.date)
        .bind(changes.date.map(calendar::day_of_week_label))
        .bind(changes.time.as_deref())
        .bind(changes.capacity)
        .bind(changes.enabled)
        .fetch_optional(&self.pool)
        .await
    }

    /// Insert disabled classes for every free slot; returns how many were created
    pub async fn insert_slots(
        &self,
        name: &str,
        capacity: i32,
        slots: &[(NaiveDate, String)],
    ) -> Result<u64> {
        let ids: Vec<Uuid> = slots.iter().map(|_| Uuid::new_v4()).collect();
        let dates: Vec<NaiveDate> = slots.iter().map(|(date, _)| *date).collect();
        let labels: Vec<String> = dates
            .iter()
            .map(|date| calendar::day_of_week_label(*date).to_string())
            .collect();
        let times: Vec<String> = slots.iter().map(|(_, time)| time.clone()).collect();

        let created = sqlx::query(
            r#"
            INSERT INTO classes (id, name, date, day_of_week, time, capacity, enabled)
            SELECT slot.id, $5, slot.date, slot.label, slot.time, $6, FALSE
            FROM UNNEST($1::UUID[], $2::DATE[], $3::TEXT[], $4::TEXT[])
                AS slot(id, date, label, time)
            ON CONFLICT (date, time) DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(&dates)
        .bind(&labels)
        .bind(&times)
        .bind(name)
        .bind(capacity)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(created)
    }

    /// Enable or disable every class dated between `from` and `to` inclusive
    pub async fn set_enabled_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        enabled: bool,
    ) -> Result<u64> {
        let updated = sqlx::query("UPDATE classes SET enabled = $3 WHERE date BETWEEN $1 AND $2")
            .bind(from)
            .bind(to)
            .bind(enabled)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(updated)
    }

    /// Everyone holding a live booking on the class
    pub async fn roster(&self, class_id: Uuid) -> Result<Vec<RosterEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT b.id AS booking_id, b.user_id, u.name, u.email, b.status, b.created_at
            FROM bookings b
            JOIN users u ON u.id = b.user_id
            WHERE b.class_id = $1 AND b.status <> 'cancelled'
            ORDER BY b.created_at ASC
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        let mut roster = Vec::with_capacity(rows.len());
        for row in rows {
            roster.push(RosterEntry {
                booking_id: row.get("booking_id"),
                user_id: row.get("user_id"),
                name: row.get("name"),
                email: row.get("email"),
                status: row.get::<String, _>("status").parse()?,
                booked_at: row.get("created_at"),
            });
        }

        Ok(roster)
    }
}
