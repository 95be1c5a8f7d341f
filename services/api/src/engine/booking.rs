//! Booking engine: reserve a seat and charge a package credit

use chrono::{DateTime, Utc};
use common::{
    database::is_unique_violation,
    mailer::{Email, Mailer},
};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{
    BOOKING_COLUMNS, EngineError, EngineResult, SeatContext, describe_class, email_booking_owner,
    fetch_contact, insert_notification, messages, remove_waitlist_entry, usable_package,
};
use crate::models::{Booking, BookingStatus, Class, notification::kind};

/// What a client booking will touch once every precondition passed
#[derive(Debug)]
pub struct BookingPlan<'a> {
    pub class: &'a Class,
    pub package_id: Uuid,
}

/// Check a client booking; the first failing precondition wins
pub fn check_booking(ctx: &SeatContext, now: DateTime<Utc>) -> EngineResult<BookingPlan<'_>> {
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
    if class.is_full() {
        return Err(EngineError::Capacity(messages::CLASS_FULL.to_string()));
    }

    let package = usable_package(ctx.package.as_ref(), now)
        .ok_or_else(|| EngineError::InvalidState(messages::NO_ACTIVE_PACKAGE.to_string()))?;

    Ok(BookingPlan {
        class,
        package_id: package.id,
    })
}

/// How an admin add will be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAddPlan {
    pub status: BookingStatus,
    /// Package to charge; `None` for pre-added seats
    pub charge_package: Option<Uuid>,
    pub enforce_capacity: bool,
}

/// Decide how an admin adds a user to a class
///
/// A forced add or an add to a disabled class becomes a `pre_added` seat that
/// charges nothing. Only a forced add may exceed capacity. Anything else is an
/// ordinary confirmed booking paid from the user's package.
pub fn plan_admin_add(
    ctx: &SeatContext,
    force_add: bool,
    now: DateTime<Utc>,
) -> EngineResult<AdminAddPlan> {
    let class = ctx
        .class
        .as_ref()
        .ok_or_else(|| EngineError::NotFound(messages::CLASS_NOT_FOUND.to_string()))?;

    if ctx.has_booking {
        return Err(EngineError::Conflict(
            "User is already booked on this class".to_string(),
        ));
    }

    let plan = if force_add || !class.enabled {
        AdminAddPlan {
            status: BookingStatus::PreAdded,
            charge_package: None,
            enforce_capacity: !force_add,
        }
    } else {
        let package = usable_package(ctx.package.as_ref(), now).ok_or_else(|| {
            EngineError::InvalidState(
                "User has no active package with remaining classes".to_string(),
            )
        })?;
        AdminAddPlan {
            status: BookingStatus::Confirmed,
            charge_package: Some(package.id),
            enforce_capacity: true,
        }
    };

    if plan.enforce_capacity && class.is_full() {
        return Err(EngineError::Capacity(messages::CLASS_FULL.to_string()));
    }

    Ok(plan)
}

/// Creates bookings for clients and admins
#[derive(Clone)]
pub struct BookingEngine {
    pool: PgPool,
    mailer: Mailer,
}

impl BookingEngine {
    pub fn new(pool: PgPool, mailer: Mailer) -> Self {
        Self { pool, mailer }
    }

    /// Book `class_id` for `user_id`, paying with the user's active package
    pub async fn book(&self, user_id: Uuid, class_id: Uuid) -> EngineResult<Booking> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let ctx = SeatContext::load(&mut tx, user_id, class_id, false).await?;
        let plan = check_booking(&ctx, now)?;
        let class = plan.class;

        let booking = insert_booking(&mut tx, user_id, class_id, BookingStatus::Confirmed).await?;

        if !claim_seat(&mut tx, class_id, true).await? {
            return Err(EngineError::Capacity(messages::CLASS_FULL.to_string()));
        }
        if !charge_package(&mut tx, plan.package_id, now).await? {
            return Err(EngineError::InvalidState(
                messages::NO_ACTIVE_PACKAGE.to_string(),
            ));
        }

        let description = describe_class(&class.name, class.date, &class.time);
        insert_notification(
            &mut tx,
            user_id,
            kind::BOOKING_CONFIRMED,
            &format!("Your booking for {} is confirmed", description),
        )
        .await?;

        let contact = fetch_contact(&mut tx, user_id).await?;
        tx.commit().await?;

        info!(
            "User {} booked class {} (booking {})",
            user_id, class_id, booking.id
        );

        if let Some((name, email)) = contact {
            let message = Email::new(
                email,
                "Booking confirmed",
                format!("Hi {}, your booking for {} is confirmed.", name, description),
            );
            email_booking_owner(&self.pool, &self.mailer, booking.id, message).await;
        }

        Ok(booking)
    }

    /// Admin add of `user_id` to `class_id`
    ///
    /// Any waitlist entry the user holds for the class is removed in the same
    /// transaction.
    pub async fn admin_add(
        &self,
        user_id: Uuid,
        class_id: Uuid,
        force_add: bool,
    ) -> EngineResult<Booking> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let ctx = SeatContext::load(&mut tx, user_id, class_id, true).await?;
        let plan = plan_admin_add(&ctx, force_add, now)?;
        let Some(class) = ctx.class.as_ref() else {
            return Err(EngineError::NotFound(messages::CLASS_NOT_FOUND.to_string()));
        };

        let Some((name, email)) = fetch_contact(&mut tx, user_id).await? else {
            return Err(EngineError::NotFound(messages::USER_NOT_FOUND.to_string()));
        };

        remove_waitlist_entry(&mut tx, user_id, class_id).await?;

        let booking = insert_booking(&mut tx, user_id, class_id, plan.status).await?;

        if !claim_seat(&mut tx, class_id, plan.enforce_capacity).await? {
            return Err(EngineError::Capacity(messages::CLASS_FULL.to_string()));
        }
        if let Some(package_id) = plan.charge_package {
            if !charge_package(&mut tx, package_id, now).await? {
                return Err(EngineError::InvalidState(
                    "User has no active package with remaining classes".to_string(),
                ));
            }
        }

        let description = describe_class(&class.name, class.date, &class.time);
        insert_notification(
            &mut tx,
            user_id,
            kind::BOOKING_ADDED,
            &format!("You have been added to {}", description),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Admin added user {} to class {} as {} (force: {})",
            user_id, class_id, plan.status, force_add
        );

        let message = Email::new(
            email,
            "You have been added to a class",
            format!("Hi {}, the studio has added you to {}.", name, description),
        );
        email_booking_owner(&self.pool, &self.mailer, booking.id, message).await;

        Ok(booking)
    }
}

async fn insert_booking(
    conn: &mut PgConnection,
    user_id: Uuid,
    class_id: Uuid,
    status: BookingStatus,
) -> EngineResult<Booking> {
    sqlx::query_as::<_, Booking>(&format!(
        "INSERT INTO bookings (id, user_id, class_id, status) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {BOOKING_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(class_id)
    .bind(status.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            EngineError::Conflict(messages::ALREADY_BOOKED.to_string())
        } else {
            EngineError::Database(e)
        }
    })
}

/// Take one seat; with `within_capacity` only while a seat is free
async fn claim_seat(
    conn: &mut PgConnection,
    class_id: Uuid,
    within_capacity: bool,
) -> sqlx::Result<bool> {
    let sql = if within_capacity {
        "UPDATE classes SET current_bookings = current_bookings + 1 \
         WHERE id = $1 AND current_bookings < capacity"
    } else {
        "UPDATE classes SET current_bookings = current_bookings + 1 WHERE id = $1"
    };

    let result = sqlx::query(sql).bind(class_id).execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

/// Spend one credit, only while the package is still usable
async fn charge_package(
    conn: &mut PgConnection,
    package_id: Uuid,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE packages
        SET classes_remaining = classes_remaining - 1
        WHERE id = $1 AND active AND classes_remaining > 0 AND end_date >= $2
        "#,
    )
    .bind(package_id)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{bookable, class, package};
    use chrono::Duration;

    fn assert_err<T: std::fmt::Debug>(
        result: EngineResult<T>,
        expected: fn(&EngineError) -> bool,
    ) {
        match result {
            Err(ref e) if expected(e) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_open_class_with_package_is_bookable() {
        let now = Utc::now();
        let ctx = bookable(now);
        let plan = check_booking(&ctx, now).unwrap();
        assert_eq!(plan.package_id, ctx.package.as_ref().unwrap().id);
    }

    #[test]
    fn test_missing_class_is_not_found() {
        let now = Utc::now();
        let ctx = SeatContext {
            class: None,
            ..bookable(now)
        };
        assert_err(check_booking(&ctx, now), |e| {
            matches!(e, EngineError::NotFound(_))
        });
    }

    #[test]
    fn test_disabled_class_is_invalid_state() {
        let now = Utc::now();
        let ctx = SeatContext {
            class: Some(class(10, 0, false)),
            ..bookable(now)
        };
        assert_err(check_booking(&ctx, now), |e| {
            matches!(e, EngineError::InvalidState(m) if m == messages::CLASS_DISABLED)
        });
    }

    #[test]
    fn test_duplicates_conflict_before_capacity() {
        let now = Utc::now();
        let ctx = SeatContext {
            class: Some(class(1, 1, true)),
            has_booking: true,
            ..bookable(now)
        };
        assert_err(check_booking(&ctx, now), |e| {
            matches!(e, EngineError::Conflict(m) if m == messages::ALREADY_BOOKED)
        });

        let ctx = SeatContext {
            class: Some(class(1, 1, true)),
            on_waitlist: true,
            ..bookable(now)
        };
        assert_err(check_booking(&ctx, now), |e| {
            matches!(e, EngineError::Conflict(m) if m == messages::ALREADY_WAITLISTED)
        });
    }

    #[test]
    fn test_full_class_fails_on_capacity_regardless_of_package() {
        let now = Utc::now();
        for package in [
            Some(package(5, now + Duration::days(10))),
            Some(package(0, now + Duration::days(10))),
            None,
        ] {
            let ctx = SeatContext {
                class: Some(class(4, 4, true)),
                package,
                ..bookable(now)
            };
            assert_err(check_booking(&ctx, now), |e| {
                matches!(e, EngineError::Capacity(_))
            });
        }
    }

    #[test]
    fn test_depleted_or_expired_package_is_invalid_state() {
        let now = Utc::now();
        for package in [
            Some(package(0, now + Duration::days(10))),
            Some(package(3, now - Duration::seconds(1))),
            None,
        ] {
            let ctx = SeatContext {
                package,
                ..bookable(now)
            };
            assert_err(check_booking(&ctx, now), |e| {
                matches!(e, EngineError::InvalidState(m) if m == messages::NO_ACTIVE_PACKAGE)
            });
        }
    }

    #[test]
    fn test_package_ending_exactly_now_still_pays() {
        let now = Utc::now();
        let ctx = SeatContext {
            package: Some(package(1, now)),
            ..bookable(now)
        };
        assert!(check_booking(&ctx, now).is_ok());
    }

    #[test]
    fn test_force_add_to_full_disabled_class_is_pre_added() {
        let now = Utc::now();
        let ctx = SeatContext {
            class: Some(class(2, 2, false)),
            package: None,
            ..bookable(now)
        };
        let plan = plan_admin_add(&ctx, true, now).unwrap();
        assert_eq!(
            plan,
            AdminAddPlan {
                status: BookingStatus::PreAdded,
                charge_package: None,
                enforce_capacity: false,
            }
        );
    }

    #[test]
    fn test_admin_add_to_disabled_class_skips_package_but_respects_capacity() {
        let now = Utc::now();
        let ctx = SeatContext {
            class: Some(class(2, 1, false)),
            package: None,
            ..bookable(now)
        };
        let plan = plan_admin_add(&ctx, false, now).unwrap();
        assert_eq!(plan.status, BookingStatus::PreAdded);
        assert_eq!(plan.charge_package, None);

        let ctx = SeatContext {
            class: Some(class(2, 2, false)),
            package: None,
            ..bookable(now)
        };
        assert_err(plan_admin_add(&ctx, false, now), |e| {
            matches!(e, EngineError::Capacity(_))
        });
    }

    #[test]
    fn test_admin_add_to_enabled_class_charges_package() {
        let now = Utc::now();
        let ctx = bookable(now);
        let plan = plan_admin_add(&ctx, false, now).unwrap();
        assert_eq!(plan.status, BookingStatus::Confirmed);
        assert_eq!(plan.charge_package, ctx.package.as_ref().map(|p| p.id));

        let ctx = SeatContext {
            package: None,
            ..bookable(now)
        };
        assert_err(plan_admin_add(&ctx, false, now), |e| {
            matches!(e, EngineError::InvalidState(_))
        });
    }

    #[test]
    fn test_admin_add_ignores_waitlist_but_not_bookings() {
        let now = Utc::now();
        let ctx = SeatContext {
            on_waitlist: true,
            ..bookable(now)
        };
        assert!(plan_admin_add(&ctx, false, now).is_ok());

        let ctx = SeatContext {
            has_booking: true,
            ..bookable(now)
        };
        assert_err(plan_admin_add(&ctx, true, now), |e| {
            matches!(e, EngineError::Conflict(_))
        });
    }
}
