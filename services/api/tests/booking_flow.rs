//! Database scenarios for the booking, cancellation and waitlist engines
//!
//! Run with `DATABASE_URL` pointing at a disposable PostgreSQL server:
//! `cargo test -p api -- --ignored`

use api::{
    engine::{
        Actor, BookingEngine, CancellationEngine, CancellationPolicy, EngineError, WaitlistEngine,
    },
    maintenance::{self, ClassScope},
    models::{BookingStatus, RenewalMethod, package::AssignPackageRequest},
    repositories::PackageRepository,
};
use chrono::{Duration, NaiveDate, Utc};
use common::mailer::{Mailer, MailerConfig};
use sqlx::PgPool;
use uuid::Uuid;

fn mailer() -> Mailer {
    Mailer::new(MailerConfig {
        from_address: "studio@example.com".to_string(),
        enabled: true,
    })
}

async fn user(pool: &PgPool, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, approved) \
         VALUES ($1, $2, $3, 'x', $4, TRUE)",
    )
    .bind(id)
    .bind(format!("{} {}", role, &id.to_string()[..8]))
    .bind(format!("{}@example.com", id))
    .bind(role)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn class_on(pool: &PgPool, date: NaiveDate, time: &str, capacity: i32) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO classes (id, name, date, day_of_week, time, capacity, enabled) \
         VALUES ($1, 'Reformer', $2, 'Any', $3, $4, TRUE)",
    )
    .bind(id)
    .bind(date)
    .bind(time)
    .bind(capacity)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// An enabled class a month from now
async fn future_class(pool: &PgPool, capacity: i32) -> Uuid {
    class_on(pool, Utc::now().date_naive() + Duration::days(30), "18:00", capacity).await
}

async fn package(pool: &PgPool, user_id: Uuid, remaining: i32) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO packages \
             (id, user_id, name, total_classes, classes_remaining, start_date, end_date) \
         VALUES ($1, $2, '10 classes', 10, $3, $4, $5)",
    )
    .bind(id)
    .bind(user_id)
    .bind(remaining)
    .bind(now - Duration::days(1))
    .bind(now + Duration::days(60))
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn set_enabled(pool: &PgPool, class_id: Uuid, enabled: bool) {
    sqlx::query("UPDATE classes SET enabled = $2 WHERE id = $1")
        .bind(class_id)
        .bind(enabled)
        .execute(pool)
        .await
        .unwrap();
}

fn cancellation_engine(pool: &PgPool) -> CancellationEngine {
    CancellationEngine::new(pool.clone(), mailer(), CancellationPolicy::default())
}

async fn current_bookings(pool: &PgPool, class_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT current_bookings FROM classes WHERE id = $1")
        .bind(class_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn classes_remaining(pool: &PgPool, package_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT classes_remaining FROM packages WHERE id = $1")
        .bind(package_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn client(id: Uuid) -> Actor {
    Actor {
        id,
        is_admin: false,
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn booking_takes_a_seat_and_a_credit(pool: PgPool) {
    let engine = BookingEngine::new(pool.clone(), mailer());
    let user_id = user(&pool, "user").await;
    let package_id = package(&pool, user_id, 5).await;
    let class_id = future_class(&pool, 10).await;

    let booking = engine.book(user_id, class_id).await.unwrap();

    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(current_bookings(&pool, class_id).await, 1);
    assert_eq!(classes_remaining(&pool, package_id).await, 4);

    let notifications: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND type = 'booking_confirmed'",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(notifications, 1);

    let again = engine.book(user_id, class_id).await;
    assert!(matches!(again, Err(EngineError::Conflict(_))));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn full_class_rejects_and_package_is_untouched(pool: PgPool) {
    let engine = BookingEngine::new(pool.clone(), mailer());
    let class_id = future_class(&pool, 1).await;

    let first = user(&pool, "user").await;
    package(&pool, first, 5).await;
    engine.book(first, class_id).await.unwrap();

    let second = user(&pool, "user").await;
    let second_package = package(&pool, second, 5).await;
    let result = engine.book(second, class_id).await;

    assert!(matches!(result, Err(EngineError::Capacity(_))));
    assert_eq!(current_bookings(&pool, class_id).await, 1);
    assert_eq!(classes_remaining(&pool, second_package).await, 5);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn last_credit_books_once(pool: PgPool) {
    let engine = BookingEngine::new(pool.clone(), mailer());
    let user_id = user(&pool, "user").await;
    let package_id = package(&pool, user_id, 1).await;
    let first_class = future_class(&pool, 10).await;
    let second_class = class_on(
        &pool,
        Utc::now().date_naive() + Duration::days(31),
        "07:00",
        10,
    )
    .await;

    engine.book(user_id, first_class).await.unwrap();
    let result = engine.book(user_id, second_class).await;

    assert!(matches!(result, Err(EngineError::InvalidState(_))));
    assert_eq!(classes_remaining(&pool, package_id).await, 0);
    assert_eq!(current_bookings(&pool, second_class).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn forced_add_exceeds_capacity_without_charging(pool: PgPool) {
    let engine = BookingEngine::new(pool.clone(), mailer());
    let class_id = future_class(&pool, 1).await;

    let regular = user(&pool, "user").await;
    package(&pool, regular, 5).await;
    engine.book(regular, class_id).await.unwrap();

    let guest = user(&pool, "user").await;
    let guest_package = package(&pool, guest, 3).await;

    let refused = engine.admin_add(guest, class_id, false).await;
    assert!(matches!(refused, Err(EngineError::Capacity(_))));

    let booking = engine.admin_add(guest, class_id, true).await.unwrap();
    assert_eq!(booking.status, BookingStatus::PreAdded);
    assert_eq!(current_bookings(&pool, class_id).await, 2);
    assert_eq!(classes_remaining(&pool, guest_package).await, 3);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn pre_added_booking_on_disabled_full_class_never_touches_the_package(pool: PgPool) {
    let engine = BookingEngine::new(pool.clone(), mailer());
    let cancellation = cancellation_engine(&pool);
    let class_id = future_class(&pool, 1).await;

    let regular = user(&pool, "user").await;
    package(&pool, regular, 5).await;
    engine.book(regular, class_id).await.unwrap();
    set_enabled(&pool, class_id, false).await;

    let guest = user(&pool, "user").await;
    let guest_package = package(&pool, guest, 3).await;

    let booking = engine.admin_add(guest, class_id, true).await.unwrap();
    assert_eq!(booking.status, BookingStatus::PreAdded);
    assert_eq!(current_bookings(&pool, class_id).await, 2);
    assert_eq!(classes_remaining(&pool, guest_package).await, 3);

    let cancelled = cancellation.cancel(booking.id, client(guest)).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(current_bookings(&pool, class_id).await, 1);
    assert_eq!(classes_remaining(&pool, guest_package).await, 3);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn waitlist_positions_stay_gapless(pool: PgPool) {
    let waitlist = WaitlistEngine::new(pool.clone());
    let class_id = future_class(&pool, 1).await;

    let mut members = Vec::new();
    for _ in 0..3 {
        let id = user(&pool, "user").await;
        package(&pool, id, 5).await;
        members.push(id);
    }

    for (index, member) in members.iter().enumerate() {
        let entry = waitlist.join(*member, class_id).await.unwrap();
        assert_eq!(entry.position, index as i32 + 1);
    }

    let duplicate = waitlist.join(members[0], class_id).await;
    assert!(matches!(duplicate, Err(EngineError::Conflict(_))));

    assert_eq!(waitlist.leave(members[0], class_id).await.unwrap(), 1);

    let positions: Vec<i32> = sqlx::query_scalar(
        "SELECT position FROM waitlist WHERE class_id = $1 ORDER BY position",
    )
    .bind(class_id)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(positions, vec![1, 2]);

    let admin = user(&pool, "admin").await;
    let view = waitlist
        .view(
            class_id,
            Actor {
                id: admin,
                is_admin: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(view.waitlist_count, 2);
    let entries = view.waitlist_entries.unwrap();
    assert_eq!(entries[0].user_id, members[1]);

    let own = waitlist.view(class_id, client(members[2])).await.unwrap();
    assert_eq!(own.user_waitlist_status.unwrap().position, 2);
    assert!(own.waitlist_entries.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn cancellation_refunds_and_notifies_admins(pool: PgPool) {
    let booking_engine = BookingEngine::new(pool.clone(), mailer());
    let cancellation = cancellation_engine(&pool);

    let admin = user(&pool, "admin").await;
    let user_id = user(&pool, "user").await;
    let package_id = package(&pool, user_id, 5).await;
    let class_id = future_class(&pool, 10).await;

    let booking = booking_engine.book(user_id, class_id).await.unwrap();
    let cancelled = cancellation.cancel(booking.id, client(user_id)).await.unwrap();

    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(current_bookings(&pool, class_id).await, 0);
    assert_eq!(classes_remaining(&pool, package_id).await, 5);

    let admin_notifications: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND type = 'booking_cancelled'",
    )
    .bind(admin)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(admin_notifications, 1);

    let twice = cancellation.cancel(booking.id, client(user_id)).await;
    assert!(matches!(twice, Err(EngineError::NotFound(_))));

    // The seat can be booked again after cancelling
    booking_engine.book(user_id, class_id).await.unwrap();
    assert_eq!(current_bookings(&pool, class_id).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn late_cancellation_is_rejected_for_clients_only(pool: PgPool) {
    let booking_engine = BookingEngine::new(pool.clone(), mailer());
    let cancellation = cancellation_engine(&pool);

    let start = Utc::now() + Duration::hours(2);
    let class_id = class_on(
        &pool,
        start.date_naive(),
        &start.format("%H:%M").to_string(),
        10,
    )
    .await;

    let user_id = user(&pool, "user").await;
    package(&pool, user_id, 5).await;
    let booking = booking_engine.book(user_id, class_id).await.unwrap();

    let result = cancellation.cancel(booking.id, client(user_id)).await;
    assert!(matches!(result, Err(EngineError::Rejected(_))));

    let admin = user(&pool, "admin").await;
    let removed = cancellation
        .cancel_for_class(
            class_id,
            user_id,
            Actor {
                id: admin,
                is_admin: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(removed.status, BookingStatus::Cancelled);

    let owner_notifications: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND type = 'booking_removed'",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(owner_notifications, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn assigning_packages_keeps_one_active(pool: PgPool) {
    let repository = PackageRepository::new(pool.clone());
    let user_id = user(&pool, "user").await;

    let request = AssignPackageRequest {
        name: "10 classes".to_string(),
        total_classes: 10,
        duration_days: Some(30),
        end_date: None,
        price_cents: 15000,
        method: None,
    };

    let first = repository.assign(user_id, &request).await.unwrap();
    let second = repository.assign(user_id, &request).await.unwrap();
    assert_ne!(first.id, second.id);

    let active = repository.active_for_user(user_id).await.unwrap().unwrap();
    assert_eq!(active.id, second.id);
    assert_eq!(active.classes_remaining, 10);

    let renewals = repository.renewals_for_user(user_id).await.unwrap();
    let methods: Vec<RenewalMethod> = renewals.iter().map(|r| r.method).collect();
    assert_eq!(methods.len(), 2);
    assert!(methods.contains(&RenewalMethod::AdminAssigned));
    assert!(methods.contains(&RenewalMethod::Renewal));

    let active_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM packages WHERE user_id = $1 AND active")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(active_count, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn deleting_a_future_class_refunds_confirmed_bookings(pool: PgPool) {
    let engine = BookingEngine::new(pool.clone(), mailer());
    let user_id = user(&pool, "user").await;
    let package_id = package(&pool, user_id, 5).await;
    let class_id = future_class(&pool, 10).await;
    engine.book(user_id, class_id).await.unwrap();

    let summary =
        maintenance::delete_classes(&pool, ClassScope::One(class_id), Utc::now().date_naive())
            .await
            .unwrap();

    assert_eq!(summary.classes, 1);
    assert_eq!(summary.bookings, 1);
    assert_eq!(summary.refunded_credits, 1);
    assert_eq!(classes_remaining(&pool, package_id).await, 5);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn reconciliation_repairs_drifted_counters(pool: PgPool) {
    let engine = BookingEngine::new(pool.clone(), mailer());
    let user_id = user(&pool, "user").await;
    package(&pool, user_id, 5).await;
    let class_id = future_class(&pool, 10).await;
    engine.book(user_id, class_id).await.unwrap();

    sqlx::query("UPDATE classes SET current_bookings = 7 WHERE id = $1")
        .bind(class_id)
        .execute(&pool)
        .await
        .unwrap();

    let fixed = maintenance::reconcile_class_counters(&pool, None).await.unwrap();
    assert_eq!(fixed, 1);
    assert_eq!(current_bookings(&pool, class_id).await, 1);
}
