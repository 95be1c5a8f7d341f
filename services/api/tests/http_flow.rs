//! Router-level checks of the client booking endpoints
//!
//! Run with `DATABASE_URL` pointing at a disposable PostgreSQL server:
//! `cargo test -p api -- --ignored`

use api::{
    AppState, create_router,
    config::StudioConfig,
    middleware::{Claims, JwtConfig, JwtVerifier, TokenType},
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use chrono::{Duration, Utc};
use common::mailer::{Mailer, MailerConfig};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

const PRIVATE_KEY: &str = include_str!("../../../fixtures/jwt/test_private.pem");
const PUBLIC_KEY: &str = include_str!("../../../fixtures/jwt/test_public.pem");

fn app(pool: PgPool) -> Router {
    let verifier = JwtVerifier::new(&JwtConfig {
        public_key: PUBLIC_KEY.to_string(),
    })
    .unwrap();
    let mailer = Mailer::new(MailerConfig {
        from_address: "studio@example.com".to_string(),
        enabled: false,
    });

    create_router(AppState::new(pool, StudioConfig::default(), verifier, mailer))
}

fn access_token(user_id: Uuid) -> String {
    let now = Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: user_id,
        roles: vec!["user".to_string()],
        iat: now,
        exp: now + 900,
        token_type: TokenType::Access,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::RS256),
        &claims,
        &EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap(),
    )
    .unwrap()
}

async fn client_with_package(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, approved) \
         VALUES ($1, 'Member', $2, 'x', 'user', TRUE)",
    )
    .bind(id)
    .bind(format!("{}@example.com", id))
    .execute(pool)
    .await
    .unwrap();

    let now = Utc::now();
    sqlx::query(
        "INSERT INTO packages \
             (id, user_id, name, total_classes, classes_remaining, start_date, end_date) \
         VALUES ($1, $2, '10 classes', 10, 10, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(id)
    .bind(now - Duration::days(1))
    .bind(now + Duration::days(60))
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn single_seat_class(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO classes (id, name, date, day_of_week, time, capacity, enabled) \
         VALUES ($1, 'Reformer', $2, 'Any', '18:00', 1, TRUE)",
    )
    .bind(id)
    .bind(Utc::now().date_naive() + Duration::days(30))
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user_id: Uuid,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", access_token(user_id)));
    let body = match body {
        Some(json) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn booking_waitlist_and_cancel_by_class_answer_ok(pool: PgPool) {
    let app = app(pool.clone());
    let booked = client_with_package(&pool).await;
    let waiting = client_with_package(&pool).await;
    let class_id = single_seat_class(&pool).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/bookings",
        booked,
        Some(json!({ "classId": class_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "confirmed");

    let (status, body) = send(
        &app,
        Method::POST,
        "/bookings",
        waiting,
        Some(json!({ "classId": class_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["canJoinWaitlist"], true);

    let (status, body) = send(
        &app,
        Method::POST,
        "/classes/waitlist",
        waiting,
        Some(json!({ "classId": class_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], 1);
    assert_eq!(body["waitlistEntry"]["position"], 1);

    let uri = format!("/classes/{}/booking", class_id);
    let (status, body) = send(&app, Method::DELETE, &uri, booked, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "cancelled");

    let (status, _) = send(&app, Method::DELETE, &uri, booked, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
