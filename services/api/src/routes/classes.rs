//! Class calendar handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, NaiveDate, Utc};
use common::database::is_unique_violation;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use super::require_text;
use crate::{
    AppState, calendar,
    error::{ApiError, ApiResult, internal},
    maintenance::{self, ClassScope},
    middleware::AuthUser,
    models::{
        booking::BookingResponse,
        class::{
            AddUserRequest, BatchCreateRequest, BatchToggleRequest, ClassNotificationRequest,
            ClassQuery, CreateClassRequest, RemoveUserRequest, UpdateClassRequest,
        },
    },
    repositories::class::NewClass,
};

/// Days shown when the listing has no explicit end
const DEFAULT_LISTING_DAYS: i64 = 14;

const SLOT_TAKEN: &str = "A class already exists at that date and time";

fn class_not_found() -> ApiError {
    ApiError::NotFound("Class not found".to_string())
}

fn canonical_time(raw: &str) -> ApiResult<String> {
    calendar::canonical_time(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid class time '{}'", raw)))
}

fn validate_capacity(capacity: i32) -> ApiResult<i32> {
    if capacity < 1 {
        return Err(ApiError::BadRequest(
            "Capacity must be at least 1".to_string(),
        ));
    }
    Ok(capacity)
}

/// Date range for a listing, defaulting to the next two weeks
pub fn listing_range(query: &ClassQuery, today: NaiveDate) -> ApiResult<(NaiveDate, NaiveDate)> {
    let from = query.from.unwrap_or(today);
    let to = query
        .to
        .unwrap_or(from + Duration::days(DEFAULT_LISTING_DAYS));
    if to < from {
        return Err(ApiError::BadRequest(
            "'to' must not be before 'from'".to_string(),
        ));
    }
    Ok((from, to))
}

/// List classes in a date range
pub async fn list_classes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ClassQuery>,
) -> ApiResult<impl IntoResponse> {
    let (from, to) = listing_range(&query, state.studio.today(Utc::now()))?;

    let classes = state
        .class_repository
        .list_for_user(user.id, user.is_admin(), from, to)
        .await
        .map_err(internal("Failed to list classes"))?;

    Ok(Json(classes))
}

/// Get a class by ID
pub async fn get_class(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let class = state
        .class_repository
        .find_by_id(id)
        .await
        .map_err(internal("Failed to get class"))?
        .filter(|class| class.enabled || user.is_admin())
        .ok_or_else(class_not_found)?;

    Ok(Json(class))
}

/// Create a single class
pub async fn create_class(
    State(state): State<AppState>,
    Json(payload): Json<CreateClassRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = match payload.name.as_deref() {
        Some(name) => require_text(name, "name")?,
        None => state.studio.default_class_name.clone(),
    };
    let new = NewClass {
        name,
        date: payload.date,
        time: canonical_time(&payload.time)?,
        capacity: validate_capacity(payload.capacity.unwrap_or(state.studio.default_capacity))?,
        enabled: payload.enabled,
    };

    let class = state
        .class_repository
        .create(&new)
        .await
        .map_err(internal("Failed to create class"))?
        .ok_or_else(|| ApiError::Conflict(SLOT_TAKEN.to_string()))?;

    Ok((StatusCode::CREATED, Json(class)))
}

/// Update a class
pub async fn update_class(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateClassRequest>,
) -> ApiResult<impl IntoResponse> {
    if let Some(name) = payload.name.as_deref() {
        payload.name = Some(require_text(name, "name")?);
    }
    if let Some(time) = payload.time.as_deref() {
        payload.time = Some(canonical_time(time)?);
    }
    if let Some(capacity) = payload.capacity {
        validate_capacity(capacity)?;
    }

    let class = state
        .class_repository
        .update(id, &payload)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict(SLOT_TAKEN.to_string())
            } else {
                error!("Failed to update class {}: {}", id, e);
                ApiError::InternalServerError
            }
        })?
        .ok_or_else(class_not_found)?;

    Ok(Json(class))
}

/// Delete a class, refunding upcoming confirmed bookings
pub async fn delete_class(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let today = state.studio.today(Utc::now());
    let summary = maintenance::delete_classes(&state.db_pool, ClassScope::One(id), today)
        .await
        .map_err(internal("Failed to delete class"))?;

    if summary.classes == 0 {
        return Err(class_not_found());
    }

    Ok(Json(summary))
}

/// Lay out a year of disabled classes from the weekly template
pub async fn batch_create(
    State(state): State<AppState>,
    Json(payload): Json<BatchCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    let start = payload
        .start_date
        .unwrap_or_else(|| state.studio.today(Utc::now()));
    let name = match payload.name.as_deref() {
        Some(name) => require_text(name, "name")?,
        None => state.studio.default_class_name.clone(),
    };
    let capacity = validate_capacity(payload.capacity.unwrap_or(state.studio.default_capacity))?;

    let slots = calendar::WeeklyTemplate::default().generate(start, state.studio.batch_days);
    let created = state
        .class_repository
        .insert_slots(&name, capacity, &slots)
        .await
        .map_err(internal("Failed to batch create classes"))?;
    let skipped = slots.len() as u64 - created;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Created {} classes, skipped {} existing", created, skipped),
            "created": created,
            "skipped": skipped,
        })),
    ))
}

/// Enable or disable the week containing a date
pub async fn batch_toggle(
    State(state): State<AppState>,
    Json(payload): Json<BatchToggleRequest>,
) -> ApiResult<impl IntoResponse> {
    let (monday, sunday) = calendar::week_window(payload.date);

    let updated = state
        .class_repository
        .set_enabled_between(monday, sunday, payload.enabled)
        .await
        .map_err(internal("Failed to toggle classes"))?;

    Ok(Json(json!({
        "message": format!(
            "{} {} classes",
            if payload.enabled { "Enabled" } else { "Disabled" },
            updated
        ),
        "weekStart": monday,
        "weekEnd": sunday,
        "updated": updated,
    })))
}

/// Remove every class
pub async fn clear_all(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let today = state.studio.today(Utc::now());
    let summary = maintenance::delete_classes(&state.db_pool, ClassScope::All, today)
        .await
        .map_err(internal("Failed to clear classes"))?;

    Ok(Json(summary))
}

/// Remove classes older than the retention period
pub async fn delete_past(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let today = state.studio.today(Utc::now());
    let summary =
        maintenance::purge_past_classes(&state.db_pool, today, state.studio.retention_days)
            .await
            .map_err(internal("Failed to delete past classes"))?;

    Ok(Json(summary))
}

/// Everyone booked on a class
pub async fn roster(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .class_repository
        .find_by_id(id)
        .await
        .map_err(internal("Failed to get class"))?
        .ok_or_else(class_not_found)?;

    let roster = state
        .class_repository
        .roster(id)
        .await
        .map_err(internal("Failed to get class roster"))?;

    Ok(Json(roster))
}

/// Add a user to a class on their behalf
pub async fn add_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking = state
        .booking_engine
        .admin_add(payload.user_id, id, payload.force_add)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            message: "User added to class".to_string(),
            booking,
        }),
    ))
}

/// Remove a user's booking from a class
pub async fn remove_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RemoveUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking = state
        .cancellation_engine
        .cancel_for_class(id, payload.user_id, user.actor())
        .await?;

    Ok(Json(BookingResponse {
        message: "User removed from class".to_string(),
        booking,
    }))
}

/// Message everyone booked on a class
pub async fn send_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClassNotificationRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = require_text(&payload.message, "message")?;

    let class = state
        .class_repository
        .find_by_id(id)
        .await
        .map_err(internal("Failed to get class"))?
        .ok_or_else(class_not_found)?;

    let notified = state
        .notification_repository
        .notify_class(&state.mailer, &class, &message)
        .await
        .map_err(internal("Failed to notify class"))?;

    Ok(Json(json!({
        "message": format!("Notified {} users", notified),
        "notified": notified,
    })))
}
