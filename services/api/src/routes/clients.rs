//! Client administration handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use super::require_text;
use crate::{
    AppState,
    error::{ApiError, ApiResult, internal},
    models::{
        MessageResponse,
        package::{AssignPackageRequest, UpdateClassesRequest, UpdateExpirationRequest},
        user::ClientDetail,
    },
    repositories::package::package_end_date,
};

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

fn no_active_package() -> ApiError {
    ApiError::NotFound("User has no active package".to_string())
}

/// Longest validity an assignment may ask for
const MAX_DURATION_DAYS: i64 = 3650;

/// Check the numbers of a package grant
pub fn validate_assignment(request: &AssignPackageRequest) -> ApiResult<()> {
    if request.total_classes < 1 {
        return Err(ApiError::BadRequest(
            "totalClasses must be at least 1".to_string(),
        ));
    }
    if matches!(request.duration_days, Some(days) if days < 1) {
        return Err(ApiError::BadRequest(
            "durationDays must be at least 1".to_string(),
        ));
    }
    if matches!(request.duration_days, Some(days) if days > MAX_DURATION_DAYS) {
        return Err(ApiError::BadRequest(format!(
            "durationDays must be at most {}",
            MAX_DURATION_DAYS
        )));
    }
    if package_end_date(request, Utc::now()).is_none() {
        return Err(ApiError::BadRequest(
            "Package end date is out of range".to_string(),
        ));
    }
    if request.price_cents < 0 {
        return Err(ApiError::BadRequest(
            "priceCents must not be negative".to_string(),
        ));
    }
    Ok(())
}

pub async fn list_clients(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let clients = state
        .user_repository
        .list_clients()
        .await
        .map_err(internal("Failed to list clients"))?;

    Ok(Json(clients))
}

/// Everything about one client
pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .user_repository
        .find_by_id(id)
        .await
        .map_err(internal("Failed to get client"))?
        .ok_or_else(user_not_found)?;

    let packages = state
        .package_repository
        .list_for_user(id)
        .await
        .map_err(internal("Failed to list client packages"))?;
    let active_package = state
        .package_repository
        .active_for_user(id)
        .await
        .map_err(internal("Failed to get client package"))?;
    let renewals = state
        .package_repository
        .renewals_for_user(id)
        .await
        .map_err(internal("Failed to list client renewals"))?;
    let bookings = state
        .booking_repository
        .list_for_user(id)
        .await
        .map_err(internal("Failed to list client bookings"))?;

    Ok(Json(ClientDetail {
        user,
        active_package,
        packages,
        renewals,
        bookings,
    }))
}

pub async fn approve_client(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .user_repository
        .approve(id)
        .await
        .map_err(internal("Failed to approve client"))?
        .ok_or_else(user_not_found)?;

    Ok(Json(user))
}

/// Delete a client with their bookings, waitlist places and packages
pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state
        .user_repository
        .delete_cascade(id)
        .await
        .map_err(internal("Failed to delete client"))?;

    if !deleted {
        return Err(user_not_found());
    }

    Ok(Json(MessageResponse::new("Client deleted")))
}

/// Give a client a new active package
pub async fn assign_package(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<AssignPackageRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.name = require_text(&payload.name, "name")?;
    validate_assignment(&payload)?;

    state
        .user_repository
        .find_by_id(id)
        .await
        .map_err(internal("Failed to get client"))?
        .ok_or_else(user_not_found)?;

    let package = state
        .package_repository
        .assign(id, &payload)
        .await
        .map_err(internal("Failed to assign package"))?;

    Ok((StatusCode::CREATED, Json(package)))
}

/// Overwrite the remaining classes of a client's active package
///
/// Only the table constraints apply; a negative count comes back as 400.
pub async fn update_classes(
    State(state): State<AppState>,
    Json(payload): Json<UpdateClassesRequest>,
) -> ApiResult<impl IntoResponse> {
    let package = state
        .package_repository
        .update_classes_remaining(payload.user_id, payload.classes_remaining)
        .await?
        .ok_or_else(no_active_package)?;

    Ok(Json(package))
}

/// Move the end date of a client's active package
pub async fn update_expiration(
    State(state): State<AppState>,
    Json(payload): Json<UpdateExpirationRequest>,
) -> ApiResult<impl IntoResponse> {
    let package = state
        .package_repository
        .update_end_date(payload.user_id, payload.end_date)
        .await?
        .ok_or_else(no_active_package)?;

    Ok(Json(package))
}
