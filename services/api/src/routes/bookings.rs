//! Booking handlers

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::{ApiError, ApiResult, internal},
    middleware::AuthUser,
    models::booking::{AttendanceRequest, BookingResponse, CreateBookingRequest},
};

/// The caller's bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let bookings = state
        .booking_repository
        .list_for_user(user.id)
        .await
        .map_err(internal("Failed to list bookings"))?;

    Ok(Json(bookings))
}

/// Book a class for the caller
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.booking_engine.book(user.id, payload.class_id).await?;

    Ok(Json(BookingResponse {
        message: "Class booked successfully".to_string(),
        booking,
    }))
}

/// Cancel a booking
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.cancellation_engine.cancel(id, user.actor()).await?;

    Ok(Json(BookingResponse {
        message: "Booking cancelled successfully".to_string(),
        booking,
    }))
}

/// Cancel the caller's booking on a class
pub async fn cancel_class_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(class_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let booking = state
        .cancellation_engine
        .cancel_for_class(class_id, user.id, user.actor())
        .await?;

    Ok(Json(BookingResponse {
        message: "Booking cancelled successfully".to_string(),
        booking,
    }))
}

/// Mark whether the booked user showed up
pub async fn mark_attendance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttendanceRequest>,
) -> ApiResult<impl IntoResponse> {
    if let Some(booking) = state
        .booking_repository
        .set_attendance(id, payload.attended)
        .await
        .map_err(internal("Failed to record attendance"))?
    {
        return Ok(Json(booking));
    }

    let exists = state
        .booking_repository
        .find_by_id(id)
        .await
        .map_err(internal("Failed to get booking"))?
        .is_some();

    if exists {
        Err(ApiError::BadRequest(
            "Attendance cannot be recorded for a cancelled booking".to_string(),
        ))
    } else {
        Err(ApiError::NotFound("Booking not found".to_string()))
    }
}
