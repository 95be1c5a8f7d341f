//! Notification handlers

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    AppState,
    error::{ApiError, ApiResult, internal},
    middleware::AuthUser,
    models::MessageResponse,
};

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let notifications = state
        .notification_repository
        .list_for_user(user.id)
        .await
        .map_err(internal("Failed to list notifications"))?;

    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let updated = state
        .notification_repository
        .mark_read(user.id, id)
        .await
        .map_err(internal("Failed to mark notification read"))?;

    if !updated {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }

    Ok(Json(MessageResponse::new("Notification marked as read")))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let updated = state
        .notification_repository
        .mark_all_read(user.id)
        .await
        .map_err(internal("Failed to mark notifications read"))?;

    Ok(Json(json!({
        "message": "All notifications marked as read",
        "updated": updated,
    })))
}
