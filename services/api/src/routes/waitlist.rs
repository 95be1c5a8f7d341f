//! Waitlist handlers

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::{
    AppState,
    error::ApiResult,
    middleware::AuthUser,
    models::{
        MessageResponse,
        waitlist::{JoinWaitlistResponse, WaitlistQuery, WaitlistRequest},
    },
};

/// Join the waitlist of a class
pub async fn join_waitlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<WaitlistRequest>,
) -> ApiResult<impl IntoResponse> {
    let entry = state
        .waitlist_engine
        .join(user.id, payload.class_id)
        .await?;

    Ok(Json(JoinWaitlistResponse {
        message: format!("Added to waitlist at position {}", entry.position),
        position: entry.position,
        waitlist_entry: entry,
    }))
}

/// Waitlist status of a class
pub async fn view_waitlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<WaitlistQuery>,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .waitlist_engine
        .view(query.class_id, user.actor())
        .await?;

    Ok(Json(view))
}

/// Leave the waitlist of a class
pub async fn leave_waitlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<WaitlistQuery>,
) -> ApiResult<impl IntoResponse> {
    let position = state
        .waitlist_engine
        .leave(user.id, query.class_id)
        .await?;

    Ok(Json(MessageResponse::new(format!(
        "Removed from waitlist (was position {})",
        position
    ))))
}
