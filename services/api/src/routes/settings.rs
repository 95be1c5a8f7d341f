//! Studio settings handlers

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::{Value, json};

use crate::{
    AppState,
    error::{ApiError, ApiResult, internal},
    repositories::setting::STUDIO_KEY,
};

/// Public studio settings; an empty object until an admin saves some
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let settings = state
        .setting_repository
        .get(STUDIO_KEY)
        .await
        .map_err(internal("Failed to get settings"))?
        .unwrap_or_else(|| json!({}));

    Ok(Json(settings))
}

/// Replace the studio settings
pub async fn put_settings(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    if !payload.is_object() {
        return Err(ApiError::BadRequest(
            "Settings must be a JSON object".to_string(),
        ));
    }

    let stored = state
        .setting_repository
        .put(STUDIO_KEY, &payload)
        .await
        .map_err(internal("Failed to save settings"))?;

    Ok(Json(stored))
}
