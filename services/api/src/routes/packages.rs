//! Package handlers for clients

use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::{ApiResult, internal},
    middleware::AuthUser,
};

/// The caller's packages, newest first
pub async fn list_packages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let packages = state
        .package_repository
        .list_for_user(user.id)
        .await
        .map_err(internal("Failed to list packages"))?;

    Ok(Json(packages))
}

/// The caller's active package, or `null`
pub async fn active_package(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let package = state
        .package_repository
        .active_for_user(user.id)
        .await
        .map_err(internal("Failed to get active package"))?;

    Ok(Json(package))
}
