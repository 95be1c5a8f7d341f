//! API service routes

use axum::{
    Json, Router,
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde_json::json;

use crate::{
    AppState,
    error::ApiError,
    middleware::{auth_middleware, require_admin},
};

pub mod bookings;
pub mod classes;
pub mod clients;
pub mod notifications;
pub mod packages;
pub mod settings;
pub mod waitlist;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/classes", post(classes::create_class))
        .route("/admin/classes/batch-create", post(classes::batch_create))
        .route("/admin/classes/batch-toggle", post(classes::batch_toggle))
        .route("/admin/classes/clear-all", delete(classes::clear_all))
        .route("/admin/classes/delete-past", post(classes::delete_past))
        .route(
            "/admin/classes/:id",
            put(classes::update_class).delete(classes::delete_class),
        )
        .route("/admin/classes/:id/bookings", get(classes::roster))
        .route("/admin/classes/:id/add-user", post(classes::add_user))
        .route("/admin/classes/:id/remove-user", post(classes::remove_user))
        .route(
            "/admin/classes/:id/send-notification",
            post(classes::send_notification),
        )
        .route(
            "/admin/bookings/:id/attendance",
            post(bookings::mark_attendance),
        )
        .route("/admin/clients", get(clients::list_clients))
        .route(
            "/admin/clients/update-classes",
            post(clients::update_classes),
        )
        .route(
            "/admin/clients/update-expiration",
            post(clients::update_expiration),
        )
        .route(
            "/admin/clients/:id",
            get(clients::get_client).delete(clients::delete_client),
        )
        .route("/admin/clients/:id/approve", post(clients::approve_client))
        .route(
            "/admin/clients/:id/assign-package",
            post(clients::assign_package),
        )
        .route("/admin/settings", put(settings::put_settings))
        .route_layer(middleware::from_fn(require_admin));

    let protected_routes = Router::new()
        .route("/classes", get(classes::list_classes))
        .route(
            "/classes/waitlist",
            get(waitlist::view_waitlist)
                .post(waitlist::join_waitlist)
                .delete(waitlist::leave_waitlist),
        )
        .route("/classes/:id", get(classes::get_class))
        .route("/classes/:id/booking", delete(bookings::cancel_class_booking))
        .route(
            "/bookings",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route("/bookings/:id", delete(bookings::cancel_booking))
        .route("/bookings/:id/cancel", put(bookings::cancel_booking))
        .route("/packages", get(packages::list_packages))
        .route("/packages/active", get(packages::active_package))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route("/notifications/:id/read", put(notifications::mark_read))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state.jwt.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/settings", get(settings::get_settings))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or(false);

    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "service": "api-service",
        "database": database,
    }))
}

/// Reject blank free-text input
pub(crate) fn require_text(value: &str, field: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}
