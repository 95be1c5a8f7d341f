//! In-app notification models

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Notification tags written by the platform
pub mod kind {
    pub const BOOKING_CONFIRMED: &str = "booking_confirmed";
    pub const BOOKING_ADDED: &str = "booking_added";
    pub const BOOKING_CANCELLED: &str = "booking_cancelled";
    pub const BOOKING_REMOVED: &str = "booking_removed";
    pub const WAITLIST_JOINED: &str = "waitlist_joined";
    pub const PACKAGE_ASSIGNED: &str = "package_assigned";
    pub const PACKAGE_EXPIRING: &str = "package_expiring";
    pub const CLASS_MESSAGE: &str = "class_message";
}

/// Notification entity
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
