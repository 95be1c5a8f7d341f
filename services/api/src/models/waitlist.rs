//! Waitlist models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Class;

/// One place in a class waitlist
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    /// 1-based, gapless per class
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// Waitlist entry with the member's identity, for admins
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistMember {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// Request body for joining or leaving a waitlist
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistRequest {
    pub class_id: Uuid,
}

/// Query for `GET /classes/waitlist`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistQuery {
    pub class_id: Uuid,
}

/// Requester's own place in a waitlist
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWaitlistStatus {
    pub position: i32,
    pub joined_at: DateTime<Utc>,
}

/// Waitlist as seen by the requester
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistView {
    pub class: Class,
    pub user_waitlist_status: Option<UserWaitlistStatus>,
    pub waitlist_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_entries: Option<Vec<WaitlistMember>>,
}

/// Response for a successful join
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinWaitlistResponse {
    pub message: String,
    pub position: i32,
    pub waitlist_entry: WaitlistEntry,
}
