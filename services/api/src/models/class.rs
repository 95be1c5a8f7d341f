//! Class (scheduled session) models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A scheduled class occurrence
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: Uuid,
    pub name: String,
    pub date: NaiveDate,
    pub day_of_week: String,
    /// Canonical `HH:MM`
    pub time: String,
    pub capacity: i32,
    pub current_bookings: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Class {
    pub fn is_full(&self) -> bool {
        self.current_bookings >= self.capacity
    }

    pub fn available_spots(&self) -> i32 {
        (self.capacity - self.current_bookings).max(0)
    }
}

/// A class plus what the requesting user holds on it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassListing {
    #[serde(flatten)]
    pub class: Class,
    pub available_spots: i32,
    pub is_booked: bool,
    pub waitlist_position: Option<i32>,
}

/// Query parameters for class listing
#[derive(Debug, Clone, Deserialize)]
pub struct ClassQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Request to create a single class
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassRequest {
    pub name: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    pub capacity: Option<i32>,
    #[serde(default)]
    pub enabled: bool,
}

/// Partial class update
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassRequest {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub capacity: Option<i32>,
    pub enabled: Option<bool>,
}

/// Request to lay out a year of classes
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateRequest {
    pub start_date: Option<NaiveDate>,
    pub name: Option<String>,
    pub capacity: Option<i32>,
}

/// Request to enable or disable one week of classes
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchToggleRequest {
    /// Any day inside the target week
    pub date: NaiveDate,
    pub enabled: bool,
}

/// Roster line for a class
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub status: super::BookingStatus,
    pub booked_at: DateTime<Utc>,
}

/// Request for adding a user to a class from the admin panel
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub force_add: bool,
}

/// Request for removing a user from a class from the admin panel
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveUserRequest {
    pub user_id: Uuid,
}

/// Free-text message sent to everyone booked on a class
#[derive(Debug, Clone, Deserialize)]
pub struct ClassNotificationRequest {
    pub message: String,
}
