//! Booking models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::UnknownVariant;

/// Lifecycle of a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Paid for with a package credit
    Confirmed,
    /// Added by an admin without charging a package
    PreAdded,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::PreAdded => "pre_added",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::NoShow => "no_show",
        }
    }

    /// Whether the booking occupies a seat in the class counter
    pub fn holds_seat(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    /// Whether cancelling hands a credit back to the package
    pub fn is_refundable(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    /// Whether the booking can still be cancelled
    pub fn is_cancellable(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::PreAdded)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "active" is the legacy default for a paid booking
            "confirmed" | "active" => Ok(BookingStatus::Confirmed),
            "pre_added" => Ok(BookingStatus::PreAdded),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            "no_show" | "no-show" => Ok(BookingStatus::NoShow),
            other => Err(UnknownVariant {
                kind: "booking status",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Booking entity
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking with the class fields a client list needs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingWithClass {
    #[serde(flatten)]
    pub booking: Booking,
    pub class_name: String,
    pub class_date: NaiveDate,
    pub class_time: String,
}

/// Request body for `POST /bookings`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub class_id: Uuid,
}

/// Response for booking create and cancel
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub message: String,
    pub booking: Booking,
}

/// Request body for marking attendance
#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceRequest {
    pub attended: bool,
}
