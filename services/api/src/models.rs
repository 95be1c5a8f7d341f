//! API models for request and response payloads
//!
//! Entities mirror the database rows; request structs are what handlers
//! accept. All JSON uses camelCase field names.

use serde::Serialize;

pub mod booking;
pub mod class;
pub mod notification;
pub mod package;
pub mod user;
pub mod waitlist;

pub use booking::{Booking, BookingStatus, BookingWithClass};
pub use class::Class;
pub use notification::Notification;
pub use package::{Package, PackageRenewal, RenewalMethod};
pub use user::{Role, User};
pub use waitlist::{UserWaitlistStatus, WaitlistEntry, WaitlistView};

/// Plain acknowledgement with a human-readable message
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised when a stored enum column holds an unknown value
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
