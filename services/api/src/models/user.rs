//! User model as seen by the booking service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::{BookingWithClass, Package, PackageRenewal, UnknownVariant};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// User entity (password hash stays in the auth service)
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Row of the admin client list
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub package_name: Option<String>,
    pub classes_remaining: Option<i32>,
    pub package_end_date: Option<DateTime<Utc>>,
    pub upcoming_bookings: i64,
}

/// Everything the admin client page shows for one user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    pub user: User,
    pub active_package: Option<Package>,
    pub packages: Vec<Package>,
    pub renewals: Vec<PackageRenewal>,
    pub bookings: Vec<BookingWithClass>,
}
