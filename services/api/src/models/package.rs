//! Class package models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

/// Prepaid bundle of classes
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub total_classes: i32,
    pub classes_remaining: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub active: bool,
    pub expiry_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Package {
    /// Whether the package can pay for a class at `now`
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.classes_remaining > 0 && self.end_date >= now
    }
}

/// How a package was granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalMethod {
    Renewal,
    Purchase,
    AdminAssigned,
}

impl RenewalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalMethod::Renewal => "renewal",
            RenewalMethod::Purchase => "purchase",
            RenewalMethod::AdminAssigned => "admin_assigned",
        }
    }
}

impl FromStr for RenewalMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "renewal" => Ok(RenewalMethod::Renewal),
            "purchase" => Ok(RenewalMethod::Purchase),
            "admin_assigned" => Ok(RenewalMethod::AdminAssigned),
            other => Err(UnknownVariant {
                kind: "renewal method",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for RenewalMethod {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Audit record of a package grant
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PackageRenewal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub package_type: String,
    pub price_cents: i64,
    #[sqlx(try_from = "String")]
    pub method: RenewalMethod,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /admin/clients/{id}/assign-package`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignPackageRequest {
    pub name: String,
    pub total_classes: i32,
    /// Validity in days from now; ignored when `end_date` is given
    pub duration_days: Option<i64>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub price_cents: i64,
    pub method: Option<RenewalMethod>,
}

/// Request body for `POST /admin/clients/update-classes`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassesRequest {
    pub user_id: Uuid,
    pub classes_remaining: i32,
}

/// Request body for `POST /admin/clients/update-expiration`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExpirationRequest {
    pub user_id: Uuid,
    pub end_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn package(remaining: i32, ends_in: Duration, active: bool) -> Package {
        let now = Utc::now();
        Package {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "10 classes".to_string(),
            total_classes: 10,
            classes_remaining: remaining,
            start_date: now - Duration::days(1),
            end_date: now + ends_in,
            active,
            expiry_notified_at: None,
            created_at: now,
        }
    }

    #[test]
    fn test_package_usability() {
        let now = Utc::now();
        assert!(package(3, Duration::days(5), true).is_usable(now));
        assert!(!package(0, Duration::days(5), true).is_usable(now));
        assert!(!package(3, Duration::days(-1), true).is_usable(now));
        assert!(!package(3, Duration::days(5), false).is_usable(now));
    }

    #[test]
    fn test_assign_request_defaults() {
        let request: AssignPackageRequest =
            serde_json::from_str(r#"{"name":"Monthly","totalClasses":8,"durationDays":30}"#)
                .unwrap();
        assert_eq!(request.price_cents, 0);
        assert_eq!(request.duration_days, Some(30));
        assert!(request.method.is_none());

        let request: AssignPackageRequest = serde_json::from_str(
            r#"{"name":"Drop-in","totalClasses":1,"method":"purchase","priceCents":1500}"#,
        )
        .unwrap();
        assert_eq!(request.method, Some(RenewalMethod::Purchase));
    }
}
