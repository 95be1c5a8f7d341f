//! Package repository: grants, balances and expiry

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::engine::{PACKAGE_COLUMNS, active_package, insert_notification};
use crate::models::{
    Package, PackageRenewal, RenewalMethod, notification::kind, package::AssignPackageRequest,
};

/// Validity used when an assignment names neither a duration nor an end date
pub const DEFAULT_DURATION_DAYS: i64 = 30;

/// Method recorded when the admin does not name one
pub fn default_method(had_package: bool) -> RenewalMethod {
    if had_package {
        RenewalMethod::Renewal
    } else {
        RenewalMethod::AdminAssigned
    }
}

/// When an assigned package ends; `None` when the duration is out of range
pub fn package_end_date(
    request: &AssignPackageRequest,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if let Some(end_date) = request.end_date {
        return Some(end_date);
    }
    let days = request.duration_days.unwrap_or(DEFAULT_DURATION_DAYS);
    now.checked_add_signed(Duration::try_days(days)?)
}

#[derive(Clone)]
pub struct PackageRepository {
    pool: PgPool,
}

impl PackageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All of a user's packages, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Package>> {
        let packages = sqlx::query_as::<_, Package>(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM packages WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(packages)
    }

    pub async fn active_for_user(&self, user_id: Uuid) -> Result<Option<Package>> {
        let mut conn = self.pool.acquire().await?;
        Ok(active_package(&mut conn, user_id).await?)
    }

    pub async fn renewals_for_user(&self, user_id: Uuid) -> Result<Vec<PackageRenewal>> {
        let renewals = sqlx::query_as::<_, PackageRenewal>(
            r#"
            SELECT id, user_id, package_id, package_type, price_cents, method, created_at
            FROM package_renewals
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(renewals)
    }

    /// Give a user a new active package
    ///
    /// Every other package of the user is deactivated in the same transaction,
    /// and the grant is recorded as a renewal.
    pub async fn assign(&self, user_id: Uuid, request: &AssignPackageRequest) -> Result<Package> {
        let now = Utc::now();
        let end_date = package_end_date(request, now)
            .ok_or_else(|| anyhow::anyhow!("Package duration out of range"))?;
        let mut tx = self.pool.begin().await?;

        let had_package: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM packages WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query("UPDATE packages SET active = FALSE WHERE user_id = $1 AND active")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let package = sqlx::query_as::<_, Package>(&format!(
            "INSERT INTO packages \
                 (id, user_id, name, total_classes, classes_remaining, \
                  start_date, end_date, active) \
             VALUES ($1, $2, $3, $4, $4, $5, $6, TRUE) \
             RETURNING {PACKAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&request.name)
        .bind(request.total_classes)
        .bind(now)
        .bind(end_date)
        .fetch_one(&mut *tx)
        .await?;

        let method = request.method.unwrap_or_else(|| default_method(had_package));
        sqlx::query(
            r#"
            INSERT INTO package_renewals
                (id, user_id, package_id, package_type, price_cents, method)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(package.id)
        .bind(&package.name)
        .bind(request.price_cents)
        .bind(method.as_str())
        .execute(&mut *tx)
        .await?;

        insert_notification(
            &mut tx,
            user_id,
            kind::PACKAGE_ASSIGNED,
            &format!(
                "You have a new package '{}' with {} classes, valid until {}",
                package.name,
                package.total_classes,
                package.end_date.format("%Y-%m-%d")
            ),
        )
        .await?;

        tx.commit().await?;

        info!(
            "Assigned package {} ({} classes) to user {} as {}",
            package.id,
            package.total_classes,
            user_id,
            method.as_str()
        );

        Ok(package)
    }

    /// Overwrite the remaining balance of the active package
    ///
    /// `total_classes` grows with the balance so the package stays consistent.
    pub async fn update_classes_remaining(
        &self,
        user_id: Uuid,
        classes_remaining: i32,
    ) -> DatabaseResult<Option<Package>> {
        let package = sqlx::query_as::<_, Package>(&format!(
            "UPDATE packages \
             SET classes_remaining = $2, total_classes = GREATEST(total_classes, $2) \
             WHERE id = ( \
                 SELECT id FROM packages WHERE user_id = $1 AND active \
                 ORDER BY end_date DESC LIMIT 1) \
             RETURNING {PACKAGE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(classes_remaining)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::classify)?;

        Ok(package)
    }

    /// Move the end date of the active package and re-arm the expiry warning
    pub async fn update_end_date(
        &self,
        user_id: Uuid,
        end_date: DateTime<Utc>,
    ) -> DatabaseResult<Option<Package>> {
        let package = sqlx::query_as::<_, Package>(&format!(
            "UPDATE packages \
             SET end_date = $2, expiry_notified_at = NULL \
             WHERE id = ( \
                 SELECT id FROM packages WHERE user_id = $1 AND active \
                 ORDER BY end_date DESC LIMIT 1) \
             RETURNING {PACKAGE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(end_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::classify)?;

        Ok(package)
    }
}
