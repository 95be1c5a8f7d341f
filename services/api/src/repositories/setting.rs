//! Key/value studio settings stored as JSON

use anyhow::Result;
use serde_json::Value;
use sqlx::PgPool;

/// Key of the public studio configuration blob
pub const STUDIO_KEY: &str = "studio";

#[derive(Clone)]
pub struct SettingRepository {
    pool: PgPool,
}

impl SettingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let value: Option<Value> = sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Replace the value stored under `key`
    pub async fn put(&self, key: &str, value: &Value) -> Result<Value> {
        let stored: Value = sqlx::query_scalar(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }
}
