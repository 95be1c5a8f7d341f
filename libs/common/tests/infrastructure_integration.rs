//! Integration tests for the infrastructure components
//!
//! These tests verify that the PostgreSQL database and Redis cache
//! are properly configured and accessible from the application.
//! Run with `cargo test -- --ignored` against live services.

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
};
use sqlx::Row;

/// Test that verifies both PostgreSQL and Redis are accessible
/// and can perform basic operations
#[tokio::test]
#[ignore = "requires running PostgreSQL and Redis instances"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize PostgreSQL connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");

    // Schema must be in place for the services
    run_migrations(&pool).await?;
    let row = sqlx::query(
        "SELECT COUNT(*) AS tables FROM information_schema.tables \
         WHERE table_name IN ('users', 'classes', 'bookings', 'waitlist', 'packages')",
    )
    .fetch_one(&pool)
    .await?;

    let tables: i64 = row.get("tables");
    assert_eq!(tables, 5, "Expected core tables to exist after migration");

    // Initialize Redis client
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    assert!(
        redis_pool.health_check().await?,
        "Redis health check failed"
    );

    let test_key = "integration_test_key";
    let test_value = "integration_test_value";

    redis_pool.set(test_key, test_value, Some(10)).await?;

    let retrieved_value = redis_pool.get(test_key).await?;
    assert_eq!(
        retrieved_value,
        Some(test_value.to_string()),
        "Redis SET/GET test failed"
    );

    redis_pool.delete(test_key).await?;

    let retrieved_value = redis_pool.get(test_key).await?;
    assert_eq!(retrieved_value, None, "Redis delete operation failed");

    Ok(())
}
