use anyhow::Result;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod jwt;
mod middleware;
mod models;
mod rate_limiter;
mod repositories;
mod routes;
mod session;
mod validation;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
};

use crate::{
    jwt::{JwtConfig, JwtService},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::UserRepository,
    session::SessionManager,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub sessions: SessionManager,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub rate_limiter: RateLimiter,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    run_migrations(&pool).await?;

    // Initialize JWT service
    let jwt_config = JwtConfig::from_env()?;
    let jwt_service = JwtService::new(jwt_config)?;

    // Initialize Redis connection pool
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    let app_state = AppState {
        db_pool: pool.clone(),
        sessions: SessionManager::new(redis_pool, jwt_service.refresh_token_expiry()),
        jwt_service,
        user_repository: UserRepository::new(pool),
        rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let port = std::env::var("AUTH_PORT").unwrap_or_else(|_| "3000".to_string());
    let address = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Authentication service listening on {}", address);

    axum::serve(listener, app).await?;

    Ok(())
}
