use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use api::{
    AppState,
    config::{ServerConfig, StudioConfig},
    create_router,
    middleware::{JwtConfig, JwtVerifier},
};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
    mailer::{Mailer, MailerConfig},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting API service");

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

    let studio = StudioConfig::load()?;
    info!(
        "Studio policy: {}h cancellation window, UTC offset {} minutes",
        studio.cancellation_window_hours, studio.utc_offset_minutes
    );

    let jwt_config = JwtConfig::from_env().map_err(anyhow::Error::msg)?;
    let redis = RedisPool::new(&RedisConfig::from_env()?).await?;
    let jwt = JwtVerifier::new(&jwt_config)?.with_revocations(redis);
    let mailer = Mailer::new(MailerConfig::from_env());

    let app_state = AppState::new(pool, studio, jwt, mailer);

    info!("API service initialized successfully");

    // Start the web server
    let app = create_router(app_state);

    let server_config = ServerConfig::from_env();
    let listener = tokio::net::TcpListener::bind(server_config.address()).await?;
    info!("API service listening on {}", server_config.address());

    axum::serve(listener, app).await?;

    Ok(())
}
