use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod jobs;

use api::config::StudioConfig;
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
    mailer::{Mailer, MailerConfig},
};
use jobs::JobContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting maintenance scheduler");

    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if !health_check(&pool).await? {
        anyhow::bail!("Failed to connect to database");
    }

    let redis_config = RedisConfig::from_env()?;
    let redis = RedisPool::new(&redis_config).await?;

    let ctx = JobContext {
        pool,
        redis,
        mailer: Mailer::new(MailerConfig::from_env()),
        studio: Arc::new(StudioConfig::load()?),
        instance_id: Uuid::new_v4().to_string(),
    };
    info!("Scheduler instance {}", ctx.instance_id);

    let mut scheduler = jobs::start(ctx).await?;

    info!("Maintenance scheduler started successfully");

    // Keep the service running
    tokio::signal::ctrl_c().await?;
    info!("Shutting down maintenance scheduler");
    scheduler.shutdown().await?;

    Ok(())
}
