//! Common library for the studio booking platform
//!
//! This crate provides shared functionality used across the services,
//! including database connectivity, error handling, the Redis pool and the
//! best-effort mailer.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, init_pool, health_check, run_migrations};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     run_migrations(&pool).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod mailer;
