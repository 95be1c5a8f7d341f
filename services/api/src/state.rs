//! Application state shared across handlers

use common::mailer::Mailer;
use sqlx::PgPool;
use std::sync::Arc;

use crate::{
    config::StudioConfig,
    engine::{BookingEngine, CancellationEngine, CancellationPolicy, WaitlistEngine},
    middleware::JwtVerifier,
    repositories::{
        BookingRepository, ClassRepository, NotificationRepository, PackageRepository,
        SettingRepository, UserRepository,
    },
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub studio: Arc<StudioConfig>,
    pub jwt: JwtVerifier,
    pub mailer: Mailer,
    pub user_repository: UserRepository,
    pub class_repository: ClassRepository,
    pub booking_repository: BookingRepository,
    pub package_repository: PackageRepository,
    pub notification_repository: NotificationRepository,
    pub setting_repository: SettingRepository,
    pub booking_engine: BookingEngine,
    pub cancellation_engine: CancellationEngine,
    pub waitlist_engine: WaitlistEngine,
}

impl AppState {
    pub fn new(pool: PgPool, studio: StudioConfig, jwt: JwtVerifier, mailer: Mailer) -> Self {
        let policy = CancellationPolicy {
            window: studio.cancellation_window(),
            utc_offset: studio.utc_offset(),
        };

        Self {
            user_repository: UserRepository::new(pool.clone()),
            class_repository: ClassRepository::new(pool.clone()),
            booking_repository: BookingRepository::new(pool.clone()),
            package_repository: PackageRepository::new(pool.clone()),
            notification_repository: NotificationRepository::new(pool.clone()),
            setting_repository: SettingRepository::new(pool.clone()),
            booking_engine: BookingEngine::new(pool.clone(), mailer.clone()),
            cancellation_engine: CancellationEngine::new(pool.clone(), mailer.clone(), policy),
            waitlist_engine: WaitlistEngine::new(pool.clone()),
            studio: Arc::new(studio),
            jwt,
            mailer,
            db_pool: pool,
        }
    }
}
