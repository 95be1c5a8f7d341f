//! Periodic maintenance jobs
//!
//! Every run first takes a Redis lock named after the job, so with several
//! scheduler instances up only one of them does the work for a given tick.

use anyhow::Result;
use api::{config::StudioConfig, maintenance};
use chrono::Utc;
use common::{cache::RedisPool, mailer::Mailer};
use sqlx::PgPool;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

/// Upper bound on how long one run may hold its lock
pub const LOCK_TTL_SECONDS: u64 = 600;

/// The maintenance jobs this service runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    ExpiringPackages,
    PurgePastClasses,
    ReconcileCounters,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::ExpiringPackages,
        JobKind::PurgePastClasses,
        JobKind::ReconcileCounters,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JobKind::ExpiringPackages => "expiring-packages",
            JobKind::PurgePastClasses => "purge-past-classes",
            JobKind::ReconcileCounters => "reconcile-counters",
        }
    }

    /// Six-field cron expression (seconds first), evaluated in UTC
    pub fn default_cron(self) -> &'static str {
        match self {
            JobKind::ExpiringPackages => "0 0 8 * * *",
            JobKind::PurgePastClasses => "0 0 3 * * Mon",
            JobKind::ReconcileCounters => "0 30 2 * * *",
        }
    }

    /// Environment variable that overrides the schedule
    pub fn env_var(self) -> &'static str {
        match self {
            JobKind::ExpiringPackages => "SCHEDULER_EXPIRING_PACKAGES_CRON",
            JobKind::PurgePastClasses => "SCHEDULER_PURGE_PAST_CLASSES_CRON",
            JobKind::ReconcileCounters => "SCHEDULER_RECONCILE_COUNTERS_CRON",
        }
    }

    pub fn schedule(self) -> String {
        std::env::var(self.env_var()).unwrap_or_else(|_| self.default_cron().to_string())
    }

    pub fn lock_key(self) -> String {
        format!("scheduler:lock:{}", self.name())
    }
}

/// Everything a job run needs
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub redis: RedisPool,
    pub mailer: Mailer,
    pub studio: Arc<StudioConfig>,
    /// Lock owner token for this process
    pub instance_id: String,
}

async fn execute(ctx: &JobContext, kind: JobKind) -> Result<()> {
    let now = Utc::now();

    match kind {
        JobKind::ExpiringPackages => {
            let warned = maintenance::notify_expiring_packages(
                &ctx.pool,
                &ctx.mailer,
                now,
                ctx.studio.expiry_warning_days,
            )
            .await?;
            info!("Warned {} package holders about expiry", warned);
        }
        JobKind::PurgePastClasses => {
            let summary = maintenance::purge_past_classes(
                &ctx.pool,
                ctx.studio.today(now),
                ctx.studio.retention_days,
            )
            .await?;
            info!(
                "Purged {} past classes, {} bookings, {} waitlist entries",
                summary.classes, summary.bookings, summary.waitlist_entries
            );
        }
        JobKind::ReconcileCounters => {
            let fixed = maintenance::reconcile_class_counters(&ctx.pool, None).await?;
            info!("Counter reconciliation fixed {} classes", fixed);
        }
    }

    Ok(())
}

/// Run `kind` if no other instance holds its lock
///
/// Returns whether this instance ran the job. Job failures are logged, not
/// returned; only lock errors propagate.
pub async fn run_locked(ctx: &JobContext, kind: JobKind) -> Result<bool> {
    let key = kind.lock_key();

    if !ctx
        .redis
        .try_lock(&key, &ctx.instance_id, LOCK_TTL_SECONDS)
        .await?
    {
        debug!("Job {} is running elsewhere, skipping", kind.name());
        return Ok(false);
    }

    info!("Job {} started", kind.name());
    if let Err(e) = execute(ctx, kind).await {
        error!("Job {} failed: {}", kind.name(), e);
    }

    if !ctx.redis.release_lock(&key, &ctx.instance_id).await? {
        warn!("Lock for job {} expired before the run finished", kind.name());
    }

    Ok(true)
}

/// Register every job on a new scheduler and start it
pub async fn start(ctx: JobContext) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    for kind in JobKind::ALL {
        let schedule = kind.schedule();
        let ctx = ctx.clone();

        let job = Job::new_async(schedule.as_str(), move |_, _| {
            let ctx = ctx.clone();
            Box::pin(async move {
                if let Err(e) = run_locked(&ctx, kind).await {
                    error!("Job {} could not run: {}", kind.name(), e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Scheduled job {} with schedule: {}", kind.name(), schedule);
    }

    scheduler.start().await?;

    Ok(scheduler)
}
