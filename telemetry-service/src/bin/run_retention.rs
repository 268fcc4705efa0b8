//! One-shot retention rollup, for operators and cron-style schedulers.

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use telemetry_service::{config::AppConfig, observability, retention::RetentionJob};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let job = RetentionJob::new(
        pool,
        Duration::from_secs(cfg.retention.max_age_days * 24 * 3600),
    );
    let outcome = job.run_once().await?;

    tracing::info!(
        copied = outcome.copied,
        deleted = outcome.deleted,
        "retention run finished"
    );
    Ok(())
}
