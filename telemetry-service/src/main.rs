use std::{sync::Arc, time::Duration};

use anyhow::Result;
use solar_client::db::{schema, ErrorLog, Store, TenantProvisioner};
use solar_client::domain::DeviceReading;
use sqlx::postgres::PgPoolOptions;
use telemetry_service::{
    config::AppConfig,
    metrics_server, observability,
    pipeline::Pipeline,
    retention::RetentionJob,
    sinks::TelemetryStoreSink,
    sources::HttpReadingSource,
    transform::DeviceReadingValidation,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    schema::create_schema(&pool).await?;
    schema::enable_hypertables(&pool).await;

    let provisioner = TenantProvisioner::new(pool.clone());
    let error_log = ErrorLog::new(pool.clone());

    // Weekly retention rollup runs alongside the ingest pipeline.
    let retention = RetentionJob::new(
        pool.clone(),
        Duration::from_secs(cfg.retention.max_age_days * 24 * 3600),
    );
    tokio::spawn(retention.run_scheduled(
        Duration::from_secs(cfg.retention.interval_hours * 3600),
        cfg.retention.run_on_start,
    ));

    let source = HttpReadingSource::new(
        &cfg.ingest.source.http_bind_addr,
        cfg.ingest.source.channel_capacity,
        provisioner,
    )
    .await?;

    let sink = TelemetryStoreSink::new(
        pool,
        Store::Current,
        cfg.ingest.sink.batch_size,
        cfg.ingest.sink.max_retries,
        Duration::from_millis(cfg.ingest.sink.retry_backoff_ms),
    );

    let pipeline: Pipeline<_, DeviceReading, _> = Pipeline {
        source,
        transforms: vec![Arc::new(DeviceReadingValidation::new(error_log))],
        sink,
    };

    tracing::info!(
        bind = %cfg.ingest.source.http_bind_addr,
        "telemetry ingest pipeline starting"
    );
    pipeline.run().await?;

    Ok(())
}
