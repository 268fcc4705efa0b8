//! Backfill historical device data from an NDJSON export.
//!
//! Rows land in the historical store; duplicates against earlier backfills
//! are skipped by the sink's conflict handling.

use std::{env, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use solar_client::db::{schema, ErrorLog, Store};
use solar_client::domain::DeviceReading;
use sqlx::postgres::PgPoolOptions;
use telemetry_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::TelemetryStoreSink,
    sources::ReadingBackfillFileSource,
    transform::DeviceReadingValidation,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_readings <ndjson_file_path>");
    }
    let file_path = &args[1];

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    schema::create_schema(&pool).await?;

    let sink = TelemetryStoreSink::new(
        pool.clone(),
        Store::Historical,
        cfg.ingest.sink.batch_size,
        cfg.ingest.sink.max_retries,
        Duration::from_millis(cfg.ingest.sink.retry_backoff_ms),
    );

    let source = ReadingBackfillFileSource::new(file_path);

    let pipeline: Pipeline<_, DeviceReading, _> = Pipeline {
        source,
        transforms: vec![Arc::new(DeviceReadingValidation::new(ErrorLog::new(pool)))],
        sink,
    };

    pipeline.run().await?;

    Ok(())
}
