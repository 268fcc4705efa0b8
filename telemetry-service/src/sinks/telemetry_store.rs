use std::time::Duration;

use futures::StreamExt;
use solar_client::db::Store;
use solar_client::domain::device_reading::insert_column_list;
use solar_client::domain::DeviceReading;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Batched writer into one of the device-data stores.
///
/// Duplicate (`device_sn`, `ts`) rows are skipped via `ON CONFLICT DO
/// NOTHING`, so replays and overlapping backfills stay idempotent. A failed
/// flush is retried with linear backoff before the pipeline is failed.
pub struct TelemetryStoreSink {
    pool: PgPool,
    store: Store,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl TelemetryStoreSink {
    pub fn new(
        pool: PgPool,
        store: Store,
        batch_size: usize,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            pool,
            store,
            batch_size,
            max_retries,
            retry_backoff,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope<DeviceReading>]) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            match self.insert_batch(batch).await {
                Ok(stored) => {
                    metrics::counter!("store_ingested_readings_total").increment(stored);
                    let skipped = batch.len() as u64 - stored;
                    if skipped > 0 {
                        metrics::counter!("store_duplicate_readings_total").increment(skipped);
                    }

                    // Approximate end-to-end latency from earliest received_at.
                    if let Some(min_received) = batch.iter().map(|e| e.received_at).min() {
                        if let Ok(dur) = std::time::SystemTime::now().duration_since(min_received) {
                            metrics::histogram!("ingest_end_to_end_latency_seconds")
                                .record(dur.as_secs_f64());
                        }
                    }

                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        table = self.store.table(),
                        "store flush failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, table = self.store.table(), "store flush failed, giving up");
                    metrics::counter!("store_sink_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }

    /// Returns the number of rows actually stored (conflicts excluded).
    async fn insert_batch(&self, batch: &[Envelope<DeviceReading>]) -> Result<u64, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) ",
            self.store.table(),
            insert_column_list(),
        ));

        builder.push_values(batch, |mut b, env| {
            let r = &env.payload;
            b.push_bind(&r.tenant).push_bind(&r.device_sn).push_bind(r.ts);
            for (_, value) in r.numeric_fields() {
                b.push_bind(value);
            }
            b.push_bind(&r.state);
        });
        builder.push(" ON CONFLICT (device_sn, ts) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl Sink<DeviceReading> for TelemetryStoreSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<DeviceReading>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        let mut buffer: Vec<Envelope<DeviceReading>> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(PipelineError::Validation(_)) => {
                    // Already counted and error-logged by the transform.
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for TelemetryStoreSink");
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer).await?;
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            self.flush_batch(&buffer).await?;
        }

        Ok(())
    }
}
