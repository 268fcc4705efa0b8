//! Current-to-historical retention rollup.
//!
//! Rows older than the age threshold are copied into the historical store
//! and deleted from the current store in one transaction, so no row is ever
//! visible in both stores or in neither. The copy skips rows whose
//! (`device_sn`, `ts`) key already exists in historical, which keeps
//! re-runs after a failed invocation idempotent.

use std::time::Duration;

use solar_client::domain::device_reading::insert_column_list;
use sqlx::PgPool;
use time::OffsetDateTime;

#[derive(thiserror::Error, Debug)]
pub enum RetentionError {
    #[error("retention rollup failed: {0}")]
    Db(#[from] sqlx::Error),
}

/// Result of one rollup invocation. `copied` excludes rows already present
/// in historical from an earlier partial run; `deleted` counts every
/// age-qualified row removed from current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionOutcome {
    pub copied: u64,
    pub deleted: u64,
}

pub struct RetentionJob {
    pool: PgPool,
    max_age: Duration,
}

impl RetentionJob {
    pub fn new(pool: PgPool, max_age: Duration) -> Self {
        Self { pool, max_age }
    }

    /// Oldest timestamp allowed to stay in the current store, as of `now`.
    /// Both statements of the rollup bind this one value so the copy and
    /// the delete qualify exactly the same rows.
    pub fn cutoff_from(&self, now: OffsetDateTime) -> OffsetDateTime {
        now - self.max_age
    }

    pub async fn run_once(&self) -> Result<RetentionOutcome, RetentionError> {
        let cutoff = self.cutoff_from(OffsetDateTime::now_utc());
        let cols = insert_column_list();

        let mut tx = self.pool.begin().await?;

        let copied = sqlx::query(&format!(
            "INSERT INTO device_data_historical ({cols}, created_at, updated_at) \
             SELECT {cols}, created_at, now() FROM device_data_current \
             WHERE ts < $1 \
             ON CONFLICT (device_sn, ts) DO NOTHING"
        ))
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let deleted = sqlx::query("DELETE FROM device_data_current WHERE ts < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        metrics::counter!("retention_rows_copied_total").increment(copied);
        metrics::counter!("retention_rows_deleted_total").increment(deleted);
        tracing::info!(
            copied,
            deleted,
            cutoff = %cutoff,
            "device data retention rollup complete"
        );

        Ok(RetentionOutcome { copied, deleted })
    }

    /// Run the rollup on a fixed cadence until the task is dropped. A failed
    /// invocation is logged and recovery is left to the next tick.
    pub async fn run_scheduled(self, every: Duration, run_on_start: bool) {
        let mut ticker = tokio::time::interval(every);
        if !run_on_start {
            // interval fires immediately; swallow the first tick.
            ticker.tick().await;
        }
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                metrics::counter!("retention_failures_total").increment(1);
                tracing::error!(error = %e, "retention rollup failed, awaiting next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn job(days: u64) -> RetentionJob {
        // Pool handle is lazy; no connection is made until a query runs.
        let pool = PgPool::connect_lazy("postgres://localhost/unused").expect("lazy pool");
        RetentionJob::new(pool, Duration::from_secs(days * 24 * 3600))
    }

    #[tokio::test]
    async fn cutoff_is_threshold_days_before_now() {
        let now = datetime!(2024-06-08 00:00:00 UTC);
        assert_eq!(job(7).cutoff_from(now), datetime!(2024-06-01 00:00:00 UTC));
    }

    #[tokio::test]
    async fn eight_day_old_rows_qualify_and_six_day_old_rows_do_not() {
        let now = datetime!(2024-06-09 12:00:00 UTC);
        let cutoff = job(7).cutoff_from(now);
        let eight_days_old = datetime!(2024-06-01 12:00:00 UTC);
        let six_days_old = datetime!(2024-06-03 12:00:00 UTC);
        assert!(eight_days_old < cutoff);
        assert!(six_days_old >= cutoff);
    }
}
