use sqlx::PgPool;

use crate::domain::ErrorLogEntry;

/// Append-only sink for provisioning and validation failures.
///
/// Recording acquires its own connection from the pool, so an entry written
/// while a caller's transaction is failing still commits after that
/// transaction rolls back. A failure to write the log entry itself is
/// demoted to a warning; the primary error path never depends on the audit
/// trail.
#[derive(Clone)]
pub struct ErrorLog {
    pool: PgPool,
}

impl ErrorLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: ErrorLogEntry) {
        let res = sqlx::query(
            r#"
            INSERT INTO error_logs (customer_id, device_sn, api_provider, field_name, field_value, error_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entry.customer_id)
        .bind(&entry.device_sn)
        .bind(&entry.api_provider)
        .bind(&entry.field_name)
        .bind(&entry.field_value)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await;

        if let Err(e) = res {
            tracing::warn!(
                field = %entry.field_name,
                error = %e,
                "failed to append error_logs entry"
            );
        }
    }
}
