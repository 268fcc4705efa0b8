//! Database schema bootstrap.
//!
//! Applied once at startup. Every statement is `IF NOT EXISTS`-guarded so
//! the bootstrap is safe to re-run on every boot; existing tables are never
//! altered or dropped. The device-data DDL for both stores is generated
//! from [`READING_BOUNDS`] so column set and CHECK constraints cannot drift
//! between current and historical storage.

use anyhow::Result;
use sqlx::PgPool;

use crate::domain::device_reading::READING_BOUNDS;

/// Create all catalog and telemetry tables (idempotent, one transaction).
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            customer_id   TEXT PRIMARY KEY,
            customer_name TEXT NOT NULL,
            email         TEXT,
            phone         TEXT,
            address       TEXT,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Tenant registry: one row per sanitized customer identifier. Replaces
    // the original deployment's per-customer tables created by trigger DDL.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenant_stores (
            tenant      TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL UNIQUE REFERENCES customers (customer_id),
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plants (
            plant_id     TEXT PRIMARY KEY,
            customer_id  TEXT NOT NULL REFERENCES customers (customer_id),
            plant_name   TEXT NOT NULL,
            capacity     DOUBLE PRECISION NOT NULL DEFAULT 0 CHECK (capacity >= 0),
            total_energy DOUBLE PRECISION NOT NULL DEFAULT 0 CHECK (total_energy >= 0),
            install_date DATE,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            device_sn          TEXT PRIMARY KEY,
            plant_id           TEXT NOT NULL REFERENCES plants (plant_id),
            inverter_model     TEXT,
            panel_model        TEXT,
            pv_count           INTEGER NOT NULL DEFAULT 0 CHECK (pv_count >= 0),
            string_count       INTEGER NOT NULL DEFAULT 0 CHECK (string_count >= 0),
            first_install_date DATE,
            created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at         TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_credentials (
            user_id      TEXT PRIMARY KEY,
            customer_id  TEXT NOT NULL REFERENCES customers (customer_id),
            api_provider TEXT NOT NULL,
            username     TEXT,
            password     TEXT,
            api_key      TEXT,
            api_secret   TEXT,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Append-only; rows are never updated or deleted by this service.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS error_logs (
            id            BIGSERIAL PRIMARY KEY,
            customer_id   TEXT,
            device_sn     TEXT,
            api_provider  TEXT,
            field_name    TEXT NOT NULL,
            field_value   TEXT,
            error_message TEXT NOT NULL,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(&device_data_ddl("device_data_current"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&device_data_ddl("device_data_historical"))
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_data_daily (
            device_sn    TEXT NOT NULL,
            date         DATE NOT NULL,
            total_energy DOUBLE PRECISION,
            avg_power    DOUBLE PRECISION,
            max_voltage  DOUBLE PRECISION,
            min_voltage  DOUBLE PRECISION,
            active_hours DOUBLE PRECISION,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (device_sn, date)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    for table in ["device_data_current", "device_data_historical"] {
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_tenant_ts ON {table} (tenant, ts);"
        ))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Register both device-data stores as hypertables, best effort.
///
/// On a plain Postgres instance (no TimescaleDB extension) the stores work
/// as ordinary tables; the failure is logged and startup continues.
pub async fn enable_hypertables(pool: &PgPool) {
    if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS timescaledb;")
        .execute(pool)
        .await
    {
        tracing::warn!(error = %e, "timescaledb extension unavailable, continuing with plain tables");
        return;
    }

    for table in ["device_data_current", "device_data_historical"] {
        let res = sqlx::query(&format!(
            "SELECT create_hypertable('{table}', 'ts', if_not_exists => TRUE, migrate_data => TRUE);"
        ))
        .execute(pool)
        .await;
        match res {
            Ok(_) => tracing::info!(table, "hypertable registered"),
            Err(e) => tracing::warn!(table, error = %e, "hypertable registration failed"),
        }
    }
}

/// CREATE TABLE statement for a device-data store.
///
/// NULL telemetry fields pass their CHECK constraint (SQL three-valued
/// logic); present values must sit inside the physical bounds.
fn device_data_ddl(table: &str) -> String {
    let mut ddl = format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n\
         \x20   tenant    TEXT NOT NULL REFERENCES tenant_stores (tenant),\n\
         \x20   device_sn TEXT NOT NULL,\n\
         \x20   ts        TIMESTAMPTZ NOT NULL,\n"
    );
    for fb in READING_BOUNDS {
        ddl.push_str(&format!(
            "    {col} DOUBLE PRECISION CHECK ({col} >= {min} AND {col} <= {max}),\n",
            col = fb.column,
            min = fb.min,
            max = fb.max,
        ));
    }
    ddl.push_str(
        "    state      TEXT,\n\
         \x20   created_at TIMESTAMPTZ NOT NULL DEFAULT now(),\n\
         \x20   updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),\n\
         \x20   PRIMARY KEY (device_sn, ts)\n\
         );",
    );
    ddl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_data_ddl_carries_every_bounded_column() {
        let ddl = device_data_ddl("device_data_current");
        for fb in READING_BOUNDS {
            assert!(ddl.contains(fb.column), "missing column {}", fb.column);
        }
        assert!(ddl.contains("PRIMARY KEY (device_sn, ts)"));
        assert!(ddl.contains("pv01_voltage DOUBLE PRECISION CHECK (pv01_voltage >= 0 AND pv01_voltage <= 1000)"));
        assert!(ddl.contains("reactive_power >= -100000"));
    }

    #[test]
    fn stores_share_identical_column_sets() {
        let current = device_data_ddl("device_data_current");
        let historical = device_data_ddl("device_data_historical");
        assert_eq!(
            current.replace("device_data_current", "X"),
            historical.replace("device_data_historical", "X"),
        );
    }
}
