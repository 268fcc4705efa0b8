use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::device_reading::insert_column_list;
use crate::domain::{DailyRollup, DeviceReading, TenantMetrics};

use super::Store;

/// Fetch a time-ordered reading window for a single device.
pub async fn load_profile(
    pool: &PgPool,
    store: Store,
    device_sn: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<DeviceReading>> {
    let sql = format!(
        "SELECT {cols} FROM {table} WHERE device_sn = $1 AND ts >= $2 AND ts < $3 ORDER BY ts",
        cols = insert_column_list(),
        table = store.table(),
    );

    let rows = sqlx::query_as::<_, DeviceReading>(&sql)
        .bind(device_sn)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Recompute yesterday-onward daily aggregates for one device from the
/// historical store and upsert them into `device_data_daily`.
///
/// Active hours are the summed gaps between consecutive producing samples;
/// the window function runs in a subquery so the outer aggregate stays
/// plain.
pub async fn upsert_daily_rollup(pool: &PgPool, device_sn: &str) -> Result<u64> {
    let touched = sqlx::query(
        r#"
        INSERT INTO device_data_daily
            (device_sn, date, total_energy, avg_power, max_voltage, min_voltage, active_hours)
        SELECT
            device_sn,
            DATE(ts) AS date,
            SUM(energy_today)                              AS total_energy,
            AVG(total_power)                               AS avg_power,
            MAX(GREATEST(r_voltage, s_voltage, t_voltage)) AS max_voltage,
            MIN(LEAST(r_voltage, s_voltage, t_voltage))    AS min_voltage,
            SUM(CASE WHEN total_power > 0 THEN gap_hours ELSE 0 END) AS active_hours
        FROM (
            SELECT
                device_sn, ts, energy_today, total_power,
                r_voltage, s_voltage, t_voltage,
                EXTRACT(EPOCH FROM (
                    LEAD(ts) OVER (PARTITION BY device_sn ORDER BY ts) - ts
                )) / 3600.0 AS gap_hours
            FROM device_data_historical
            WHERE device_sn = $1
              AND ts >= CURRENT_DATE - INTERVAL '1 day'
        ) samples
        GROUP BY device_sn, DATE(ts)
        ON CONFLICT (device_sn, date) DO UPDATE
        SET total_energy = EXCLUDED.total_energy,
            avg_power    = EXCLUDED.avg_power,
            max_voltage  = EXCLUDED.max_voltage,
            min_voltage  = EXCLUDED.min_voltage,
            active_hours = EXCLUDED.active_hours,
            created_at   = now()
        "#,
    )
    .bind(device_sn)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(touched)
}

pub async fn daily_rollups(pool: &PgPool, device_sn: &str) -> Result<Vec<DailyRollup>> {
    let rows = sqlx::query_as::<_, DailyRollup>(
        r#"
        SELECT device_sn, date, total_energy, avg_power, max_voltage, min_voltage, active_hours
        FROM device_data_daily
        WHERE device_sn = $1
        ORDER BY date
        "#,
    )
    .bind(device_sn)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Last-24h production summary per tenant over the current store. One
/// aggregate over the shared store; no per-tenant view machinery.
pub async fn tenant_metrics(pool: &PgPool) -> Result<Vec<TenantMetrics>> {
    let rows = sqlx::query_as::<_, TenantMetrics>(
        r#"
        SELECT
            tenant,
            COALESCE(SUM(energy_today), 0.0)  AS total_energy_today,
            COALESCE(AVG(pr), 0.0)            AS avg_pr,
            COUNT(DISTINCT device_sn)         AS active_devices
        FROM device_data_current
        WHERE ts > now() - INTERVAL '1 day'
        GROUP BY tenant
        ORDER BY tenant
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
