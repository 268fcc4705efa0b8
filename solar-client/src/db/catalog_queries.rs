use anyhow::Result;
use sqlx::PgPool;

use crate::domain::{ApiCredential, Device, Plant};

/// Insert a plant discovered in the field, keeping the first-seen record.
/// Returns whether a new row was created.
pub async fn upsert_plant(pool: &PgPool, plant: &Plant) -> Result<bool> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO plants (plant_id, customer_id, plant_name, capacity, install_date)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (plant_id) DO NOTHING
        "#,
    )
    .bind(&plant.plant_id)
    .bind(&plant.customer_id)
    .bind(&plant.plant_name)
    .bind(plant.capacity)
    .bind(plant.install_date)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(inserted > 0)
}

pub async fn upsert_device(pool: &PgPool, device: &Device) -> Result<bool> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO devices (device_sn, plant_id, inverter_model, panel_model, pv_count, string_count, first_install_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (device_sn) DO NOTHING
        "#,
    )
    .bind(&device.device_sn)
    .bind(&device.plant_id)
    .bind(&device.inverter_model)
    .bind(&device.panel_model)
    .bind(device.pv_count)
    .bind(device.string_count)
    .bind(device.first_install_date)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(inserted > 0)
}

/// Store or refresh one user's vendor API credentials. An existing set is
/// overwritten in place (credentials rotate; stale secrets are useless).
pub async fn upsert_credential(pool: &PgPool, cred: &ApiCredential) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO api_credentials (user_id, customer_id, api_provider, username, password, api_key, api_secret)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_id) DO UPDATE
        SET customer_id  = EXCLUDED.customer_id,
            api_provider = EXCLUDED.api_provider,
            username     = EXCLUDED.username,
            password     = EXCLUDED.password,
            api_key      = EXCLUDED.api_key,
            api_secret   = EXCLUDED.api_secret,
            updated_at   = now()
        "#,
    )
    .bind(&cred.user_id)
    .bind(&cred.customer_id)
    .bind(&cred.api_provider)
    .bind(&cred.username)
    .bind(&cred.password)
    .bind(&cred.api_key)
    .bind(&cred.api_secret)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_credentials(pool: &PgPool) -> Result<Vec<ApiCredential>> {
    let rows = sqlx::query_as::<_, ApiCredential>(
        r#"
        SELECT user_id, customer_id, api_provider, username, password, api_key, api_secret
        FROM api_credentials
        ORDER BY user_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
