//! Load customers and vendor API credentials from a CSV file.
//!
//! Expected header columns: user_id, customer_id, api_provider, username,
//! password, api_key, api_secret. Each distinct customer is registered and
//! provisioned before its credentials are stored; a bad row is logged and
//! skipped so one typo does not sink the whole load.

use std::{collections::BTreeSet, env};

use anyhow::{bail, Result};
use solar_client::db::{catalog_queries, schema, TenantProvisioner};
use solar_client::domain::{ApiCredential, NewCustomer};
use sqlx::postgres::PgPoolOptions;
use telemetry_service::{config::AppConfig, observability};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: load_credentials <csv_file_path>");
    }
    let csv_path = &args[1];

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    schema::create_schema(&pool).await?;
    let provisioner = TenantProvisioner::new(pool.clone());

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut credentials: Vec<ApiCredential> = Vec::new();
    for (row, record) in reader.deserialize::<ApiCredential>().enumerate() {
        match record {
            Ok(cred) => credentials.push(cred),
            Err(e) => tracing::error!(row = row + 1, error = %e, "skipping malformed CSV row"),
        }
    }

    // Register each customer once; failures exclude the customer's
    // credentials but are already recorded in error_logs.
    let customer_ids: BTreeSet<String> =
        credentials.iter().map(|c| c.customer_id.clone()).collect();
    let mut provisioned: BTreeSet<String> = BTreeSet::new();
    for customer_id in customer_ids {
        let customer = NewCustomer {
            customer_id: customer_id.clone(),
            customer_name: customer_id.clone(),
            email: None,
            phone: None,
            address: None,
        };
        match provisioner.register_customer(&customer).await {
            Ok(tenant) => {
                tracing::info!(customer_id = %customer_id, tenant, "customer registered");
                provisioned.insert(customer_id);
            }
            Err(e) => {
                tracing::error!(customer_id = %customer_id, error = %e, "customer registration failed");
            }
        }
    }

    let mut stored = 0usize;
    for cred in &credentials {
        if !provisioned.contains(&cred.customer_id) {
            tracing::warn!(
                user_id = %cred.user_id,
                customer_id = %cred.customer_id,
                "skipping credential for unprovisioned customer"
            );
            continue;
        }
        match catalog_queries::upsert_credential(&pool, cred).await {
            Ok(()) => stored += 1,
            Err(e) => {
                tracing::error!(user_id = %cred.user_id, error = %e, "failed to store credential");
            }
        }
    }

    tracing::info!(total = credentials.len(), stored, "credential load finished");
    Ok(())
}
