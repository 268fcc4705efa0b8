//! Tenant provisioning.
//!
//! A customer registration provisions a row in the `tenant_stores` registry
//! keyed by the sanitized customer identifier; telemetry for the tenant
//! lands in the shared partitioned stores under that key. Registration is
//! create-if-absent and runs in the same transaction as the customer
//! insert, so a customer row and its tenant registration commit or roll
//! back together.

use sqlx::PgPool;

use crate::domain::{ErrorLogEntry, NewCustomer};

use super::error_log::ErrorLog;

/// Postgres identifier limit (NAMEDATALEN - 1). Tenant keys stay within it
/// so they remain usable as identifier fragments in operator tooling.
pub const MAX_TENANT_LEN: usize = 63;

#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    #[error("customer identifier is empty")]
    EmptyIdentifier,
    #[error("customer identifier {0:?} sanitizes to an empty tenant key")]
    UnusableIdentifier(String),
    #[error("tenant registration failed: {0}")]
    Db(#[from] sqlx::Error),
}

/// Normalize a raw customer identifier into a tenant key.
///
/// Lower-cases, maps every character outside `[a-z0-9_]` to `_`, and
/// truncates to [`MAX_TENANT_LEN`]. Whitespace-only input is rejected as
/// empty before sanitization.
pub fn sanitize_customer_id(raw: &str) -> Result<String, ProvisionError> {
    if raw.trim().is_empty() {
        return Err(ProvisionError::EmptyIdentifier);
    }

    let tenant: String = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .take(MAX_TENANT_LEN)
        .collect();

    if tenant.is_empty() {
        return Err(ProvisionError::UnusableIdentifier(raw.to_string()));
    }
    Ok(tenant)
}

/// Registers customers and their tenant store entries.
#[derive(Clone)]
pub struct TenantProvisioner {
    pool: PgPool,
    error_log: ErrorLog,
}

impl TenantProvisioner {
    pub fn new(pool: PgPool) -> Self {
        let error_log = ErrorLog::new(pool.clone());
        Self { pool, error_log }
    }

    /// Insert a customer and provision its tenant, returning the tenant key.
    ///
    /// Idempotent: re-registering an existing customer (or one whose
    /// identifier sanitizes to an already-provisioned tenant) is a no-op
    /// that still returns the tenant key. Every failure is recorded to
    /// `error_logs` before it propagates; the log write happens outside the
    /// registration transaction so the audit record survives the rollback.
    pub async fn register_customer(&self, customer: &NewCustomer) -> Result<String, ProvisionError> {
        let tenant = match sanitize_customer_id(&customer.customer_id) {
            Ok(tenant) => tenant,
            Err(e) => {
                self.error_log
                    .record(
                        ErrorLogEntry::field("customer_id", Some(customer.customer_id.clone()), e.to_string())
                            .for_customer(customer.customer_id.clone()),
                    )
                    .await;
                return Err(e);
            }
        };

        match self.register_tenant(customer, &tenant).await {
            Ok(created) => {
                if created {
                    tracing::info!(customer_id = %customer.customer_id, tenant, "tenant provisioned");
                } else {
                    tracing::debug!(customer_id = %customer.customer_id, tenant, "tenant already provisioned");
                }
                Ok(tenant)
            }
            Err(e) => {
                self.error_log
                    .record(
                        ErrorLogEntry::field("customer_id", Some(customer.customer_id.clone()), e.to_string())
                            .for_customer(customer.customer_id.clone()),
                    )
                    .await;
                Err(ProvisionError::Db(e))
            }
        }
    }

    /// Customer insert + tenant registration, one transaction. Returns
    /// whether the tenant row was newly created.
    async fn register_tenant(&self, customer: &NewCustomer, tenant: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO customers (customer_id, customer_name, email, phone, address)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (customer_id) DO NOTHING
            "#,
        )
        .bind(&customer.customer_id)
        .bind(&customer.customer_name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .execute(&mut *tx)
        .await?;

        // Conflict-tolerant create-if-absent; two concurrent registrations
        // of the same tenant serialize on the primary key instead of racing
        // an existence check.
        let created = sqlx::query(
            r#"
            INSERT INTO tenant_stores (tenant, customer_id)
            VALUES ($1, $2)
            ON CONFLICT (tenant) DO NOTHING
            "#,
        )
        .bind(tenant)
        .bind(&customer.customer_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(created > 0)
    }

    /// Tenant key for an already-registered customer, if any.
    pub async fn lookup_tenant(&self, customer_id: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT tenant FROM tenant_stores WHERE customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(tenant,)| tenant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_substitutes() {
        assert_eq!(sanitize_customer_id("Acme Solar GmbH").unwrap(), "acme_solar_gmbh");
        assert_eq!(sanitize_customer_id("plant-42/west").unwrap(), "plant_42_west");
        assert_eq!(sanitize_customer_id("ALL_CAPS_9").unwrap(), "all_caps_9");
    }

    #[test]
    fn sanitize_keeps_already_clean_identifiers() {
        assert_eq!(sanitize_customer_id("acme_solar_01").unwrap(), "acme_solar_01");
    }

    #[test]
    fn sanitize_replaces_non_ascii() {
        assert_eq!(sanitize_customer_id("søl@r").unwrap(), "s_l_r");
    }

    #[test]
    fn sanitize_truncates_to_identifier_limit() {
        let long = "x".repeat(200);
        let tenant = sanitize_customer_id(&long).unwrap();
        assert_eq!(tenant.len(), MAX_TENANT_LEN);
        assert_eq!(tenant, "x".repeat(MAX_TENANT_LEN));
    }

    #[test]
    fn sanitize_rejects_empty_and_whitespace() {
        assert!(matches!(sanitize_customer_id(""), Err(ProvisionError::EmptyIdentifier)));
        assert!(matches!(sanitize_customer_id("   \t"), Err(ProvisionError::EmptyIdentifier)));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_customer_id("Acme Solar GmbH").unwrap();
        let twice = sanitize_customer_id(&once).unwrap();
        assert_eq!(once, twice);
    }
}
