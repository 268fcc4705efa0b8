pub mod catalog_queries;
pub mod error_log;
pub mod provisioning;
pub mod reading_queries;
pub mod schema;

pub use error_log::ErrorLog;
pub use provisioning::{sanitize_customer_id, ProvisionError, TenantProvisioner};

/// Which device-data store a statement targets. The two stores share one
/// column set; rows move current -> historical by age and are never present
/// in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Current,
    Historical,
}

impl Store {
    pub fn table(self) -> &'static str {
        match self {
            Store::Current => "device_data_current",
            Store::Historical => "device_data_historical",
        }
    }
}
