use time::Date;

/// Customer registration input. `customer_id` is the raw, unsanitized
/// identifier as supplied by the operator; the provisioning layer derives
/// the tenant key from it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct NewCustomer {
    pub customer_id: String,
    pub customer_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Plant {
    pub plant_id: String,
    pub customer_id: String,
    pub plant_name: String,
    pub capacity: f64,
    pub install_date: Option<Date>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Device {
    pub device_sn: String,
    pub plant_id: String,
    pub inverter_model: Option<String>,
    pub panel_model: Option<String>,
    pub pv_count: i32,
    pub string_count: i32,
    pub first_install_date: Option<Date>,
}

/// One stored set of vendor API credentials. Exactly one per user; a
/// customer owns the set through `customer_id`.
#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct ApiCredential {
    pub user_id: String,
    pub customer_id: String,
    pub api_provider: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

/// Append-only record of a provisioning or validation failure.
#[derive(Debug, Clone)]
pub struct ErrorLogEntry {
    pub customer_id: Option<String>,
    pub device_sn: Option<String>,
    pub api_provider: Option<String>,
    pub field_name: String,
    pub field_value: Option<String>,
    pub error_message: String,
}

impl ErrorLogEntry {
    pub fn field(field_name: impl Into<String>, field_value: Option<String>, error_message: impl Into<String>) -> Self {
        Self {
            customer_id: None,
            device_sn: None,
            api_provider: None,
            field_name: field_name.into(),
            field_value,
            error_message: error_message.into(),
        }
    }

    pub fn for_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn for_device(mut self, device_sn: impl Into<String>) -> Self {
        self.device_sn = Some(device_sn.into());
        self
    }
}

/// Per-device daily aggregate row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyRollup {
    pub device_sn: String,
    pub date: Date,
    pub total_energy: Option<f64>,
    pub avg_power: Option<f64>,
    pub max_voltage: Option<f64>,
    pub min_voltage: Option<f64>,
    pub active_hours: Option<f64>,
}

/// Last-24h production summary for one tenant over the current store.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantMetrics {
    pub tenant: String,
    pub total_energy_today: f64,
    pub avg_pr: f64,
    pub active_devices: i64,
}
