pub mod catalog;
pub mod device_reading;

pub use catalog::{ApiCredential, DailyRollup, Device, ErrorLogEntry, NewCustomer, Plant, TenantMetrics};
pub use device_reading::{DeviceReading, FieldBounds, READING_BOUNDS};
