use time::OffsetDateTime;

/// One inverter telemetry sample.
///
/// A row is keyed by (`device_sn`, `ts`); `tenant` is the sanitized customer
/// identifier partitioning the shared current/historical stores. Every
/// numeric field is optional (inverters report different subsets depending
/// on vendor and string count) but bounded when present; see
/// [`READING_BOUNDS`].
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct DeviceReading {
    /// Sanitized customer identifier. Filled in by the ingestion source
    /// from the raw `customer_id`, never taken from the wire directly.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tenant: String,
    pub device_sn: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub ts: OffsetDateTime,
    pub pv01_voltage: Option<f64>,
    pub pv01_current: Option<f64>,
    pub pv02_voltage: Option<f64>,
    pub pv02_current: Option<f64>,
    pub pv03_voltage: Option<f64>,
    pub pv03_current: Option<f64>,
    pub pv04_voltage: Option<f64>,
    pub pv04_current: Option<f64>,
    pub pv05_voltage: Option<f64>,
    pub pv05_current: Option<f64>,
    pub pv06_voltage: Option<f64>,
    pub pv06_current: Option<f64>,
    pub pv07_voltage: Option<f64>,
    pub pv07_current: Option<f64>,
    pub pv08_voltage: Option<f64>,
    pub pv08_current: Option<f64>,
    pub pv09_voltage: Option<f64>,
    pub pv09_current: Option<f64>,
    pub pv10_voltage: Option<f64>,
    pub pv10_current: Option<f64>,
    pub pv11_voltage: Option<f64>,
    pub pv11_current: Option<f64>,
    pub pv12_voltage: Option<f64>,
    pub pv12_current: Option<f64>,
    pub r_voltage: Option<f64>,
    pub s_voltage: Option<f64>,
    pub t_voltage: Option<f64>,
    pub r_current: Option<f64>,
    pub s_current: Option<f64>,
    pub t_current: Option<f64>,
    pub rs_voltage: Option<f64>,
    pub st_voltage: Option<f64>,
    pub tr_voltage: Option<f64>,
    pub frequency: Option<f64>,
    pub total_power: Option<f64>,
    pub reactive_power: Option<f64>,
    pub energy_today: Option<f64>,
    pub cuf: Option<f64>,
    pub pr: Option<f64>,
    pub state: Option<String>,
}

/// Physical plausibility interval for one numeric telemetry column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldBounds {
    pub column: &'static str,
    pub min: f64,
    pub max: f64,
}

const fn b(column: &'static str, min: f64, max: f64) -> FieldBounds {
    FieldBounds { column, min, max }
}

const PV_V: f64 = 1000.0;
const PV_A: f64 = 50.0;
const PHASE_V: f64 = 300.0;
const PHASE_A: f64 = 100.0;
const LINE_V: f64 = 600.0;

/// Canonical bounds for every numeric telemetry column, in storage column
/// order. This single table drives the CHECK constraints in the device-data
/// DDL, the ingestion-time validation, and the insert column list, so the
/// three can never disagree.
pub const READING_BOUNDS: &[FieldBounds] = &[
    b("pv01_voltage", 0.0, PV_V),
    b("pv01_current", 0.0, PV_A),
    b("pv02_voltage", 0.0, PV_V),
    b("pv02_current", 0.0, PV_A),
    b("pv03_voltage", 0.0, PV_V),
    b("pv03_current", 0.0, PV_A),
    b("pv04_voltage", 0.0, PV_V),
    b("pv04_current", 0.0, PV_A),
    b("pv05_voltage", 0.0, PV_V),
    b("pv05_current", 0.0, PV_A),
    b("pv06_voltage", 0.0, PV_V),
    b("pv06_current", 0.0, PV_A),
    b("pv07_voltage", 0.0, PV_V),
    b("pv07_current", 0.0, PV_A),
    b("pv08_voltage", 0.0, PV_V),
    b("pv08_current", 0.0, PV_A),
    b("pv09_voltage", 0.0, PV_V),
    b("pv09_current", 0.0, PV_A),
    b("pv10_voltage", 0.0, PV_V),
    b("pv10_current", 0.0, PV_A),
    b("pv11_voltage", 0.0, PV_V),
    b("pv11_current", 0.0, PV_A),
    b("pv12_voltage", 0.0, PV_V),
    b("pv12_current", 0.0, PV_A),
    b("r_voltage", 0.0, PHASE_V),
    b("s_voltage", 0.0, PHASE_V),
    b("t_voltage", 0.0, PHASE_V),
    b("r_current", 0.0, PHASE_A),
    b("s_current", 0.0, PHASE_A),
    b("t_current", 0.0, PHASE_A),
    b("rs_voltage", 0.0, LINE_V),
    b("st_voltage", 0.0, LINE_V),
    b("tr_voltage", 0.0, LINE_V),
    b("frequency", 0.0, 70.0),
    b("total_power", 0.0, 100_000.0),
    b("reactive_power", -100_000.0, 100_000.0),
    b("energy_today", 0.0, 1000.0),
    b("cuf", 0.0, 100.0),
    b("pr", 0.0, 100.0),
];

impl DeviceReading {
    /// All numeric columns as (column name, value), in [`READING_BOUNDS`]
    /// order. Sinks iterate this for binding; validation zips it with the
    /// bounds table.
    pub fn numeric_fields(&self) -> [(&'static str, Option<f64>); READING_BOUNDS.len()] {
        [
            ("pv01_voltage", self.pv01_voltage),
            ("pv01_current", self.pv01_current),
            ("pv02_voltage", self.pv02_voltage),
            ("pv02_current", self.pv02_current),
            ("pv03_voltage", self.pv03_voltage),
            ("pv03_current", self.pv03_current),
            ("pv04_voltage", self.pv04_voltage),
            ("pv04_current", self.pv04_current),
            ("pv05_voltage", self.pv05_voltage),
            ("pv05_current", self.pv05_current),
            ("pv06_voltage", self.pv06_voltage),
            ("pv06_current", self.pv06_current),
            ("pv07_voltage", self.pv07_voltage),
            ("pv07_current", self.pv07_current),
            ("pv08_voltage", self.pv08_voltage),
            ("pv08_current", self.pv08_current),
            ("pv09_voltage", self.pv09_voltage),
            ("pv09_current", self.pv09_current),
            ("pv10_voltage", self.pv10_voltage),
            ("pv10_current", self.pv10_current),
            ("pv11_voltage", self.pv11_voltage),
            ("pv11_current", self.pv11_current),
            ("pv12_voltage", self.pv12_voltage),
            ("pv12_current", self.pv12_current),
            ("r_voltage", self.r_voltage),
            ("s_voltage", self.s_voltage),
            ("t_voltage", self.t_voltage),
            ("r_current", self.r_current),
            ("s_current", self.s_current),
            ("t_current", self.t_current),
            ("rs_voltage", self.rs_voltage),
            ("st_voltage", self.st_voltage),
            ("tr_voltage", self.tr_voltage),
            ("frequency", self.frequency),
            ("total_power", self.total_power),
            ("reactive_power", self.reactive_power),
            ("energy_today", self.energy_today),
            ("cuf", self.cuf),
            ("pr", self.pr),
        ]
    }

    /// Empty reading for a device/timestamp, every telemetry field unset.
    pub fn empty(tenant: impl Into<String>, device_sn: impl Into<String>, ts: OffsetDateTime) -> Self {
        Self {
            tenant: tenant.into(),
            device_sn: device_sn.into(),
            ts,
            pv01_voltage: None,
            pv01_current: None,
            pv02_voltage: None,
            pv02_current: None,
            pv03_voltage: None,
            pv03_current: None,
            pv04_voltage: None,
            pv04_current: None,
            pv05_voltage: None,
            pv05_current: None,
            pv06_voltage: None,
            pv06_current: None,
            pv07_voltage: None,
            pv07_current: None,
            pv08_voltage: None,
            pv08_current: None,
            pv09_voltage: None,
            pv09_current: None,
            pv10_voltage: None,
            pv10_current: None,
            pv11_voltage: None,
            pv11_current: None,
            pv12_voltage: None,
            pv12_current: None,
            r_voltage: None,
            s_voltage: None,
            t_voltage: None,
            r_current: None,
            s_current: None,
            t_current: None,
            rs_voltage: None,
            st_voltage: None,
            tr_voltage: None,
            frequency: None,
            total_power: None,
            reactive_power: None,
            energy_today: None,
            cuf: None,
            pr: None,
            state: None,
        }
    }
}

/// Comma-separated column list for inserting into either device-data store.
/// `created_at`/`updated_at` are left to their DDL defaults.
pub fn insert_column_list() -> String {
    let mut cols = Vec::with_capacity(READING_BOUNDS.len() + 4);
    cols.extend(["tenant", "device_sn", "ts"]);
    cols.extend(READING_BOUNDS.iter().map(|fb| fb.column));
    cols.push("state");
    cols.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn numeric_fields_align_with_bounds_table() {
        let reading = DeviceReading::empty("acme", "sn-1", datetime!(2024-06-01 12:00:00 UTC));
        let fields = reading.numeric_fields();
        assert_eq!(fields.len(), READING_BOUNDS.len());
        for (field, bounds) in fields.iter().zip(READING_BOUNDS) {
            assert_eq!(field.0, bounds.column);
        }
    }

    #[test]
    fn bounds_are_well_formed_intervals() {
        for fb in READING_BOUNDS {
            assert!(fb.min < fb.max, "degenerate bounds for {}", fb.column);
        }
    }

    #[test]
    fn insert_column_list_starts_with_key_columns() {
        let cols = insert_column_list();
        assert!(cols.starts_with("tenant, device_sn, ts, pv01_voltage"));
        assert!(cols.ends_with("cuf, pr, state"));
    }
}
