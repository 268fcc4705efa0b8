use crate::pipeline::{Envelope, PipelineError, Transform};
use solar_client::db::ErrorLog;
use solar_client::domain::{DeviceReading, ErrorLogEntry, READING_BOUNDS};
use time::macros::datetime;

/// One out-of-bounds field in a rejected reading.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsViolation {
    pub column: &'static str,
    pub value: String,
    pub message: String,
}

/// Check every numeric field of a reading against [`READING_BOUNDS`], plus
/// a broad timestamp sanity window [2000-01-01, 2100-01-01].
///
/// Returns every violation so each can be recorded individually; an empty
/// vec means the reading is storable.
pub fn check_reading(reading: &DeviceReading) -> Vec<BoundsViolation> {
    let mut violations = Vec::new();

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);
    if reading.ts < min_ts || reading.ts > max_ts {
        violations.push(BoundsViolation {
            column: "ts",
            value: reading.ts.to_string(),
            message: "timestamp outside allowed window".to_string(),
        });
    }

    for (field, bounds) in reading.numeric_fields().iter().zip(READING_BOUNDS) {
        debug_assert_eq!(field.0, bounds.column);
        if let Some(value) = field.1 {
            if !value.is_finite() || value < bounds.min || value > bounds.max {
                violations.push(BoundsViolation {
                    column: bounds.column,
                    value: value.to_string(),
                    message: format!(
                        "{} = {} outside [{}, {}]",
                        bounds.column, value, bounds.min, bounds.max
                    ),
                });
            }
        }
    }

    violations
}

/// Pure whole-record validation: any violation rejects the reading.
pub fn validate_reading(
    env: Envelope<DeviceReading>,
) -> Result<Envelope<DeviceReading>, PipelineError> {
    let violations = check_reading(&env.payload);
    if violations.is_empty() {
        return Ok(env);
    }
    let summary = violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Err(PipelineError::Validation(summary))
}

/// Pipeline stage rejecting readings with out-of-bounds telemetry.
///
/// Rejection is wholesale (no field nulling, no partial row reaches the
/// store); each offending field is appended to `error_logs` when a recorder
/// is attached.
#[derive(Clone, Default)]
pub struct DeviceReadingValidation {
    error_log: Option<ErrorLog>,
}

impl DeviceReadingValidation {
    pub fn new(error_log: ErrorLog) -> Self {
        Self {
            error_log: Some(error_log),
        }
    }
}

#[async_trait::async_trait]
impl Transform<DeviceReading, DeviceReading> for DeviceReadingValidation {
    async fn apply(
        &self,
        input: Envelope<DeviceReading>,
    ) -> Result<Envelope<DeviceReading>, PipelineError> {
        let violations = check_reading(&input.payload);
        if violations.is_empty() {
            return Ok(input);
        }

        metrics::counter!("validation_readings_rejected_total").increment(1);
        tracing::warn!(
            device_sn = %input.payload.device_sn,
            tenant = %input.payload.tenant,
            violations = violations.len(),
            "rejected out-of-bounds reading"
        );

        if let Some(error_log) = &self.error_log {
            for v in &violations {
                error_log
                    .record(
                        ErrorLogEntry::field(v.column, Some(v.value.clone()), v.message.clone())
                            .for_customer(input.payload.tenant.clone())
                            .for_device(input.payload.device_sn.clone()),
                    )
                    .await;
            }
        }

        let summary = violations
            .into_iter()
            .map(|v| v.message)
            .collect::<Vec<_>>()
            .join("; ");
        Err(PipelineError::Validation(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading() -> DeviceReading {
        let mut r = DeviceReading::empty("acme", "sn-100", datetime!(2024-06-01 12:00:00 UTC));
        r.pv01_voltage = Some(642.5);
        r.pv01_current = Some(8.2);
        r.r_voltage = Some(231.0);
        r.frequency = Some(50.02);
        r.total_power = Some(4800.0);
        r.energy_today = Some(12.4);
        r.pr = Some(81.0);
        r
    }

    #[test]
    fn accepts_reading_within_bounds() {
        let env = Envelope::now(reading());
        assert!(validate_reading(env).is_ok());
    }

    #[test]
    fn rejects_string_voltage_above_dc_limit() {
        let mut r = reading();
        r.pv01_voltage = Some(1500.0);
        let res = validate_reading(Envelope::now(r));
        assert!(matches!(res, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn rejects_negative_string_current() {
        let mut r = reading();
        r.pv03_current = Some(-0.5);
        let violations = check_reading(&r);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].column, "pv03_current");
    }

    #[test]
    fn rejects_overfrequency() {
        let mut r = reading();
        r.frequency = Some(82.0);
        let violations = check_reading(&r);
        assert_eq!(violations[0].column, "frequency");
    }

    #[test]
    fn accepts_values_exactly_on_the_bound() {
        let mut r = reading();
        r.pv01_voltage = Some(1000.0);
        r.frequency = Some(70.0);
        r.reactive_power = Some(-100_000.0);
        assert!(check_reading(&r).is_empty());
    }

    #[test]
    fn collects_every_violation_for_the_error_log() {
        let mut r = reading();
        r.pv01_voltage = Some(1500.0);
        r.s_current = Some(400.0);
        r.pr = Some(150.0);
        let violations = check_reading(&r);
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn rejects_non_finite_values() {
        let mut r = reading();
        r.total_power = Some(f64::NAN);
        assert_eq!(check_reading(&r).len(), 1);
    }

    #[test]
    fn rejects_timestamp_outside_sanity_window() {
        let mut r = reading();
        r.ts = datetime!(1970-01-01 00:00:00 UTC);
        let violations = check_reading(&r);
        assert_eq!(violations[0].column, "ts");
    }
}
