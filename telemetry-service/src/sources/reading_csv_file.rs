use std::path::PathBuf;

use async_stream::try_stream;
use futures::Stream;
use serde_json::{Map, Value};
use solar_client::db::sanitize_customer_id;
use solar_client::domain::{DeviceReading, READING_BOUNDS};

use crate::pipeline::{Envelope, PipelineError, Source};

/// CSV backfill source.
///
/// Columns are addressed by header name: `customer_id`, `device_sn`, `ts`
/// (RFC 3339), `state`, and any subset of the numeric telemetry columns.
/// Numeric column names come from the canonical bounds table, so a column
/// the store does not know cannot sneak in through an export. Empty cells
/// are absent fields.
pub struct ReadingCsvFileSource {
    path: PathBuf,
}

impl ReadingCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn record_to_reading(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
) -> Result<DeviceReading, PipelineError> {
    let get = |name: &str| -> Option<&str> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let customer_id = get("customer_id")
        .ok_or_else(|| PipelineError::Source("missing customer_id in CSV record".to_string()))?;
    let tenant = sanitize_customer_id(customer_id)
        .map_err(|e| PipelineError::Source(format!("unusable customer_id in CSV record: {e}")))?;
    let device_sn = get("device_sn")
        .ok_or_else(|| PipelineError::Source("missing device_sn in CSV record".to_string()))?;
    let ts = get("ts")
        .ok_or_else(|| PipelineError::Source("missing ts in CSV record".to_string()))?;

    // Materialize through a JSON object so the field list stays single-
    // sourced in DeviceReading's Deserialize impl.
    let mut obj = Map::new();
    obj.insert("tenant".to_string(), Value::String(tenant));
    obj.insert("device_sn".to_string(), Value::String(device_sn.to_string()));
    obj.insert("ts".to_string(), Value::String(ts.to_string()));
    if let Some(state) = get("state") {
        obj.insert("state".to_string(), Value::String(state.to_string()));
    }

    for fb in READING_BOUNDS {
        if let Some(raw) = get(fb.column) {
            let value: f64 = raw.parse().map_err(|e| {
                PipelineError::Source(format!("invalid {} '{raw}': {e}", fb.column))
            })?;
            let number = serde_json::Number::from_f64(value).ok_or_else(|| {
                PipelineError::Source(format!("non-finite {} '{raw}'", fb.column))
            })?;
            obj.insert(fb.column.to_string(), Value::Number(number));
        }
    }

    serde_json::from_value(Value::Object(obj))
        .map_err(|e| PipelineError::Source(format!("invalid CSV record: {e}")))
}

#[async_trait::async_trait]
impl Source<DeviceReading> for ReadingCsvFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<DeviceReading>, PipelineError>> + Send>>
    {
        let path = self.path.clone();
        let s = try_stream! {
            let mut reader = csv::Reader::from_path(&path).map_err(|e| {
                PipelineError::Source(format!("failed to open CSV file: {e}"))
            })?;
            let headers = reader
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV header: {e}")))?
                .clone();

            for record in reader.records() {
                let record = record.map_err(|e| {
                    PipelineError::Source(format!("failed to read CSV record: {e}"))
                })?;
                let reading = record_to_reading(&headers, &record)?;
                yield Envelope::now(reading);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(headers: &[&str], fields: &[&str]) -> (csv::StringRecord, csv::StringRecord) {
        (
            csv::StringRecord::from(headers.to_vec()),
            csv::StringRecord::from(fields.to_vec()),
        )
    }

    #[test]
    fn converts_record_with_partial_columns() {
        let (headers, rec) = record(
            &["customer_id", "device_sn", "ts", "pv01_voltage", "pv02_voltage", "state"],
            &["Acme Solar", "INV-03", "2024-05-20T06:30:00Z", "588.4", "", "normal"],
        );

        let reading = record_to_reading(&headers, &rec).unwrap();
        assert_eq!(reading.tenant, "acme_solar");
        assert_eq!(reading.device_sn, "INV-03");
        assert_eq!(reading.ts, datetime!(2024-05-20 06:30:00 UTC));
        assert_eq!(reading.pv01_voltage, Some(588.4));
        assert_eq!(reading.pv02_voltage, None);
        assert_eq!(reading.state.as_deref(), Some("normal"));
    }

    #[test]
    fn rejects_record_without_timestamp() {
        let (headers, rec) = record(
            &["customer_id", "device_sn", "ts"],
            &["acme", "INV-03", "  "],
        );
        assert!(matches!(
            record_to_reading(&headers, &rec),
            Err(PipelineError::Source(_))
        ));
    }

    #[test]
    fn rejects_unparseable_numeric_cell() {
        let (headers, rec) = record(
            &["customer_id", "device_sn", "ts", "frequency"],
            &["acme", "INV-03", "2024-05-20T06:30:00Z", "fifty"],
        );
        assert!(matches!(
            record_to_reading(&headers, &rec),
            Err(PipelineError::Source(_))
        ));
    }
}
