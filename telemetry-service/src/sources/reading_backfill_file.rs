use std::path::PathBuf;

use async_stream::try_stream;
use futures::Stream;
use solar_client::db::sanitize_customer_id;
use solar_client::domain::DeviceReading;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::pipeline::{Envelope, PipelineError, Source};

/// NDJSON backfill source.
///
/// Each line is one reading in the HTTP ingest shape (raw `customer_id`
/// plus telemetry fields); the tenant key is derived per line. A malformed
/// line aborts the backfill so a bad export is noticed instead of silently
/// thinned.
pub struct ReadingBackfillFileSource {
    path: PathBuf,
}

#[derive(serde::Deserialize)]
struct BackfillReading {
    customer_id: String,
    #[serde(flatten)]
    reading: DeviceReading,
}

impl ReadingBackfillFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<DeviceReading> for ReadingBackfillFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<DeviceReading>, PipelineError>> + Send>>
    {
        let path = self.path.clone();
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open backfill file: {e}"))
            })?;
            let reader = BufReader::new(file);
            let mut lines = reader.lines();

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::Source(format!("failed to read backfill line: {e}"))
            })? {
                if line.trim().is_empty() {
                    continue;
                }

                let parsed: BackfillReading = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        metrics::counter!("backfill_reading_parse_errors_total").increment(1);
                        Err(PipelineError::Source(format!(
                            "failed to parse backfill json line: {e}"
                        )))?
                    }
                };

                let tenant = sanitize_customer_id(&parsed.customer_id).map_err(|e| {
                    PipelineError::Source(format!(
                        "unusable customer_id in backfill line: {e}"
                    ))
                })?;

                let mut reading = parsed.reading;
                reading.tenant = tenant;
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

    #[test]
    fn backfill_line_parses_and_rekeys_to_tenant() {
        let line = r#"{"customer_id":"Acme Solar","device_sn":"INV-01","ts":"2024-05-20T06:30:00Z","pv01_voltage":590.2,"energy_today":3.4}"#;

        let parsed: BackfillReading = serde_json::from_str(line).unwrap();
        let tenant = sanitize_customer_id(&parsed.customer_id).unwrap();

        assert_eq!(tenant, "acme_solar");
        assert_eq!(parsed.reading.device_sn, "INV-01");
        assert_eq!(parsed.reading.ts, datetime!(2024-05-20 06:30:00 UTC));
        assert_eq!(parsed.reading.energy_today, Some(3.4));
        assert!(parsed.reading.frequency.is_none());
    }
}
