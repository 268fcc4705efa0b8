use std::{net::SocketAddr, sync::Arc};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use futures::{Stream, StreamExt};
use serde_json::json;
use solar_client::db::{sanitize_customer_id, ProvisionError, TenantProvisioner};
use solar_client::domain::{DeviceReading, NewCustomer};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::pipeline::{Envelope, PipelineError, Source};

/// HTTP ingestion source.
///
/// Serves two routes on one listener:
/// - `POST /ingest/device_data` — JSON array of readings, each tagged with
///   the raw `customer_id`; rows are re-keyed to the sanitized tenant and
///   queued for the pipeline.
/// - `POST /customers` — registers a customer and provisions its tenant.
#[derive(Clone)]
pub struct HttpReadingSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<DeviceReading>>>>>,
}

#[derive(Clone)]
struct AppState {
    tx: mpsc::Sender<Envelope<DeviceReading>>,
    provisioner: TenantProvisioner,
}

#[derive(serde::Deserialize)]
struct IncomingReading {
    customer_id: String,
    #[serde(flatten)]
    reading: DeviceReading,
}

impl HttpReadingSource {
    pub async fn new(
        bind_addr: &str,
        channel_capacity: usize,
        provisioner: TenantProvisioner,
    ) -> Result<Self, PipelineError> {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let state = AppState { tx, provisioner };

        let app = Router::new()
            .route("/ingest/device_data", post(ingest_device_data))
            .route("/customers", post(register_customer))
            .with_state(state);

        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;

        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        tracing::error!(error = %e, "HTTP reading source server error");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to bind HTTP reading source listener");
                }
            }
        });

        Ok(Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        })
    }
}

#[async_trait::async_trait]
impl Source<DeviceReading> for HttpReadingSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<DeviceReading>, PipelineError>> + Send>>
    {
        let mut guard = self.receiver.lock().await;
        let rx = guard
            .take()
            .expect("HttpReadingSource stream already taken; only one consumer supported");

        Box::pin(ReceiverStream::new(rx).map(Ok))
    }
}

async fn ingest_device_data(
    State(state): State<AppState>,
    Json(payload): Json<Vec<IncomingReading>>,
) -> Result<(), StatusCode> {
    metrics::counter!("http_ingest_requests_total").increment(1);

    for incoming in payload {
        let tenant = match sanitize_customer_id(&incoming.customer_id) {
            Ok(tenant) => tenant,
            Err(e) => {
                metrics::counter!("http_ingest_rejected_total").increment(1);
                tracing::warn!(customer_id = %incoming.customer_id, error = %e, "rejected ingest row");
                return Err(StatusCode::UNPROCESSABLE_ENTITY);
            }
        };

        let mut reading = incoming.reading;
        reading.tenant = tenant;

        if state.tx.send(Envelope::now(reading)).await.is_err() {
            // Channel closed; the pipeline is gone.
            metrics::counter!("http_ingest_failed_total").increment(1);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    Ok(())
}

async fn register_customer(
    State(state): State<AppState>,
    Json(customer): Json<NewCustomer>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, Json<serde_json::Value>)> {
    match state.provisioner.register_customer(&customer).await {
        Ok(tenant) => Ok((
            StatusCode::CREATED,
            Json(json!({ "customer_id": customer.customer_id, "tenant": tenant })),
        )),
        Err(e @ (ProvisionError::EmptyIdentifier | ProvisionError::UnusableIdentifier(_))) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn incoming_reading_deserializes_with_flattened_fields() {
        let body = r#"
        {
            "customer_id": "Acme Solar",
            "device_sn": "INV-07",
            "ts": "2024-06-01T12:00:00Z",
            "pv01_voltage": 640.0,
            "pv01_current": 8.1,
            "r_voltage": 230.5,
            "state": "normal"
        }"#;

        let incoming: IncomingReading = serde_json::from_str(body).unwrap();
        assert_eq!(incoming.customer_id, "Acme Solar");
        assert_eq!(incoming.reading.device_sn, "INV-07");
        assert_eq!(incoming.reading.ts, datetime!(2024-06-01 12:00:00 UTC));
        assert_eq!(incoming.reading.pv01_voltage, Some(640.0));
        assert_eq!(incoming.reading.pv02_voltage, None);
        assert_eq!(incoming.reading.state.as_deref(), Some("normal"));
        // tenant is never taken from the wire.
        assert!(incoming.reading.tenant.is_empty());
    }
}
