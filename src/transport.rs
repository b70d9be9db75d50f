//! The delivery transport seam.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::clientoptions::CollectorOptions;
use crate::constants::REQUEST_TIMEOUT;
use crate::dsn::Dsn;

/// A delivery failure, counted against the retry budget and the circuit
/// breaker.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint answered outside the 2xx range.
    #[error("ingestion endpoint returned status {0}")]
    Status(u16),
    /// The request never completed.
    #[error("transport failed: {0}")]
    Send(String),
}

/// One serialized batch on its way out.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// The ingestion endpoint.
    pub dsn: Dsn,
    /// Optional pre-shared key for the `X-Api-Key` header.
    pub api_key: Option<String>,
    /// The JSON array of records.
    pub body: Vec<u8>,
}

/// The external transport of the delivery engine.
///
/// The engine is oblivious to how batches travel; it only distinguishes
/// a request-response send from the fire-and-forget beacon used during
/// shutdown.
pub trait Transport: Send + Sync + 'static {
    /// Delivers a batch and reports whether the endpoint accepted it.
    fn send_batch(&self, request: &BatchRequest) -> Result<(), TransportError>;

    /// Best-effort send during shutdown. Returns whether the payload was
    /// handed off; a refusal falls back to [`send_batch`](Self::send_batch).
    fn send_beacon(&self, request: &BatchRequest) -> bool {
        self.send_batch(request).is_ok()
    }
}

/// A factory creating the transport for a set of options.
pub trait TransportFactory: Send + Sync {
    /// Creates a new transport.
    fn create_transport(&self, options: &CollectorOptions) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&CollectorOptions) -> Arc<dyn Transport> + Send + Sync,
{
    fn create_transport(&self, options: &CollectorOptions) -> Arc<dyn Transport> {
        self(options)
    }
}

/// Creates the default HTTP transport.
///
/// This is the default value for `transport` on the collector options.
#[derive(Clone)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create_transport(&self, options: &CollectorOptions) -> Arc<dyn Transport> {
        Arc::new(HttpTransport::new(options))
    }
}

/// A [`Transport`] that POSTs batches via [`reqwest`].
///
/// The transport owns a current-thread tokio runtime; every send blocks
/// the calling delivery thread on it. The beacon variant is the same POST
/// under the shutdown deadline, with a dispatch counting as "queued".
pub struct HttpTransport {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
    beacon_timeout: std::time::Duration,
}

impl HttpTransport {
    /// Creates a new transport for the given options.
    pub fn new(options: &CollectorOptions) -> Self {
        // a runtime for the delivery thread to block on
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build transport runtime");
        let client = reqwest::Client::builder()
            .user_agent(crate::constants::USER_AGENT)
            .build()
            .expect("failed to build http client");
        HttpTransport {
            runtime,
            client,
            beacon_timeout: options.shutdown_timeout,
        }
    }

    fn post(
        &self,
        request: &BatchRequest,
        timeout: std::time::Duration,
    ) -> Result<u16, TransportError> {
        self.runtime.block_on(async {
            let mut builder = self
                .client
                .post(request.dsn.as_str())
                .header("Content-Type", "application/json")
                .header("X-Request-Timestamp", Utc::now().to_rfc3339())
                .timeout(timeout)
                .body(request.body.clone());
            if let Some(api_key) = &request.api_key {
                builder = builder.header("X-Api-Key", api_key);
            }
            let response = builder
                .send()
                .await
                .map_err(|err| TransportError::Send(err.to_string()))?;
            Ok(response.status().as_u16())
        })
    }
}

impl Transport for HttpTransport {
    fn send_batch(&self, request: &BatchRequest) -> Result<(), TransportError> {
        let status = self.post(request, REQUEST_TIMEOUT)?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(TransportError::Status(status))
        }
    }

    fn send_beacon(&self, request: &BatchRequest) -> bool {
        self.post(request, self.beacon_timeout).is_ok()
    }
}
