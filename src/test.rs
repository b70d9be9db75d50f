//! This provides testing functionality for building tests.
//!
//! The [`TestTransport`] collects batches instead of sending them and can
//! be scripted with a sequence of response statuses to exercise the retry
//! and circuit-breaker paths.
//!
//! # Example usage
//!
//! ```
//! use logbeam::test::with_captured_batches;
//!
//! let batches = with_captured_batches(|client| {
//!     client.info("Hello World!", None);
//!     client.flush();
//! });
//! assert_eq!(batches.len(), 1);
//! assert_eq!(batches[0][0].message, "Hello World!");
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lazy_static::lazy_static;

use crate::clientoptions::CollectorOptions;
use crate::dsn::Dsn;
use crate::protocol::LogEntry;
use crate::transport::{BatchRequest, Transport, TransportError};
use crate::Client;

lazy_static! {
    static ref TEST_DSN: Dsn = "https://logs.invalid/ingest".parse().unwrap();
}

/// Collects batches instead of sending them.
///
/// Every delivery attempt answers with the next scripted status (or 200
/// once the script runs dry) and is recorded together with its parsed
/// batch. Beacon sends are recorded separately and accepted unless
/// [`refuse_beacons`](Self::refuse_beacons) was called.
pub struct TestTransport {
    responses: Mutex<VecDeque<u16>>,
    attempts: Mutex<Vec<(u16, Vec<LogEntry>)>>,
    beacons: Mutex<Vec<Vec<LogEntry>>>,
    beacon_refused: AtomicBool,
    posts: AtomicUsize,
}

impl TestTransport {
    /// Creates a transport that accepts everything.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<TestTransport> {
        TestTransport::with_responses(Vec::new())
    }

    /// Creates a transport answering with the given statuses in order.
    pub fn with_responses(responses: Vec<u16>) -> Arc<TestTransport> {
        Arc::new(TestTransport {
            responses: Mutex::new(responses.into()),
            attempts: Mutex::new(Vec::new()),
            beacons: Mutex::new(Vec::new()),
            beacon_refused: AtomicBool::new(false),
            posts: AtomicUsize::new(0),
        })
    }

    /// Makes every beacon send report "not queued".
    pub fn refuse_beacons(&self) {
        self.beacon_refused.store(true, Ordering::SeqCst);
    }

    /// Every POST attempt with its answered status, in order.
    pub fn attempts(&self) -> Vec<(u16, Vec<LogEntry>)> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The accepted (2xx) batches, in delivery order.
    pub fn batches(&self) -> Vec<Vec<LogEntry>> {
        self.attempts()
            .into_iter()
            .filter(|(status, _)| (200..300).contains(status))
            .map(|(_, batch)| batch)
            .collect()
    }

    /// Everything the endpoint accepted: 2xx batches followed by beacon
    /// payloads.
    pub fn delivered(&self) -> Vec<Vec<LogEntry>> {
        let mut all = self.batches();
        all.extend(self.beacons());
        all
    }

    /// The payloads that went out through the beacon path.
    pub fn beacons(&self) -> Vec<Vec<LogEntry>> {
        self.beacons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of POST attempts (beacons not included).
    pub fn post_count(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    fn parse(request: &BatchRequest) -> Vec<LogEntry> {
        serde_json::from_slice(&request.body).unwrap_or_default()
    }
}

impl Transport for TestTransport {
    fn send_batch(&self, request: &BatchRequest) -> Result<(), TransportError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        let status = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(200);
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((status, TestTransport::parse(request)));
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(TransportError::Status(status))
        }
    }

    fn send_beacon(&self, request: &BatchRequest) -> bool {
        if self.beacon_refused.load(Ordering::SeqCst) {
            return false;
        }
        self.beacons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TestTransport::parse(request));
        true
    }
}

/// Options wired for tests: test DSN, stores disabled, adapters off.
///
/// Capture adapters hook process-wide seams and would leak between test
/// cases, so they stay opt-in here.
pub fn test_options() -> CollectorOptions {
    CollectorOptions {
        dsn: Some(TEST_DSN.clone()),
        enable_durable_store: false,
        enable_fallback_store: false,
        enable_console_capture: false,
        enable_panic_capture: false,
        enable_network_capture: false,
        enable_interaction_capture: false,
        enable_navigation_capture: false,
        ..Default::default()
    }
}

/// Builds a client over the given transport and options.
pub fn client_with_transport(
    transport: Arc<TestTransport>,
    mut options: CollectorOptions,
) -> Client {
    if options.dsn.is_none() {
        options.dsn = Some(TEST_DSN.clone());
    }
    options.transport = Some(Arc::new(
        move |_options: &CollectorOptions| -> Arc<dyn Transport> { transport.clone() },
    ));
    Client::new(options)
}

/// Runs some code against a collector with default test options and
/// returns the accepted batches.
pub fn with_captured_batches<F: FnOnce(&Client)>(f: F) -> Vec<Vec<LogEntry>> {
    with_captured_batches_options(f, test_options())
}

/// Runs some code against a collector with the given options and returns
/// the accepted batches.
pub fn with_captured_batches_options<F: FnOnce(&Client)>(
    f: F,
    options: CollectorOptions,
) -> Vec<Vec<LogEntry>> {
    let transport = TestTransport::new();
    let client = client_with_transport(transport.clone(), options);
    f(&client);
    client.close();
    transport.delivered()
}
