//! Capture adapters over the ambient event sources.
//!
//! Each adapter hooks one process-wide seam (the `log` facade, the panic
//! handler, an HTTP service stack, UI intake, a router), saving whatever
//! original it wraps and delegating to it from the wrapper. Installation
//! happens through the [`AdapterRegistry`] so teardown is explicit and a
//! second collector in the same process is detected instead of silently
//! double-capturing. Hooks that the platform cannot hand back (the global
//! logger, the panic chain) stay in place after uninstall but turn into
//! pure pass-throughs, which is observationally the same as restoring the
//! original.

mod console;
mod interaction;
mod navigation;
mod network;
mod panic;

pub use console::{ConsoleAdapter, NoopLogger};
pub use interaction::InteractionAdapter;
pub use navigation::{NavigationAdapter, Navigator};
pub use network::{HttpCaptureFuture, HttpCaptureLayer, HttpCaptureService, NetworkAdapter};
pub use panic::PanicAdapter;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::protocol::{Breadcrumb, Level, Map, Value};

/// Fields an adapter attaches to a captured record beyond level and
/// message. Enrichment owns everything else.
#[derive(Debug, Default)]
pub struct CaptureExtra {
    /// Free-form payload merged into the record's `context`.
    pub context: Option<Map>,
    /// Name of a captured failure.
    pub error_name: Option<String>,
    /// Stack or cause chain of a captured failure.
    pub stack: Option<String>,
    /// Rejection payload of a captured failure.
    pub reason: Option<Value>,
    /// Attributes of an observed HTTP request.
    pub request: Option<RequestInfo>,
}

/// What the network adapter learned about one observed request.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// HTTP method.
    pub method: Option<String>,
    /// Request URL.
    pub url: Option<String>,
    /// Response status.
    pub status_code: Option<u16>,
    /// Response status text.
    pub status_text: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Response size in bytes, where the response declared one.
    pub response_size: Option<u64>,
    /// Failure description when the request never completed.
    pub error_message: Option<String>,
}

/// Where adapters hand their events. Implemented by the client.
pub trait CaptureSink: Send + Sync {
    /// Routes one captured event into the enrichment pipeline.
    fn capture_log(&self, level: Level, message: &str, extra: CaptureExtra);

    /// Appends a breadcrumb describing a captured event.
    fn add_breadcrumb(&self, breadcrumb: Breadcrumb);

    /// Whether an error message is filtered by `ignore_errors`.
    fn should_ignore_error(&self, message: &str) -> bool;

    /// Whether a request URL is filtered by `ignore_urls`.
    fn should_ignore_url(&self, url: &str) -> bool;

    /// Quiet period for the interaction debouncer.
    fn interaction_debounce(&self) -> Duration;
}

/// One hooked event source.
pub trait CaptureAdapter: Send + Sync {
    /// Name of this adapter.
    fn name(&self) -> &'static str;

    /// Hooks the seam and starts routing into `sink`.
    fn install(&self, sink: Arc<dyn CaptureSink>);

    /// Stops routing. The saved original keeps being delegated to.
    fn uninstall(&self);
}

// Only one collector per process may own the ambient seams.
static SEAMS_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Owns the installed adapters and tears them down in reverse order.
pub struct AdapterRegistry {
    adapters: Mutex<Vec<Arc<dyn CaptureAdapter>>>,
    installed: AtomicBool,
}

impl AdapterRegistry {
    pub(crate) fn new() -> Self {
        AdapterRegistry {
            adapters: Mutex::new(Vec::new()),
            installed: AtomicBool::new(false),
        }
    }

    pub(crate) fn register(&self, adapter: Arc<dyn CaptureAdapter>) {
        self.adapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(adapter);
    }

    /// Installs every registered adapter.
    ///
    /// Returns `false` when another collector already claimed the seams;
    /// installation still proceeds (the newest sink wins on the shared
    /// hooks) but the caller should report the double capture.
    pub(crate) fn install_all(&self, sink: Arc<dyn CaptureSink>) -> bool {
        let first = !SEAMS_CLAIMED.swap(true, Ordering::SeqCst);
        let adapters = self.adapters.lock().unwrap_or_else(PoisonError::into_inner);
        for adapter in adapters.iter() {
            adapter.install(sink.clone());
        }
        self.installed.store(true, Ordering::SeqCst);
        first
    }

    /// Uninstalls in reverse installation order. Idempotent.
    pub(crate) fn uninstall_all(&self) {
        if !self.installed.swap(false, Ordering::SeqCst) {
            return;
        }
        let adapters = self.adapters.lock().unwrap_or_else(PoisonError::into_inner);
        for adapter in adapters.iter().rev() {
            adapter.uninstall();
        }
        SEAMS_CLAIMED.store(false, Ordering::SeqCst);
    }

    /// Names of the registered adapters, in installation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|adapter| adapter.name())
            .collect()
    }
}
