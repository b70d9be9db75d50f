//! The collector façade wiring capture, policy, persistence and delivery.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::adapters::{
    AdapterRegistry, CaptureExtra, CaptureSink, ConsoleAdapter, InteractionAdapter,
    NavigationAdapter, NetworkAdapter, PanicAdapter,
};
use crate::breadcrumbs::BreadcrumbRing;
use crate::circuit::CircuitBreaker;
use crate::clientoptions::{apply_defaults, CollectorOptions};
use crate::contexts;
use crate::delivery::{self, DeliveryWorker};
use crate::dsn::Dsn;
use crate::macros::beam_debug;
use crate::masking;
use crate::protocol::{Breadcrumb, Level, LogEntry, Map, Value};
use crate::ratelimit::MinuteRateLimiter;
use crate::store::{FileStore, LogStore, SqliteStore};
use crate::transport::{DefaultTransportFactory, Transport};
use crate::utils::parse_type_from_debug;

/// State shared between the capture side and the delivery worker.
pub(crate) struct Shared {
    pub(crate) options: RwLock<Arc<CollectorOptions>>,
    pub(crate) queue: Mutex<Vec<LogEntry>>,
    pub(crate) ring: BreadcrumbRing,
    pub(crate) limiter: Mutex<MinuteRateLimiter>,
    pub(crate) store: Option<Arc<SqliteStore>>,
    pub(crate) fallback: Option<Arc<FileStore>>,
    pub(crate) transport: RwLock<Option<Arc<dyn Transport>>>,
    pub(crate) circuit: Mutex<CircuitBreaker>,
    pub(crate) is_sending: AtomicBool,
}

impl Shared {
    /// The live configuration snapshot.
    pub(crate) fn options(&self) -> Arc<CollectorOptions> {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct ClientInner {
    shared: Arc<Shared>,
    worker: Mutex<Option<DeliveryWorker>>,
    registry: AdapterRegistry,
    interaction: Option<Arc<InteractionAdapter>>,
    navigation: Option<Arc<NavigationAdapter>>,
    closed: AtomicBool,
}

/// The log collector.
///
/// Cheap to clone; every clone shares the same pipeline. Constructing a
/// client merges the options over defaults, opens the persistence tiers,
/// installs the capture adapters and starts the delivery worker. Errors
/// never escape the public API: delivery failures surface through
/// `on_send_failure` and, with `debug` set, on stderr.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dsn", &self.dsn())
            .field("options", &self.options())
            .finish()
    }
}

impl<T: Into<CollectorOptions>> From<T> for Client {
    fn from(config: T) -> Client {
        Client::new(config.into())
    }
}

impl Client {
    /// Creates a new collector for the given configuration.
    ///
    /// Accepts anything that converts into [`CollectorOptions`]: the
    /// options themselves, a DSN string, or a `(dsn, options)` pair. With
    /// no DSN the collector is capture-only and nothing is delivered.
    pub fn new<O: Into<CollectorOptions>>(config: O) -> Client {
        let options = apply_defaults(config.into());

        let store = if options.enable_durable_store {
            let store = SqliteStore::new(
                &options.database_path,
                options.table_name.clone(),
                options.schema_version,
            );
            match store.ensure_open() {
                Ok(()) => Some(Arc::new(store)),
                Err(err) => {
                    // logged once; the fallback tier takes over
                    beam_debug!(options, "durable store unavailable: {}", err);
                    None
                }
            }
        } else {
            None
        };
        let fallback = if options.enable_fallback_store {
            Some(Arc::new(FileStore::new(
                &options.fallback_path,
                options.max_fallback_size,
            )))
        } else {
            None
        };

        // revive whatever the previous session left in the slot
        let mut queue = Vec::new();
        if let Some(fallback) = &fallback {
            let revived = fallback.load();
            if !revived.is_empty() {
                match &store {
                    Some(store) => {
                        if let Err(err) = store.append(&revived) {
                            beam_debug!(options, "failed to revive fallback records: {}", err);
                            queue = revived;
                        }
                    }
                    None => queue = revived,
                }
            }
        }

        let transport = options.dsn.as_ref().map(|_| {
            let factory = options
                .transport
                .clone()
                .unwrap_or_else(|| Arc::new(DefaultTransportFactory));
            factory.create_transport(&options)
        });

        let registry = AdapterRegistry::new();
        if options.enable_console_capture {
            let console = match &options.console_dest {
                Some(dest) => ConsoleAdapter::with_dest(dest.clone()),
                None => ConsoleAdapter::new(),
            };
            registry.register(Arc::new(console));
        }
        if options.enable_panic_capture {
            registry.register(Arc::new(PanicAdapter::new()));
        }
        if options.enable_network_capture {
            registry.register(Arc::new(NetworkAdapter::new()));
        }
        let interaction = if options.enable_interaction_capture {
            let adapter = Arc::new(InteractionAdapter::new());
            registry.register(adapter.clone());
            Some(adapter)
        } else {
            None
        };
        let navigation = if options.enable_navigation_capture {
            let adapter = Arc::new(NavigationAdapter::new());
            registry.register(adapter.clone());
            Some(adapter)
        } else {
            None
        };

        let debug = options.debug;
        let shared = Arc::new(Shared {
            options: RwLock::new(Arc::new(options)),
            queue: Mutex::new(queue),
            ring: BreadcrumbRing::new(),
            limiter: Mutex::new(MinuteRateLimiter::new()),
            store,
            fallback,
            transport: RwLock::new(transport),
            circuit: Mutex::new(CircuitBreaker::default()),
            is_sending: AtomicBool::new(false),
        });
        let worker = DeliveryWorker::start(shared.clone());

        let client = Client {
            inner: Arc::new(ClientInner {
                shared,
                worker: Mutex::new(Some(worker)),
                registry,
                interaction,
                navigation,
                closed: AtomicBool::new(false),
            }),
        };
        let first = client
            .inner
            .registry
            .install_all(Arc::new(client.clone()));
        if !first && debug {
            eprintln!("[logbeam] another collector already owns the capture seams");
        }
        client
    }

    /// The live configuration snapshot.
    pub fn options(&self) -> Arc<CollectorOptions> {
        self.inner.shared.options()
    }

    /// The ingestion endpoint, if one is configured.
    pub fn dsn(&self) -> Option<Dsn> {
        self.options().dsn.clone()
    }

    /// Whether records can actually be delivered.
    pub fn is_enabled(&self) -> bool {
        self.dsn().is_some()
            && self
                .inner
                .shared
                .transport
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }

    /// The interaction intake, when interaction capture is enabled.
    pub fn interaction(&self) -> Option<Arc<InteractionAdapter>> {
        self.inner.interaction.clone()
    }

    /// The navigation intake, when navigation capture is enabled.
    pub fn navigation(&self) -> Option<Arc<NavigationAdapter>> {
        self.inner.navigation.clone()
    }

    /// Names of the installed capture adapters.
    pub fn adapter_names(&self) -> Vec<&'static str> {
        self.inner.registry.names()
    }

    /// Captures a record at the given level.
    pub fn log(&self, level: Level, message: &str, context: Option<Map>) {
        self.capture_log(
            level,
            message,
            CaptureExtra {
                context,
                ..Default::default()
            },
        );
    }

    /// Captures at `trace`.
    pub fn trace(&self, message: &str, context: Option<Map>) {
        self.log(Level::Trace, message, context);
    }

    /// Captures at `debug`.
    pub fn debug(&self, message: &str, context: Option<Map>) {
        self.log(Level::Debug, message, context);
    }

    /// Captures at `info`.
    pub fn info(&self, message: &str, context: Option<Map>) {
        self.log(Level::Info, message, context);
    }

    /// Captures at `warn`.
    pub fn warn(&self, message: &str, context: Option<Map>) {
        self.log(Level::Warn, message, context);
    }

    /// Captures at `error`.
    pub fn error(&self, message: &str, context: Option<Map>) {
        self.log(Level::Error, message, context);
    }

    /// Captures at `fatal`.
    pub fn fatal(&self, message: &str, context: Option<Map>) {
        self.log(Level::Fatal, message, context);
    }

    /// Captures at `critical`.
    pub fn critical(&self, message: &str, context: Option<Map>) {
        self.log(Level::Critical, message, context);
    }

    /// Captures a structured error value at `error`.
    ///
    /// The error's type name and cause chain are extracted, and the value
    /// is subjected to `ignore_errors` before routing.
    pub fn capture_error(&self, error: &dyn std::error::Error, context: Option<Map>) {
        let message = error.to_string();
        if self.should_ignore_error(&message) {
            return;
        }
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        self.capture_log(
            Level::Error,
            &message,
            CaptureExtra {
                context,
                error_name: Some(parse_type_from_debug(error)),
                stack: if causes.is_empty() {
                    None
                } else {
                    Some(causes.join("\n"))
                },
                reason: Some(Value::from(message.clone())),
                ..Default::default()
            },
        );
    }

    /// Records a breadcrumb.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        let options = self.options();
        self.inner.shared.ring.add(breadcrumb, &options);
    }

    /// The single entry point for accepted events.
    ///
    /// Runs the policy steps in order: level gate, sampling, rate limit,
    /// record build, masking, `before_send`, enqueue-and-persist, flush
    /// trigger.
    pub fn capture_log(&self, level: Level, message: &str, extra: CaptureExtra) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let options = self.options();

        if level < options.log_level {
            return;
        }

        let rate = options.sampling_rates.get(&level).copied().unwrap_or(1.0);
        if !sample_should_send(rate) {
            return;
        }

        let allowed = self
            .inner
            .shared
            .limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(options.max_logs_per_minute);
        if !allowed {
            beam_debug!(options, "rate limit exceeded, dropping record");
            return;
        }

        let entry = self.prepare_entry(level, message, extra, &options);

        let entry = if options.mask_fields.is_empty() {
            entry
        } else {
            masking::mask_entry(entry, &options.mask_fields)
        };

        let entry = match &options.before_send {
            Some(callback) => match callback(entry) {
                Some(entry) => entry,
                None => return,
            },
            None => entry,
        };

        let shared = &self.inner.shared;
        {
            let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.push(entry);
        }

        // pending counts whatever the next flush would see
        let mut pending = 0;
        if let Some(store) = &shared.store {
            let snapshot = {
                let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *queue)
            };
            if let Err(err) = store.append(&snapshot) {
                beam_debug!(options, "durable store write failed: {}", err);
                let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
                let newer = std::mem::take(&mut *queue);
                *queue = snapshot;
                queue.extend(newer);
                if let Some(fallback) = &shared.fallback {
                    if let Err(err) = fallback.save(&queue) {
                        beam_debug!(options, "fallback store write failed: {}", err);
                    }
                }
            } else {
                pending = store.len().unwrap_or(0);
            }
        } else if let Some(fallback) = &shared.fallback {
            let queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = fallback.save(&queue) {
                beam_debug!(options, "fallback store write failed: {}", err);
            }
            pending = queue.len();
        } else {
            pending = shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len();
        }

        if pending >= options.batch_size {
            if let Some(worker) = &*self
                .inner
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
            {
                worker.kick();
            }
        }
    }

    /// Flushes pending batches now instead of waiting for the timer.
    pub fn flush(&self) {
        delivery::flush_queue(&self.inner.shared, false);
    }

    /// Applies a configuration change atomically.
    ///
    /// The closure receives a copy of the current snapshot; the modified
    /// copy replaces it in one step. Derived state follows: the batch
    /// timer is re-armed when its interval changed, the rate limiter is
    /// reset when its cap changed.
    pub fn update_config(&self, apply: impl FnOnce(&mut CollectorOptions)) {
        let current = self.options();
        let mut next = (*current).clone();
        apply(&mut next);
        let next = Arc::new(next);
        {
            let mut slot = self
                .inner
                .shared
                .options
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *slot = next.clone();
        }
        if next.batch_interval != current.batch_interval {
            if let Some(worker) = &*self
                .inner
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
            {
                worker.set_interval(next.batch_interval);
            }
        }
        if next.max_logs_per_minute != current.max_logs_per_minute {
            self.inner
                .shared
                .limiter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .reset();
        }
    }

    /// Shuts the collector down.
    ///
    /// Tears the adapters down, stops the batch timer, persists whatever
    /// is still in memory and runs one shutdown flush (beacon first).
    /// Idempotent; also runs when the [`ClientInitGuard`] drops.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.registry.uninstall_all();
        if let Some(mut worker) = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            worker.shutdown();
        }

        let shared = &self.inner.shared;
        let options = shared.options();
        {
            let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if !queue.is_empty() {
                match &shared.store {
                    Some(store) => {
                        if store.append(&queue).is_ok() {
                            queue.clear();
                        } else if let Some(fallback) = &shared.fallback {
                            if let Err(err) = fallback.save(&queue) {
                                beam_debug!(options, "fallback store write failed: {}", err);
                            }
                        }
                    }
                    None => {
                        if let Some(fallback) = &shared.fallback {
                            if let Err(err) = fallback.save(&queue) {
                                beam_debug!(options, "fallback store write failed: {}", err);
                            }
                        }
                    }
                }
            }
        }
        delivery::flush_queue(shared, true);
    }

    fn prepare_entry(
        &self,
        level: Level,
        message: &str,
        extra: CaptureExtra,
        options: &CollectorOptions,
    ) -> LogEntry {
        let request = extra.request.unwrap_or_default();
        LogEntry {
            id: Some(Uuid::new_v4().to_string()),
            level,
            message: message.to_owned(),
            timestamp: Utc::now(),
            service: options.service.clone(),
            context: extra.context,
            global_context: options
                .global_context
                .as_ref()
                .map(|provider| provider())
                .unwrap_or_default(),
            user_context: options.user_context.as_ref().map(|provider| provider()),
            user: options.user.clone(),
            device: Some(contexts::device_info()),
            breadcrumbs: Some(self.inner.shared.ring.snapshot()),
            error_name: extra.error_name,
            stack: extra.stack,
            reason: extra.reason,
            request_method: request.method,
            request_url: request.url,
            status_code: request.status_code,
            status_text: request.status_text,
            duration_ms: request.duration_ms,
            response_size: request.response_size,
            error_message: request.error_message,
        }
    }
}

impl CaptureSink for Client {
    fn capture_log(&self, level: Level, message: &str, extra: CaptureExtra) {
        Client::capture_log(self, level, message, extra);
    }

    fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        Client::add_breadcrumb(self, breadcrumb);
    }

    fn should_ignore_error(&self, message: &str) -> bool {
        self.options()
            .ignore_errors
            .iter()
            .any(|pattern| pattern.matches(message))
    }

    fn should_ignore_url(&self, url: &str) -> bool {
        self.options()
            .ignore_urls
            .iter()
            .any(|pattern| pattern.matches(url))
    }

    fn interaction_debounce(&self) -> Duration {
        self.options().interaction_debounce
    }
}

fn sample_should_send(rate: f64) -> bool {
    if rate >= 1.0 {
        true
    } else if rate <= 0.0 {
        false
    } else {
        rand::random::<f64>() < rate
    }
}

/// Helper struct that is returned from [`init`].
///
/// When dropped, pending records are persisted and flushed through the
/// beacon path, then the delivery worker shuts down.
#[must_use = "when the init guard is dropped the collector shuts down \
              and no further records are delivered"]
pub struct ClientInitGuard(Client);

impl std::ops::Deref for ClientInitGuard {
    type Target = Client;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ClientInitGuard {
    /// Quick check if the collector can deliver.
    pub fn is_enabled(&self) -> bool {
        self.0.is_enabled()
    }
}

impl Drop for ClientInitGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Creates the collector for a given configuration and starts it.
///
/// This is the primary way to initialize the collector in an
/// application. The returned guard must be kept in scope; when it drops,
/// still-buffered records are persisted and a final beacon flush runs.
///
/// # Examples
///
/// ```no_run
/// let _collector = logbeam::init("https://logs.example.com/ingest");
/// ```
pub fn init<C>(config: C) -> ClientInitGuard
where
    C: Into<CollectorOptions>,
{
    let client = Client::new(config);
    {
        let options = client.options();
        if let Some(dsn) = &options.dsn {
            beam_debug!(options, "enabled collector for DSN {}", dsn);
        } else {
            beam_debug!(options, "collector running capture-only (no DSN)");
        }
    }
    ClientInitGuard(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_shortcuts_at_the_bounds() {
        assert!(sample_should_send(1.0));
        assert!(sample_should_send(1.5));
        assert!(!sample_should_send(0.0));
        assert!(!sample_should_send(-0.5));
    }

    #[test]
    fn sampling_converges_to_the_rate() {
        let n = 20_000;
        let hits = (0..n).filter(|_| sample_should_send(0.5)).count();
        let fraction = hits as f64 / n as f64;
        assert!((fraction - 0.5).abs() < 0.05, "fraction was {fraction}");
    }
}
