use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::DEFAULT_SERVICE;
use crate::dsn::{Dsn, IntoDsn};
use crate::protocol::{Breadcrumb, Level, LogEntry, Map, UserInfo};
use crate::transport::{TransportError, TransportFactory};

/// Type alias for before send/breadcrumb handlers.
pub type BeforeCallback<T> = Arc<dyn Fn(T) -> Option<T> + Send + Sync>;

/// Provider evaluated once per captured event to snapshot caller context.
pub type ContextProvider = Arc<dyn Fn() -> Map + Send + Sync>;

/// Invoked after a batch was accepted by the endpoint.
pub type SendSuccessCallback = Arc<dyn Fn(&[LogEntry]) + Send + Sync>;

/// Invoked after a batch delivery attempt failed.
pub type SendFailureCallback = Arc<dyn Fn(&TransportError, &[LogEntry]) + Send + Sync>;

/// Predicate form of an error filter.
pub type ErrorPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A URL filter: a literal substring or a regular expression.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches when the value contains the string.
    Substring(String),
    /// Matches when the regex finds a match in the value.
    Regex(regex::Regex),
}

impl Pattern {
    /// Whether the pattern matches the given value.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Substring(needle) => value.contains(needle.as_str()),
            Pattern::Regex(regex) => regex.is_match(value),
        }
    }
}

impl From<&str> for Pattern {
    fn from(needle: &str) -> Self {
        Pattern::Substring(needle.to_string())
    }
}

impl From<String> for Pattern {
    fn from(needle: String) -> Self {
        Pattern::Substring(needle)
    }
}

impl From<regex::Regex> for Pattern {
    fn from(regex: regex::Regex) -> Self {
        Pattern::Regex(regex)
    }
}

/// An error filter: substring, regex, or an arbitrary predicate over the
/// error message.
#[derive(Clone)]
pub enum ErrorPattern {
    /// Matches when the message contains the string.
    Substring(String),
    /// Matches when the regex finds a match in the message.
    Regex(regex::Regex),
    /// Matches when the predicate returns `true` for the message.
    Predicate(ErrorPredicate),
}

impl ErrorPattern {
    /// Whether the filter matches the given error message.
    pub fn matches(&self, message: &str) -> bool {
        match self {
            ErrorPattern::Substring(needle) => message.contains(needle.as_str()),
            ErrorPattern::Regex(regex) => regex.is_match(message),
            ErrorPattern::Predicate(predicate) => predicate(message),
        }
    }
}

impl fmt::Debug for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPattern::Substring(needle) => f.debug_tuple("Substring").field(needle).finish(),
            ErrorPattern::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            ErrorPattern::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for ErrorPattern {
    fn from(needle: &str) -> Self {
        ErrorPattern::Substring(needle.to_string())
    }
}

impl From<String> for ErrorPattern {
    fn from(needle: String) -> Self {
        ErrorPattern::Substring(needle)
    }
}

impl From<regex::Regex> for ErrorPattern {
    fn from(regex: regex::Regex) -> Self {
        ErrorPattern::Regex(regex)
    }
}

/// Configuration settings for the collector.
///
/// Merged over [`Default`] at construction; afterwards the live snapshot
/// is immutable and [`Client::update_config`](crate::Client::update_config)
/// replaces it atomically.
#[derive(Clone)]
pub struct CollectorOptions {
    /// The ingestion endpoint. If not set, delivery is disabled and
    /// records only accumulate locally.
    pub dsn: Option<Dsn>,
    /// Pre-shared key sent verbatim as the `X-Api-Key` header.
    pub api_key: Option<String>,
    /// Logical source name stamped on every record.
    pub service: String,
    /// Print internal diagnostics to stderr.
    pub debug: bool,

    /// Flush when this many records are pending.
    pub batch_size: usize,
    /// Flush at least this often.
    pub batch_interval: Duration,
    /// Per-batch retry budget.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_delay: Duration,

    /// Wrap the global logger and capture its records.
    pub enable_console_capture: bool,
    /// The destination logger console capture delegates to, preserving
    /// the application's own logging output.
    pub console_dest: Option<Arc<dyn log::Log>>,
    /// Hook the process panic handler.
    pub enable_panic_capture: bool,
    /// Activate the HTTP capture layer.
    pub enable_network_capture: bool,
    /// Accept click/input intake from the embedding UI.
    pub enable_interaction_capture: bool,
    /// Accept navigation intake and wrap routers.
    pub enable_navigation_capture: bool,

    /// Minimum severity to accept; lower-ranked events are dropped.
    pub log_level: Level,
    /// Network requests whose URL matches are not captured.
    pub ignore_urls: Vec<Pattern>,
    /// Errors whose message matches are suppressed.
    pub ignore_errors: Vec<ErrorPattern>,
    /// Key names whose values are masked in the outgoing payload.
    pub mask_fields: Vec<String>,
    /// Per-level acceptance probability in [0, 1]; absent levels keep 1.
    pub sampling_rates: BTreeMap<Level, f64>,
    /// Hard cap per rolling minute; 0 means unlimited.
    pub max_logs_per_minute: u32,

    /// Transform or drop every record before it is enqueued.
    pub before_send: Option<BeforeCallback<LogEntry>>,
    /// Transform or drop every breadcrumb before it enters the ring.
    pub before_breadcrumb: Option<BeforeCallback<Breadcrumb>>,
    /// Post-delivery success callback.
    pub on_send_success: Option<SendSuccessCallback>,
    /// Per-attempt delivery failure callback.
    pub on_send_failure: Option<SendFailureCallback>,
    /// Snapshotted into `globalContext` at enrichment time.
    pub global_context: Option<ContextProvider>,
    /// Snapshotted into `userContext` at enrichment time.
    pub user_context: Option<ContextProvider>,
    /// The user attached to every record.
    pub user: Option<UserInfo>,

    /// Use the durable store.
    pub enable_durable_store: bool,
    /// Database file of the durable store.
    pub database_path: PathBuf,
    /// Table name inside the database.
    pub table_name: String,
    /// Schema version stamped into the database.
    pub schema_version: u32,

    /// Use the fallback slot when the durable store is unavailable.
    pub enable_fallback_store: bool,
    /// Slot file of the fallback store.
    pub fallback_path: PathBuf,
    /// Upper bound on the serialized slot, in bytes.
    pub max_fallback_size: usize,

    /// Capacity of the breadcrumb ring.
    pub max_breadcrumbs: usize,
    /// Quiet period before a buffered click is emitted.
    pub interaction_debounce: Duration,

    /// The transport to use.
    ///
    /// Typically either a factory implementation or a boxed closure
    /// taking the options by reference and returning an
    /// `Arc<dyn Transport>`. Defaults to the HTTP transport.
    pub transport: Option<Arc<dyn TransportFactory>>,
    /// Deadline for the close-time flush.
    pub shutdown_timeout: Duration,
}

impl fmt::Debug for CollectorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[derive(Debug)]
        struct CallbackSet(bool);
        #[derive(Debug)]
        struct TransportSet(bool);
        f.debug_struct("CollectorOptions")
            .field("dsn", &self.dsn)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("service", &self.service)
            .field("debug", &self.debug)
            .field("batch_size", &self.batch_size)
            .field("batch_interval", &self.batch_interval)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("enable_console_capture", &self.enable_console_capture)
            .field("console_dest", &CallbackSet(self.console_dest.is_some()))
            .field("enable_panic_capture", &self.enable_panic_capture)
            .field("enable_network_capture", &self.enable_network_capture)
            .field(
                "enable_interaction_capture",
                &self.enable_interaction_capture,
            )
            .field("enable_navigation_capture", &self.enable_navigation_capture)
            .field("log_level", &self.log_level)
            .field("ignore_urls", &self.ignore_urls)
            .field("ignore_errors", &self.ignore_errors)
            .field("mask_fields", &self.mask_fields)
            .field("sampling_rates", &self.sampling_rates)
            .field("max_logs_per_minute", &self.max_logs_per_minute)
            .field("before_send", &CallbackSet(self.before_send.is_some()))
            .field(
                "before_breadcrumb",
                &CallbackSet(self.before_breadcrumb.is_some()),
            )
            .field(
                "on_send_success",
                &CallbackSet(self.on_send_success.is_some()),
            )
            .field(
                "on_send_failure",
                &CallbackSet(self.on_send_failure.is_some()),
            )
            .field("global_context", &CallbackSet(self.global_context.is_some()))
            .field("user_context", &CallbackSet(self.user_context.is_some()))
            .field("user", &self.user)
            .field("enable_durable_store", &self.enable_durable_store)
            .field("database_path", &self.database_path)
            .field("table_name", &self.table_name)
            .field("schema_version", &self.schema_version)
            .field("enable_fallback_store", &self.enable_fallback_store)
            .field("fallback_path", &self.fallback_path)
            .field("max_fallback_size", &self.max_fallback_size)
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("interaction_debounce", &self.interaction_debounce)
            .field("transport", &TransportSet(self.transport.is_some()))
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl Default for CollectorOptions {
    fn default() -> CollectorOptions {
        CollectorOptions {
            dsn: None,
            api_key: None,
            service: DEFAULT_SERVICE.into(),
            debug: false,
            batch_size: 10,
            batch_interval: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            enable_console_capture: true,
            console_dest: None,
            enable_panic_capture: true,
            enable_network_capture: true,
            enable_interaction_capture: true,
            enable_navigation_capture: true,
            log_level: Level::Trace,
            ignore_urls: Vec::new(),
            ignore_errors: Vec::new(),
            mask_fields: Vec::new(),
            sampling_rates: BTreeMap::new(),
            max_logs_per_minute: 0,
            before_send: None,
            before_breadcrumb: None,
            on_send_success: None,
            on_send_failure: None,
            global_context: None,
            user_context: None,
            user: None,
            enable_durable_store: true,
            database_path: PathBuf::from("logbeam.db"),
            table_name: "logs".into(),
            schema_version: 1,
            enable_fallback_store: true,
            fallback_path: PathBuf::from("logbeam-queue.json"),
            max_fallback_size: 64 * 1024,
            max_breadcrumbs: 100,
            interaction_debounce: Duration::from_millis(500),
            transport: None,
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl CollectorOptions {
    /// Creates empty options.
    pub fn new() -> CollectorOptions {
        Default::default()
    }
}

/// Fills unset options from the environment.
///
/// `LOGBEAM_DSN` and `LOGBEAM_API_KEY` are picked up when the respective
/// option was not provided; an unparsable environment DSN is ignored.
pub fn apply_defaults(mut options: CollectorOptions) -> CollectorOptions {
    if options.dsn.is_none() {
        options.dsn = env::var("LOGBEAM_DSN")
            .ok()
            .and_then(|dsn| dsn.parse::<Dsn>().ok());
    }
    if options.api_key.is_none() {
        options.api_key = env::var("LOGBEAM_API_KEY").ok();
    }
    options
}

impl<T: IntoDsn> From<(T, CollectorOptions)> for CollectorOptions {
    fn from((into_dsn, mut options): (T, CollectorOptions)) -> CollectorOptions {
        options.dsn = into_dsn.into_dsn().expect("invalid value for DSN");
        options
    }
}

impl<T: IntoDsn> From<T> for CollectorOptions {
    fn from(into_dsn: T) -> CollectorOptions {
        CollectorOptions {
            dsn: into_dsn.into_dsn().expect("invalid value for DSN"),
            ..CollectorOptions::default()
        }
    }
}
