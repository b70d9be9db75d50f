//! This crate is a client-side log collection pipeline: it captures
//! events from the ambient sources of an application (explicit API
//! calls, the `log` facade, panics, HTTP activity, UI input,
//! navigation), enriches each captured event with contextual metadata,
//! filters and samples it, persists it durably, and delivers batches to
//! a remote ingestion endpoint with retry, circuit breaking and a final
//! flush on shutdown.
//!
//! # Quickstart
//!
//! To use the crate you create a collector first. The [`init`]
//! convenience function merges your configuration over the defaults,
//! installs the capture adapters and returns a guard; keep the guard
//! around, its drop persists and flushes whatever is still buffered.
//!
//! ```no_run
//! let _collector = logbeam::init(logbeam::CollectorOptions {
//!     dsn: "https://logs.example.com/ingest".parse().ok(),
//!     api_key: Some("secret".into()),
//!     ..Default::default()
//! });
//! ```
//!
//! Records are captured through the level methods on [`Client`], through
//! the wrapped `log` facade, or as side effects of the other adapters:
//!
//! ```no_run
//! let collector = logbeam::init(logbeam::CollectorOptions::default());
//! collector.info("checkout completed", None);
//! log::warn!("retrying payment");              // console capture
//! collector.add_breadcrumb(logbeam::Breadcrumb {
//!     message: "cart opened".into(),
//!     ..Default::default()
//! });
//! ```
//!
//! # Pipeline
//!
//! Every accepted event passes the level gate, per-level sampling, the
//! per-minute rate limit, enrichment (timestamp, service, device info,
//! context providers, breadcrumb snapshot), field masking and the
//! `before_send` hook, in that order. Accepted records are persisted
//! immediately, into an embedded SQLite database or a flat slot file
//! where SQLite is unavailable, and survive a crash or restart; they
//! are deleted only after the endpoint acknowledged their batch, so
//! delivery is at-least-once.
//!
//! # Delivery
//!
//! A background worker flushes the oldest pending records whenever the
//! queue reaches `batch_size` or `batch_interval` elapses, whichever
//! comes first. Failed batches retry with exponential backoff and
//! jitter; five consecutive failures open a circuit breaker that
//! suppresses delivery for a minute before probing again. On shutdown a
//! best-effort beacon send is attempted first for small payloads.

#![warn(missing_docs)]

mod breadcrumbs;
mod circuit;
mod client;
mod clientoptions;
mod constants;
mod contexts;
mod delivery;
mod dsn;
mod macros;
mod masking;
mod protocol;
mod ratelimit;
mod transport;
mod utils;

pub mod adapters;
pub mod store;
pub mod test;

pub use crate::client::{init, Client, ClientInitGuard};
pub use crate::clientoptions::{
    apply_defaults, BeforeCallback, CollectorOptions, ContextProvider, ErrorPattern,
    ErrorPredicate, Pattern, SendFailureCallback, SendSuccessCallback,
};
pub use crate::dsn::{Dsn, DsnParseError, IntoDsn};
pub use crate::protocol::{
    Brand, Breadcrumb, BreadcrumbType, Coords, DeviceInfo, ElementInfo, Level, LogEntry, Map,
    UserAgentClientHints, UserInfo, Value,
};
pub use crate::transport::{
    BatchRequest, DefaultTransportFactory, HttpTransport, Transport, TransportError,
    TransportFactory,
};
pub use crate::utils::parse_type_from_debug;
