pub(crate) const USER_AGENT: &str = concat!("logbeam.rust/", env!("CARGO_PKG_VERSION"));

/// The logical source name attached to records when none is configured.
pub(crate) const DEFAULT_SERVICE: &str = "frontend-app";

/// Replacement written over masked field values.
pub(crate) const MASK: &str = "********";

/// Consecutive delivery failures that open the circuit.
pub(crate) const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;

/// How long the circuit stays open before a half-open probe is allowed.
pub(crate) const CIRCUIT_RESET_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Payloads at or above this size skip the beacon path on shutdown.
pub(crate) const BEACON_MAX_BYTES: usize = 60 * 1024;

/// Deadline for a regular batch POST.
pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Console breadcrumb messages are cut at this many characters.
pub(crate) const CONSOLE_BREADCRUMB_MAX: usize = 200;

/// Click capture truncates element text content at this many characters.
pub(crate) const CLICK_TEXT_MAX: usize = 100;
