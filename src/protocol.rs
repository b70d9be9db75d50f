//! The wire protocol of the log ingestion endpoint.
//!
//! Batches are serialized as a JSON array of [`LogEntry`] objects. Field
//! names are camelCase on the wire; optional fields that were never
//! populated are omitted entirely rather than serialized as `null`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An arbitrary (JSON) value.
pub use serde_json::Value;

/// The internally used arbitrary data map type.
pub type Map = std::collections::BTreeMap<String, Value>;

/// Severity of a captured record.
///
/// The variant order is the severity order; `Ord` is the level gate's
/// comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Finest-grained diagnostics.
    Trace,
    /// Development diagnostics.
    Debug,
    /// Routine events.
    #[default]
    Info,
    /// Something surprising, not yet an error.
    Warn,
    /// A failed operation.
    Error,
    /// A failure the application cannot recover from.
    Fatal,
    /// Reserved for operator escalation.
    Critical,
}

impl Level {
    /// The lowercase wire name of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Critical => "critical",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of event a breadcrumb describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BreadcrumbType {
    /// A pointer interaction.
    Click,
    /// A route or page transition.
    Navigation,
    /// An observed HTTP request.
    Xhr,
    /// Output that went through the console seam.
    Console,
    /// Anything recorded through the public API.
    #[default]
    Custom,
    /// A captured failure.
    Error,
}

/// A short record of a user or system event, attached to subsequent logs
/// for context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Moment the breadcrumb was recorded.
    pub timestamp: DateTime<Utc>,
    /// Event category.
    #[serde(rename = "type")]
    pub ty: BreadcrumbType,
    /// Human-readable description.
    pub message: String,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Default for Breadcrumb {
    fn default() -> Self {
        Breadcrumb {
            timestamp: Utc::now(),
            ty: BreadcrumbType::default(),
            message: String::new(),
            data: None,
        }
    }
}

/// The user a record is attributed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Stable identifier of the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Contact address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One entry of the structured user-agent client hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brand {
    /// Browser or engine brand name.
    pub brand: String,
    /// Advertised version of that brand.
    pub version: String,
}

/// Structured user-agent information, where the platform exposes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgentClientHints {
    /// The advertised brand list.
    pub brands: Vec<Brand>,
    /// Whether the device reports itself as mobile.
    pub mobile: bool,
    /// The advertised platform name.
    pub platform: String,
}

/// Best-effort description of the device a record originated on.
///
/// Every field is optional; a field whose backing API is unavailable on
/// the current platform is omitted from the payload, never set to `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Operating system name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    /// Operating system version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    /// Device brand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Device model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Device or architecture family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// Screen width in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,
    /// Screen height in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,
    /// Physical-to-logical pixel ratio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_pixel_ratio: Option<f32>,
    /// Full user-agent string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Structured user-agent data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent_client_hints: Option<UserAgentClientHints>,
    /// Network connection kind (wifi, cellular, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    /// Effective connection class (4g, 3g, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_connection_type: Option<String>,
    /// Estimated round-trip time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt: Option<u32>,
    /// Estimated downlink bandwidth in Mbps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink: Option<f32>,
    /// Whether the user requested reduced data usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_data: Option<bool>,
    /// Logical processor count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_concurrency: Option<u32>,
    /// Approximate device memory in GiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_memory: Option<f32>,
    /// Script heap ceiling in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js_heap_size_limit: Option<u64>,
    /// Total allocated script heap in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_js_heap_size: Option<u64>,
    /// Used script heap in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_js_heap_size: Option<u64>,
}

/// The element an interaction record points at.
///
/// Travels inside [`LogEntry::context`] under the `element` key, together
/// with `coords`; it is not a top-level payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    /// Element tag name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    /// Element id attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Element class attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Visible text, truncated by the capturing adapter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
}

/// Pointer coordinates of an interaction record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Coords {
    /// Horizontal position in logical pixels.
    pub x: f64,
    /// Vertical position in logical pixels.
    pub y: f64,
}

/// A single captured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Opaque unique id, assigned at enrichment and immutable afterwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Record severity.
    pub level: Level,
    /// The captured message.
    pub message: String,
    /// Assigned at enrichment, never later.
    pub timestamp: DateTime<Utc>,
    /// Logical source name.
    pub service: String,
    /// Free-form payload supplied at capture time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map>,
    /// Snapshot of the configured global context provider.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub global_context: Map,
    /// Snapshot of the configured user context provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<Map>,
    /// The attributed user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    /// Device description gathered at enrichment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    /// Snapshot of the breadcrumb ring at enrichment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breadcrumbs: Option<Vec<Breadcrumb>>,

    /// Name of a captured failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_name: Option<String>,
    /// Stack or cause chain of a captured failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Rejection payload of a captured failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Value>,

    /// HTTP method of an observed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,
    /// URL of an observed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_url: Option<String>,
    /// Response status of an observed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Response status text of an observed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Wall-clock duration of an observed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Response size of an observed request, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    /// Failure description of an observed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Default for LogEntry {
    fn default() -> Self {
        LogEntry {
            id: None,
            level: Level::default(),
            message: String::new(),
            timestamp: Utc::now(),
            service: crate::constants::DEFAULT_SERVICE.into(),
            context: None,
            global_context: Map::new(),
            user_context: None,
            user: None,
            device: None,
            breadcrumbs: None,
            error_name: None,
            stack: None,
            reason: None,
            request_method: None,
            request_url: None,
            status_code: None,
            status_text: None,
            duration_ms: None,
            response_size: None,
            error_message: None,
        }
    }
}
