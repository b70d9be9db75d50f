//! Console capture over the `log` facade.

use std::sync::{Arc, Once, RwLock};

use lazy_static::lazy_static;

use super::{CaptureAdapter, CaptureExtra, CaptureSink};
use crate::constants::CONSOLE_BREADCRUMB_MAX;
use crate::protocol::{Breadcrumb, BreadcrumbType, Level, Map, Value};

lazy_static! {
    static ref CONSOLE_SINK: RwLock<Option<Arc<dyn CaptureSink>>> = RwLock::new(None);
}

static INSTALL: Once = Once::new();

fn level_from_log(level: log::Level) -> Level {
    match level {
        log::Level::Error => Level::Error,
        log::Level::Warn => Level::Warn,
        log::Level::Info => Level::Info,
        log::Level::Debug => Level::Debug,
        log::Level::Trace => Level::Trace,
    }
}

/// A no-op destination for when there is nothing to delegate to.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl log::Log for NoopLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        false
    }

    fn log(&self, _record: &log::Record<'_>) {}

    fn flush(&self) {}
}

/// The dispatching logger installed over the facade.
///
/// Every record is routed into the capture pipeline at the matching
/// severity and always handed on to the saved destination logger, so the
/// application's own logging output is unchanged.
struct ConsoleLogger {
    dest: Option<Arc<dyn log::Log>>,
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.dest
            .as_ref()
            .map(|dest| dest.enabled(metadata))
            .unwrap_or(false)
            || CONSOLE_SINK
                .read()
                .map(|sink| sink.is_some())
                .unwrap_or(false)
    }

    fn log(&self, record: &log::Record<'_>) {
        let sink = CONSOLE_SINK.read().ok().and_then(|guard| guard.clone());
        if let Some(sink) = sink {
            let message = record.args().to_string();
            let mut context = Map::new();
            context.insert("target".into(), Value::from(record.target()));
            sink.capture_log(
                level_from_log(record.level()),
                &message,
                CaptureExtra {
                    context: Some(context),
                    ..Default::default()
                },
            );

            let mut preview: String = message.chars().take(CONSOLE_BREADCRUMB_MAX).collect();
            if message.chars().count() > CONSOLE_BREADCRUMB_MAX {
                preview.push('…');
            }
            sink.add_breadcrumb(Breadcrumb {
                ty: BreadcrumbType::Console,
                message: preview,
                data: Some(serde_json::json!({
                    "level": level_from_log(record.level()).as_str(),
                })),
                ..Default::default()
            });
        }
        if let Some(dest) = &self.dest {
            dest.log(record);
        }
    }

    fn flush(&self) {
        if let Some(dest) = &self.dest {
            dest.flush();
        }
    }
}

/// Captures records flowing through the `log` facade.
///
/// Only the five facade levels exist; there is nothing to wrap for
/// `fatal` and `critical`, those arrive through the public API alone.
pub struct ConsoleAdapter {
    dest: Option<Arc<dyn log::Log>>,
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        ConsoleAdapter::new()
    }
}

impl ConsoleAdapter {
    /// Capture only; facade output goes nowhere else.
    pub fn new() -> Self {
        ConsoleAdapter { dest: None }
    }

    /// Capture and delegate every record to `dest`, preserving the
    /// application's logging behavior.
    pub fn with_dest(dest: Arc<dyn log::Log>) -> Self {
        ConsoleAdapter { dest: Some(dest) }
    }
}

impl CaptureAdapter for ConsoleAdapter {
    fn name(&self) -> &'static str {
        "console"
    }

    fn install(&self, sink: Arc<dyn CaptureSink>) {
        if let Ok(mut slot) = CONSOLE_SINK.write() {
            *slot = Some(sink);
        }
        INSTALL.call_once(|| {
            let dest = self.dest.clone();
            if log::set_boxed_logger(Box::new(ConsoleLogger { dest })).is_err() {
                // someone else owns the facade; leave their logger alone
                eprintln!("[logbeam] global logger already installed, console capture disabled");
            } else {
                log::set_max_level(log::LevelFilter::Trace);
            }
        });
    }

    fn uninstall(&self) {
        if let Ok(mut slot) = CONSOLE_SINK.write() {
            *slot = None;
        }
    }
}
