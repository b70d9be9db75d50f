//! Uncaught-failure capture over the process panic hook.

use std::backtrace::Backtrace;
#[allow(deprecated)] // `PanicHookInfo` is only available in Rust 1.81+.
use std::panic::{self, PanicInfo};
use std::sync::{Arc, Once, RwLock};

use lazy_static::lazy_static;

use super::{CaptureAdapter, CaptureExtra, CaptureSink};
use crate::protocol::{Breadcrumb, BreadcrumbType, Level, Value};

lazy_static! {
    static ref PANIC_SINK: RwLock<Option<Arc<dyn CaptureSink>>> = RwLock::new(None);
}

static INSTALL: Once = Once::new();

/// Extract the message of a panic.
#[allow(deprecated)]
pub fn message_from_panic_info<'a>(info: &'a PanicInfo<'_>) -> &'a str {
    match info.payload().downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    }
}

#[allow(deprecated)]
fn panic_handler(info: &PanicInfo<'_>) {
    let sink = PANIC_SINK.read().ok().and_then(|guard| guard.clone());
    let Some(sink) = sink else { return };

    let message = message_from_panic_info(info);
    if sink.should_ignore_error(message) {
        return;
    }

    sink.add_breadcrumb(Breadcrumb {
        ty: BreadcrumbType::Error,
        message: format!("panic: {message}"),
        ..Default::default()
    });
    sink.capture_log(
        Level::Error,
        message,
        CaptureExtra {
            error_name: Some("panic".into()),
            stack: Some(Backtrace::force_capture().to_string()),
            reason: Some(Value::from(message)),
            ..Default::default()
        },
    );
}

/// Captures panics that would otherwise only reach the default handler.
///
/// On install the previous hook is taken and every panic is forwarded to
/// it after capture, so existing behavior (abort messages, custom hooks)
/// is untouched. Panics matching `ignore_errors` are suppressed from
/// capture but still delegated.
#[derive(Debug, Default)]
pub struct PanicAdapter;

impl PanicAdapter {
    /// Creates the panic adapter.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureAdapter for PanicAdapter {
    fn name(&self) -> &'static str {
        "panic"
    }

    fn install(&self, sink: Arc<dyn CaptureSink>) {
        if let Ok(mut slot) = PANIC_SINK.write() {
            *slot = Some(sink);
        }
        INSTALL.call_once(|| {
            let next = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                panic_handler(info);
                next(info);
            }));
        });
    }

    fn uninstall(&self) {
        if let Ok(mut slot) = PANIC_SINK.write() {
            *slot = None;
        }
    }
}
