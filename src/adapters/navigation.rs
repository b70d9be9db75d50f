//! Navigation capture as a router decorator.

use std::sync::{Arc, RwLock};

use super::{CaptureAdapter, CaptureExtra, CaptureSink};
use crate::protocol::{Breadcrumb, BreadcrumbType, Level, Map, Value};

/// The history seam of the embedding application.
///
/// Implemented by whatever drives route transitions (a router, a webview
/// history object). The adapter wraps an implementation and observes the
/// calls without altering them.
pub trait Navigator: Send + Sync {
    /// Pushes a new location onto the history.
    fn push_state(&self, url: &str);

    /// Replaces the current location.
    fn replace_state(&self, url: &str);
}

struct NavigationState {
    sink: RwLock<Option<Arc<dyn CaptureSink>>>,
    inner: RwLock<Option<Arc<dyn Navigator>>>,
}

/// Captures page loads and route transitions.
///
/// `push_state` and `replace_state` emit before delegating to the wrapped
/// [`Navigator`] with the argument list unchanged, so routing behavior is
/// preserved exactly. `page_load` and `pop_state` are plain intakes for
/// events the embedding layer observes itself.
pub struct NavigationAdapter {
    state: Arc<NavigationState>,
}

impl Default for NavigationAdapter {
    fn default() -> Self {
        NavigationAdapter::new()
    }
}

impl NavigationAdapter {
    /// Creates the navigation adapter.
    pub fn new() -> Self {
        NavigationAdapter {
            state: Arc::new(NavigationState {
                sink: RwLock::new(None),
                inner: RwLock::new(None),
            }),
        }
    }

    /// Saves the original router the adapter delegates to.
    pub fn wrap(&self, inner: Arc<dyn Navigator>) {
        if let Ok(mut slot) = self.state.inner.write() {
            *slot = Some(inner);
        }
    }

    /// Reports that the page (or view) finished loading.
    pub fn page_load(&self, url: &str) {
        self.emit("page load", url);
    }

    /// Reports a history pop (back/forward navigation).
    pub fn pop_state(&self, url: &str) {
        self.emit("navigation (popstate)", url);
    }

    fn emit(&self, kind: &str, url: &str) {
        let sink = self.state.sink.read().ok().and_then(|guard| guard.clone());
        let Some(sink) = sink else { return };

        sink.add_breadcrumb(Breadcrumb {
            ty: BreadcrumbType::Navigation,
            message: format!("{kind}: {url}"),
            data: Some(serde_json::json!({ "url": url })),
            ..Default::default()
        });
        let mut context = Map::new();
        context.insert("url".into(), Value::from(url));
        sink.capture_log(
            Level::Info,
            &format!("{kind}: {url}"),
            CaptureExtra {
                context: Some(context),
                ..Default::default()
            },
        );
    }
}

impl Navigator for NavigationAdapter {
    fn push_state(&self, url: &str) {
        self.emit("navigation (pushState)", url);
        let inner = self.state.inner.read().ok().and_then(|guard| guard.clone());
        if let Some(inner) = inner {
            inner.push_state(url);
        }
    }

    fn replace_state(&self, url: &str) {
        self.emit("navigation (replaceState)", url);
        let inner = self.state.inner.read().ok().and_then(|guard| guard.clone());
        if let Some(inner) = inner {
            inner.replace_state(url);
        }
    }
}

impl CaptureAdapter for NavigationAdapter {
    fn name(&self) -> &'static str {
        "navigation"
    }

    fn install(&self, sink: Arc<dyn CaptureSink>) {
        if let Ok(mut slot) = self.state.sink.write() {
            *slot = Some(sink);
        }
    }

    fn uninstall(&self) {
        if let Ok(mut slot) = self.state.sink.write() {
            *slot = None;
        }
    }
}
