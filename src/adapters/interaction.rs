//! UI interaction capture with debouncing.
//!
//! The embedding UI layer feeds pointer and input events through
//! [`InteractionAdapter::record_click`] and
//! [`InteractionAdapter::record_input`]. Clicks are buffered and emitted
//! once the configured quiet period elapses, so a burst collapses into
//! its final event. Input events only leave a breadcrumb and never carry
//! the entered value.

use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Instant;

use super::{CaptureAdapter, CaptureExtra, CaptureSink};
use crate::constants::CLICK_TEXT_MAX;
use crate::protocol::{Breadcrumb, BreadcrumbType, Coords, ElementInfo, Level, Map, Value};

struct PendingClick {
    element: ElementInfo,
    coords: Coords,
    at: Instant,
}

#[derive(Default)]
struct DebounceState {
    pending: Option<PendingClick>,
    shutdown: bool,
}

struct InteractionShared {
    sink: RwLock<Option<Arc<dyn CaptureSink>>>,
    state: Mutex<DebounceState>,
    cvar: Condvar,
}

/// Captures clicks and input events handed in by the embedding UI.
pub struct InteractionAdapter {
    shared: Arc<InteractionShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for InteractionAdapter {
    fn default() -> Self {
        InteractionAdapter::new()
    }
}

impl InteractionAdapter {
    /// Creates the interaction adapter.
    pub fn new() -> Self {
        InteractionAdapter {
            shared: Arc::new(InteractionShared {
                sink: RwLock::new(None),
                state: Mutex::new(DebounceState::default()),
                cvar: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Buffers a click; the latest click in a burst wins.
    pub fn record_click(&self, element: ElementInfo, coords: Coords) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.pending = Some(PendingClick {
            element,
            coords,
            at: Instant::now(),
        });
        self.shared.cvar.notify_one();
    }

    /// Records an input event as a breadcrumb. The entered value is never
    /// captured.
    pub fn record_input(&self, element: ElementInfo) {
        let sink = self.shared.sink.read().ok().and_then(|guard| guard.clone());
        if let Some(sink) = sink {
            let target = element.tag_name.as_deref().unwrap_or("input");
            sink.add_breadcrumb(Breadcrumb {
                ty: BreadcrumbType::Custom,
                message: format!("input on {target}"),
                data: Some(serde_json::json!({
                    "tagName": element.tag_name,
                    "id": element.id,
                })),
                ..Default::default()
            });
        }
    }

    fn emit(shared: &InteractionShared, click: PendingClick) {
        let sink = shared.sink.read().ok().and_then(|guard| guard.clone());
        let Some(sink) = sink else { return };

        let mut element = click.element;
        if let Some(text) = element.text_content.take() {
            element.text_content = Some(text.chars().take(CLICK_TEXT_MAX).collect());
        }
        let target = element.tag_name.as_deref().unwrap_or("element").to_owned();
        let message = match element.id.as_deref() {
            Some(id) if !id.is_empty() => format!("click on {target}#{id}"),
            _ => format!("click on {target}"),
        };

        sink.add_breadcrumb(Breadcrumb {
            ty: BreadcrumbType::Click,
            message: message.clone(),
            data: serde_json::to_value(&element).ok(),
            ..Default::default()
        });

        let mut context = Map::new();
        if let Ok(value) = serde_json::to_value(&element) {
            context.insert("element".into(), value);
        }
        context.insert(
            "coords".into(),
            serde_json::to_value(click.coords).unwrap_or(Value::Null),
        );
        sink.capture_log(
            Level::Info,
            &message,
            CaptureExtra {
                context: Some(context),
                ..Default::default()
            },
        );
    }

    fn spawn_worker(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        std::thread::Builder::new()
            .name("logbeam-interaction".into())
            .spawn(move || {
                let mut state = shared
                    .state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                loop {
                    if state.shutdown {
                        return;
                    }
                    let deadline = match &state.pending {
                        None => {
                            state = shared
                                .cvar
                                .wait(state)
                                .unwrap_or_else(PoisonError::into_inner);
                            continue;
                        }
                        Some(pending) => {
                            let debounce = shared
                                .sink
                                .read()
                                .ok()
                                .and_then(|guard| guard.clone())
                                .map(|sink| sink.interaction_debounce())
                                .unwrap_or_default();
                            pending.at + debounce
                        }
                    };
                    let now = Instant::now();
                    if now < deadline {
                        state = shared
                            .cvar
                            .wait_timeout(state, deadline - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                        continue;
                    }
                    if let Some(click) = state.pending.take() {
                        drop(state);
                        InteractionAdapter::emit(&shared, click);
                        state = shared
                            .state
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                }
            })
            .expect("failed to spawn interaction worker")
    }
}

impl CaptureAdapter for InteractionAdapter {
    fn name(&self) -> &'static str {
        "interaction"
    }

    fn install(&self, sink: Arc<dyn CaptureSink>) {
        if let Ok(mut slot) = self.shared.sink.write() {
            *slot = Some(sink);
        }
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_none() {
            self.shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .shutdown = false;
            *worker = Some(self.spawn_worker());
        }
    }

    fn uninstall(&self) {
        if let Ok(mut slot) = self.shared.sink.write() {
            *slot = None;
        }
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.shutdown = true;
            state.pending = None;
            self.shared.cvar.notify_one();
        }
        if let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.join().ok();
        }
    }
}
