//! Network capture as a tower layer.
//!
//! Wraps any `http::Request -> http::Response` service. The wrapper times
//! each call and, when it completes, emits one record with method, url,
//! status and duration, plus an `xhr` breadcrumb. The wrapped service is
//! always invoked with the request unchanged (apart from the sentinel
//! extension that prevents a doubly-applied layer from capturing twice).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::Instant;

use http::{Request, Response};
use lazy_static::lazy_static;
use pin_project::pin_project;
use tower_layer::Layer;
use tower_service::Service;

use super::{CaptureAdapter, CaptureExtra, CaptureSink, RequestInfo};
use crate::protocol::{Breadcrumb, BreadcrumbType, Level};

lazy_static! {
    static ref NETWORK_SINK: RwLock<Option<Arc<dyn CaptureSink>>> = RwLock::new(None);
}

/// Marks a request that is already being captured further up the stack.
#[derive(Debug, Clone, Copy)]
struct Captured;

/// Activates the HTTP capture seam for [`HttpCaptureLayer`].
#[derive(Debug, Default)]
pub struct NetworkAdapter;

impl NetworkAdapter {
    /// Creates the network adapter.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureAdapter for NetworkAdapter {
    fn name(&self) -> &'static str {
        "network"
    }

    fn install(&self, sink: Arc<dyn CaptureSink>) {
        if let Ok(mut slot) = NETWORK_SINK.write() {
            *slot = Some(sink);
        }
    }

    fn uninstall(&self) {
        if let Ok(mut slot) = NETWORK_SINK.write() {
            *slot = None;
        }
    }
}

/// Tower layer that captures the requests flowing through a service.
///
/// The layer can be composed into a stack at any time; it only captures
/// while the collector's network adapter is installed, and passes calls
/// straight through otherwise.
#[derive(Clone, Default)]
pub struct HttpCaptureLayer;

impl HttpCaptureLayer {
    /// Creates a new capture layer.
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for HttpCaptureLayer {
    type Service = HttpCaptureService<S>;

    fn layer(&self, service: S) -> Self::Service {
        HttpCaptureService { service }
    }
}

/// The service produced by [`HttpCaptureLayer`].
#[derive(Clone)]
pub struct HttpCaptureService<S> {
    service: S,
}

struct PendingCapture {
    sink: Arc<dyn CaptureSink>,
    method: String,
    url: String,
    started: Instant,
}

impl PendingCapture {
    fn finish<ResBody, E: fmt::Display>(self, result: &Result<Response<ResBody>, E>) {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let mut request = RequestInfo {
            method: Some(self.method.clone()),
            url: Some(self.url.clone()),
            duration_ms: Some(duration_ms),
            ..Default::default()
        };
        let (level, message) = match result {
            Ok(response) => {
                let status = response.status();
                request.status_code = Some(status.as_u16());
                request.status_text = status.canonical_reason().map(str::to_owned);
                request.response_size = response
                    .headers()
                    .get(http::header::CONTENT_LENGTH)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse().ok());
                (
                    Level::Info,
                    format!("HTTP {} {} -> {}", self.method, self.url, status.as_u16()),
                )
            }
            Err(err) => {
                request.error_message = Some(err.to_string());
                (
                    Level::Error,
                    format!("HTTP {} {} failed: {err}", self.method, self.url),
                )
            }
        };

        self.sink.add_breadcrumb(Breadcrumb {
            ty: BreadcrumbType::Xhr,
            message: format!("{} {}", self.method, self.url),
            data: Some(serde_json::json!({
                "method": self.method,
                "url": self.url,
                "statusCode": request.status_code,
                "durationMs": duration_ms,
            })),
            ..Default::default()
        });
        self.sink.capture_log(
            level,
            &message,
            CaptureExtra {
                request: Some(request),
                ..Default::default()
            },
        );
    }
}

/// The future returned from [`HttpCaptureService`].
#[pin_project]
pub struct HttpCaptureFuture<F> {
    pending: Option<PendingCapture>,
    #[pin]
    future: F,
}

impl<F, ResBody, E> Future for HttpCaptureFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: fmt::Display,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.future.poll(cx) {
            Poll::Ready(result) => {
                if let Some(pending) = this.pending.take() {
                    pending.finish(&result);
                }
                Poll::Ready(result)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpCaptureService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: fmt::Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = HttpCaptureFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let sink = NETWORK_SINK.read().ok().and_then(|guard| guard.clone());
        let pending = match sink {
            Some(sink) if request.extensions().get::<Captured>().is_none() => {
                let url = request.uri().to_string();
                if sink.should_ignore_url(&url) {
                    None
                } else {
                    request.extensions_mut().insert(Captured);
                    Some(PendingCapture {
                        sink,
                        method: request.method().to_string(),
                        url,
                        started: Instant::now(),
                    })
                }
            }
            _ => None,
        };
        HttpCaptureFuture {
            pending,
            future: self.service.call(request),
        }
    }
}
