use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use logbeam::adapters::{HttpCaptureLayer, Navigator};
use logbeam::test::{client_with_transport, test_options, TestTransport};
use logbeam::{BreadcrumbType, CollectorOptions, Coords, ElementInfo, Level};
use tower_layer::Layer;
use tower_service::Service;

fn quiet_worker() -> CollectorOptions {
    CollectorOptions {
        batch_interval: Duration::from_secs(60),
        batch_size: 100,
        ..test_options()
    }
}

#[derive(Default)]
struct CountingLogger(AtomicUsize);

impl log::Log for CountingLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, _record: &log::Record<'_>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn flush(&self) {}
}

#[test]
fn test_console_capture_delegates_and_tears_down() {
    let dest = Arc::new(CountingLogger::default());
    let transport = TestTransport::new();
    let client = client_with_transport(
        transport.clone(),
        CollectorOptions {
            enable_console_capture: true,
            console_dest: Some(dest.clone()),
            ..quiet_worker()
        },
    );

    log::warn!("console says {}", 42);
    log::info!("and again");
    client.flush();

    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    let entry = &batches[0][0];
    assert_eq!(entry.level, Level::Warn);
    assert_eq!(entry.message, "console says 42");
    // the console breadcrumb of the first record is visible to the next
    let crumbs = batches[0][1].breadcrumbs.as_ref().unwrap();
    assert!(crumbs
        .iter()
        .any(|crumb| crumb.ty == BreadcrumbType::Console && crumb.message == "console says 42"));
    // the saved original was invoked
    let delegated = dest.0.load(Ordering::SeqCst);
    assert!(delegated >= 1);

    client.close();
    // after teardown the wrapper is pass-through: delegation continues,
    // capture stops
    log::warn!("after teardown");
    assert_eq!(dest.0.load(Ordering::SeqCst), delegated + 1);
    assert_eq!(transport.batches().len(), 1);
}

#[test]
fn test_panic_capture_routes_through_ignore_filter() {
    // keep the default hook quiet underneath the adapter
    std::panic::set_hook(Box::new(|_| {}));

    let transport = TestTransport::new();
    let client = client_with_transport(
        transport.clone(),
        CollectorOptions {
            enable_panic_capture: true,
            ignore_errors: vec!["ignorable".into()],
            ..quiet_worker()
        },
    );

    let _ = std::panic::catch_unwind(|| panic!("ignorable glitch"));
    let _ = std::panic::catch_unwind(|| panic!("real trouble"));
    client.flush();

    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    let entry = &batches[0][0];
    assert_eq!(entry.level, Level::Error);
    assert_eq!(entry.message, "real trouble");
    assert_eq!(entry.error_name.as_deref(), Some("panic"));
    assert!(entry.stack.is_some());
    assert!(entry.reason.is_some());
    client.close();
}

struct MockService {
    status: u16,
}

impl Service<http::Request<Vec<u8>>> for MockService {
    type Response = http::Response<()>;
    type Error = std::convert::Infallible;
    type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _request: http::Request<Vec<u8>>) -> Self::Future {
        std::future::ready(Ok(http::Response::builder()
            .status(self.status)
            .header("content-length", "42")
            .body(())
            .unwrap()))
    }
}

#[test]
fn test_network_capture_records_request_attributes() {
    let transport = TestTransport::new();
    let client = client_with_transport(
        transport.clone(),
        CollectorOptions {
            enable_network_capture: true,
            ignore_urls: vec!["/health".into()],
            ..quiet_worker()
        },
    );

    // double layering must not double-capture
    let mut service = HttpCaptureLayer::new().layer(HttpCaptureLayer::new().layer(MockService {
        status: 200,
    }));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    let request = http::Request::builder()
        .method("GET")
        .uri("https://api.example.com/users")
        .body(Vec::new())
        .unwrap();
    runtime.block_on(service.call(request)).unwrap();

    let ignored = http::Request::builder()
        .method("GET")
        .uri("https://api.example.com/health")
        .body(Vec::new())
        .unwrap();
    runtime.block_on(service.call(ignored)).unwrap();

    client.flush();
    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    let entry = &batches[0][0];
    assert_eq!(entry.level, Level::Info);
    assert_eq!(entry.request_method.as_deref(), Some("GET"));
    assert_eq!(
        entry.request_url.as_deref(),
        Some("https://api.example.com/users")
    );
    assert_eq!(entry.status_code, Some(200));
    assert_eq!(entry.response_size, Some(42));
    assert!(entry.duration_ms.is_some());
    let crumbs = entry.breadcrumbs.as_ref().unwrap();
    assert!(crumbs.iter().any(|crumb| crumb.ty == BreadcrumbType::Xhr));
    client.close();
}

#[test]
fn test_interaction_debounce_collapses_a_click_burst() {
    let transport = TestTransport::new();
    let client = client_with_transport(
        transport.clone(),
        CollectorOptions {
            enable_interaction_capture: true,
            interaction_debounce: Duration::from_millis(50),
            ..quiet_worker()
        },
    );
    let interaction = client.interaction().unwrap();

    for i in 0..3 {
        interaction.record_click(
            ElementInfo {
                tag_name: Some("button".into()),
                id: Some(format!("submit-{i}")),
                text_content: Some("Pay now".repeat(40)),
                ..Default::default()
            },
            Coords {
                x: f64::from(i),
                y: 2.0,
            },
        );
    }
    std::thread::sleep(Duration::from_millis(400));
    client.flush();

    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1, "the burst collapsed into one record");
    let entry = &batches[0][0];
    assert_eq!(entry.level, Level::Info);
    let context = entry.context.as_ref().unwrap();
    assert_eq!(context["element"]["id"], serde_json::json!("submit-2"));
    assert_eq!(context["coords"]["x"], serde_json::json!(2.0));
    let text = context["element"]["textContent"].as_str().unwrap();
    assert!(text.chars().count() <= 100);
    client.close();
}

#[test]
fn test_input_events_leave_breadcrumbs_only() {
    let transport = TestTransport::new();
    let client = client_with_transport(
        transport.clone(),
        CollectorOptions {
            enable_interaction_capture: true,
            ..quiet_worker()
        },
    );
    let interaction = client.interaction().unwrap();
    interaction.record_input(ElementInfo {
        tag_name: Some("input".into()),
        id: Some("card-number".into()),
        ..Default::default()
    });
    client.info("after typing", None);
    client.flush();

    let batches = transport.batches();
    assert_eq!(batches[0].len(), 1, "the input itself produced no record");
    let crumbs = batches[0][0].breadcrumbs.as_ref().unwrap();
    let input_crumb = crumbs
        .iter()
        .find(|crumb| crumb.message.starts_with("input"))
        .unwrap();
    // never the value, only the element identity
    assert_eq!(
        input_crumb.data.as_ref().unwrap()["id"],
        serde_json::json!("card-number")
    );
    client.close();
}

#[derive(Default)]
struct RecordingRouter {
    visited: Mutex<Vec<String>>,
}

impl Navigator for RecordingRouter {
    fn push_state(&self, url: &str) {
        self.visited.lock().unwrap().push(format!("push {url}"));
    }

    fn replace_state(&self, url: &str) {
        self.visited.lock().unwrap().push(format!("replace {url}"));
    }
}

#[test]
fn test_navigation_wrapper_emits_then_delegates_unchanged() {
    let transport = TestTransport::new();
    let client = client_with_transport(
        transport.clone(),
        CollectorOptions {
            enable_navigation_capture: true,
            ..quiet_worker()
        },
    );
    let navigation = client.navigation().unwrap();
    let router = Arc::new(RecordingRouter::default());
    navigation.wrap(router.clone());

    navigation.page_load("/");
    navigation.push_state("/checkout");
    navigation.replace_state("/checkout?step=2");
    client.flush();

    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    let messages: Vec<_> = batches[0].iter().map(|e| e.message.clone()).collect();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("page load"));
    assert!(messages[1].contains("pushState"));
    assert!(messages[2].contains("replaceState"));

    client.close();
    // after teardown the router still receives every call
    navigation.push_state("/after-close");
    let visited = router.visited.lock().unwrap().clone();
    assert_eq!(
        visited,
        vec![
            "push /checkout".to_string(),
            "replace /checkout?step=2".to_string(),
            "push /after-close".to_string(),
        ]
    );
    assert_eq!(transport.batches().len(), 1);
}
