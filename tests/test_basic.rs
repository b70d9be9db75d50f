use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use logbeam::test::{client_with_transport, test_options, with_captured_batches_options, TestTransport};
use logbeam::{Breadcrumb, CollectorOptions, Level, Map, Value};

fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    panic!("condition not reached within 5s");
}

#[test]
fn test_happy_path_batches_two_records_in_one_post() {
    let successes = Arc::new(AtomicUsize::new(0));
    let successes_cb = successes.clone();
    let transport = TestTransport::new();
    let client = client_with_transport(
        transport.clone(),
        CollectorOptions {
            batch_size: 2,
            batch_interval: Duration::from_secs(60),
            on_send_success: Some(Arc::new(move |entries| {
                assert_eq!(entries.len(), 2);
                successes_cb.fetch_add(1, Ordering::SeqCst);
            })),
            ..test_options()
        },
    );

    client.info("a", None);
    client.info("b", None);

    // reaching the batch size triggered the flush without waiting for
    // the timer
    wait_for(|| transport.post_count() >= 1);
    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    let messages: Vec<_> = batches[0].iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["a", "b"]);
    assert_eq!(batches[0][0].level, Level::Info);
    assert_eq!(batches[0][0].service, "frontend-app");
    assert!(batches[0][0].id.is_some());
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    client.close();
}

#[test]
fn test_level_gate_drops_lower_ranked_records() {
    let batches = with_captured_batches_options(
        |client| {
            client.info("dropped", None);
            client.debug("dropped", None);
            client.error("kept", None);
            client.flush();
        },
        CollectorOptions {
            log_level: Level::Warn,
            ..test_options()
        },
    );
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].message, "kept");
}

#[test]
fn test_zero_sampling_rate_drops_everything() {
    let batches = with_captured_batches_options(
        |client| {
            for _ in 0..50 {
                client.info("sampled out", None);
            }
            client.warn("kept", None);
            client.flush();
        },
        CollectorOptions {
            sampling_rates: [(Level::Info, 0.0)].into_iter().collect(),
            ..test_options()
        },
    );
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].message, "kept");
}

#[test]
fn test_masking_applies_recursively() {
    let mut context = Map::new();
    context.insert("password".into(), Value::from("p"));
    context.insert(
        "nested".into(),
        serde_json::json!({ "token": "t", "keep": "k" }),
    );

    let batches = with_captured_batches_options(
        |client| {
            client.info("x", Some(context.clone()));
            client.flush();
        },
        CollectorOptions {
            mask_fields: vec!["password".into(), "token".into()],
            ..test_options()
        },
    );
    let entry = &batches[0][0];
    let masked = entry.context.as_ref().unwrap();
    assert_eq!(masked["password"], Value::from("********"));
    assert_eq!(masked["nested"]["token"], Value::from("********"));
    assert_eq!(masked["nested"]["keep"], Value::from("k"));
    assert_eq!(entry.message, "x");
}

#[test]
fn test_before_send_can_drop_and_rewrite() {
    let batches = with_captured_batches_options(
        |client| {
            client.info("drop me", None);
            client.info("keep me", None);
            client.flush();
        },
        CollectorOptions {
            before_send: Some(Arc::new(|mut entry| {
                if entry.message.starts_with("drop") {
                    return None;
                }
                entry.message = format!("[app] {}", entry.message);
                Some(entry)
            })),
            ..test_options()
        },
    );
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].message, "[app] keep me");
}

#[test]
fn test_breadcrumbs_are_snapshotted_into_records() {
    let batches = with_captured_batches_options(
        |client| {
            for i in 0..5 {
                client.add_breadcrumb(Breadcrumb {
                    message: format!("b{i}"),
                    ..Default::default()
                });
            }
            client.info("with crumbs", None);
            client.add_breadcrumb(Breadcrumb {
                message: "too late".into(),
                ..Default::default()
            });
            client.flush();
        },
        CollectorOptions {
            max_breadcrumbs: 3,
            ..test_options()
        },
    );
    let crumbs = batches[0][0].breadcrumbs.as_ref().unwrap();
    let messages: Vec<_> = crumbs.iter().map(|b| b.message.as_str()).collect();
    // capacity 3, FIFO, and the post-capture crumb is absent
    assert_eq!(messages, vec!["b2", "b3", "b4"]);
}

#[test]
fn test_global_and_user_context_providers_snapshot_per_event() {
    let counter = Arc::new(AtomicUsize::new(0));
    let provider_counter = counter.clone();
    let batches = with_captured_batches_options(
        |client| {
            client.info("one", None);
            client.info("two", None);
            client.flush();
        },
        CollectorOptions {
            global_context: Some(Arc::new(move || {
                let n = provider_counter.fetch_add(1, Ordering::SeqCst);
                let mut map = Map::new();
                map.insert("n".into(), Value::from(n as u64));
                map
            })),
            user_context: Some(Arc::new(|| {
                let mut map = Map::new();
                map.insert("plan".into(), Value::from("pro"));
                map
            })),
            ..test_options()
        },
    );
    let entries = &batches[0];
    assert_eq!(entries[0].global_context["n"], Value::from(0u64));
    assert_eq!(entries[1].global_context["n"], Value::from(1u64));
    assert_eq!(entries[0].user_context.as_ref().unwrap()["plan"], Value::from("pro"));
}

#[test]
fn test_capture_error_extracts_name_and_chain() {
    let parse_error = "zz".parse::<u32>().unwrap_err();
    let batches = with_captured_batches_options(
        |client| {
            client.capture_error(&parse_error, None);
            client.flush();
        },
        test_options(),
    );
    let entry = &batches[0][0];
    assert_eq!(entry.level, Level::Error);
    assert_eq!(entry.error_name.as_deref(), Some("ParseIntError"));
    assert!(entry.reason.is_some());
}

#[test]
fn test_ignore_errors_suppresses_capture_error() {
    let parse_error = "zz".parse::<u32>().unwrap_err();
    let batches = with_captured_batches_options(
        |client| {
            client.capture_error(&parse_error, None);
            client.flush();
        },
        CollectorOptions {
            ignore_errors: vec!["invalid digit".into()],
            ..test_options()
        },
    );
    assert!(batches.is_empty());
}

#[test]
fn test_update_config_swaps_the_snapshot() {
    let transport = TestTransport::new();
    let client = client_with_transport(transport, test_options());
    assert_eq!(client.options().log_level, Level::Trace);

    client.update_config(|options| {
        options.log_level = Level::Error;
        options.batch_interval = Duration::from_millis(50);
        options.max_logs_per_minute = 7;
    });
    let options = client.options();
    assert_eq!(options.log_level, Level::Error);
    assert_eq!(options.batch_interval, Duration::from_millis(50));
    assert_eq!(options.max_logs_per_minute, 7);
    client.close();
}

#[test]
fn test_close_is_idempotent() {
    let transport = TestTransport::new();
    let client = client_with_transport(transport, test_options());
    client.info("x", None);
    client.close();
    client.close();
}
