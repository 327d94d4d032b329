//! Tests for the `tracing` output of [`TracingLogger`].

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use invocation_shell::{InvocationShell, LogInfo, Logger, TracingLogger};
use proptest::prelude::*;
use tracing::field::Visit;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::SubscriberExt;

type Captured = Arc<Mutex<Vec<(Level, HashMap<String, String>)>>>;

#[derive(Debug, Default)]
struct FieldCapture {
    fields: HashMap<String, String>,
}

impl Visit for FieldCapture {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields.insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }
}

/// Captures the level and fields of every event.
struct EventCaptureLayer {
    events: Captured,
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for EventCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut capture = FieldCapture::default();
        event.record(&mut capture);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), capture.fields));
    }
}

fn capturing_subscriber() -> (impl Subscriber + Send + Sync, Captured) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let layer = EventCaptureLayer {
        events: events.clone(),
    };
    (tracing_subscriber::registry().with(layer), events)
}

#[test]
fn test_tracing_logger_emits_structured_fields() {
    let (subscriber, events) = capturing_subscriber();
    let info = LogInfo::new("inv-1")
        .with_trace_id(Some("Root=1-abc"))
        .with_outcome("Completed")
        .with_extra("duration_ms", 12);

    tracing::subscriber::with_default(subscriber, || {
        TracingLogger.warn("Invocation completed", &info);
    });

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    let (level, fields) = &events[0];
    assert_eq!(*level, Level::WARN);
    assert_eq!(fields["message"], "Invocation completed");
    assert_eq!(fields["invocation_id"], "inv-1");
    assert_eq!(fields["trace_id"], "Root=1-abc");
    assert_eq!(fields["outcome"], "Completed");
    assert_eq!(fields["input"], "");
    assert_eq!(fields["extra"], "duration_ms=12");
}

#[tokio::test]
async fn test_shell_logs_receipt_and_completion_through_tracing() {
    let (subscriber, events) = capturing_subscriber();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (handler, _) = OpHandler::new();
    let shell = InvocationShell::new(handler);
    shell
        .invoke(br#"{"op": "echo", "value": 42}"#, platform(Duration::from_secs(1)))
        .await;

    let events = events.lock().unwrap();
    let shell_events: Vec<_> = events
        .iter()
        .filter(|(_, fields)| {
            fields.get("invocation_id").map(String::as_str) == Some(TEST_INVOCATION_ID)
        })
        .collect();
    assert_eq!(shell_events.len(), 2);

    let (level, received) = shell_events[0];
    assert_eq!(*level, Level::INFO);
    assert_eq!(received["message"], "Invocation received");
    assert_eq!(received["input"], r#"{"op": "echo", "value": 42}"#);

    let (level, completed) = shell_events[1];
    assert_eq!(*level, Level::INFO);
    assert_eq!(completed["message"], "Invocation completed");
    assert_eq!(completed["outcome"], "Completed");
    assert!(completed["extra"].contains("duration_ms="));
}

fn extra_fields_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-zA-Z][a-zA-Z0-9_]{0,15}", "[a-zA-Z0-9_\\-\\.]{1,32}"), 0..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Every extra pair reaches the event as `key=value`.
    #[test]
    fn prop_extra_fields_pass_through(
        message in "[a-zA-Z0-9 ]{1,50}",
        extra in extra_fields_strategy(),
    ) {
        let (subscriber, events) = capturing_subscriber();
        let mut info = LogInfo::new("inv-prop");
        for (key, value) in &extra {
            info = info.with_extra(key.clone(), value);
        }

        tracing::subscriber::with_default(subscriber, || {
            TracingLogger.info(&message, &info);
        });

        let events = events.lock().unwrap();
        prop_assert_eq!(events.len(), 1);
        let rendered = &events[0].1["extra"];
        for (key, value) in &extra {
            let pair = format!("{}={}", key, value);
            prop_assert!(rendered.contains(&pair), "missing {} in {}", pair, rendered);
        }
        if extra.is_empty() {
            prop_assert!(rendered.is_empty());
        }
    }
}
