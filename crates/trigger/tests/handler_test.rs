//! End-to-end trigger behaviour against the in-memory orchestrator.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};

use waker_core::{ControlError, ServiceDescriptor, TimeWindowPolicy, WakerConfig};
use waker_ecs::memory::{ApiOperation, InMemoryOrchestrator};
use waker_ecs::RetryPolicy;
use waker_trigger::event::MAX_DECODED_BYTES;
use waker_trigger::{Clock, TriggerHandler, TriggerOutcome};

const HOSTNAME: &str = "minecraft.example.com";

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn at_hour(hour: u32) -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, hour, 15, 0).unwrap())
}

fn config() -> WakerConfig {
    WakerConfig {
        cluster: "minecraft".into(),
        service: "minecraft-server".into(),
        monitored_hostname: Some(HOSTNAME.into()),
        allowed_hours: TimeWindowPolicy::default(),
        ..WakerConfig::default()
    }
}

fn descriptor() -> ServiceDescriptor {
    ServiceDescriptor::new("minecraft", "minecraft-server")
}

fn trigger(
    api: InMemoryOrchestrator,
    hour: u32,
) -> (Arc<InMemoryOrchestrator>, TriggerHandler<Arc<InMemoryOrchestrator>, FixedClock>) {
    let api = Arc::new(api);
    let handler = TriggerHandler::new(&config(), api.clone())
        .with_clock(at_hour(hour))
        .with_retry(RetryPolicy::immediate(3));
    (api, handler)
}

fn stopped() -> InMemoryOrchestrator {
    InMemoryOrchestrator::new().with_service("minecraft", "minecraft-server", 0)
}

fn dns_query_event(names: &[&str]) -> Value {
    let events: Vec<Value> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "id": format!("3650{i}"),
                "timestamp": 1_717_236_900_000i64,
                "message": format!("1.0 2024-06-01T10:15:00Z Z0123 {name} A NOERROR UDP IAD89-C1 203.0.113.7 -"),
            })
        })
        .collect();
    let doc = json!({
        "messageType": "DATA_MESSAGE",
        "owner": "123456789012",
        "logGroup": "/aws/route53/example.com",
        "logStream": "Z0123/IAD89-C1",
        "subscriptionFilters": ["minecraft"],
        "logEvents": events,
    });

    awslogs_envelope(doc.to_string().as_bytes())
}

fn awslogs_envelope(body: &[u8]) -> Value {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    let data = base64::engine::general_purpose::STANDARD.encode(encoder.finish().unwrap());
    json!({"awslogs": {"data": data}})
}

#[tokio::test]
async fn stopped_service_is_activated_in_hours() {
    let (api, handler) = trigger(stopped(), 10);

    let outcome = handler.handle(&dns_query_event(&[HOSTNAME])).await;

    assert_eq!(
        outcome,
        TriggerOutcome::Activated {
            service: "minecraft/minecraft-server".into()
        }
    );
    assert_eq!(api.update_calls(), 1);
    let updates = api.updates();
    assert_eq!(updates[0].0, descriptor());
    assert_eq!(updates[0].1.desired_count, Some(1));
    assert_eq!(api.desired_count(&descriptor()), Some(1));
}

#[tokio::test]
async fn running_service_is_left_alone() {
    let api = InMemoryOrchestrator::new().with_service("minecraft", "minecraft-server", 1);
    let (api, handler) = trigger(api, 10);

    let outcome = handler.handle(&dns_query_event(&[HOSTNAME])).await;

    assert!(matches!(outcome, TriggerOutcome::NoOp { .. }));
    assert_eq!(api.update_calls(), 0);
    assert_eq!(api.desired_count(&descriptor()), Some(1));
}

#[tokio::test]
async fn repeated_delivery_activates_once() {
    let (api, handler) = trigger(stopped(), 12);
    let event = dns_query_event(&[HOSTNAME]);

    let first = handler.handle(&event).await;
    let second = handler.handle(&event).await;

    assert!(matches!(first, TriggerOutcome::Activated { .. }));
    assert!(matches!(second, TriggerOutcome::NoOp { .. }));
    assert_eq!(api.update_calls(), 1);
}

#[tokio::test]
async fn outside_window_makes_no_calls() {
    let (api, handler) = trigger(stopped(), 3);

    let outcome = handler.handle(&dns_query_event(&[HOSTNAME])).await;

    assert!(matches!(outcome, TriggerOutcome::GateDenied { .. }));
    assert_eq!(api.total_calls(), 0);
    assert_eq!(api.desired_count(&descriptor()), Some(0));
}

#[tokio::test]
async fn window_edges_are_inclusive() {
    let (api, handler) = trigger(stopped(), 22);
    let outcome = handler.handle(&json!({})).await;
    assert!(matches!(outcome, TriggerOutcome::Activated { .. }));
    assert_eq!(api.update_calls(), 1);

    let (api, handler) = trigger(stopped(), 23);
    let outcome = handler.handle(&json!({})).await;
    assert!(matches!(outcome, TriggerOutcome::GateDenied { .. }));
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn malformed_payload_is_a_no_op() {
    let (api, handler) = trigger(stopped(), 10);
    let not_gzip = base64::engine::general_purpose::STANDARD.encode(b"definitely not gzip");

    let outcome = handler.handle(&json!({"awslogs": {"data": not_gzip}})).await;

    assert!(matches!(outcome, TriggerOutcome::MalformedEvent { .. }));
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn raw_bytes_that_are_not_json_are_malformed() {
    let (api, handler) = trigger(stopped(), 10);

    let outcome = handler.handle_bytes(b"{\"awslogs\":").await;

    assert!(matches!(outcome, TriggerOutcome::MalformedEvent { .. }));
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn empty_payloads_are_no_ops() {
    let (api, handler) = trigger(stopped(), 10);

    assert!(matches!(handler.handle(&Value::Null).await, TriggerOutcome::NoOp { .. }));
    assert!(matches!(handler.handle_bytes(b"").await, TriggerOutcome::NoOp { .. }));
    assert!(matches!(handler.handle(&dns_query_event(&[])).await, TriggerOutcome::NoOp { .. }));
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn queries_for_other_hosts_are_ignored() {
    let (api, handler) = trigger(stopped(), 10);

    let outcome = handler.handle(&dns_query_event(&["valheim.example.com"])).await;

    assert!(matches!(outcome, TriggerOutcome::NoOp { .. }));
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn missing_service_fails() {
    let (api, handler) = trigger(InMemoryOrchestrator::new(), 10);

    let outcome = handler.handle(&dns_query_event(&[HOSTNAME])).await;

    let TriggerOutcome::Failed { error } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(error.contains("minecraft/minecraft-server"));
    assert_eq!(api.describe_calls(), 1);
    assert_eq!(api.update_calls(), 0);
}

#[tokio::test]
async fn draining_service_is_not_found() {
    let api = stopped();
    api.set_status(&descriptor(), "DRAINING");
    let (api, handler) = trigger(api, 10);

    let outcome = handler.handle(&dns_query_event(&[HOSTNAME])).await;

    assert!(matches!(outcome, TriggerOutcome::Failed { .. }));
    assert_eq!(api.update_calls(), 0);
}

#[tokio::test]
async fn transient_describe_fault_is_retried() {
    let (api, handler) = trigger(stopped(), 10);
    api.inject_fault(ApiOperation::Describe, ControlError::Transient("throttled".into()));

    let outcome = handler.handle(&dns_query_event(&[HOSTNAME])).await;

    assert!(matches!(outcome, TriggerOutcome::Activated { .. }));
    // failed read, retried read, fresh read before the update
    assert_eq!(api.describe_calls(), 3);
    assert_eq!(api.update_calls(), 1);
}

#[tokio::test]
async fn permission_fault_is_not_retried() {
    let (api, handler) = trigger(stopped(), 10);
    api.inject_fault(ApiOperation::Update, ControlError::Permission("AccessDenied".into()));

    let outcome = handler.handle(&dns_query_event(&[HOSTNAME])).await;

    assert!(matches!(outcome, TriggerOutcome::Failed { .. }));
    assert_eq!(api.update_calls(), 1);
    assert_eq!(api.desired_count(&descriptor()), Some(0));
}

#[tokio::test]
async fn oversized_log_batch_is_malformed() {
    let (api, handler) = trigger(stopped(), 10);
    let payload = awslogs_envelope(&vec![b' '; MAX_DECODED_BYTES as usize + 1]);

    let outcome = handler.handle(&payload).await;

    let TriggerOutcome::MalformedEvent { error } = outcome else {
        panic!("expected malformed event, got {outcome:?}");
    };
    assert!(error.contains("exceeds"));
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn lost_update_response_still_reports_activation() {
    let (api, handler) = trigger(stopped(), 10);
    api.inject_lost_response(ControlError::Transient("response timed out".into()));

    let outcome = handler.handle(&dns_query_event(&[HOSTNAME])).await;

    assert_eq!(
        outcome,
        TriggerOutcome::Activated {
            service: "minecraft/minecraft-server".into()
        }
    );
    assert_eq!(api.update_calls(), 1);
    assert_eq!(api.desired_count(&descriptor()), Some(1));
}

#[tokio::test]
async fn invocation_is_abandoned_after_timeout() {
    let api = stopped().with_latency(Duration::from_millis(500));
    let (api, handler) = trigger(api, 10);
    let raw = dns_query_event(&[HOSTNAME]).to_string();

    let result = handler
        .handle_bytes_within(raw.as_bytes(), Duration::from_millis(20))
        .await;

    assert!(result.is_err());
    assert_eq!(api.update_calls(), 0);
    assert_eq!(api.desired_count(&descriptor()), Some(0));
}

#[tokio::test]
async fn invocation_within_timeout_reports_outcome() {
    let api = stopped().with_latency(Duration::from_millis(5));
    let (api, handler) = trigger(api, 10);
    let raw = dns_query_event(&[HOSTNAME]).to_string();

    let outcome = handler
        .handle_bytes_within(raw.as_bytes(), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(matches!(outcome, TriggerOutcome::Activated { .. }));
    assert_eq!(api.update_calls(), 1);
}
