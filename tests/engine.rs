//! End-to-end engine behavior over the loopback transport.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use devtools_client::transport::channel::{self, RemoteEnd};
use devtools_client::{
    ClientEngine, Command, Diagnostic, Error, EventPayload, RawCommand, Result, SessionState,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Fixtures
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine() -> (ClientEngine, RemoteEnd) {
    init_tracing();
    let (sink, source, remote) = channel::pair();
    (ClientEngine::builder().start(sink, source), remote)
}

/// Reads the next command frame and returns its id.
async fn next_id(remote: &mut RemoteEnd) -> u64 {
    let frame = remote.next_sent().await.expect("command frame");
    let value: Value = serde_json::from_str(&frame).expect("valid JSON");
    value["id"].as_u64().expect("integer id")
}

#[derive(Debug, Serialize)]
struct Evaluate {
    a: i64,
    b: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct EvaluateResult {
    ok: bool,
    echo: String,
}

impl Command for Evaluate {
    type Response = EvaluateResult;

    fn method(&self) -> &str {
        "Runtime.evaluate"
    }

    fn validate(&self) -> Result<()> {
        if self.b.is_empty() {
            return Err(Error::missing_field("b"));
        }
        Ok(())
    }

    fn params(&self) -> Result<Value> {
        devtools_client::protocol::serialize_params(self)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWillBeSent {
    request_id: String,
}

impl EventPayload for RequestWillBeSent {
    const METHOD: &'static str = "Network.requestWillBeSent";
}

// ============================================================================
// Responses
// ============================================================================

#[tokio::test]
async fn round_trip_typed_result() -> anyhow::Result<()> {
    let (engine, mut remote) = engine();

    let completion = engine
        .invoke(&Evaluate {
            a: 1,
            b: "x".into(),
        })
        .await?;

    let frame = remote.next_sent().await.context("no frame sent")?;
    let sent: Value = serde_json::from_str(&frame)?;
    assert_eq!(sent["method"], "Runtime.evaluate");
    assert_eq!(sent["params"], json!({"a": 1, "b": "x"}));

    let id = sent["id"].as_u64().context("id is not an integer")?;
    let result = json!({"ok": true, "echo": "x"});
    remote.push(json!({"id": id, "result": result}).to_string());

    let direct: EvaluateResult = serde_json::from_value(result)?;
    assert_eq!(completion.await?, direct);
    Ok(())
}

#[tokio::test]
async fn success_response_resolves_completion() {
    let (engine, mut remote) = engine();

    let completion = engine
        .invoke(&RawCommand::new("Page.enable", json!({})))
        .await
        .expect("invoke");
    let id = next_id(&mut remote).await;

    remote.push(format!(r#"{{"id":{id},"result":{{"ok":true}}}}"#));
    assert_eq!(completion.await.expect("success"), json!({"ok": true}));
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn error_response_resolves_protocol_error() {
    let (engine, mut remote) = engine();

    let completion = engine
        .invoke(&RawCommand::new("Target.attachToTarget", json!({"targetId": "T"})))
        .await
        .expect("invoke");
    let id = next_id(&mut remote).await;

    remote.push(format!(
        r#"{{"id":{id},"error":{{"code":-32000,"message":"No target"}}}}"#
    ));

    match completion.await {
        Err(Error::Protocol { code, message, .. }) => {
            assert_eq!(code, -32000);
            assert_eq!(message, "No target");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn responses_out_of_order_reach_their_callers() {
    let (engine, mut remote) = engine();

    let first = engine
        .invoke(&RawCommand::new("A.first", json!({})))
        .await
        .expect("invoke");
    let second = engine
        .invoke(&RawCommand::new("A.second", json!({})))
        .await
        .expect("invoke");
    let first_id = next_id(&mut remote).await;
    let second_id = next_id(&mut remote).await;

    remote.push(json!({"id": second_id, "result": {"n": 2}}).to_string());
    remote.push(json!({"id": first_id, "result": {"n": 1}}).to_string());

    assert_eq!(first.await.expect("first"), json!({"n": 1}));
    assert_eq!(second.await.expect("second"), json!({"n": 2}));
}

#[tokio::test]
async fn malformed_result_fails_only_that_caller() {
    let (engine, mut remote) = engine();

    let completion = engine
        .invoke(&Evaluate {
            a: 2,
            b: "y".into(),
        })
        .await
        .expect("invoke");
    let id = next_id(&mut remote).await;

    remote.push(json!({"id": id, "result": {"unexpected": true}}).to_string());
    assert!(matches!(completion.await, Err(Error::Decode { .. })));
    assert!(engine.is_running());
}

#[tokio::test]
async fn duplicate_and_unknown_responses_are_reported() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);

    let (sink, source, mut remote) = channel::pair();
    let engine = ClientEngine::builder()
        .on_diagnostic(move |d| seen_clone.lock().push(d.clone()))
        .start(sink, source);

    let completion = engine
        .invoke(&RawCommand::new("A.b", json!({})))
        .await
        .expect("invoke");
    let id = next_id(&mut remote).await;

    remote.push(json!({"id": id, "result": {"n": 1}}).to_string());
    remote.push(json!({"id": id, "result": {"n": 2}}).to_string());
    remote.push("not json");

    assert_eq!(completion.await.expect("first wins"), json!({"n": 1}));

    // A round trip guarantees the earlier frames were processed.
    let barrier = engine
        .invoke(&RawCommand::new("A.barrier", json!({})))
        .await
        .expect("invoke");
    let barrier_id = next_id(&mut remote).await;
    remote.push(json!({"id": barrier_id, "result": {}}).to_string());
    barrier.await.expect("barrier");

    let seen = seen.lock();
    assert!(seen.contains(&Diagnostic::UnknownCorrelation { id: id.into() }));
    assert!(
        seen.iter()
            .any(|d| matches!(d, Diagnostic::MalformedFrame { raw, .. } if raw == "not json"))
    );

    let stats = engine.stats();
    assert_eq!(stats.unknown_correlations, 1);
    assert_eq!(stats.malformed_frames, 1);
    assert_eq!(stats.responses_resolved, 2);
    assert_eq!(stats.commands_sent, 2);
}

// ============================================================================
// Validation and sending
// ============================================================================

#[tokio::test]
async fn validation_error_is_immediate() {
    let (engine, mut remote) = engine();

    let err = engine
        .invoke(&Evaluate {
            a: 1,
            b: String::new(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation { ref field, .. } if field == "b"));
    assert!(remote.try_next_sent().is_none());
}

#[tokio::test]
async fn concurrent_callers_get_unique_ids() {
    let (engine, mut remote) = engine();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .invoke(&RawCommand::new("A.b", json!({"i": i})))
                    .await
                    .expect("invoke")
            })
        })
        .collect();

    let mut completions = Vec::new();
    for task in tasks {
        completions.push(task.await.expect("join"));
    }

    let mut ids = Vec::new();
    for _ in 0..32 {
        let frame = remote.next_sent().await.expect("frame");
        let value: Value = serde_json::from_str(&frame).expect("json");
        ids.push(value["id"].as_u64().expect("id"));
    }
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 32);

    for id in &ids {
        remote.push(json!({"id": id, "result": {"id": id}}).to_string());
    }
    for completion in completions {
        let id = completion.id().as_u64();
        assert_eq!(completion.await.expect("result"), json!({"id": id}));
    }
}

#[tokio::test]
async fn single_caller_order_is_preserved_on_the_wire() {
    let (engine, mut remote) = engine();

    let mut completions = Vec::new();
    for i in 0..5 {
        completions.push(
            engine
                .invoke(&RawCommand::new("A.step", json!({"i": i})))
                .await
                .expect("invoke"),
        );
    }

    for i in 0..5 {
        let frame = remote.next_sent().await.expect("frame");
        let value: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["params"]["i"], i);
    }
}

#[tokio::test]
async fn execute_times_out_and_late_response_is_harmless() {
    let (engine, mut remote) = engine();

    let err = engine
        .execute_with_timeout(
            &RawCommand::new("Page.reload", json!({})),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let id = next_id(&mut remote).await;
    remote.push(json!({"id": id, "result": {}}).to_string());

    let value = {
        let completion = engine
            .invoke(&RawCommand::new("A.after", json!({})))
            .await
            .expect("invoke");
        let next = next_id(&mut remote).await;
        remote.push(json!({"id": next, "result": {"alive": true}}).to_string());
        completion.await.expect("engine still works")
    };
    assert_eq!(value, json!({"alive": true}));
    assert_eq!(engine.stats().unknown_correlations, 1);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn subscribers_fire_in_registration_order() {
    let (engine, remote) = engine();
    let calls = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second"] {
        let calls = Arc::clone(&calls);
        engine.subscribe("Network.requestWillBeSent", move |event| {
            calls.lock().push((name, event.params.clone()));
            Ok(())
        });
    }

    let mut stream = engine.listen("Network.requestWillBeSent");
    remote.push(r#"{"method":"Network.requestWillBeSent","params":{"requestId":"R1"}}"#);
    stream.next().await.expect("event delivered");

    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "first");
    assert_eq!(calls[1].0, "second");
    assert_eq!(calls[0].1, json!({"requestId": "R1"}));
    assert_eq!(calls[0].1, calls[1].1);
}

#[tokio::test]
async fn failing_subscriber_does_not_stop_delivery() {
    let (engine, remote) = engine();

    engine.subscribe("Page.loadEventFired", |_| Err("subscriber bug".into()));
    engine.subscribe("Page.loadEventFired", |_| panic!("subscriber panic"));
    let mut stream = engine.listen("Page.loadEventFired");

    remote.push(r#"{"method":"Page.loadEventFired","params":{"timestamp":1}}"#);
    remote.push(r#"{"method":"Page.loadEventFired","params":{"timestamp":2}}"#);

    assert_eq!(stream.next().await.expect("first").params["timestamp"], 1);
    assert_eq!(stream.next().await.expect("second").params["timestamp"], 2);
    assert_eq!(engine.stats().callback_failures, 4);
    assert!(engine.is_running());
}

#[tokio::test]
async fn typed_subscription_and_unsubscribe() {
    let (engine, remote) = engine();
    let ids = Arc::new(Mutex::new(Vec::new()));

    let ids_clone = Arc::clone(&ids);
    let handle = engine.subscribe_to(move |e: RequestWillBeSent| ids_clone.lock().push(e.request_id));
    let mut stream = engine.listen(RequestWillBeSent::METHOD);

    remote.push(r#"{"method":"Network.requestWillBeSent","params":{"requestId":"R1"}}"#);
    stream.next().await.expect("first");

    assert!(engine.unsubscribe(&handle));
    remote.push(r#"{"method":"Network.requestWillBeSent","params":{"requestId":"R2"}}"#);
    stream.next().await.expect("second");

    assert_eq!(*ids.lock(), vec!["R1".to_string()]);
}

#[tokio::test]
async fn events_carry_session_id() {
    let (engine, remote) = engine();
    let mut stream = engine.listen("Runtime.consoleAPICalled");

    remote.push(r#"{"method":"Runtime.consoleAPICalled","params":{},"sessionId":"S9"}"#);

    let event = stream.next().await.expect("event");
    assert_eq!(event.session_id.as_deref(), Some("S9"));
    assert_eq!(event.domain(), "Runtime");
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn transport_close_fails_all_pending() {
    let (engine, mut remote) = engine();
    let closed_with = Arc::new(Mutex::new(None));

    let closed_clone = Arc::clone(&closed_with);
    engine.on_closed(move |cause| *closed_clone.lock() = Some(cause.to_string()));
    let mut stream = engine.listen("Page.frameNavigated");

    let mut completions = Vec::new();
    for i in 0..3 {
        completions.push(
            engine
                .invoke(&RawCommand::new("A.b", json!({"i": i})))
                .await
                .expect("invoke"),
        );
        next_id(&mut remote).await;
    }

    remote.close("socket reset");

    for completion in completions {
        match completion.await {
            Err(Error::TransportClosed { cause }) => assert_eq!(cause, "socket reset"),
            other => panic!("expected transport closed, got {other:?}"),
        }
    }

    assert_eq!(engine.closed().await, "socket reset");
    assert_eq!(
        engine.state(),
        SessionState::Stopped {
            cause: "socket reset".to_string()
        }
    );
    assert_eq!(closed_with.lock().as_deref(), Some("socket reset"));
    assert!(stream.next().await.is_none());

    // A fourth command after closure fails immediately.
    let err = engine
        .invoke(&RawCommand::new("A.b", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TransportClosed { ref cause } if cause == "socket reset"));
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invokes_racing_close_each_get_one_outcome() {
    const CALLERS: usize = 64;
    const ANSWERED: usize = 10;

    let (engine, mut remote) = engine();

    // Answers the first frames, then closes mid-stream.
    let responder = tokio::spawn(async move {
        let mut answered = 0;
        while let Some(frame) = remote.next_sent().await {
            if answered == ANSWERED {
                remote.close("socket reset");
                break;
            }
            let value: Value = serde_json::from_str(&frame).expect("json");
            remote.push(json!({"id": value["id"], "result": {"n": answered}}).to_string());
            answered += 1;
        }
    });

    let callers: Vec<_> = (0..CALLERS)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                match engine
                    .invoke(&RawCommand::new("A.b", json!({"i": i})))
                    .await
                {
                    Ok(completion) => tokio::time::timeout(Duration::from_secs(5), completion)
                        .await
                        .expect("every completion resolves"),
                    Err(err) => Err(err),
                }
            })
        })
        .collect();

    let mut successes = 0;
    for caller in callers {
        match caller.await.expect("join") {
            Ok(_) => successes += 1,
            Err(Error::Send { .. } | Error::TransportClosed { .. }) => {}
            Err(other) => panic!("unexpected outcome: {other:?}"),
        }
    }

    responder.await.expect("responder");
    assert_eq!(engine.closed().await, "socket reset");
    assert!(successes <= ANSWERED);
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn send_failure_resolves_completion_immediately() {
    let (engine, remote) = engine();
    drop(remote);

    // Either the send fails or the dispatcher already closed the table.
    match engine.invoke(&RawCommand::new("A.b", json!({}))).await {
        Ok(completion) => {
            let err = completion.await.unwrap_err();
            assert!(err.is_connection_error(), "unexpected error: {err:?}");
        }
        Err(err) => assert!(err.is_connection_error(), "unexpected error: {err:?}"),
    }
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn dropping_engine_stops_dispatcher() {
    let (engine, remote) = engine();
    let closed = Arc::new(Mutex::new(None));

    let closed_clone = Arc::clone(&closed);
    engine.on_closed(move |cause| *closed_clone.lock() = Some(cause.to_string()));

    let observer = engine.clone();
    drop(engine);
    assert!(observer.is_running());
    drop(observer);

    for _ in 0..100 {
        if closed.lock().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(closed.lock().as_deref(), Some("client shutdown"));
    assert!(!remote.push("{}"));
}
