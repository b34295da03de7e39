//! End-to-end pipeline tests: scripted broker reader through the runner to a
//! real HTTP endpoint.

use std::sync::atomic::Ordering;
use std::time::Duration;

use anyker_relay::{
    BrokerSource, MemoryReader, MemorySink, Message, ReadStep, RelayConfig, RelayMetrics,
    RelayPolicy, ReqwestSink, Runner, RunnerError, RunnerState, SinkResponse, SourceError,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FAST_POLL: Duration = Duration::from_millis(10);

fn relay_config(origin_filter: &str, endpoint: String) -> RelayConfig {
    RelayConfig {
        origin_filter: origin_filter.to_string(),
        endpoint,
        request_timeout: Duration::from_secs(5),
    }
}

fn record(key: &str, payload: &str, correlation_id: &str) -> ReadStep {
    ReadStep::Message(
        Message::new(key, payload.to_string()).with_header("correlation_id", correlation_id),
    )
}

/// Wait until the runner has finished with `count` messages. Cancelling
/// earlier could abort a request whose response is still in flight.
async fn wait_for_handled(metrics: &RelayMetrics, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while metrics.handled() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("runner did not handle expected messages");
}

#[tokio::test]
async fn test_relays_matching_origin_to_http_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("Authorization", "Bearer secret"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let reader = MemoryReader::new(vec![
        record("telegram:u1", r#"{"text":"hello"}"#, "corr-1"),
        ReadStep::Timeout,
        record("slack:u2", r#"{"text":"ignored"}"#, "corr-2"),
        record("telegram:u3", r#"{"text":"world"}"#, "corr-3"),
    ]);
    let closes = reader.close_count();
    let subscriptions = reader.subscriptions();
    let source = BrokerSource::new(reader, "anyker-topic").with_poll_timeout(FAST_POLL);

    let sink = ReqwestSink::new("secret", Duration::from_secs(5)).unwrap();
    let policy = RelayPolicy::new(
        relay_config("telegram", format!("{}/messages", server.uri())),
        sink,
    );
    let metrics = RelayMetrics::new("pipeline-e2e");
    let runner = Runner::new(source, policy, metrics.clone());
    let state = runner.state();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(runner.run(shutdown.clone()));

    wait_for_handled(&metrics, 3).await;
    shutdown.cancel();

    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("runner did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(summary.forwarded, 2);
    assert_eq!(summary.filtered, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(*state.borrow(), RunnerState::Stopped);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(*subscriptions.lock().unwrap(), vec!["anyker-topic".to_string()]);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].body, br#"{"text":"hello"}"#.to_vec());
    assert_eq!(received[1].body, br#"{"text":"world"}"#.to_vec());
    assert_eq!(
        received[0].headers.get("X-Correlation-ID").unwrap().to_str().unwrap(),
        "corr-1"
    );
    assert_eq!(
        received[1].headers.get("X-Correlation-ID").unwrap().to_str().unwrap(),
        "corr-3"
    );
}

#[tokio::test]
async fn test_downstream_errors_do_not_stop_the_relay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let reader = MemoryReader::new(vec![record("a:1", "first", "c1"), record("a:2", "second", "c2")]);
    let source = BrokerSource::new(reader, "t").with_poll_timeout(FAST_POLL);
    let sink = ReqwestSink::new("", Duration::from_secs(5)).unwrap();
    let policy = RelayPolicy::new(relay_config("", server.uri()), sink);
    let metrics = RelayMetrics::new("pipeline-errors");
    let runner = Runner::new(source, policy, metrics.clone());

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(runner.run(shutdown.clone()));

    wait_for_handled(&metrics, 2).await;
    shutdown.cancel();

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.forwarded, 1);
}

#[tokio::test]
async fn test_read_failure_forwards_earlier_messages_then_fails() {
    let reader = MemoryReader::new(vec![
        record("k:1", "one", "c1"),
        record("k:2", "two", "c2"),
        ReadStep::Fail("broker connection lost".to_string()),
        record("k:3", "never", "c3"),
    ]);
    let closes = reader.close_count();
    let source = BrokerSource::new(reader, "t").with_poll_timeout(FAST_POLL);

    let sink = MemorySink::new().respond_with(Ok(SinkResponse::new(200, "")));
    let calls = sink.calls();
    let policy = RelayPolicy::new(relay_config("", "http://sink.test/".to_string()), sink);
    let runner = Runner::new(source, policy, RelayMetrics::new("pipeline-read-failure"));

    let err = tokio::time::timeout(Duration::from_secs(5), runner.run(CancellationToken::new()))
        .await
        .expect("runner did not stop")
        .unwrap_err();

    assert!(matches!(
        err,
        RunnerError::Source(SourceError::ReadFailed(ref reason)) if reason == "broker connection lost"
    ));
    let payloads: Vec<_> = calls.lock().unwrap().iter().map(|c| c.payload.clone()).collect();
    assert_eq!(payloads, vec!["one", "two"]);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_subscribe_failure_closes_source_and_fails() {
    let reader = MemoryReader::from_messages(vec![Message::new("k", "v")])
        .fail_subscribe("topic authorization failed");
    let closes = reader.close_count();
    let source = BrokerSource::new(reader, "locked-topic").with_poll_timeout(FAST_POLL);

    let sink = MemorySink::new();
    let calls = sink.calls();
    let policy = RelayPolicy::new(relay_config("", "http://sink.test/".to_string()), sink);
    let runner = Runner::new(source, policy, RelayMetrics::new("pipeline-subscribe"));

    let err = runner.run(CancellationToken::new()).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "queue source failed: failed to subscribe to topic locked-topic: topic authorization failed"
    );
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_failure_does_not_fail_the_run() {
    let reader = MemoryReader::from_messages(vec![Message::new("k", "v")]).fail_close("already closed");
    let closes = reader.close_count();
    let source = BrokerSource::new(reader, "t").with_poll_timeout(FAST_POLL);

    let sink = MemorySink::new();
    let calls = sink.calls();
    let policy = RelayPolicy::new(relay_config("", "http://sink.test/".to_string()), sink);
    let metrics = RelayMetrics::new("pipeline-close");
    let runner = Runner::new(source, policy, metrics.clone());

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(runner.run(shutdown.clone()));

    wait_for_handled(&metrics, 1).await;
    shutdown.cancel();

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.forwarded, 1);
    assert_eq!(calls.lock().unwrap()[0].payload, "v");
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}
