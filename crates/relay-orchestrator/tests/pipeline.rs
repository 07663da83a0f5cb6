//! End-to-end pipeline tests: scripted file source, scripted completion
//! endpoint, scripted controller.

use relay_agent::CompletionAgent;
use relay_controller::{ActionExecutor, MockChannel};
use relay_core::{AgentConfig, ControllerConfig, ExecutionOutcome, OrchestratorConfig, WatchConfig};
use relay_orchestrator::{ChangeOutcome, Orchestrator};
use relay_watch::{ChangeWatcher, MockPoll, MockSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const FORWARD_ANSWER: &str =
    "{\"response\":\"```json\\n{\\\"program\\\":\\\"forward.urp\\\"}\\n```\",\"done\":true}\n";

/// Completion endpoint that streams `answer` to every request
async fn spawn_completion(answer: &'static str) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));

    let count = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            count.fetch_add(1, Ordering::AcqRel);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buffer = [0_u8; 2048];
                // Headers and the small JSON body arrive together in practice;
                // wait for the body's closing brace.
                while !request.ends_with(b"}") {
                    match socket.read(&mut buffer).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buffer[..n]),
                    }
                }

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    answer.len(),
                    answer
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/api/generate", addr), requests)
}

fn pipeline(
    source: MockSource,
    url: String,
    channel: MockChannel,
) -> Orchestrator<MockSource, MockChannel> {
    let watcher = ChangeWatcher::new(
        source,
        &WatchConfig {
            remote_path: "/home/ubuntu/instructions.json".to_string(),
            poll_interval_ms: 0,
            reconnect_backoff_ms: 0,
            ..WatchConfig::default()
        },
    );
    let agent = CompletionAgent::new(AgentConfig {
        url,
        model_name: "phi4:latest".to_string(),
        system_prompt: "Reply with the program to run.".to_string(),
        max_retries: 3,
        retry_backoff_ms: 0,
        timeout_secs: 5,
    })
    .unwrap();
    let executor = ActionExecutor::new(channel, ControllerConfig::immediate("localhost", 29999));
    Orchestrator::new(
        watcher,
        agent,
        executor,
        OrchestratorConfig { error_backoff_ms: 0 },
    )
}

#[tokio::test]
async fn test_instruction_change_drives_the_controller() {
    let (url, requests) = spawn_completion(FORWARD_ANSWER).await;
    let source = MockSource::new()
        .with_text(r#"{"text":"go"}"#)
        .with_text(r#"{"text":"move forward"}"#);
    let channel = MockChannel::new().with_running(&[false, true, false]);
    let handle = channel.clone();
    let mut orchestrator = pipeline(source, url, channel);

    assert_eq!(
        orchestrator.process_next().await.unwrap(),
        ChangeOutcome::Baseline
    );
    assert_eq!(requests.load(Ordering::Acquire), 0);

    assert_eq!(
        orchestrator.process_next().await.unwrap(),
        ChangeOutcome::Executed(vec![ExecutionOutcome::Completed])
    );
    assert_eq!(requests.load(Ordering::Acquire), 1);
    assert_eq!(
        handle.sent(),
        vec![
            "running",
            "stop",
            "load /programs/interaction/forward.urp",
            "play",
            "running",
            "running",
        ]
    );
}

#[tokio::test]
async fn test_reconnect_with_same_content_is_not_replayed() {
    let (url, requests) = spawn_completion(FORWARD_ANSWER).await;
    let source = MockSource::new()
        .with_text(r#"{"text":"go"}"#)
        .with_poll(MockPoll::Disconnect)
        .with_text(r#"{"text":"go"}"#);
    let channel = MockChannel::new();
    let handle = channel.clone();
    let mut orchestrator = pipeline(source, url, channel);

    assert_eq!(
        orchestrator.process_next().await.unwrap(),
        ChangeOutcome::Baseline
    );
    // The watcher reports the file again after reconnecting; the text is
    // identical to what was already accepted.
    assert_eq!(
        orchestrator.process_next().await.unwrap(),
        ChangeOutcome::Unchanged
    );
    assert_eq!(requests.load(Ordering::Acquire), 0);
    assert!(handle.sent().is_empty());
}

#[tokio::test]
async fn test_bad_content_is_dropped_and_pipeline_continues() {
    let (url, _requests) = spawn_completion(FORWARD_ANSWER).await;
    let source = MockSource::new()
        .with_text(r#"{"text":"go"}"#)
        .with_text("{not json")
        .with_text(r#"{"other":"field"}"#)
        .with_text(r#"{"text":"move forward"}"#);
    let channel = MockChannel::new();
    let handle = channel.clone();
    let mut orchestrator = pipeline(source, url, channel);

    assert_eq!(
        orchestrator.process_next().await.unwrap(),
        ChangeOutcome::Baseline
    );
    assert!(matches!(
        orchestrator.process_next().await.unwrap(),
        ChangeOutcome::Rejected(_)
    ));
    assert!(matches!(
        orchestrator.process_next().await.unwrap(),
        ChangeOutcome::Rejected(_)
    ));
    assert_eq!(
        orchestrator.process_next().await.unwrap(),
        ChangeOutcome::Executed(vec![ExecutionOutcome::Completed])
    );
    assert_eq!(handle.count("play"), 1);
}

#[tokio::test]
async fn test_empty_completion_executes_nothing() {
    let (url, requests) = spawn_completion("{\"response\":\"[]\",\"done\":true}\n").await;
    let source = MockSource::new()
        .with_text(r#"{"text":"go"}"#)
        .with_text(r#"{"text":"do nothing"}"#);
    let channel = MockChannel::new();
    let handle = channel.clone();
    let mut orchestrator = pipeline(source, url, channel);

    orchestrator.process_next().await.unwrap();
    assert_eq!(
        orchestrator.process_next().await.unwrap(),
        ChangeOutcome::NoActions
    );
    assert_eq!(requests.load(Ordering::Acquire), 1);
    assert!(handle.sent().is_empty());
}

#[tokio::test]
async fn test_controller_transport_failure_surfaces_as_error() {
    let (url, _requests) = spawn_completion(FORWARD_ANSWER).await;
    let source = MockSource::new()
        .with_text(r#"{"text":"go"}"#)
        .with_text(r#"{"text":"move forward"}"#);
    let channel = MockChannel::new().with_disconnect("running");
    let mut orchestrator = pipeline(source, url, channel);

    orchestrator.process_next().await.unwrap();
    let err = orchestrator.process_next().await.unwrap_err();
    assert!(err.is_transport());
}
