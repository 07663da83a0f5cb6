//! Integration tests for the dashboard session against a scripted line server.

use relay_controller::{ActionExecutor, CommandChannel, DashboardSession};
use relay_core::{Action, ControllerConfig, ExecutionOutcome};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

const GREETING: &str = "Connected: Universal Robots Dashboard Server";

/// How one accepted connection behaves
#[derive(Clone, Copy)]
enum Session {
    /// Answer every command like an idle controller
    Healthy,
    /// Greet, then close after reading the first command
    DropAfterFirst,
}

struct LineServer {
    port: u16,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<usize>>,
}

async fn spawn_server(sessions: Vec<Session>, busy_polls: usize) -> LineServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(Mutex::new(0_usize));
    let busy = Arc::new(Mutex::new(busy_polls));

    let seen = Arc::clone(&received);
    let count = Arc::clone(&connections);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let index = {
                let mut count = count.lock().await;
                *count += 1;
                *count - 1
            };
            let behavior = sessions
                .get(index)
                .or_else(|| sessions.last())
                .copied()
                .unwrap_or(Session::Healthy);
            let seen = Arc::clone(&seen);
            let busy = Arc::clone(&busy);
            tokio::spawn(async move { serve(socket, behavior, seen, busy).await });
        }
    });

    LineServer {
        port,
        received,
        connections,
    }
}

async fn serve(
    socket: TcpStream,
    behavior: Session,
    seen: Arc<Mutex<Vec<String>>>,
    busy: Arc<Mutex<usize>>,
) {
    let (reader, mut writer) = socket.into_split();
    if writer
        .write_all(format!("{}\n", GREETING).as_bytes())
        .await
        .is_err()
    {
        return;
    }

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        seen.lock().await.push(line.clone());
        if matches!(behavior, Session::DropAfterFirst) {
            return;
        }

        let reply = match line.split_whitespace().next().unwrap_or("") {
            "running" => {
                let mut busy = busy.lock().await;
                if *busy > 0 {
                    *busy -= 1;
                    "Program running: true".to_string()
                } else {
                    "Program running: false".to_string()
                }
            }
            "stop" => "Stopped".to_string(),
            "load" if line.contains("missing") => {
                format!("File not found: {}", line.trim_start_matches("load "))
            }
            "load" => format!("Loading program: {}", line.trim_start_matches("load ")),
            "play" => "Starting program".to_string(),
            other => format!("could not understand: '{}'", other),
        };
        if writer
            .write_all(format!("{}\n", reply).as_bytes())
            .await
            .is_err()
        {
            return;
        }
    }
}

fn config(server: &LineServer) -> ControllerConfig {
    ControllerConfig {
        read_timeout_secs: 2,
        connect_timeout_secs: 2,
        ..ControllerConfig::immediate("127.0.0.1", server.port)
    }
}

#[tokio::test]
async fn test_greeting_is_consumed_before_first_command() {
    let server = spawn_server(vec![Session::Healthy], 0).await;
    let mut session = DashboardSession::connect(config(&server)).await.unwrap();

    assert_eq!(session.greeting(), Some(GREETING));
    assert_eq!(session.send("running").await.unwrap(), "Program running: false");
    assert_eq!(session.send("stop").await.unwrap(), "Stopped");
    assert_eq!(
        *server.received.lock().await,
        vec!["running".to_string(), "stop".to_string()]
    );
}

#[tokio::test]
async fn test_session_reopens_after_disconnect() {
    let server = spawn_server(vec![Session::DropAfterFirst, Session::Healthy], 0).await;
    let mut session = DashboardSession::connect(config(&server)).await.unwrap();

    let err = session.send("running").await.unwrap_err();
    assert!(err.is_transport());

    assert_eq!(session.send("running").await.unwrap(), "Program running: false");
    assert_eq!(*server.connections.lock().await, 2);
}

#[tokio::test]
async fn test_lazy_session_connects_on_first_send() {
    let server = spawn_server(vec![Session::Healthy], 0).await;
    let mut session = DashboardSession::new(config(&server));

    assert_eq!(session.greeting(), None);
    assert_eq!(*server.connections.lock().await, 0);

    assert_eq!(session.send("stop").await.unwrap(), "Stopped");
    assert_eq!(session.greeting(), Some(GREETING));
    assert_eq!(*server.connections.lock().await, 1);
}

#[tokio::test]
async fn test_lazy_session_survives_unreachable_controller() {
    let mut session = DashboardSession::new(ControllerConfig {
        connect_timeout_secs: 1,
        ..ControllerConfig::immediate("127.0.0.1", 1)
    });

    assert!(session.send("running").await.unwrap_err().is_transport());
    assert!(session.send("running").await.unwrap_err().is_transport());
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    let config = ControllerConfig {
        connect_timeout_secs: 1,
        ..ControllerConfig::immediate("127.0.0.1", 1)
    };

    let err = DashboardSession::connect(config).await.err().unwrap();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_executor_over_tcp() {
    let server = spawn_server(vec![Session::Healthy], 2).await;
    let session = DashboardSession::connect(config(&server)).await.unwrap();
    let mut executor = ActionExecutor::new(session, config(&server));

    let outcomes = executor
        .execute(&[Action::new("missing.urp"), Action::new("forward.urp")])
        .await
        .unwrap();

    assert_eq!(
        outcomes,
        vec![ExecutionOutcome::SkippedNotFound, ExecutionOutcome::Completed]
    );
    assert_eq!(
        *server.received.lock().await,
        vec![
            "running",
            "running",
            "running",
            "stop",
            "load /programs/interaction/missing.urp",
            "running",
            "stop",
            "load /programs/interaction/forward.urp",
            "play",
            "running",
        ]
    );
}
