//! Connection lifecycle tests against a loopback WebSocket service

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use formsense_core::{
    AnalysisResult, ConnectionConfig, ConnectionManager, ConnectionState, FrameSink,
    ReconnectPolicy, SendOutcome, TrackerError,
};

const WAIT: Duration = Duration::from_secs(5);

/// Replies sent by the scripted service for each inbound frame
type Script = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Start a service that answers every text frame with the scripted replies.
///
/// Every received frame is forwarded on the returned channel.
async fn start_scripted_service(script: Script) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let script = script.clone();
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(text) => {
                            let _ = seen_tx.send(text.clone());
                            for reply in script(&text) {
                                if ws.send(Message::Text(reply)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });

    (addr, seen_rx)
}

/// Start a service that accepts the handshake and immediately closes
async fn start_dropping_service() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Ok(mut ws) = accept_async(stream).await {
                    let _ = ws.close(None).await;
                }
            });
        }
    });

    addr
}

async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    let mut rx = manager.subscribe_state();
    timeout(WAIT, rx.wait_for(|current| *current == state))
        .await
        .expect("state not reached in time")
        .expect("state channel closed");
}

fn collecting_handler(manager: &ConnectionManager) -> mpsc::UnboundedReceiver<AnalysisResult> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.on_message(move |result: AnalysisResult| {
        let _ = tx.send(result);
    });
    rx
}

fn result_json(angle: u32, feedback: &str) -> String {
    format!(
        r#"{{"angle": {}, "feedback": "{}", "landmarks": {{"shoulder": [0.5, 0.3], "elbow": [0.55, 0.5], "wrist": [0.5, 0.7]}}}}"#,
        angle, feedback
    )
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_open_reaches_open_and_sends_frame() {
    let (addr, mut seen) = start_scripted_service(Arc::new(|_: &str| Vec::<String>::new())).await;
    let mut manager = ConnectionManager::default();
    assert_eq!(manager.state(), ConnectionState::Connecting);

    manager.open(&format!("ws://{}/ws", addr)).unwrap();
    wait_for_state(&manager, ConnectionState::Open).await;

    let payload = "data:image/jpeg;base64,/9j/AAAA".to_string();
    assert_eq!(manager.send(payload.clone()), SendOutcome::Queued);

    let received = timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(received, payload);

    manager.close().await;
    assert_eq!(manager.stats().messages_sent, 1);
}

#[tokio::test]
async fn test_invalid_endpoint_is_rejected() {
    let mut manager = ConnectionManager::default();
    let err = manager.open("http://localhost:8000/ws").unwrap_err();
    assert!(matches!(err, TrackerError::InvalidEndpoint { .. }));
    assert_eq!(manager.state(), ConnectionState::Connecting);
}

#[tokio::test]
async fn test_open_twice_is_invalid_state() {
    let (addr, _seen) = start_scripted_service(Arc::new(|_: &str| Vec::<String>::new())).await;
    let mut manager = ConnectionManager::default();
    let url = format!("ws://{}/ws", addr);

    manager.open(&url).unwrap();
    let err = manager.open(&url).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_STATE");
    manager.close().await;
}

#[tokio::test]
async fn test_unreachable_service_ends_closed() {
    // Reserve a port, then release it so nothing is listening there.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let mut manager = ConnectionManager::default();
    manager.open(&format!("ws://{}/ws", addr)).unwrap();
    wait_for_state(&manager, ConnectionState::Closed).await;

    assert_eq!(manager.send("data:,".to_string()), SendOutcome::NotOpen);
    assert_eq!(manager.stats().successful_connections, 0);
    manager.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent_after_open() {
    let (addr, _seen) = start_scripted_service(Arc::new(|_: &str| Vec::<String>::new())).await;
    let mut manager = ConnectionManager::default();
    manager.open(&format!("ws://{}/ws", addr)).unwrap();
    wait_for_state(&manager, ConnectionState::Open).await;

    manager.close().await;
    assert_eq!(manager.state(), ConnectionState::Closed);
    manager.close().await;
    assert_eq!(manager.state(), ConnectionState::Closed);

    assert_eq!(manager.send("data:,".to_string()), SendOutcome::NotOpen);
    assert!(!manager.is_open());
}

#[tokio::test]
async fn test_close_before_handshake_completes() {
    let (addr, _seen) = start_scripted_service(Arc::new(|_: &str| Vec::<String>::new())).await;
    let mut manager = ConnectionManager::default();
    manager.open(&format!("ws://{}/ws", addr)).unwrap();

    manager.close().await;
    assert_eq!(manager.state(), ConnectionState::Closed);

    // The driver is gone: state must not flip back to open.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.state(), ConnectionState::Closed);
}

// ============================================================================
// Inbound results
// ============================================================================

#[tokio::test]
async fn test_results_delivered_in_arrival_order() {
    let script: Script = Arc::new(|_: &str| {
        vec![
            result_json(170, "Arm Straight - Down"),
            result_json(90, "Moving... 90°"),
            result_json(30, "Arm Curl - Up"),
        ]
    });
    let (addr, _seen) = start_scripted_service(script).await;

    let mut manager = ConnectionManager::default();
    let mut results = collecting_handler(&manager);
    manager.open(&format!("ws://{}/ws", addr)).unwrap();
    wait_for_state(&manager, ConnectionState::Open).await;

    assert_eq!(manager.send("data:image/jpeg;base64,AA".to_string()), SendOutcome::Queued);

    let mut angles = Vec::new();
    for _ in 0..3 {
        let result = timeout(WAIT, results.recv()).await.unwrap().unwrap();
        angles.push(result.angle);
    }
    assert_eq!(angles, vec![170.0, 90.0, 30.0]);
    manager.close().await;
}

#[tokio::test]
async fn test_error_and_malformed_messages_are_not_delivered() {
    let script: Script = Arc::new(|_: &str| {
        vec![
            r#"{"error": "No person detected"}"#.to_string(),
            "not json at all".to_string(),
            r#"{"feedback": "no angle"}"#.to_string(),
            result_json(45, "Moving... 45°"),
        ]
    });
    let (addr, _seen) = start_scripted_service(script).await;

    let mut manager = ConnectionManager::default();
    let mut results = collecting_handler(&manager);
    manager.open(&format!("ws://{}/ws", addr)).unwrap();
    wait_for_state(&manager, ConnectionState::Open).await;
    manager.send("data:image/jpeg;base64,AA".to_string());

    let result = timeout(WAIT, results.recv()).await.unwrap().unwrap();
    assert_eq!(result.angle, 45.0);
    assert_eq!(result.feedback, "Moving... 45°");

    let stats = manager.stats();
    assert_eq!(stats.results_rejected, 1);
    assert_eq!(stats.malformed_messages, 2);
    assert_eq!(stats.results_delivered, 1);

    // Connection survives bad messages.
    assert_eq!(manager.state(), ConnectionState::Open);
    manager.close().await;
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test]
async fn test_reconnect_disabled_stays_closed() {
    let addr = start_dropping_service().await;
    let mut manager = ConnectionManager::default();
    manager.open(&format!("ws://{}/ws", addr)).unwrap();

    wait_for_state(&manager, ConnectionState::Closed).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(manager.stats().connect_attempts, 1);
    manager.close().await;
}

#[tokio::test]
async fn test_bounded_reconnect_retries_then_gives_up() {
    let addr = start_dropping_service().await;
    let config = ConnectionConfig {
        reconnect: ReconnectPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(50),
            stable_after: Duration::from_secs(30),
        },
        ..ConnectionConfig::default()
    };

    let mut manager = ConnectionManager::new(config);
    manager.open(&format!("ws://{}/ws", addr)).unwrap();

    timeout(WAIT, async {
        while manager.stats().connect_attempts < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    wait_for_state(&manager, ConnectionState::Closed).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    // Each retry reached the service and was dropped straight away
    let stats = manager.stats();
    assert_eq!(stats.connect_attempts, 3);
    assert_eq!(stats.successful_connections, 3);
    assert_eq!(manager.state(), ConnectionState::Closed);
    manager.close().await;
}
