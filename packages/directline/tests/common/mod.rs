//! In-process stand-in for the Direct Line service.

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

use directline::{SessionConfig, SessionEvent};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const SECRET: &str = "test-secret";
pub const CONVERSATION_ID: &str = "C1";

/// One activity POST as the service saw it.
#[derive(Clone, Debug)]
pub struct Posted {
    pub conversation_id: String,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

enum Script {
    Frame(String),
    Close,
    /// Drop the TCP connection without a close frame.
    Drop,
}

#[derive(Clone, Default)]
pub struct MockOptions {
    pub negotiate_status: Option<StatusCode>,
    pub negotiate_delay: Option<Duration>,
    /// Answer the stream upgrade request with this status instead.
    pub stream_status: Option<StatusCode>,
}

#[derive(Clone)]
struct MockState {
    addr: SocketAddr,
    options: MockOptions,
    negotiations: Arc<AtomicUsize>,
    stream_connections: Arc<AtomicUsize>,
    posted_tx: mpsc::UnboundedSender<Posted>,
    script: Arc<Mutex<Option<mpsc::UnboundedReceiver<Script>>>>,
}

pub struct MockDirectLine {
    pub addr: SocketAddr,
    negotiations: Arc<AtomicUsize>,
    stream_connections: Arc<AtomicUsize>,
    posted_rx: mpsc::UnboundedReceiver<Posted>,
    script_tx: mpsc::UnboundedSender<Script>,
}

impl MockDirectLine {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (posted_tx, posted_rx) = mpsc::unbounded_channel();
        let (script_tx, script_rx) = mpsc::unbounded_channel();
        let negotiations = Arc::new(AtomicUsize::new(0));
        let stream_connections = Arc::new(AtomicUsize::new(0));

        let state = MockState {
            addr,
            options,
            negotiations: negotiations.clone(),
            stream_connections: stream_connections.clone(),
            posted_tx,
            script: Arc::new(Mutex::new(Some(script_rx))),
        };
        let app = Router::new()
            .route("/v3/directline/conversations", post(negotiate))
            .route(
                "/v3/directline/conversations/{id}/activities",
                post(post_activity),
            )
            .route("/v3/directline/conversations/{id}/stream", get(stream))
            .with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            negotiations,
            stream_connections,
            posted_rx,
            script_tx,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/v3/directline/", self.addr)
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            endpoint: self.endpoint(),
            close_timeout_secs: 2,
            request_timeout_secs: 5,
            ..SessionConfig::new(SECRET)
        }
    }

    pub fn negotiations(&self) -> usize {
        self.negotiations.load(Ordering::SeqCst)
    }

    pub fn stream_connections(&self) -> usize {
        self.stream_connections.load(Ordering::SeqCst)
    }

    /// Push a text frame to the connected stream.
    pub fn push_frame(&self, frame: impl Into<String>) {
        self.script_tx.send(Script::Frame(frame.into())).unwrap();
    }

    /// Close the stream from the service side.
    pub fn close_stream(&self) {
        self.script_tx.send(Script::Close).unwrap();
    }

    /// Kill the stream connection without a close handshake.
    pub fn drop_stream(&self) {
        self.script_tx.send(Script::Drop).unwrap();
    }

    pub async fn next_post(&mut self) -> Posted {
        tokio::time::timeout(TEST_TIMEOUT, self.posted_rx.recv())
            .await
            .expect("timed out waiting for a posted activity")
            .expect("mock service stopped")
    }

    pub fn posted_count(&mut self) -> usize {
        let mut count = 0;
        while self.posted_rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

async fn negotiate(State(mock): State<MockState>) -> Response {
    mock.negotiations.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = mock.options.negotiate_delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(status) = mock.options.negotiate_status {
        return (status, "negotiation refused").into_response();
    }
    Json(serde_json::json!({
        "conversationId": CONVERSATION_ID,
        "token": "conversation-token",
        "expires_in": 1800,
        "streamUrl": format!(
            "ws://{}/v3/directline/conversations/{}/stream",
            mock.addr, CONVERSATION_ID
        ),
    }))
    .into_response()
}

async fn post_activity(
    State(mock): State<MockState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let _ = mock.posted_tx.send(Posted {
        conversation_id: conversation_id.clone(),
        authorization,
        body,
    });
    Json(serde_json::json!({ "id": format!("{conversation_id}|0000001") })).into_response()
}

async fn stream(State(mock): State<MockState>, ws: WebSocketUpgrade) -> Response {
    mock.stream_connections.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = mock.options.stream_status {
        return (status, "stream unavailable").into_response();
    }
    ws.on_upgrade(move |socket| serve_stream(socket, mock))
}

async fn serve_stream(mut socket: WebSocket, mock: MockState) {
    // later connections get no script and stay open until the client leaves
    let Some(mut script) = mock.script.lock().await.take() else {
        while let Some(Ok(_)) = socket.recv().await {}
        return;
    };
    let mut scripting = true;
    loop {
        tokio::select! {
            command = script.recv(), if scripting => match command {
                Some(Script::Frame(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Script::Drop) => return,
                Some(Script::Close) | None => {
                    scripting = false;
                    let _ = socket.send(Message::Close(None)).await;
                }
            },
            incoming = socket.recv() => match incoming {
                // keep reading after a close so the reply gets flushed
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(TEST_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("observer channel closed")
}

/// Assert nothing arrives within `window`.
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<SessionEvent>, window: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("expected no notification, got {event:?}");
    }
}

pub fn frame(watermark: Option<&str>, texts: &[&str]) -> String {
    let activities: Vec<_> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            serde_json::json!({
                "type": "message",
                "id": format!("{CONVERSATION_ID}|{i:07}"),
                "timestamp": "2018-03-06T09:15:02.1234567Z",
                "channelId": "directline",
                "from": { "id": "echo-bot", "name": "Echo Bot" },
                "conversation": { "id": CONVERSATION_ID },
                "text": text,
                "inputHint": "acceptingInput",
            })
        })
        .collect();
    let mut frame = serde_json::json!({ "activities": activities });
    if let Some(watermark) = watermark {
        frame["watermark"] = serde_json::Value::String(watermark.to_string());
    }
    frame.to_string()
}
