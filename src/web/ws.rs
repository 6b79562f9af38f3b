//! WebSocket endpoint for camera requests and streamed frames
//!
//! `/api/ws` carries JSON envelopes in both directions:
//! - requests: `{"endpoint": "startcamera", "syncKey": "...", "args": ["video0"]}`
//! - replies: `{"endpoint": "startcamera", "syncKey": "...", "results": {...}}`
//! - frames and frame failures: endpoint `cameraframe`
//! - event bus events for subscribed topics: endpoint `event`
//!
//! Every outgoing message goes through one bounded queue drained by a writer
//! task. The connection's [`WsSink`] feeds that queue, so a slow client
//! slows down its own streaming loops and nothing else.
//!
//! Camera requests of one connection are handled in arrival order by a
//! single request worker, so `startcamera` followed by `startcamerastream`
//! always sees the camera running. The read loop only queues them and keeps
//! reading while a slow request (such as a stream stop) is in progress.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::events::SystemEvent;
use crate::session::{Dispatcher, Request};
use crate::state::AppState;
use crate::stream::{FrameSink, StreamEvent};

const OUTBOUND_CAPACITY: usize = 32;
const REQUEST_QUEUE_CAPACITY: usize = 64;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

const FRAME_ENDPOINT: &str = "cameraframe";
const EVENT_ENDPOINT: &str = "event";
const ERROR_ENDPOINT: &str = "error";
const SUBSCRIBE_ENDPOINT: &str = "subscribe";
const UNSUBSCRIBE_ENDPOINT: &str = "unsubscribe";

/// Client-to-server request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientRequest {
    endpoint: String,
    #[serde(default)]
    sync_key: Option<String>,
    #[serde(default)]
    args: Vec<Value>,
}

impl ClientRequest {
    /// Arguments as strings; non-string values use their JSON text
    fn args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| match arg {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

/// Server-to-client message
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, T: Serialize> {
    endpoint: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_key: Option<&'a str>,
    results: T,
}

fn encode<T: Serialize>(endpoint: &str, sync_key: Option<&str>, results: T) -> Result<String> {
    Ok(serde_json::to_string(&Envelope {
        endpoint,
        sync_key,
        results,
    })?)
}

fn stream_event_results(event: &StreamEvent) -> Value {
    match event {
        StreamEvent::Frame {
            device_id,
            sequence,
            data,
        } => json!({
            "deviceId": device_id,
            "sequence": sequence,
            "cameraData": BASE64.encode(data),
        }),
        StreamEvent::FrameFailed { device_id, message } => json!({
            "deviceId": device_id,
            "cameraFrameFailed": true,
            "message": message,
        }),
    }
}

/// Outgoing side of one WebSocket connection
pub struct WsSink {
    live: AtomicBool,
    closed: CancellationToken,
    tx: mpsc::Sender<Message>,
}

impl WsSink {
    fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            live: AtomicBool::new(true),
            closed: CancellationToken::new(),
            tx,
        }
    }

    /// Mark the connection gone and wake the streaming loops waiting on it
    fn close(&self) {
        self.live.store(false, Ordering::Release);
        self.closed.cancel();
    }

    /// Queue a message; `false` once the writer is gone
    async fn send(&self, message: Message) -> bool {
        self.tx.send(message).await.is_ok()
    }
}

#[async_trait]
impl FrameSink for WsSink {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    async fn deliver(&self, event: StreamEvent) -> Result<()> {
        if !self.is_live() {
            return Err(AppError::ConsumerDisconnected);
        }
        let text = encode(FRAME_ENDPOINT, None, stream_event_results(&event))?;
        self.tx
            .send(Message::Text(text))
            .await
            .map_err(|_| AppError::ConsumerDisconnected)
    }

    async fn closed(&self) {
        tokio::select! {
            _ = self.closed.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }
}

/// A request waiting for the connection's request worker
struct QueuedRequest {
    endpoint: String,
    sync_key: Option<String>,
    args: Vec<String>,
}

/// Spawn the worker that runs one connection's requests in arrival order
///
/// The worker exits once every sender is dropped and the queue is drained.
fn spawn_request_worker(
    dispatcher: Arc<Dispatcher>,
    sink: Arc<WsSink>,
) -> (mpsc::Sender<QueuedRequest>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<QueuedRequest>(REQUEST_QUEUE_CAPACITY);
    let worker = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let reply = run_request(&dispatcher, &sink, &request).await;
            match reply {
                Ok(text) => {
                    if !sink.send(Message::Text(text)).await {
                        debug!("Client gone before reply to {}", request.endpoint);
                    }
                }
                Err(e) => warn!("Failed to encode reply to {}: {}", request.endpoint, e),
            }
        }
    });
    (tx, worker)
}

/// Dispatch one request and encode its reply
async fn run_request(
    dispatcher: &Dispatcher,
    sink: &Arc<WsSink>,
    request: &QueuedRequest,
) -> Result<String> {
    let endpoint = request.endpoint.as_str();
    let sync_key = request.sync_key.as_deref();
    let sink: Arc<dyn FrameSink> = sink.clone();
    match dispatcher
        .dispatch(endpoint, Request::new(request.args.clone(), sink))
        .await
    {
        Ok(results) => encode(endpoint, sync_key, results),
        Err(e) => {
            debug!("Request to {} failed: {}", endpoint, e);
            encode(endpoint, sync_key, json!({ "message": e.to_string() }))
        }
    }
}

/// WebSocket upgrade handler
///
/// This is the entry point for WebSocket connections at `/api/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
    let sink = Arc::new(WsSink::new(tx));
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let (requests, _request_worker) = spawn_request_worker(state.dispatcher.clone(), sink.clone());

    let mut event_rx = state.events.subscribe();
    let mut shutdown_rx = state.shutdown_signal();
    // No bus events until the client subscribes
    let mut topics: Vec<String> = Vec::new();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    info!("WebSocket client connected");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_text(&sink, &requests, &mut topics, &text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    // Pongs are answered by axum; binary frames are not part of the protocol
                    Some(Ok(_)) => {}
                }
            }

            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if should_send_event(&event, &topics) {
                            if let Ok(text) = encode(EVENT_ENDPOINT, None, &event) {
                                if !sink.send(Message::Text(text)).await {
                                    warn!("Failed to send event to client, disconnecting");
                                    break;
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {} events", n);
                        let error_event = SystemEvent::Error {
                            message: format!("Lagged by {} events", n),
                        };
                        if let Ok(text) = encode(EVENT_ENDPOINT, None, &error_event) {
                            let _ = sink.send(Message::Text(text)).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("Event bus closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if !sink.send(Message::Ping(Vec::new())).await {
                    warn!("Failed to send ping, disconnecting");
                    break;
                }
            }

            _ = shutdown_rx.recv() => {
                debug!("Closing WebSocket for shutdown");
                break;
            }
        }
    }

    // Streams of this connection end now; queued requests still run and
    // the worker exits once the queue is drained
    drop(requests);
    sink.close();
    writer.abort();
    info!("WebSocket handler exiting");
}

/// Handle one text message; returns `false` when the connection is gone
async fn handle_text(
    sink: &Arc<WsSink>,
    requests: &mpsc::Sender<QueuedRequest>,
    topics: &mut Vec<String>,
    text: &str,
) -> bool {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            warn!("Failed to parse client message: {}", e);
            return match encode(ERROR_ENDPOINT, None, json!({ "message": e.to_string() })) {
                Ok(reply) => sink.send(Message::Text(reply)).await,
                Err(_) => true,
            };
        }
    };

    let endpoint = request.endpoint.to_ascii_lowercase();
    if endpoint == SUBSCRIBE_ENDPOINT || endpoint == UNSUBSCRIBE_ENDPOINT {
        update_topics(topics, &endpoint, request.args());
        return match encode(&endpoint, request.sync_key.as_deref(), json!({ "topics": topics })) {
            Ok(reply) => sink.send(Message::Text(reply)).await,
            Err(_) => true,
        };
    }

    let queued = QueuedRequest {
        args: request.args(),
        sync_key: request.sync_key,
        endpoint,
    };
    if requests.send(queued).await.is_err() {
        warn!("Request worker gone, disconnecting");
        return false;
    }
    true
}

fn update_topics(topics: &mut Vec<String>, endpoint: &str, args: Vec<String>) {
    if endpoint == SUBSCRIBE_ENDPOINT {
        for topic in args {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        info!("Client subscribed to topics: {:?}", topics);
    } else {
        topics.retain(|t| !args.contains(t));
        info!("Client unsubscribed, remaining topics: {:?}", topics);
    }
}

/// Check if an event should be sent based on subscribed topics
fn should_send_event(event: &SystemEvent, topics: &[String]) -> bool {
    topics.iter().any(|topic| event.matches_topic(topic))
}
