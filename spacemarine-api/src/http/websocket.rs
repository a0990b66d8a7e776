//! WebSocket change feed
//!
//! Each connection becomes one subscriber in the registry. A writer task
//! drains the subscriber's queue to the socket while the reader handles
//! subscribe/unsubscribe commands. Closing or failing either side
//! unregisters the subscriber.

use std::str::FromStr;

use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use spacemarine_notify::{SubscriberRegistry, Topic};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{AppError, AppResult, AppState};

/// Capacity of the per-connection queue for command replies
const REPLY_CHANNEL_CAPACITY: usize = 16;

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Comma-separated topics; none means all of them
    pub topics: Option<String>,
}

/// `GET /ws?topics=chapters,marines`
pub async fn websocket_handler(
    State(state): State<AppState>,
    query: Result<Query<WsQuery>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let Query(query) = query?;
    let topics = parse_topics(query.topics.as_deref())?;
    upgrade(state, topics, ws)
}

/// `GET /ws/{topic}`
pub async fn topic_websocket_handler(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let topic = Topic::from_str(&topic).map_err(|e| AppError::bad_request(e.to_string()))?;
    upgrade(state, vec![topic], ws)
}

/// Topics are validated before the upgrade so a bad request gets a plain 400
fn upgrade(
    state: AppState,
    topics: Vec<Topic>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let ws = ws.map_err(|rejection| AppError::new(rejection.status(), rejection.body_text()))?;
    let registry = state.registry.clone();

    Ok(ws
        .max_message_size(state.ws_max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, registry, topics))
        .into_response())
}

/// Parse `a,b,c`, ignoring blanks and duplicates. Empty input means every topic.
pub fn parse_topics(raw: Option<&str>) -> AppResult<Vec<Topic>> {
    let mut topics = Vec::new();
    for part in raw.unwrap_or_default().split(',').filter(|p| !p.trim().is_empty()) {
        let topic = Topic::from_str(part).map_err(|e| AppError::bad_request(e.to_string()))?;
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    }

    if topics.is_empty() {
        topics.extend(Topic::ALL);
    }
    Ok(topics)
}

async fn handle_socket(socket: WebSocket, registry: SubscriberRegistry, topics: Vec<Topic>) {
    let (subscriber_id, mut events) = registry.connect(topics.iter().copied());
    info!(subscriber_id = %subscriber_id, topics = ?topics, "WebSocket subscriber connected");

    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_CHANNEL_CAPACITY);

    // Writer: the only task touching the sink, so per-subscriber order holds
    let writer_registry = registry.clone();
    let writer_id = subscriber_id.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                event = events.recv() => match event {
                    Some(payload) => payload.to_string(),
                    // Unregistered, e.g. dropped as too slow
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };

            if let Err(e) = sink.send(Message::Text(text.into())).await {
                warn!(subscriber_id = %writer_id, error = %e, "Failed to send WebSocket message");
                break;
            }
        }

        writer_registry.unregister(&writer_id);
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_command(&registry, &subscriber_id, text.as_str()) {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(subscriber_id = %subscriber_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    // Closes the event queue, which stops the writer
    registry.unregister(&subscriber_id);
    drop(reply_tx);

    info!(subscriber_id = %subscriber_id, "WebSocket subscriber disconnected");
}

/// Apply a `{"command": ..., "topic": ...}` frame. Returns the reply to send,
/// or `None` for frames that are not commands.
pub fn handle_command(registry: &SubscriberRegistry, subscriber_id: &str, text: &str) -> Option<String> {
    let frame: Value = serde_json::from_str(text).ok()?;
    let command = frame.get("command")?.as_str()?;
    let topic_name = frame.get("topic").and_then(Value::as_str).unwrap_or_default();

    let reply = match (command, Topic::from_str(topic_name)) {
        (_, Err(e)) => error_reply(&e.to_string()),
        ("subscribe", Ok(topic)) => {
            if registry.subscribe_topic(subscriber_id, topic) {
                json!({"type": "ack", "command": "subscribe", "topic": topic.as_str()})
            } else {
                error_reply("Subscriber is no longer connected")
            }
        }
        ("unsubscribe", Ok(topic)) => {
            if registry.unsubscribe_topic(subscriber_id, topic) {
                json!({"type": "ack", "command": "unsubscribe", "topic": topic.as_str()})
            } else {
                error_reply("Subscriber is no longer connected")
            }
        }
        (other, Ok(_)) => error_reply(&format!("Unknown command: {other}")),
    };

    Some(reply.to_string())
}

fn error_reply(message: &str) -> Value {
    json!({"type": "error", "message": message})
}
