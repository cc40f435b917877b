//! WebSocket handlers for the push channel.
//!
//! `/ws/feed` receives frames from the upstream server and publishes them to
//! the hub. `/ws/events` forwards UI events to a connected UI client.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::channel::{ChannelFrame, Hub, UiCommand, UiEvent, UI_TOPIC};

/// Handle an established upstream feed connection.
pub async fn handle_feed_connection(socket: WebSocket, hub: Arc<Hub>) {
    let (_ws_sender, mut ws_receiver) = socket.split();
    let conn_id = uuid::Uuid::new_v4().to_string();

    tracing::info!(conn_id = %conn_id, "Upstream feed connected");

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                publish_frame(&hub, &text);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "Feed close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "Feed error: {}", e);
                break;
            }
        }
    }

    tracing::info!(conn_id = %conn_id, "Upstream feed disconnected");
}

/// Decode one feed frame and publish its payload.
///
/// Returns the number of hub subscribers reached.
pub fn publish_frame(hub: &Hub, text: &str) -> usize {
    match serde_json::from_str::<ChannelFrame>(text) {
        Ok(frame) => {
            let sent = hub.publish(&frame.topic, frame.payload);
            tracing::debug!(topic = %frame.topic, recipients = sent, "Feed frame published");
            sent
        }
        Err(e) => {
            tracing::warn!("Invalid feed frame: {}", e);
            0
        }
    }
}

/// Handle an established UI event connection.
///
/// This function:
/// 1. Subscribes to the UI topic
/// 2. Spawns a task to forward events to the socket
/// 3. Answers pings until the client disconnects
pub async fn handle_events_connection(socket: WebSocket, hub: Arc<Hub>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut subscription = hub.subscribe(UI_TOPIC);
    let conn_id = subscription.id().to_string();

    // Replies to this client only
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<UiEvent>();

    tracing::info!(conn_id = %conn_id, "UI client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                Some(payload) = subscription.recv() => payload.to_string(),
                Some(reply) = reply_rx.recv() => match serde_json::to_string(&reply) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Failed to serialize UI event: {}", e);
                        continue;
                    }
                },
                else => break,
            };

            if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                tracing::warn!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<UiCommand>(&text) {
                    Ok(UiCommand::Ping) => UiEvent::Pong,
                    Err(e) => UiEvent::error(format!("Invalid message format: {}", e)),
                };
                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        ui_clients = hub.subscriber_count(UI_TOPIC),
        "UI client disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use changeline_engine::CHANGES_TOPIC;

    #[tokio::test]
    async fn test_publish_frame_routes_by_topic() {
        let hub = Hub::new_shared();
        let mut changes = hub.subscribe(CHANGES_TOPIC);
        let _entity = hub.subscribe("entity:tag:t1");

        let frame = r#"{"payload": {"type": "ENTITY_UPDATED",
            "data": {"entityType": "tag", "entityId": "t1"}}}"#;
        assert_eq!(publish_frame(&hub, frame), 1);
        assert_eq!(changes.recv().await.unwrap()["type"], "ENTITY_UPDATED");

        let frame = r#"{"topic": "entity:tag:t1", "payload": {}}"#;
        assert_eq!(publish_frame(&hub, frame), 1);
    }

    #[test]
    fn test_publish_frame_rejects_garbage() {
        let hub = Hub::new_shared();
        let _changes = hub.subscribe(CHANGES_TOPIC);
        assert_eq!(publish_frame(&hub, "not json"), 0);
        assert_eq!(publish_frame(&hub, r#"{"topic": "changes"}"#), 0);
    }
}
