use crate::{
    handlers::AppState,
    models::{NotificationEvent, Stats, StreamEntry, StreamStats},
};
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};

/// Frames pushed to dashboard clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    Transaction(StreamEntry),
    Notification(NotificationEvent),
    Stats { stats: Stats, stream: StreamStats },
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let mut interval = interval(Duration::from_secs(1));
    let mut notifications = state.notifications.subscribe();
    // Without a stream this receiver never yields; its sender stays alive here.
    let (_idle, idle_entries) = broadcast::channel::<StreamEntry>(1);
    let mut entries = match &state.stream {
        Some(stream) => stream.subscribe(),
        None => idle_entries,
    };

    loop {
        let message = tokio::select! {
            _ = interval.tick() => DashboardMessage::Stats {
                stats: state.analytics.get_stats(),
                stream: state.buffer.stats().await,
            },

            entry = entries.recv() => match entry {
                Ok(entry) => DashboardMessage::Transaction(entry),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Dashboard client skipped {} stream entries", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            event = notifications.recv() => match event {
                Ok(event) => DashboardMessage::Notification(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },

            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                    continue;
                }
                Some(Ok(_)) => continue,
            },
        };

        if let Ok(msg) = serde_json::to_string(&message) {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    }

    tracing::debug!("WebSocket connection closed");
}
