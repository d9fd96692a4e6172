use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{AppState, SqliteChat, model::{Notification, UserId}};

use super::Caller;

/// Pushes the caller's notifications as JSON text frames while the socket
/// stays open. Incoming frames are ignored.
#[debug_handler(state = AppState)]
pub async fn notifications_ws(
    State(chat): State<SqliteChat>,
    Caller(caller): Caller,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let feed = chat.subscribe();
    ws.on_upgrade(async move |stream| forward(stream, feed, caller).await)
}

async fn forward(stream: WebSocket, mut feed: broadcast::Receiver<Notification>, caller: UserId) {
    let (mut sender, mut receiver) = stream.split();
    tracing::debug!(user = %caller, "notification socket opened");

    let mut push_task = tokio::spawn(async move {
        loop {
            let notification = match feed.recv().await {
                Ok(notification) => notification,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user = %caller, skipped, "notification socket lagging");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if notification.recipient != caller {
                continue;
            }

            let Ok(text) = serde_json::to_string(&notification) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            if matches!(frame, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut push_task => read_task.abort(),
        _ = &mut read_task => push_task.abort(),
    };
    tracing::debug!(user = %caller, "notification socket closed");
}
