//! WebSocket push of live query snapshots.
//!
//! ```text
//! Client          WebSocket Handler          DocumentStore
//!   │                    │                          │
//!   ├─ Connect ─────────>│                          │
//!   │                    ├─ subscribe(query) ──────>│
//!   │<─ snapshot ────────┤<── snapshot (seq n) ─────┤
//!   │<─ snapshot ────────┤<── snapshot (seq n+k) ───┤
//!   ├─ ping ────────────>│                          │
//!   │<─ pong ────────────┤                          │
//! ```
//!
//! **Server → Client:**
//! ```json
//! {"type": "snapshot", "sequence": 42, "data": { ... }}
//! {"type": "error", "message": "Store unavailable: ..."}
//! ```
//!
//! Snapshots at or below the last sequence sent are dropped, so a client
//! never sees an older view after a newer one.

use axum::{
    extract::{
        WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use talkboard_core::subscription::LiveView;
use tracing::{debug, info, warn};

/// WebSocket message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsMessage<T> {
    /// Latest view of the subscribed query.
    Snapshot {
        /// Store sequence the view reflects.
        sequence: u64,
        /// The view itself.
        data: T,
    },
    /// The subscription failed; the server closes the socket after this.
    Error {
        /// Error description
        message: String,
    },
    /// Ping message (keep-alive)
    Ping,
    /// Pong response
    Pong,
}

/// Upgrade the connection and forward `views` to the client.
///
/// `views` yields `(sequence, view)` pairs; the first error is sent to the
/// client as an `error` message and ends the connection.
///
/// # Example
///
/// ```ignore
/// async fn live(ws: WebSocketUpgrade, State(app): State<AppState>, Path(id): Path<TalkId>)
///     -> Response
/// {
///     let views = app.ledger.subscribe_talk(id);
///     websocket::stream_views(ws, views)
/// }
/// ```
pub fn stream_views<T, E, St>(ws: WebSocketUpgrade, views: St) -> Response
where
    T: Serialize + Send + Sync + 'static,
    E: Display + Send + 'static,
    St: Stream<Item = Result<(u64, T), E>> + Send + 'static,
{
    debug!("WebSocket connection requested");
    ws.on_upgrade(move |socket| forward(socket, views))
}

async fn forward<T, E, St>(socket: WebSocket, views: St)
where
    T: Serialize + Send + Sync + 'static,
    E: Display + Send + 'static,
    St: Stream<Item = Result<(u64, T), E>> + Send + 'static,
{
    info!("WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let mut views = Box::pin(views);
    let mut sent: LiveView<()> = LiveView::new();

    loop {
        tokio::select! {
            next = views.next() => {
                let outgoing = match next {
                    Some(Ok((sequence, data))) => {
                        if !sent.apply(sequence, ()) {
                            debug!(sequence, "Dropping stale snapshot");
                            continue;
                        }
                        WsMessage::Snapshot { sequence, data }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Subscription failed");
                        let _ = send(&mut sender, &WsMessage::<T>::Error { message: e.to_string() }).await;
                        break;
                    }
                    None => break,
                };
                if send(&mut sender, &outgoing).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(WsMessage::<serde_json::Value>::Ping) = serde_json::from_str(&text) {
                            if send(&mut sender, &WsMessage::<T>::Pong).await.is_err() {
                                break;
                            }
                        } else {
                            debug!("Ignoring client message");
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = sender.close().await;
    info!("WebSocket connection closed");
}

async fn send<T, S>(sender: &mut S, message: &WsMessage<T>) -> Result<(), ()>
where
    T: Serialize,
    S: futures::Sink<Message> + Unpin,
{
    let json = serde_json::to_string(message).map_err(|e| {
        warn!(error = %e, "Failed to serialize WebSocket message");
    })?;
    sender.send(Message::Text(json)).await.map_err(|_| {
        debug!("Client disconnected");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::similar_names)]
    fn test_ws_message_serialization() {
        let snapshot = WsMessage::Snapshot {
            sequence: 7,
            data: vec!["a@x.com"],
        };
        let json = serde_json::to_string(&snapshot).expect("Serialize");
        assert_eq!(json, r#"{"type":"snapshot","sequence":7,"data":["a@x.com"]}"#);

        let error = WsMessage::<()>::Error {
            message: "Store unavailable".to_string(),
        };
        let json = serde_json::to_string(&error).expect("Serialize");
        assert_eq!(json, r#"{"type":"error","message":"Store unavailable"}"#);

        let ping: WsMessage<serde_json::Value> =
            serde_json::from_str(r#"{"type":"ping"}"#).expect("Deserialize");
        assert_eq!(ping, WsMessage::Ping);

        let pong = serde_json::to_string(&WsMessage::<()>::Pong).expect("Serialize");
        assert_eq!(pong, r#"{"type":"pong"}"#);
    }

    fn assert_send<F: Send>(_: &F) {}

    // Axum spawns the upgraded connection, so the forwarding future must be `Send`.
    fn forward_live_feed(socket: WebSocket) {
        let feed = futures::stream::empty::<Result<(u64, Vec<String>), String>>();
        let future = forward(socket, feed);
        assert_send(&future);
    }

    #[test]
    fn test_forward_future_is_send() {
        let _: fn(WebSocket) = forward_live_feed;
    }
}
