//! WebSocket transport for walls
//!
//! The wall is identified by its `wallId` cookie. Client frames are JSON:
//! `{"type": "subscribe", "hashtag": "rust"}` and `{"type": "terminate", "hashtag": "rust"}`.
//! Every server frame is `{"destination": ..., "payload": ...}`; acknowledgements go to the
//! `/user/topic/*` destinations, notifications to `/topic/hashtags/{wall}/{hashtag}/{kind}`.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use futures::{Sink, SinkExt, StreamExt};
use glacier_core::models::Principal;
use glacier_core::service::SubscriptionControl;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::http::info::wall_id_from;
use crate::http::AppState;
use crate::hub::ServerFrame;

pub const SUBSCRIPTIONS_DESTINATION: &str = "/user/topic/subscriptions";
pub const TERMINATIONS_DESTINATION: &str = "/user/topic/terminations";
pub const ERRORS_DESTINATION: &str = "/user/topic/errors";

/// Frames queued per connection before notifications are dropped for a slow client
const FRAME_BUFFER: usize = 256;

/// How long a closing connection may spend flushing queued frames
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// Request sent by a wall
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe { hashtag: String },
    Terminate { hashtag: String },
}

/// WebSocket handler for wall connections
pub async fn websocket_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let wall_id = wall_id_from(&jar);
    ws.max_message_size(64 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, state, wall_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, wall_id: Option<String>) {
    let connection_id = Uuid::new_v4().to_string();
    let principal = wall_id.as_deref().and_then(|id| Principal::new(id).ok());
    let (tx, rx) = mpsc::channel::<ServerFrame>(FRAME_BUFFER);

    match &principal {
        Some(p) => state
            .hub
            .register(p, connection_id.clone(), tx.clone(), || {
                state.reconciler.on_connect(Some(p.as_str()));
            }),
        None => state.reconciler.on_connect(None),
    }
    info!(
        wall_id = wall_id.as_deref().unwrap_or(""),
        connection_id = %connection_id,
        "WebSocket connection established"
    );

    let (sink, mut stream) = socket.split();

    let writer = spawn_writer(sink, rx);

    let principal_id = principal.as_ref().map_or("", Principal::as_str);
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let reply = handle_client_frame(&state.control, principal_id, text.as_str());
                if tx.send(reply).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    if let Some(p) = &principal {
        state.hub.unregister(p, &connection_id, || {
            state.reconciler.on_disconnect(Some(p.as_str()));
        });
    }
    // the hub no longer holds a sender, so the writer ends once the queue is flushed
    drop(tx);
    if !drain_writer(writer, WRITER_DRAIN).await {
        debug!(connection_id = %connection_id, "Writer did not drain in time");
    }

    info!(
        wall_id = principal_id,
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}

/// Forward queued frames to the socket until every sender is gone or the socket fails.
fn spawn_writer<S>(mut sink: S, mut rx: mpsc::Receiver<ServerFrame>) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: std::fmt::Display,
{
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(destination = %frame.destination, error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!(error = %e, "WebSocket send failed");
                break;
            }
        }
    })
}

/// Wait up to `limit` for the writer to flush; abort it otherwise. Returns whether it finished.
async fn drain_writer(mut writer: JoinHandle<()>, limit: Duration) -> bool {
    if tokio::time::timeout(limit, &mut writer).await.is_ok() {
        true
    } else {
        writer.abort();
        false
    }
}

/// Apply one client frame and build the acknowledgement to send back.
pub fn handle_client_frame(control: &SubscriptionControl, principal: &str, text: &str) -> ServerFrame {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Subscribe { hashtag }) => {
            reply(SUBSCRIPTIONS_DESTINATION, &control.subscribe(principal, &hashtag))
        }
        Ok(ClientFrame::Terminate { hashtag }) => {
            reply(TERMINATIONS_DESTINATION, &control.unsubscribe(principal, &hashtag))
        }
        Err(e) => {
            debug!(principal, error = %e, "Unparseable client frame");
            reply(
                ERRORS_DESTINATION,
                &ErrorPayload {
                    error: format!("Invalid frame: {e}"),
                },
            )
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
}

fn reply(destination: &str, payload: &impl Serialize) -> ServerFrame {
    ServerFrame::new(destination, payload).unwrap_or_else(|e| ServerFrame {
        destination: ERRORS_DESTINATION.to_string(),
        payload: serde_json::Value::String(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_parsing() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"subscribe","hashtag":"rust"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Subscribe {
                hashtag: "rust".to_string()
            }
        );

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"terminate","hashtag":"cats"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Terminate {
                hashtag: "cats".to_string()
            }
        );

        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"subscribe"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"Subscribe","hashtag":"x"}"#).is_err());
    }

    fn frame(id: &str) -> ServerFrame {
        ServerFrame::new(SUBSCRIPTIONS_DESTINATION, &serde_json::json!({ "id": id })).unwrap()
    }

    #[tokio::test]
    async fn test_closing_connection_flushes_queued_frames() {
        let (tx, rx) = mpsc::channel(8);
        for id in ["1", "2", "3"] {
            tx.send(frame(id)).await.unwrap();
        }
        drop(tx);

        let (sink, socket) = futures::channel::mpsc::unbounded::<Message>();
        let writer = spawn_writer(sink, rx);
        assert!(drain_writer(writer, Duration::from_secs(1)).await);

        let sent: Vec<String> = socket
            .map(|message| match message {
                Message::Text(text) => text.as_str().to_string(),
                other => panic!("unexpected message {other:?}"),
            })
            .collect()
            .await;
        assert_eq!(sent.len(), 3);
        assert!(sent[2].contains(r#""id":"3""#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_writer_is_aborted_after_limit() {
        let (tx, rx) = mpsc::channel(8);
        let (sink, _socket) = futures::channel::mpsc::unbounded::<Message>();
        let writer = spawn_writer(sink, rx);

        // a live sender keeps the writer waiting
        assert!(!drain_writer(writer, Duration::from_secs(1)).await);
        drop(tx);
    }
}
