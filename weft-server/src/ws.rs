//! Axum WebSocket adapter over the transport-agnostic `Hub`. This file is
//! the only place that knows about `axum::extract::ws`; everything else
//! talks to `Hub`/`ConnectionSink`.

use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;
use weft_core::hub::ConnectionSink;
use weft_core::model::new_id;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.authorize(&headers) {
        // axum has no native "reject with WS close code" at the HTTP layer
        // for an upgrade; closest equivalent is completing the handshake
        // and immediately closing with a 4401-class code.
        return ws.on_upgrade(|socket| async move {
            close_immediately(socket, 4401, "unauthorized").await;
        });
    }
    let project_id = headers
        .get("x-project-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("default")
        .to_string();
    ws.on_upgrade(move |socket| handle(socket, state, project_id))
}

async fn close_immediately(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame { code, reason: Cow::Owned(reason.to_string()) })))
        .await;
}

/// Queues outbound frames for the forwarding task; the Hub's `ConnectionSink`
/// contract is synchronous, so it can't hold the async sink directly.
struct QueueSink {
    tx: UnboundedSender<Message>,
}

impl ConnectionSink for QueueSink {
    fn send_bytes(&self, bytes: Arc<Vec<u8>>) {
        let _ = self.tx.send(Message::Binary((*bytes).clone()));
    }

    fn send_ping(&self) {
        let _ = self.tx.send(Message::Ping(Vec::new()));
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Message::Close(Some(CloseFrame { code, reason: Cow::Owned(reason.to_string()) })));
    }
}

async fn handle(socket: WebSocket, state: AppState, project_id: String) {
    let ctx = state.projects.get_or_create(&project_id).await;
    let conn_id = new_id();
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let sink: Arc<dyn ConnectionSink> = Arc::new(QueueSink { tx: tx.clone() });
    ctx.hub.register(conn_id.clone(), sink);
    debug!(conn_id = %conn_id, project_id = %project_id, "websocket connected");

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let reply = ctx.hub.handle_inbound(&conn_id, &text);
                if let Ok(reply_text) = String::from_utf8(reply) {
                    let _ = tx.send(Message::Text(reply_text));
                }
            }
            Message::Pong(_) => ctx.hub.mark_alive(&conn_id),
            Message::Close(_) => break,
            _ => {}
        }
    }

    ctx.hub.remove(&conn_id);
    forward_task.abort();
    debug!(conn_id = %conn_id, "websocket disconnected");
}
