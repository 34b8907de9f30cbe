//! Per-connection lifecycle task.
//!
//! Each authenticated WebSocket runs one actor: a writer task owns the sink
//! and drains an mpsc channel, while this task reads inbound frames solely
//! for liveness (ping/pong/close). Inbound frame content is not interpreted
//! as application commands — outbound pushes are the only application I/O.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::{broadcast, ConnectionHandle, DeliveryEvent, PushError, UserId};

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Detects half-dead sockets that would otherwise leak registry entries.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handle backed by the actor's outbound mpsc channel.
/// Pushes serialize the event to JSON text and enqueue it; the enqueue never
/// blocks, so a slow consumer cannot stall a broadcast.
pub struct WsHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl WsHandle {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }
}

impl ConnectionHandle for WsHandle {
    fn push(&self, event: &DeliveryEvent) -> Result<(), PushError> {
        let text = serde_json::to_string(event).map_err(PushError::Encode)?;
        self.tx
            .send(Message::Text(text.into()))
            .map_err(|_| PushError::Closed)
    }
}

/// Run the full lifecycle for an authenticated connection: register, announce
/// presence, block on the read loop until error or close, then deregister and
/// re-announce. Returns when the connection is closed; a failure here is
/// terminal for this connection only.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: UserId) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle: Arc<dyn ConnectionHandle> = Arc::new(WsHandle::new(tx.clone()));
    state.connections.register(user_id, Arc::clone(&handle));
    broadcast::announce_presence(&state.connections);

    tracing::info!(user_id, "WebSocket connection active");

    // Writer task: owns the sink, forwards queued messages.
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Ping task: periodic pings, closes the connection on pong timeout.
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Read loop: liveness only.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Close(frame) => {
                    tracing::info!(user_id, reason = ?frame, "Client initiated close");
                    break;
                }
                Message::Text(_) | Message::Binary(_) => {
                    // Inbound frames only prove the socket is alive.
                    tracing::trace!(user_id, "Ignoring inbound application frame");
                }
            },
            Some(Err(e)) => {
                tracing::warn!(user_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                tracing::info!(user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    // Guarded removal: a reconnect may already have replaced our entry, in
    // which case the new connection's registration must survive.
    state.connections.remove_if_same(user_id, &handle);
    broadcast::announce_presence(&state.connections);

    tracing::info!(user_id, "WebSocket connection closed");
}

/// Writer task: receives messages from the mpsc channel and forwards them to
/// the WebSocket sink. Exits on the first failed send, which makes every
/// subsequent push through the handle fail and triggers eviction.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}
