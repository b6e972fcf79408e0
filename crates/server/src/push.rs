//! WebSocket push channel and its liveness probe.
//!
//! A connected client receives every notification of its user as a JSON
//! [`PushEvent`]. The connection is registered in the engine's dispatcher
//! for its whole lifetime and released when the socket closes.

use std::{sync::Arc, time::Duration};

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use engine::{Dispatcher, PushEvent, User};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};

use crate::server::ServerState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(45);

pub async fn connect(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let dispatcher = state.engine.dispatcher().clone();
    ws.on_upgrade(move |socket| push_socket(socket, dispatcher, user.id))
}

async fn push_socket(mut socket: WebSocket, dispatcher: Arc<Dispatcher>, user_id: String) {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let channel_id = dispatcher.register(&user_id, sender);
    tracing::info!(user_id = %user_id, "push channel opened");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        last_seen = Instant::now();
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => last_seen = Instant::now(),
                }
            }
            outgoing = receiver.recv() => {
                // `None` means a newer connection replaced this one.
                let Some(event) = outgoing else {
                    break;
                };
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > CLIENT_TIMEOUT {
                    tracing::info!(user_id = %user_id, "push client timed out");
                    break;
                }
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    dispatcher.release(&user_id, channel_id);
    tracing::info!(user_id = %user_id, "push channel closed");
}

async fn send_event(socket: &mut WebSocket, event: &PushEvent) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(payload.into())).await
}

/// Periodically drop channels whose connection task is gone.
pub(crate) fn spawn_liveness_probe(dispatcher: Arc<Dispatcher>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = dispatcher.evict_dead();
            tracing::debug!(evicted, connected = dispatcher.connected(), "liveness probe");
        }
    })
}
