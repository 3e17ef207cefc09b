use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::interval;

type Sink = SplitSink<WebSocket, Message>;

use crate::auth::apikey;
use crate::state::AppState;

use super::filter::Subscription;
use super::messages::{ClientMessage, ServerMessage};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const MAX_MISSED_PINGS: u32 = 3;

const CLOSE_INVALID_TOKEN: u16 = 4001;
const CLOSE_OVER_LIMIT: u16 = 4002;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    token: String,
}

/// `GET /v1/stream?token=<api_key>`. Authenticates the token
/// directly rather than through the Bearer-header middleware, since the
/// credential arrives as a query parameter on the upgrade request.
pub async fn stream(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hash = apikey::hash_key(&query.token);
    let key = match state.storage.authenticate(&hash).await {
        Ok(Some(key)) if key.is_active => key,
        _ => {
            return ws.on_upgrade(|socket| close_immediately(socket, CLOSE_INVALID_TOKEN, "invalid token"));
        }
    };

    let tenant_id = key.tenant_id.clone();
    let key_id = key.key_id.clone();

    ws.on_upgrade(move |socket| handle_socket(socket, state, tenant_id, key_id))
}

async fn close_immediately(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, tenant_id: String, key_id: String) {
    let Some((connection_id, mut outbox_rx, subscription)) = state.ws_registry.register(&tenant_id, &key_id) else {
        close_immediately(socket, CLOSE_OVER_LIMIT, "too many concurrent sockets for this key").await;
        return;
    };

    let (mut sink, mut stream) = socket.split();
    let missed_pings = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let mut ping_timer = interval(PING_INTERVAL);
    ping_timer.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            outgoing = outbox_rx.recv() => {
                match outgoing {
                    Some(msg) => {
                        if send_json(&mut sink, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_message(&text, &subscription, &mut sink, &missed_pings).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        missed_pings.store(0, Ordering::SeqCst);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = ping_timer.tick() => {
                if missed_pings.fetch_add(1, Ordering::SeqCst) + 1 > MAX_MISSED_PINGS {
                    break;
                }
                if send_json(&mut sink, &ServerMessage::Ping).await.is_err() {
                    break;
                }
            }
        }
    }

    state.ws_registry.remove(&tenant_id, connection_id);
}

/// Returns `false` if the connection should close.
async fn handle_client_message(
    text: &str,
    subscription: &Arc<tokio::sync::RwLock<Subscription>>,
    sink: &mut Sink,
    missed_pings: &Arc<std::sync::atomic::AtomicU32>,
) -> bool {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    match parsed {
        Ok(ClientMessage::Subscribe { channels, filters }) => {
            let mut sub = subscription.write().await;
            sub.channels = channels.into_iter().collect();
            sub.filter = filters;
            drop(sub);
            send_json(sink, &ServerMessage::Subscribed).await.is_ok()
        }
        Ok(ClientMessage::Unsubscribe { channels }) => {
            let mut sub = subscription.write().await;
            for c in channels {
                sub.channels.remove(&c);
            }
            true
        }
        Ok(ClientMessage::Ping) => {
            missed_pings.store(0, Ordering::SeqCst);
            send_json(
                sink,
                &ServerMessage::Pong {
                    server_time: Utc::now(),
                },
            )
            .await
            .is_ok()
        }
        Err(e) => {
            send_json(
                sink,
                &ServerMessage::Error {
                    message: format!("malformed message: {e}"),
                    details: None,
                },
            )
            .await
            .is_ok()
        }
    }
}

async fn send_json(sink: &mut Sink, msg: &ServerMessage) -> Result<(), ()> {
    let text = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(text)).await.map_err(|_| ())
}
