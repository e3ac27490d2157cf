//! WebSocket endpoint for live and historical candle subscriptions.
//!
//! Clients send `{"event": "subscribe" | "unsubscribe", "channel", "token0Id",
//! "token1Id", "periodSeconds"}`. Candles arrive as `{"event": "candle", ...}`.
//! A raw `PING` text frame is answered with `PONG`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::ServiceError;
use crate::handlers::validate_token;
use crate::models::candle::{Candle, CandleResponse};
use crate::models::pair::Pair;
use crate::models::ws::{CandleChannelRequest, ClientRequest, ServerMessage, SubscriptionAck};
use crate::services::subscription_dispatcher::{PushCallback, SubscribeOutcome, SubscriptionKey};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// GET /socket
pub async fn candles_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut inbox) = mpsc::unbounded_channel::<ServerMessage>();

    info!(%connection_id, "New candles WebSocket connection");

    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            Some(message) = inbox.recv() => {
                if let Err(e) = send_message(&mut sender, &message).await {
                    debug!("WebSocket send error: {}", e);
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if let Err(e) = send_message(&mut sender, &ServerMessage::heartbeat()).await {
                    debug!("Heartbeat failed: {}", e);
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = if text.as_str().trim() == "PING" {
                            sender.send(Message::Text("PONG".into())).await
                        } else {
                            let reply = handle_text(&state, connection_id, &outbox, text.as_str()).await;
                            send_message(&mut sender, &reply).await
                        };
                        if let Err(e) = reply {
                            debug!("WebSocket send error: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(%connection_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    let left = state.dispatcher.unsubscribe_all(connection_id);
    info!(%connection_id, subscriptions = left, "Candles WebSocket connection closed");
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize socket message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

/// Parses one client frame and applies it. Failures become an error event.
pub async fn handle_text(
    state: &AppState,
    subscriber: Uuid,
    outbox: &UnboundedSender<ServerMessage>,
    text: &str,
) -> ServerMessage {
    let request = match serde_json::from_str::<ClientRequest>(text) {
        Ok(request) => request,
        Err(e) => return ServerMessage::error(format!("invalid request: {e}")),
    };

    match process_request(state, subscriber, outbox, request).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!(%subscriber, error = %e, "Rejected socket request");
            ServerMessage::error(e.to_string())
        }
    }
}

/// Pushes candles for `key` into a connection's outbox.
fn forward_to(outbox: UnboundedSender<ServerMessage>) -> PushCallback {
    Arc::new(move |key: &SubscriptionKey, candle: &Candle| {
        let _ = outbox.send(ServerMessage::Candle(CandleResponse::from_candle(&key.pair, candle)));
    })
}

fn ack(request: &CandleChannelRequest, pair: &Pair, period_seconds: u64) -> SubscriptionAck {
    SubscriptionAck {
        channel: request.channel,
        token0_id: pair.token0_id.clone(),
        token1_id: pair.token1_id.clone(),
        period_seconds,
    }
}

pub async fn process_request(
    state: &AppState,
    subscriber: Uuid,
    outbox: &UnboundedSender<ServerMessage>,
    request: ClientRequest,
) -> Result<ServerMessage, ServiceError> {
    match request {
        ClientRequest::Subscribe(request) => {
            let period = request.period().map_err(ServiceError::BadRequest)?;
            validate_token("token0Id", &request.token0_id)?;
            validate_token("token1Id", &request.token1_id)?;

            let pair = state
                .pairs
                .get_or_create(&request.token0_id, &request.token1_id)
                .await?;
            let key = SubscriptionKey {
                pair: pair.clone(),
                period_seconds: period,
                channel: request.channel,
            };

            match state.dispatcher.subscribe(key, subscriber, forward_to(outbox.clone())) {
                SubscribeOutcome::Started => {
                    debug!(%subscriber, pair_id = pair.id, period, "Subscribed, producer started")
                }
                SubscribeOutcome::Joined { subscribers } => {
                    debug!(%subscriber, pair_id = pair.id, period, subscribers, "Subscribed to running producer")
                }
                SubscribeOutcome::AlreadySubscribed => {
                    debug!(%subscriber, pair_id = pair.id, period, "Already subscribed, callback replaced")
                }
            }
            Ok(ServerMessage::Subscribed(ack(&request, &pair, period)))
        }
        ClientRequest::Unsubscribe(request) => {
            let period = request.period().map_err(ServiceError::BadRequest)?;
            let pair = state
                .pairs
                .find(&request.token0_id, &request.token1_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "pair {}/{} not found",
                        request.token0_id, request.token1_id
                    ))
                })?;
            let key = SubscriptionKey {
                pair: pair.clone(),
                period_seconds: period,
                channel: request.channel,
            };

            state
                .dispatcher
                .unsubscribe(&key, subscriber)
                .map_err(|e| ServiceError::NotFound(e.to_string()))?;
            Ok(ServerMessage::Unsubscribed(ack(&request, &pair, period)))
        }
    }
}
