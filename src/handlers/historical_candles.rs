//! Server-owned historical producers, started and stopped over HTTP.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use uuid::Uuid;

use crate::AppState;
use crate::error::ServiceError;
use crate::handlers::validate_token;
use crate::models::candle::{Candle, HistoricalIndexingQuery, MessageResponse, validate_period};
use crate::models::pair::Pair;
use crate::services::subscription_dispatcher::{Channel, PushCallback, SubscribeOutcome, SubscriptionKey};

/// Subscriber id the server itself holds on historical keys.
pub const SERVER_SUBSCRIBER: Uuid = Uuid::nil();

pub const STARTED: &str = "Indexing started successfully";
pub const ALREADY_STARTED: &str = "Indexing has already been started";
pub const CANCELED: &str = "Indexing canceled successfully";

fn key(query: &HistoricalIndexingQuery, pair: Pair) -> Result<SubscriptionKey, ServiceError> {
    let period_seconds = validate_period(query.period_seconds).map_err(ServiceError::BadRequest)?;
    Ok(SubscriptionKey {
        pair,
        period_seconds,
        channel: Channel::Historical,
    })
}

/// Handler for POST /api/historicalcandles/start
pub async fn start_indexing(
    State(state): State<AppState>,
    Query(query): Query<HistoricalIndexingQuery>,
) -> Result<Json<MessageResponse>, ServiceError> {
    validate_token("token0Id", &query.token0_id)?;
    validate_token("token1Id", &query.token1_id)?;

    let pair = state.pairs.get_or_create(&query.token0_id, &query.token1_id).await?;
    let key = key(&query, pair)?;

    // candles are persisted by the producer; nothing to forward
    let discard: PushCallback = Arc::new(|_: &SubscriptionKey, _: &Candle| {});
    let outcome = state.dispatcher.subscribe(key, SERVER_SUBSCRIBER, discard);
    if outcome != SubscribeOutcome::Started {
        return Ok(Json(MessageResponse {
            message: ALREADY_STARTED.to_string(),
        }));
    }

    tracing::info!(
        "Historical indexing started for {}/{} every {}s",
        query.token0_id,
        query.token1_id,
        query.period_seconds
    );
    Ok(Json(MessageResponse {
        message: STARTED.to_string(),
    }))
}

/// Handler for POST /api/historicalcandles/cancel
pub async fn cancel_indexing(
    State(state): State<AppState>,
    Query(query): Query<HistoricalIndexingQuery>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let not_started = || {
        ServiceError::BadRequest(format!(
            "indexing for {}/{} every {}s has not been started",
            query.token0_id, query.token1_id, query.period_seconds
        ))
    };

    let pair = state
        .pairs
        .find(&query.token0_id, &query.token1_id)
        .await?
        .ok_or_else(not_started)?;
    let key = key(&query, pair)?;

    state
        .dispatcher
        .unsubscribe(&key, SERVER_SUBSCRIBER)
        .map_err(|_| not_started())?;

    tracing::info!(
        "Historical indexing canceled for {}/{} every {}s",
        query.token0_id,
        query.token1_id,
        query.period_seconds
    );
    Ok(Json(MessageResponse {
        message: CANCELED.to_string(),
    }))
}
