pub mod candles;
pub mod candles_ws;
pub mod historical_candles;
pub mod pairs;

use alloy::primitives::Address;
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;
use crate::error::ServiceError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/socket", get(candles_ws::candles_websocket))
        .route("/api/candles", get(candles::get_candles))
        .route("/api/pairs", get(pairs::get_pairs))
        .route(
            "/api/historicalcandles/start",
            post(historical_candles::start_indexing),
        )
        .route(
            "/api/historicalcandles/cancel",
            post(historical_candles::cancel_indexing),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_producers: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_producers: state.dispatcher.active_producers(),
    })
}

/// Rejects token ids that are not 20-byte hex addresses.
pub(crate) fn validate_token(field: &str, value: &str) -> Result<(), ServiceError> {
    value
        .trim()
        .parse::<Address>()
        .map(|_| ())
        .map_err(|_| ServiceError::BadRequest(format!("{field} is not a valid token address: {value}")))
}
