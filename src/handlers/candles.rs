use axum::{
    Json,
    extract::{Query, State},
};

use crate::AppState;
use crate::error::ServiceError;
use crate::models::candle::{Candle, CandleResponse, HistoricalCandlesQuery, validate_period};

pub const DEFAULT_LIMIT: usize = 10;

/// Handler for GET /api/candles
/// Stored candles for a pair and resolution, newest first.
pub async fn get_candles(
    State(state): State<AppState>,
    Query(query): Query<HistoricalCandlesQuery>,
) -> Result<Json<Vec<CandleResponse>>, ServiceError> {
    let period_seconds = u64::try_from(query.period_seconds)
        .map_err(|_| "periodSeconds must be positive".to_string())
        .and_then(validate_period)
        .map_err(ServiceError::BadRequest)?;

    let pair = state
        .pairs
        .find(&query.token0_id, &query.token1_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "pair {}/{} not found",
                query.token0_id, query.token1_id
            ))
        })?;

    let candles = state.storage.fetch_candles(pair.id, period_seconds as i64).await?;
    tracing::debug!(
        pair_id = pair.id,
        period = query.period_seconds,
        stored = candles.len(),
        "Serving historical candles"
    );

    let selected = select_candles(candles, query.start_time, query.end_time, query.limit);
    Ok(Json(
        selected
            .iter()
            .map(|candle| CandleResponse::from_candle(&pair, candle))
            .collect(),
    ))
}

/// Keeps candles whose window start lies in `[start, end]` (unix seconds),
/// newest first, at most `limit` of them.
pub fn select_candles(
    candles: Vec<Candle>,
    start: Option<i64>,
    end: Option<i64>,
    limit: Option<usize>,
) -> Vec<Candle> {
    let mut selected: Vec<Candle> = candles
        .into_iter()
        .filter(|c| start.is_none_or(|s| c.datetime.timestamp() >= s))
        .filter(|c| end.is_none_or(|e| c.datetime.timestamp() <= e))
        .collect();

    selected.sort_by(|a, b| b.datetime.cmp(&a.datetime));
    selected.truncate(limit.unwrap_or(DEFAULT_LIMIT));
    selected
}
