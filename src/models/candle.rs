use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::pair::Pair;
use crate::services::candle_aggregator::format_price;

/// Longest accepted candle period: one year.
pub const MAX_PERIOD_SECONDS: u64 = 365 * 86_400;

/// Checks a requested period is in `1..=MAX_PERIOD_SECONDS`.
pub fn validate_period(period_seconds: u64) -> Result<u64, String> {
    match period_seconds {
        0 => Err("periodSeconds must be positive".to_string()),
        p if p > MAX_PERIOD_SECONDS => Err(format!(
            "periodSeconds must be at most {MAX_PERIOD_SECONDS}"
        )),
        p => Ok(p),
    }
}

/// OHLCV bucket for one pair, resolution and window start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candle {
    pub pair_id: i32,
    pub resolution_seconds: i64,
    pub datetime: DateTime<Utc>,
    pub open: U256,
    pub high: U256,
    pub low: U256,
    pub close: U256,
    pub volume: U256,
}

impl Candle {
    /// Starting point for a fold: `low` at the maximum so the first
    /// observation always replaces it.
    pub fn seed(pair_id: i32, resolution_seconds: i64, datetime: DateTime<Utc>) -> Self {
        Self {
            pair_id,
            resolution_seconds,
            datetime,
            open: U256::ZERO,
            high: U256::ZERO,
            low: U256::MAX,
            close: U256::ZERO,
            volume: U256::ZERO,
        }
    }
}

/// Candle as returned by the REST API and pushed over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleResponse {
    pub token0_id: String,
    pub token1_id: String,
    pub resolution_seconds: i64,
    pub datetime: DateTime<Utc>,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

impl CandleResponse {
    pub fn from_candle(pair: &Pair, candle: &Candle) -> Self {
        Self {
            token0_id: pair.token0_id.clone(),
            token1_id: pair.token1_id.clone(),
            resolution_seconds: candle.resolution_seconds,
            datetime: candle.datetime,
            open: format_price(candle.open),
            high: format_price(candle.high),
            low: format_price(candle.low),
            close: format_price(candle.close),
            volume: candle.volume.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalCandlesQuery {
    pub token0_id: String,
    pub token1_id: String,
    pub period_seconds: i64,
    /// Unix seconds, inclusive.
    pub start_time: Option<i64>,
    /// Unix seconds, inclusive.
    pub end_time: Option<i64>,
    pub limit: Option<usize>,
}

/// Query for starting or cancelling server-side historical indexing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalIndexingQuery {
    pub token0_id: String,
    pub token1_id: String,
    pub period_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
