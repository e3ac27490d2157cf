use axum::{Json, extract::State};

use crate::AppState;
use crate::error::ServiceError;
use crate::models::pair::PairResponse;

/// Handler for GET /api/pairs
pub async fn get_pairs(State(state): State<AppState>) -> Result<Json<Vec<PairResponse>>, ServiceError> {
    let pairs = state.pairs.list().await?;
    tracing::debug!("Listing {} pairs", pairs.len());
    Ok(Json(pairs.into_iter().map(PairResponse::from).collect()))
}
