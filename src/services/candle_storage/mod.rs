//! Storage collaborator for pairs, candles, decoded swaps and indexer
//! checkpoints.

mod memory;
mod postgres;

pub use memory::MemoryCandleStorage;
pub use postgres::SeaOrmCandleStorage;

use alloy::primitives::Address;
use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;

use crate::models::candle::Candle;
use crate::models::pair::Pair;
use crate::models::swap::{IndexedBlock, SwapFlow};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },
}

impl From<DbErr> for StorageError {
    fn from(err: DbErr) -> Self {
        StorageError::Database(err.to_string())
    }
}

#[async_trait]
pub trait CandleStorage: Send + Sync {
    async fn fetch_pairs(&self) -> Result<Vec<Pair>, StorageError>;

    /// Exact match on the (already lowercased) token addresses.
    async fn fetch_pair(&self, token0_id: &str, token1_id: &str) -> Result<Option<Pair>, StorageError>;

    /// Inserts the pair unless it already exists. Safe to race.
    async fn add_pair(&self, token0_id: &str, token1_id: &str) -> Result<(), StorageError>;

    /// Candles for one pair and resolution, oldest first.
    async fn fetch_candles(&self, pair_id: i32, period_seconds: i64) -> Result<Vec<Candle>, StorageError>;

    /// Inserts or replaces the candle at (pair, resolution, datetime).
    async fn add_candle(&self, candle: &Candle) -> Result<(), StorageError>;

    /// Stores a block's swaps and, when `cursor` is given, advances that
    /// checkpoint to the block, all in one transaction. Re-committing a block
    /// is a no-op for swaps already stored.
    async fn commit_block(&self, block: &IndexedBlock, cursor: Option<&str>) -> Result<(), StorageError>;

    /// Stored swaps between `token_a` and `token_b`, in either direction,
    /// from blocks `[from_block, to_block)` in chain order.
    async fn fetch_swap_flows(
        &self,
        token_a: Address,
        token_b: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SwapFlow>, StorageError>;

    async fn last_indexed_block(&self, cursor: &str) -> Result<Option<u64>, StorageError>;

    async fn record_failure(&self, cursor: &str, error: &str) -> Result<(), StorageError>;
}
