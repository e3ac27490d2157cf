use std::collections::{BTreeMap, HashMap};

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{CandleStorage, StorageError};
use crate::models::candle::Candle;
use crate::models::pair::Pair;
use crate::models::swap::{IndexedBlock, StoredSwap, SwapFlow};

#[derive(Default)]
struct MemoryState {
    pairs: Vec<Pair>,
    candles: BTreeMap<(i32, i64, DateTime<Utc>), Candle>,
    swaps: BTreeMap<(B256, u64), StoredSwap>,
    checkpoints: HashMap<String, u64>,
    failures: HashMap<String, Vec<String>>,
    commit_log: Vec<u64>,
}

/// Process-local storage with the same semantics as the database backend.
#[derive(Default)]
pub struct MemoryCandleStorage {
    state: Mutex<MemoryState>,
}

impl MemoryCandleStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block numbers in the order `commit_block` was called.
    pub fn committed_blocks(&self) -> Vec<u64> {
        self.state.lock().commit_log.clone()
    }

    /// All stored swaps in chain order.
    pub fn swaps(&self) -> Vec<StoredSwap> {
        let mut swaps: Vec<StoredSwap> = self.state.lock().swaps.values().cloned().collect();
        swaps.sort_by_key(|s| (s.block_number, s.transaction_index, s.log_index));
        swaps
    }

    pub fn failures(&self, cursor: &str) -> Vec<String> {
        self.state.lock().failures.get(cursor).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CandleStorage for MemoryCandleStorage {
    async fn fetch_pairs(&self) -> Result<Vec<Pair>, StorageError> {
        Ok(self.state.lock().pairs.clone())
    }

    async fn fetch_pair(&self, token0_id: &str, token1_id: &str) -> Result<Option<Pair>, StorageError> {
        Ok(self
            .state
            .lock()
            .pairs
            .iter()
            .find(|p| p.token0_id == token0_id && p.token1_id == token1_id)
            .cloned())
    }

    async fn add_pair(&self, token0_id: &str, token1_id: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let exists = state
            .pairs
            .iter()
            .any(|p| p.token0_id == token0_id && p.token1_id == token1_id);
        if !exists {
            let id = state.pairs.len() as i32 + 1;
            state.pairs.push(Pair {
                id,
                token0_id: token0_id.to_string(),
                token1_id: token1_id.to_string(),
            });
        }
        Ok(())
    }

    async fn fetch_candles(&self, pair_id: i32, period_seconds: i64) -> Result<Vec<Candle>, StorageError> {
        Ok(self
            .state
            .lock()
            .candles
            .values()
            .filter(|c| c.pair_id == pair_id && c.resolution_seconds == period_seconds)
            .cloned()
            .collect())
    }

    async fn add_candle(&self, candle: &Candle) -> Result<(), StorageError> {
        self.state.lock().candles.insert(
            (candle.pair_id, candle.resolution_seconds, candle.datetime),
            candle.clone(),
        );
        Ok(())
    }

    async fn commit_block(&self, block: &IndexedBlock, cursor: Option<&str>) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        for swap in &block.swaps {
            state
                .swaps
                .entry((swap.tx_hash, swap.log_index))
                .or_insert_with(|| swap.clone());
        }
        if let Some(cursor) = cursor {
            state.checkpoints.insert(cursor.to_string(), block.number);
        }
        state.commit_log.push(block.number);
        Ok(())
    }

    async fn fetch_swap_flows(
        &self,
        token_a: Address,
        token_b: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SwapFlow>, StorageError> {
        Ok(self
            .swaps()
            .into_iter()
            .filter(|s| (from_block..to_block).contains(&s.block_number))
            .map(|s| s.record.flow())
            .filter(|flow| flow.involves_pair(token_a, token_b))
            .collect())
    }

    async fn last_indexed_block(&self, cursor: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.state.lock().checkpoints.get(cursor).copied())
    }

    async fn record_failure(&self, cursor: &str, error: &str) -> Result<(), StorageError> {
        self.state
            .lock()
            .failures
            .entry(cursor.to_string())
            .or_default()
            .push(error.to_string());
        Ok(())
    }
}
