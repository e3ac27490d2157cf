//! Shared lookup-or-create for trading pairs.
//!
//! Addresses are lowercased before every lookup. Token order is kept as
//! given: (A, B) and (B, A) are different pairs.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::error::ServiceError;
use crate::models::pair::Pair;
use crate::services::candle_storage::{CandleStorage, StorageError};

#[derive(Clone)]
pub struct PairCatalog {
    storage: Arc<dyn CandleStorage>,
    cache: Arc<Cache<(String, String), Pair>>,
}

pub fn normalize_token(token: &str) -> String {
    token.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, thiserror::Error)]
enum CreateError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("pair {0}/{1} was not readable after insert")]
    Missing(String, String),
}

impl PairCatalog {
    pub fn new(storage: Arc<dyn CandleStorage>) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Self {
            storage,
            cache: Arc::new(cache),
        }
    }

    /// Returns the pair if it already exists.
    pub async fn find(&self, token0_id: &str, token1_id: &str) -> Result<Option<Pair>, StorageError> {
        let key = (normalize_token(token0_id), normalize_token(token1_id));
        if let Some(pair) = self.cache.get(&key).await {
            return Ok(Some(pair));
        }

        let pair = self.storage.fetch_pair(&key.0, &key.1).await?;
        if let Some(pair) = &pair {
            self.cache.insert(key, pair.clone()).await;
        }
        Ok(pair)
    }

    /// Returns the canonical pair, creating it on first reference. Concurrent
    /// callers for the same key share one initialization; callers racing from
    /// other processes are settled by the storage's unique index and a
    /// re-fetch.
    pub async fn get_or_create(&self, token0_id: &str, token1_id: &str) -> Result<Pair, ServiceError> {
        let key = (normalize_token(token0_id), normalize_token(token1_id));
        let storage = self.storage.clone();
        let (token0, token1) = key.clone();

        self.cache
            .try_get_with(key, async move {
                if let Some(pair) = storage.fetch_pair(&token0, &token1).await? {
                    return Ok(pair);
                }

                storage.add_pair(&token0, &token1).await?;
                tracing::info!("Created pair {}/{}", token0, token1);

                storage
                    .fetch_pair(&token0, &token1)
                    .await?
                    .ok_or(CreateError::Missing(token0, token1))
            })
            .await
            .map_err(|err: Arc<CreateError>| match err.as_ref() {
                CreateError::Storage(e) => ServiceError::Storage(e.clone()),
                CreateError::Missing(..) => ServiceError::ConcurrencyConflict(err.to_string()),
            })
    }

    pub async fn list(&self) -> Result<Vec<Pair>, StorageError> {
        self.storage.fetch_pairs().await
    }
}
