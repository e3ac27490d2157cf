//! Chain collaborator: block height, block bodies and receipts.

use std::sync::Arc;

use alloy::network::TransactionResponse;
use alloy::primitives::{Address, B256, Bytes};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::BlockNumberOrTag;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use thiserror::Error;

use crate::models::swap::LogEntry;
use crate::services::retry::{RetryConfig, with_retry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Timeouts, transport failures, blocks or receipts not yet available.
    #[error("transient RPC error: {0}")]
    Transient(String),

    #[error("{call} failed after {attempts} attempts: {message}")]
    Fatal {
        call: String,
        attempts: u32,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
    pub transaction_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub number: u64,
    pub timestamp: u64,
    pub transactions: Vec<ChainTransaction>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn block(&self, number: u64) -> Result<ChainBlock, ChainError>;

    async fn block_timestamp(&self, number: u64) -> Result<u64, ChainError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Vec<LogEntry>, ChainError>;
}

fn transient(err: impl std::fmt::Display) -> ChainError {
    ChainError::Transient(err.to_string())
}

/// JSON-RPC client over HTTP.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: DynProvider,
}

impl RpcChainClient {
    pub fn new(rpc_url: &str) -> Result<Self, ChainError> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| ChainError::Fatal {
                call: "connect".to_string(),
                attempts: 0,
                message: format!("invalid RPC url {rpc_url}: {e}"),
            })?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider.get_block_number().await.map_err(transient)
    }

    async fn block(&self, number: u64) -> Result<ChainBlock, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .full()
            .await
            .map_err(transient)?
            .ok_or_else(|| ChainError::Transient(format!("block {number} not available")))?;

        let transactions = block
            .transactions
            .txns()
            .enumerate()
            .map(|(position, tx)| ChainTransaction {
                hash: TransactionResponse::tx_hash(tx),
                from: TransactionResponse::from(tx),
                to: alloy::consensus::Transaction::to(tx),
                input: alloy::consensus::Transaction::input(tx).clone(),
                transaction_index: tx.transaction_index.unwrap_or(position as u64),
            })
            .collect();

        Ok(ChainBlock {
            number,
            timestamp: block.header.timestamp,
            transactions,
        })
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(transient)?
            .ok_or_else(|| ChainError::Transient(format!("block {number} not available")))?;
        Ok(block.header.timestamp)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Vec<LogEntry>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(transient)?
            .ok_or_else(|| ChainError::Transient(format!("receipt for {hash} not available")))?;

        Ok(receipt
            .inner
            .logs()
            .iter()
            .enumerate()
            .map(|(position, log)| LogEntry {
                address: log.address(),
                topics: log.topics().to_vec(),
                data: log.data().data.clone(),
                log_index: log.log_index.unwrap_or(position as u64),
            })
            .collect())
    }
}

/// Wraps any [`ChainClient`] so that every call is bounded by a timeout and
/// retried with exponential backoff.
#[derive(Clone)]
pub struct RetryingChainClient {
    inner: Arc<dyn ChainClient>,
    config: RetryConfig,
}

impl RetryingChainClient {
    pub fn new(inner: Arc<dyn ChainClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ChainClient for RetryingChainClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        with_retry(&self.config, "eth_blockNumber", || self.inner.block_number()).await
    }

    async fn block(&self, number: u64) -> Result<ChainBlock, ChainError> {
        with_retry(&self.config, "eth_getBlockByNumber", || self.inner.block(number)).await
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, ChainError> {
        with_retry(&self.config, "eth_getBlockByNumber", || {
            self.inner.block_timestamp(number)
        })
        .await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Vec<LogEntry>, ChainError> {
        with_retry(&self.config, "eth_getTransactionReceipt", || {
            self.inner.transaction_receipt(hash)
        })
        .await
    }
}
