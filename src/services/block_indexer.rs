//! Block range indexing: chunked backfill, continuous polling and
//! timestamp-to-block resolution.
//!
//! Chunks of a backfill are fetched concurrently but committed strictly in
//! ascending block order, so storage only ever grows as a contiguous prefix.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt, stream};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IndexerConfig;
use crate::models::swap::{IndexedBlock, StoredSwap, TransactionRecord};
use crate::services::candle_storage::{CandleStorage, StorageError};
use crate::services::chain::{ChainClient, ChainError};
use crate::services::event_decoder::EventDecoder;

/// Checkpoint names in `sync_status`.
pub mod cursors {
    pub const LIVE: &str = "block_indexer_live";
    pub const BACKFILL: &str = "block_indexer_backfill";
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Transactions of one block that went to a monitored router, with receipts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransactions {
    pub number: u64,
    pub timestamp: u64,
    pub transactions: Vec<TransactionRecord>,
}

/// Fetches and decodes blocks. Cheap to clone and safe to move into tasks.
#[derive(Clone)]
pub struct BlockFetcher {
    chain: Arc<dyn ChainClient>,
    decoder: Arc<EventDecoder>,
    concurrency: usize,
}

impl BlockFetcher {
    pub fn new(chain: Arc<dyn ChainClient>, decoder: Arc<EventDecoder>, concurrency: usize) -> Self {
        Self {
            chain,
            decoder,
            concurrency: concurrency.max(1),
        }
    }

    pub fn decoder(&self) -> &EventDecoder {
        &self.decoder
    }

    pub async fn head(&self) -> Result<u64, ChainError> {
        self.chain.block_number().await
    }

    /// Block body plus receipts for the transactions sent to monitored
    /// contracts. Other transactions are dropped without a receipt fetch.
    pub async fn fetch_transactions(&self, number: u64) -> Result<BlockTransactions, ChainError> {
        let block = self.chain.block(number).await?;

        let mut transactions = Vec::new();
        for tx in block.transactions {
            if !self.decoder.is_monitored(tx.to) {
                continue;
            }
            let logs = self.chain.transaction_receipt(tx.hash).await?;
            transactions.push(TransactionRecord {
                hash: tx.hash,
                from: tx.from,
                to: tx.to,
                input: tx.input,
                logs,
                block_number: block.number,
                block_timestamp: block.timestamp,
                transaction_index: tx.transaction_index,
            });
        }
        transactions.sort_by_key(|tx| tx.transaction_index);

        Ok(BlockTransactions {
            number: block.number,
            timestamp: block.timestamp,
            transactions,
        })
    }

    /// Fetches and decodes every swap in a block.
    pub async fn fetch_indexed_block(&self, number: u64) -> Result<IndexedBlock, ChainError> {
        let block = self.fetch_transactions(number).await?;

        let swaps = block
            .transactions
            .iter()
            .flat_map(|tx| {
                self.decoder
                    .decode_transaction(tx)
                    .into_iter()
                    .map(move |swap| StoredSwap {
                        tx_hash: tx.hash,
                        transaction_index: tx.transaction_index,
                        log_index: swap.log_index,
                        block_number: block.number,
                        block_timestamp: block.timestamp,
                        record: swap.record,
                    })
            })
            .collect();

        Ok(IndexedBlock {
            number: block.number,
            timestamp: block.timestamp,
            swaps,
        })
    }

    /// Monitored transactions of blocks `[from, to)`, in ascending
    /// (block, transaction index) order.
    pub async fn transactions_in_range(&self, from: u64, to: u64) -> Result<Vec<TransactionRecord>, ChainError> {
        if from >= to {
            return Ok(Vec::new());
        }

        let blocks: Vec<BlockTransactions> = stream::iter(from..to)
            .map(|number| self.fetch_transactions(number))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(blocks.into_iter().flat_map(|b| b.transactions).collect())
    }

    /// First block whose timestamp is not earlier than `target`, or
    /// `head + 1` when every block is older.
    pub async fn timestamp_to_block(&self, target: u64) -> Result<u64, ChainError> {
        let head = self.head().await?;
        if self.chain.block_timestamp(head).await? < target {
            return Ok(head + 1);
        }

        let (mut lo, mut hi) = (0u64, head);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.chain.block_timestamp(mid).await? < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }
}

/// Splits `[from, to]` into consecutive chunks of at most `chunk_size` blocks.
pub fn partition_range(from: u64, to: u64, chunk_size: u64) -> Vec<RangeInclusive<u64>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(chunk_size - 1).min(to);
        chunks.push(start..=end);
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    chunks
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    pub range: RangeInclusive<u64>,
    pub error: ChainError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub committed_blocks: u64,
    pub swaps: usize,
    pub failed_chunks: Vec<ChunkFailure>,
    /// Highest block the backfill checkpoint reached.
    pub checkpoint: Option<u64>,
    pub cancelled: bool,
}

pub struct BlockRangeIndexer {
    fetcher: BlockFetcher,
    storage: Arc<dyn CandleStorage>,
    config: IndexerConfig,
}

impl BlockRangeIndexer {
    pub fn new(fetcher: BlockFetcher, storage: Arc<dyn CandleStorage>, config: IndexerConfig) -> Self {
        Self {
            fetcher,
            storage,
            config,
        }
    }

    pub fn fetcher(&self) -> &BlockFetcher {
        &self.fetcher
    }

    /// Indexes `[from, to]`, resuming after the stored backfill checkpoint.
    ///
    /// Chunks run on a bounded set of workers. Finished chunks are committed
    /// in block order; a failed chunk is reported and skipped, but from then
    /// on the checkpoint stops advancing so a later run retries the gap.
    pub async fn backfill(&self, from: u64, to: u64, cancel: &CancellationToken) -> Result<BackfillReport, StorageError> {
        let mut report = BackfillReport::default();

        let resume = self.storage.last_indexed_block(cursors::BACKFILL).await?;
        report.checkpoint = resume;
        let start = match resume {
            Some(checkpoint) if checkpoint >= from => checkpoint.saturating_add(1),
            _ => from,
        };
        if start > to {
            info!(from, to, checkpoint = ?resume, "Backfill range already indexed");
            return Ok(report);
        }

        let chunks = partition_range(start, to, self.config.chunk_size);
        info!(
            from = start,
            to,
            chunks = chunks.len(),
            workers = self.config.workers,
            "Starting backfill"
        );

        let mut pending = chunks.iter().cloned().enumerate().peekable();
        let mut tasks = JoinSet::new();
        let mut task_chunks: HashMap<tokio::task::Id, usize> = HashMap::new();
        let mut finished: BTreeMap<usize, Result<Vec<IndexedBlock>, ChainError>> = BTreeMap::new();
        let mut next_commit = 0usize;
        let mut checkpoint_intact = true;
        let workers = self.config.workers.max(1);
        // finished chunks held back behind a slow one stay under this many
        let window = workers.saturating_mul(2);

        loop {
            while tasks.len() < workers {
                if pending
                    .peek()
                    .is_some_and(|(index, _)| *index >= next_commit.saturating_add(window))
                {
                    break;
                }
                let Some((index, range)) = pending.next() else {
                    break;
                };
                let fetcher = self.fetcher.clone();
                let handle = tasks.spawn(async move { fetch_chunk(&fetcher, range).await });
                task_chunks.insert(handle.id(), index);
            }

            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    report.cancelled = true;
                    warn!(committed = report.committed_blocks, "Backfill cancelled");
                    break;
                }
                joined = tasks.join_next_with_id() => joined,
            };

            let Some(joined) = joined else {
                break;
            };
            match joined {
                Ok((id, result)) => {
                    if let Some(index) = task_chunks.remove(&id) {
                        finished.insert(index, result);
                    }
                }
                Err(join_error) => {
                    if let Some(index) = task_chunks.remove(&join_error.id()) {
                        finished.insert(
                            index,
                            Err(ChainError::Fatal {
                                call: "backfill_chunk".to_string(),
                                attempts: 1,
                                message: join_error.to_string(),
                            }),
                        );
                    }
                }
            }

            while let Some(result) = finished.remove(&next_commit) {
                let range = chunks[next_commit].clone();
                next_commit += 1;

                match result {
                    Ok(blocks) => {
                        let cursor = checkpoint_intact.then_some(cursors::BACKFILL);
                        for block in &blocks {
                            self.storage.commit_block(block, cursor).await?;
                            report.committed_blocks += 1;
                            report.swaps += block.swaps.len();
                            if checkpoint_intact {
                                report.checkpoint = Some(block.number);
                            }
                        }
                        debug!(
                            from = range.start(),
                            to = range.end(),
                            blocks = blocks.len(),
                            "Committed backfill chunk"
                        );
                    }
                    Err(e) => {
                        error!(
                            from = range.start(),
                            to = range.end(),
                            error = %e,
                            "Backfill chunk failed"
                        );
                        let message = format!("blocks {}..={}: {}", range.start(), range.end(), e);
                        if let Err(store_err) = self.storage.record_failure(cursors::BACKFILL, &message).await {
                            warn!(error = %store_err, "Failed to record backfill failure");
                        }
                        checkpoint_intact = false;
                        report.failed_chunks.push(ChunkFailure { range, error: e });
                    }
                }
            }
        }

        info!(
            committed = report.committed_blocks,
            swaps = report.swaps,
            failed_chunks = report.failed_chunks.len(),
            checkpoint = ?report.checkpoint,
            "Backfill finished"
        );
        Ok(report)
    }

    /// Indexes blocks produced since the live checkpoint, bounded per tick.
    /// Returns how many blocks were committed.
    pub async fn poll_once(&self) -> Result<u64, IndexerError> {
        let head = self.fetcher.head().await?;
        let next = match self.storage.last_indexed_block(cursors::LIVE).await? {
            Some(last) => last + 1,
            None => self.config.start_block.unwrap_or(head),
        };
        if next > head {
            return Ok(0);
        }

        let last = head.min(next.saturating_add(self.config.max_blocks_per_tick.max(1) - 1));
        let mut committed = 0;
        for number in next..=last {
            let block = self.fetcher.fetch_indexed_block(number).await?;
            self.storage.commit_block(&block, Some(cursors::LIVE)).await?;
            committed += 1;
            if !block.swaps.is_empty() {
                debug!(block = number, swaps = block.swaps.len(), "Indexed block");
            }
        }
        Ok(committed)
    }

    /// Polls until `cancel` fires. Failures are logged and retried next tick.
    pub async fn run_continuous(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Continuous indexing stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(0) => debug!("No new blocks"),
                        Ok(committed) => info!(blocks = committed, "Indexed new blocks"),
                        Err(e) => {
                            error!(error = %e, "Indexing tick failed");
                            if let Err(store_err) = self.storage.record_failure(cursors::LIVE, &e.to_string()).await {
                                warn!(error = %store_err, "Failed to record indexing failure");
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn fetch_chunk(fetcher: &BlockFetcher, range: RangeInclusive<u64>) -> Result<Vec<IndexedBlock>, ChainError> {
    let mut blocks = Vec::with_capacity((range.end() - range.start() + 1) as usize);
    for number in range {
        blocks.push(fetcher.fetch_indexed_block(number).await?);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_range() {
        assert_eq!(partition_range(10, 34, 10), vec![10..=19, 20..=29, 30..=34]);
        assert_eq!(partition_range(5, 5, 100), vec![5..=5]);
        assert!(partition_range(6, 5, 10).is_empty());
        assert_eq!(partition_range(0, 2, 0), vec![0..=0, 1..=1, 2..=2]);
    }

    #[test]
    fn test_partition_covers_range_without_overlap() {
        let chunks = partition_range(100, 1_000, 37);
        let mut expected = 100;
        for chunk in &chunks {
            assert_eq!(*chunk.start(), expected);
            assert!(chunk.end() - chunk.start() < 37);
            expected = chunk.end() + 1;
        }
        assert_eq!(expected, 1_001);
    }
}
