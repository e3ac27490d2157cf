use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BackfillRange;
use crate::services::block_indexer::BlockRangeIndexer;

/// Runs the configured backfill, if any, then follows the chain head until
/// `cancel` fires.
pub fn start_block_indexer_job(
    indexer: Arc<BlockRangeIndexer>,
    backfill: Option<BackfillRange>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(range) = backfill {
            tracing::info!(
                "Running startup backfill for blocks {}..={}",
                range.from_block,
                range.to_block
            );
            match indexer.backfill(range.from_block, range.to_block, &cancel).await {
                Ok(report) if report.failed_chunks.is_empty() => {
                    tracing::info!(
                        "Backfill complete: {} blocks, {} swaps",
                        report.committed_blocks,
                        report.swaps
                    );
                }
                Ok(report) => {
                    tracing::warn!(
                        "Backfill finished with {} failed chunks, checkpoint at {:?}",
                        report.failed_chunks.len(),
                        report.checkpoint
                    );
                }
                Err(e) => tracing::error!("Backfill aborted: {}", e),
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        tracing::info!("Starting continuous block indexing");
        indexer.run_continuous(cancel).await;
    })
}
