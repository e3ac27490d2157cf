//! Background candle producers started by the subscription dispatcher.
//!
//! Live producers fold the blocks produced since their previous emission once
//! per period. Historical producers walk period windows backward from now
//! until the history floor. Both persist and push only non-empty candles.
//!
//! Blocks the indexer has already committed are folded from stored swaps;
//! everything else is read from the chain.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::models::candle::Candle;
use crate::models::pair::Pair;
use crate::services::block_indexer::{BlockFetcher, cursors};
use crate::services::candle_aggregator::{FoldState, fold_flows, partly_build_candle};
use crate::services::candle_storage::CandleStorage;
use crate::services::chain::ChainError;
use crate::services::subscription_dispatcher::{Channel, ProducerFactory, ProducerSink, SubscriptionKey};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct CandleProducer {
    fetcher: BlockFetcher,
    storage: Arc<dyn CandleStorage>,
    history_floor: u64,
    page_blocks: u64,
    retry_delay: Duration,
    /// First block of the configured backfill, if one runs.
    backfill_from: Option<u64>,
}

/// Start of the window containing `timestamp`.
pub fn align_down(timestamp: i64, period_seconds: i64) -> i64 {
    timestamp - timestamp.rem_euclid(period_seconds.max(1))
}

fn pair_tokens(pair: &Pair) -> Option<(Address, Address)> {
    let token_in = pair.token0_id.parse().ok()?;
    let token_out = pair.token1_id.parse().ok()?;
    Some((token_in, token_out))
}

/// Splits `[from, to)` around the stored range: chain `[from, a)`, storage
/// `[a, b)`, chain `[b, to)`.
fn split_range(from: u64, to: u64, indexed: Option<&RangeInclusive<u64>>) -> (u64, u64) {
    match indexed {
        Some(range) => {
            let a = (*range.start()).clamp(from, to);
            let b = range.end().saturating_add(1).clamp(a, to);
            (a, b)
        }
        None => (to, to),
    }
}

impl CandleProducer {
    pub fn new(fetcher: BlockFetcher, storage: Arc<dyn CandleStorage>, history_floor: u64, page_blocks: u64) -> Self {
        Self {
            fetcher,
            storage,
            history_floor,
            page_blocks: page_blocks.max(1),
            retry_delay: DEFAULT_RETRY_DELAY,
            backfill_from: None,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Lets historical windows read blocks the backfill has committed.
    pub fn with_backfill_from(mut self, backfill_from: Option<u64>) -> Self {
        self.backfill_from = backfill_from;
        self
    }

    /// Runs the producer for `key` and releases the key when it stops.
    pub async fn run(&self, key: SubscriptionKey, sink: ProducerSink) {
        self.drive(&key, &sink).await;
        sink.finish();
        debug!(pair_id = key.pair.id, period = key.period_seconds, "Candle producer finished");
    }

    async fn drive(&self, key: &SubscriptionKey, sink: &ProducerSink) {
        let Some((token_in, token_out)) = pair_tokens(&key.pair) else {
            warn!(
                pair_id = key.pair.id,
                token0 = %key.pair.token0_id,
                token1 = %key.pair.token1_id,
                "Pair tokens are not valid addresses, producer not started"
            );
            return;
        };
        let Ok(period) = i64::try_from(key.period_seconds) else {
            warn!(pair_id = key.pair.id, period = key.period_seconds, "Candle period out of range");
            return;
        };

        match key.channel {
            Channel::Live => self.run_live(key, sink, period, token_in, token_out).await,
            Channel::Historical => self.run_historical(key, sink, period, token_in, token_out).await,
        }
    }

    /// Folds blocks `[from, to)` from the chain in pages, carrying the fold
    /// state forward.
    pub async fn fold_blocks(
        &self,
        from: u64,
        to: u64,
        token_in: Address,
        token_out: Address,
        seed: Candle,
    ) -> Result<FoldState, ChainError> {
        self.fold_chain(from, to, token_in, token_out, FoldState::new(seed)).await
    }

    async fn fold_chain(
        &self,
        from: u64,
        to: u64,
        token_in: Address,
        token_out: Address,
        mut state: FoldState,
    ) -> Result<FoldState, ChainError> {
        let mut page_start = from;
        while page_start < to {
            let page_end = page_start.saturating_add(self.page_blocks).min(to);
            let transactions = self.fetcher.transactions_in_range(page_start, page_end).await?;
            state = partly_build_candle(&transactions, token_in, token_out, self.fetcher.decoder(), state);
            page_start = page_end;
        }
        Ok(state)
    }

    /// Folds blocks `[from, to)`, taking the part inside `indexed` from
    /// stored swaps and the rest from the chain.
    pub async fn fold_range(
        &self,
        from: u64,
        to: u64,
        indexed: Option<RangeInclusive<u64>>,
        token_in: Address,
        token_out: Address,
        seed: Candle,
    ) -> Result<FoldState, ChainError> {
        let mut state = FoldState::new(seed);
        if from >= to {
            return Ok(state);
        }
        let (stored_from, stored_to) = split_range(from, to, indexed.as_ref());

        state = self.fold_chain(from, stored_from, token_in, token_out, state).await?;
        if stored_from < stored_to {
            state = match self
                .storage
                .fetch_swap_flows(token_in, token_out, stored_from, stored_to)
                .await
            {
                Ok(flows) => fold_flows(flows, token_in, token_out, state),
                Err(e) => {
                    warn!(from = stored_from, to = stored_to, error = %e, "Stored swaps unavailable, reading chain");
                    self.fold_chain(stored_from, stored_to, token_in, token_out, state).await?
                }
            };
        }
        self.fold_chain(stored_to, to, token_in, token_out, state).await
    }

    async fn checkpoint(&self, cursor: &str) -> Option<u64> {
        match self.storage.last_indexed_block(cursor).await {
            Ok(block) => block,
            Err(e) => {
                warn!(cursor, error = %e, "Could not read indexer checkpoint");
                None
            }
        }
    }

    /// Blocks the backfill has committed as one contiguous run.
    async fn backfill_coverage(&self) -> Option<RangeInclusive<u64>> {
        let from = self.backfill_from?;
        let checkpoint = self.checkpoint(cursors::BACKFILL).await?;
        (checkpoint >= from).then_some(from..=checkpoint)
    }

    /// Persists a non-empty candle and pushes it. Returns `false` once the
    /// producer should stop.
    async fn publish(&self, sink: &ProducerSink, candle: &Candle) -> bool {
        if let Err(e) = self.storage.add_candle(candle).await {
            warn!(pair_id = candle.pair_id, error = %e, "Failed to store candle");
        }
        sink.emit(candle)
    }

    async fn run_live(
        &self,
        key: &SubscriptionKey,
        sink: &ProducerSink,
        period_seconds: i64,
        token_in: Address,
        token_out: Address,
    ) {
        let period = Duration::from_secs(key.period_seconds.max(1));
        let Some(first_tick) = Instant::now().checked_add(period) else {
            warn!(pair_id = key.pair.id, period = key.period_seconds, "Candle period too long to schedule");
            return;
        };
        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // the live indexer commits every block after the checkpoint seen here
        let mut indexed_since = self
            .checkpoint(cursors::LIVE)
            .await
            .map(|block| block.saturating_add(1));
        let mut next_block = match self.fetcher.head().await {
            Ok(head) => Some(head + 1),
            Err(e) => {
                warn!(error = %e, "Could not read chain head, starting on first tick");
                None
            }
        };
        let mut window_start = Utc::now();

        loop {
            tokio::select! {
                _ = sink.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let head = match self.fetcher.head().await {
                Ok(head) => head,
                Err(e) => {
                    warn!(pair_id = key.pair.id, error = %e, "Live candle tick failed");
                    continue;
                }
            };
            let Some(from) = next_block else {
                next_block = Some(head + 1);
                window_start = Utc::now();
                continue;
            };

            let live_checkpoint = self.checkpoint(cursors::LIVE).await;
            if indexed_since.is_none() {
                indexed_since = live_checkpoint.map(|block| block.saturating_add(1));
            }
            let indexed = indexed_since
                .zip(live_checkpoint)
                .and_then(|(since, last)| (since <= last).then_some(since..=last));

            let seed = Candle::seed(key.pair.id, period_seconds, window_start);
            let state = match self
                .fold_range(from, head + 1, indexed, token_in, token_out, seed)
                .await
            {
                Ok(state) => state,
                Err(e) => {
                    // same range again next tick
                    warn!(pair_id = key.pair.id, from, to = head, error = %e, "Live candle fold failed");
                    continue;
                }
            };

            next_block = Some(head.max(from.saturating_sub(1)) + 1);
            window_start = Utc::now();

            if state.has_swaps() && !self.publish(sink, &state.candle).await {
                break;
            }
        }
    }

    async fn run_historical(
        &self,
        key: &SubscriptionKey,
        sink: &ProducerSink,
        period: i64,
        token_in: Address,
        token_out: Address,
    ) {
        let floor = i64::try_from(self.history_floor).unwrap_or(i64::MAX);
        let mut window_end = align_down(Utc::now().timestamp(), period);
        let mut end_block: Option<u64> = None;

        info!(pair_id = key.pair.id, period, "Historical candle walk started");

        while !sink.is_cancelled() {
            let window_start = match window_end.checked_sub(period) {
                Some(start) if start >= floor => start,
                _ => {
                    info!(pair_id = key.pair.id, period, "Historical candle walk reached the history floor");
                    break;
                }
            };

            let result = self
                .historical_window(key, window_start, window_end, end_block, token_in, token_out)
                .await;
            match result {
                Ok((start_block, state)) => {
                    if state.has_swaps() && !self.publish(sink, &state.candle).await {
                        break;
                    }
                    end_block = Some(start_block);
                    window_end = window_start;
                }
                Err(e) => {
                    warn!(pair_id = key.pair.id, window_start, error = %e, "Historical window failed, retrying");
                    tokio::select! {
                        _ = sink.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
    }

    /// Folds the window `[start, end)`, resolved to blocks
    /// `[timestamp_to_block(start), timestamp_to_block(end))`.
    async fn historical_window(
        &self,
        key: &SubscriptionKey,
        start: i64,
        end: i64,
        known_end_block: Option<u64>,
        token_in: Address,
        token_out: Address,
    ) -> Result<(u64, FoldState), ChainError> {
        let end_block = match known_end_block {
            Some(block) => block,
            None => self.fetcher.timestamp_to_block(end.max(0) as u64).await?,
        };
        let start_block = self.fetcher.timestamp_to_block(start.max(0) as u64).await?;

        let datetime: DateTime<Utc> = Utc.timestamp_opt(start, 0).single().unwrap_or_default();
        let seed = Candle::seed(key.pair.id, end - start, datetime);
        let indexed = self.backfill_coverage().await;
        let state = self
            .fold_range(start_block, end_block, indexed, token_in, token_out, seed)
            .await?;
        Ok((start_block, state))
    }
}

impl ProducerFactory for CandleProducer {
    fn spawn(&self, key: SubscriptionKey, sink: ProducerSink) -> JoinHandle<()> {
        let producer = self.clone();
        tokio::spawn(async move { producer.run(key, sink).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(1_600_000_123, 60), 1_600_000_080);
        assert_eq!(align_down(1_600_000_080, 60), 1_600_000_080);
        assert_eq!(align_down(3_599, 3_600), 0);
        assert_eq!(align_down(-1, 60), -60);
    }

    #[test]
    fn test_pair_tokens() {
        let pair = Pair {
            id: 1,
            token0_id: "0x1000000000000000000000000000000000000001".into(),
            token1_id: "0x2000000000000000000000000000000000000002".into(),
        };
        let (a, b) = pair_tokens(&pair).unwrap();
        assert_eq!(a, alloy::primitives::address!("1000000000000000000000000000000000000001"));
        assert_eq!(b, alloy::primitives::address!("2000000000000000000000000000000000000002"));

        let bad = Pair {
            token1_id: "not-an-address".into(),
            ..pair
        };
        assert!(pair_tokens(&bad).is_none());
    }

    #[test]
    fn test_split_range_around_stored_blocks() {
        assert_eq!(split_range(10, 20, None), (20, 20));
        assert_eq!(split_range(10, 20, Some(&(0..=30))), (10, 20));
        assert_eq!(split_range(10, 20, Some(&(12..=15))), (12, 16));
        assert_eq!(split_range(10, 20, Some(&(15..=u64::MAX))), (15, 20));
        // stored run entirely before or after the range
        assert_eq!(split_range(10, 20, Some(&(0..=5))), (10, 10));
        assert_eq!(split_range(10, 20, Some(&(25..=30))), (20, 20));
    }
}
