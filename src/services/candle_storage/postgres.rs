use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};

use super::{CandleStorage, StorageError};
use crate::entities::{candles, pairs, swap_events, sync_status};
use crate::entities::prelude::{Candles, Pairs, SwapEvents, SyncStatus};
use crate::models::candle::Candle;
use crate::models::pair::Pair;
use crate::models::swap::{IndexedBlock, StoredSwap, SwapFlow, SwapRecord};

#[derive(Clone)]
pub struct SeaOrmCandleStorage {
    db: DatabaseConnection,
}

impl SeaOrmCandleStorage {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn parse_u256(column: &'static str, value: &str) -> Result<U256, StorageError> {
    U256::from_str_radix(value, 10).map_err(|_| StorageError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

fn parse_address(column: &'static str, value: &str) -> Result<Address, StorageError> {
    value.parse().map_err(|_| StorageError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

/// Addresses are stored as lowercase hex.
fn address_key(address: Address) -> String {
    address.to_string().to_lowercase()
}

fn to_i64(column: &'static str, value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

impl From<pairs::Model> for Pair {
    fn from(model: pairs::Model) -> Self {
        Pair {
            id: model.id,
            token0_id: model.token0_id,
            token1_id: model.token1_id,
        }
    }
}

impl TryFrom<candles::Model> for Candle {
    type Error = StorageError;

    fn try_from(model: candles::Model) -> Result<Self, Self::Error> {
        Ok(Candle {
            pair_id: model.pair_id,
            resolution_seconds: model.resolution_seconds,
            datetime: model.datetime.with_timezone(&Utc),
            open: parse_u256("open", &model.open)?,
            high: parse_u256("high", &model.high)?,
            low: parse_u256("low", &model.low)?,
            close: parse_u256("close", &model.close)?,
            volume: parse_u256("volume", &model.volume)?,
        })
    }
}

impl TryFrom<swap_events::Model> for SwapFlow {
    type Error = StorageError;

    fn try_from(model: swap_events::Model) -> Result<Self, Self::Error> {
        Ok(SwapFlow {
            token_in: parse_address("token_in", &model.token_in)?,
            token_out: parse_address("token_out", &model.token_out)?,
            amount_in: parse_u256("amount_in", &model.amount_in)?,
            amount_out: parse_u256("amount_out", &model.amount_out)?,
        })
    }
}

fn swap_active_model(swap: &StoredSwap) -> Result<swap_events::ActiveModel, StorageError> {
    let flow = swap.record.flow();
    let (sqrt_price_x96, liquidity, tick) = match &swap.record {
        SwapRecord::V3Swap {
            sqrt_price_x96,
            liquidity,
            tick,
            ..
        } => (
            Some(sqrt_price_x96.to_string()),
            Some(liquidity.to_string()),
            Some(*tick),
        ),
        _ => (None, None, None),
    };

    Ok(swap_events::ActiveModel {
        block_number: Set(to_i64("block_number", swap.block_number)?),
        block_timestamp: Set(to_i64("block_timestamp", swap.block_timestamp)?),
        tx_hash: Set(swap.tx_hash.to_string()),
        transaction_index: Set(to_i64("transaction_index", swap.transaction_index)?),
        log_index: Set(to_i64("log_index", swap.log_index)?),
        protocol: Set(swap.record.protocol().as_str().to_string()),
        venue: Set(address_key(swap.record.venue())),
        token_in: Set(address_key(flow.token_in)),
        token_out: Set(address_key(flow.token_out)),
        amount_in: Set(flow.amount_in.to_string()),
        amount_out: Set(flow.amount_out.to_string()),
        sqrt_price_x96: Set(sqrt_price_x96),
        liquidity: Set(liquidity),
        tick: Set(tick),
        ..Default::default()
    })
}

async fn advance_checkpoint<C: ConnectionTrait>(
    conn: &C,
    cursor: &str,
    block: u64,
) -> Result<(), StorageError> {
    let now = Utc::now().naive_utc();
    let last_block = to_i64("last_block", block)?;

    let existing = SyncStatus::find()
        .filter(sync_status::Column::JobName.eq(cursor))
        .one(conn)
        .await?;

    match existing {
        Some(record) => {
            let success_count = record.success_count;
            let mut active_model: sync_status::ActiveModel = record.into();
            active_model.last_block = Set(Some(last_block));
            active_model.last_success_at = Set(Some(now));
            active_model.last_attempt_at = Set(Some(now));
            active_model.last_error = Set(None);
            active_model.success_count = Set(success_count + 1);
            active_model.update(conn).await?;
        }
        None => {
            let new_record = sync_status::ActiveModel {
                job_name: Set(cursor.to_string()),
                last_block: Set(Some(last_block)),
                last_success_at: Set(Some(now)),
                last_attempt_at: Set(Some(now)),
                last_error: Set(None),
                success_count: Set(1),
                error_count: Set(0),
                ..Default::default()
            };
            new_record.insert(conn).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl CandleStorage for SeaOrmCandleStorage {
    async fn fetch_pairs(&self) -> Result<Vec<Pair>, StorageError> {
        let rows = Pairs::find()
            .order_by_asc(pairs::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Pair::from).collect())
    }

    async fn fetch_pair(&self, token0_id: &str, token1_id: &str) -> Result<Option<Pair>, StorageError> {
        let row = Pairs::find()
            .filter(pairs::Column::Token0Id.eq(token0_id))
            .filter(pairs::Column::Token1Id.eq(token1_id))
            .one(&self.db)
            .await?;
        Ok(row.map(Pair::from))
    }

    async fn add_pair(&self, token0_id: &str, token1_id: &str) -> Result<(), StorageError> {
        let model = pairs::ActiveModel {
            token0_id: Set(token0_id.to_string()),
            token1_id: Set(token1_id.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        // the unique (token0_id, token1_id) index settles concurrent creates
        Pairs::insert(model)
            .on_conflict(
                OnConflict::columns([pairs::Column::Token0Id, pairs::Column::Token1Id])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn fetch_candles(&self, pair_id: i32, period_seconds: i64) -> Result<Vec<Candle>, StorageError> {
        let rows = Candles::find()
            .filter(candles::Column::PairId.eq(pair_id))
            .filter(candles::Column::ResolutionSeconds.eq(period_seconds))
            .order_by_asc(candles::Column::Datetime)
            .all(&self.db)
            .await?;
        rows.into_iter().map(Candle::try_from).collect()
    }

    async fn add_candle(&self, candle: &Candle) -> Result<(), StorageError> {
        let model = candles::ActiveModel {
            pair_id: Set(candle.pair_id),
            resolution_seconds: Set(candle.resolution_seconds),
            datetime: Set(candle.datetime.fixed_offset()),
            open: Set(candle.open.to_string()),
            high: Set(candle.high.to_string()),
            low: Set(candle.low.to_string()),
            close: Set(candle.close.to_string()),
            volume: Set(candle.volume.to_string()),
            ..Default::default()
        };

        Candles::insert(model)
            .on_conflict(
                OnConflict::columns([
                    candles::Column::PairId,
                    candles::Column::ResolutionSeconds,
                    candles::Column::Datetime,
                ])
                .update_columns([
                    candles::Column::Open,
                    candles::Column::High,
                    candles::Column::Low,
                    candles::Column::Close,
                    candles::Column::Volume,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn commit_block(&self, block: &IndexedBlock, cursor: Option<&str>) -> Result<(), StorageError> {
        let models = block
            .swaps
            .iter()
            .map(swap_active_model)
            .collect::<Result<Vec<_>, _>>()?;

        let txn = self.db.begin().await?;

        if !models.is_empty() {
            SwapEvents::insert_many(models)
                .on_conflict(
                    OnConflict::columns([swap_events::Column::TxHash, swap_events::Column::LogIndex])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        if let Some(cursor) = cursor {
            advance_checkpoint(&txn, cursor, block.number).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn fetch_swap_flows(
        &self,
        token_a: Address,
        token_b: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SwapFlow>, StorageError> {
        if from_block >= to_block {
            return Ok(Vec::new());
        }
        let (a, b) = (address_key(token_a), address_key(token_b));
        let either_direction = Condition::any()
            .add(
                Condition::all()
                    .add(swap_events::Column::TokenIn.eq(a.clone()))
                    .add(swap_events::Column::TokenOut.eq(b.clone())),
            )
            .add(
                Condition::all()
                    .add(swap_events::Column::TokenIn.eq(b))
                    .add(swap_events::Column::TokenOut.eq(a)),
            );

        let rows = SwapEvents::find()
            .filter(either_direction)
            .filter(swap_events::Column::BlockNumber.gte(to_i64("block_number", from_block)?))
            .filter(swap_events::Column::BlockNumber.lt(i64::try_from(to_block).unwrap_or(i64::MAX)))
            .order_by_asc(swap_events::Column::BlockNumber)
            .order_by_asc(swap_events::Column::TransactionIndex)
            .order_by_asc(swap_events::Column::LogIndex)
            .all(&self.db)
            .await?;
        rows.into_iter().map(SwapFlow::try_from).collect()
    }

    async fn last_indexed_block(&self, cursor: &str) -> Result<Option<u64>, StorageError> {
        let status = SyncStatus::find()
            .filter(sync_status::Column::JobName.eq(cursor))
            .one(&self.db)
            .await?;

        Ok(status
            .and_then(|record| record.last_block)
            .and_then(|block| u64::try_from(block).ok()))
    }

    async fn record_failure(&self, cursor: &str, error: &str) -> Result<(), StorageError> {
        let now = Utc::now().naive_utc();

        let existing = SyncStatus::find()
            .filter(sync_status::Column::JobName.eq(cursor))
            .one(&self.db)
            .await?;

        match existing {
            Some(record) => {
                let error_count = record.error_count;
                let mut active_model: sync_status::ActiveModel = record.into();
                active_model.last_attempt_at = Set(Some(now));
                active_model.last_error = Set(Some(error.to_string()));
                active_model.error_count = Set(error_count + 1);
                active_model.update(&self.db).await?;
            }
            None => {
                let new_record = sync_status::ActiveModel {
                    job_name: Set(cursor.to_string()),
                    last_block: Set(None),
                    last_success_at: Set(None),
                    last_attempt_at: Set(Some(now)),
                    last_error: Set(Some(error.to_string())),
                    success_count: Set(0),
                    error_count: Set(1),
                    ..Default::default()
                };
                new_record.insert(&self.db).await?;
            }
        }

        tracing::warn!("[{}] Recorded indexing failure: {}", cursor, error);
        Ok(())
    }
}
