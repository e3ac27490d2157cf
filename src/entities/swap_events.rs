//! `SeaORM` Entity for swap_events table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "swap_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub tx_hash: String,
    pub transaction_index: i64,
    pub log_index: i64,
    pub protocol: String,
    pub venue: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
    pub amount_out: String,
    pub sqrt_price_x96: Option<String>,
    pub liquidity: Option<String>,
    pub tick: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
