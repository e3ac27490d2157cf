//! `SeaORM` Entity for candles table
//!
//! Prices are 18-decimal fixed point and volume is a raw token amount; all
//! five are 256-bit values stored as decimal strings.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "candles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub pair_id: i32,
    pub resolution_seconds: i64,
    pub datetime: DateTimeWithTimeZone,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pairs::Entity",
        from = "Column::PairId",
        to = "super::pairs::Column::Id"
    )]
    Pair,
}

impl Related<super::pairs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pair.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
