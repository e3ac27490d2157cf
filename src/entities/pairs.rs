//! `SeaORM` Entity for pairs table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pairs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub token0_id: String,
    pub token1_id: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::candles::Entity")]
    Candles,
}

impl Related<super::candles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Candles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
