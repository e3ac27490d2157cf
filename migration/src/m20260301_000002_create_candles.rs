use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Candles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Candles::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Candles::PairId).integer().not_null())
                    .col(
                        ColumnDef::new(Candles::ResolutionSeconds)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Candles::Datetime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    // 256-bit values as decimal strings
                    .col(ColumnDef::new(Candles::Open).string_len(80).not_null())
                    .col(ColumnDef::new(Candles::High).string_len(80).not_null())
                    .col(ColumnDef::new(Candles::Low).string_len(80).not_null())
                    .col(ColumnDef::new(Candles::Close).string_len(80).not_null())
                    .col(ColumnDef::new(Candles::Volume).string_len(80).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_candles_pair_id")
                            .from(Candles::Table, Candles::PairId)
                            .to(Pairs::Table, Pairs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One candle per pair, resolution and window start
        manager
            .create_index(
                Index::create()
                    .name("idx_candles_pair_resolution_datetime_unique")
                    .table(Candles::Table)
                    .col(Candles::PairId)
                    .col(Candles::ResolutionSeconds)
                    .col(Candles::Datetime)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Candles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Candles {
    Table,
    Id,
    PairId,
    ResolutionSeconds,
    Datetime,
    Open,
    High,
    Low,
    Close,
    Volume,
}

#[derive(DeriveIden)]
enum Pairs {
    Table,
    Id,
}
