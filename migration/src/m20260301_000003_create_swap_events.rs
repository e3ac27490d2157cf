use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SwapEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SwapEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SwapEvents::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(SwapEvents::BlockTimestamp).big_integer().not_null())
                    .col(ColumnDef::new(SwapEvents::TxHash).string_len(66).not_null())
                    .col(ColumnDef::new(SwapEvents::TransactionIndex).big_integer().not_null())
                    .col(ColumnDef::new(SwapEvents::LogIndex).big_integer().not_null())
                    .col(ColumnDef::new(SwapEvents::Protocol).string_len(8).not_null())
                    .col(ColumnDef::new(SwapEvents::Venue).string_len(42).not_null())
                    .col(ColumnDef::new(SwapEvents::TokenIn).string_len(42).not_null())
                    .col(ColumnDef::new(SwapEvents::TokenOut).string_len(42).not_null())
                    .col(ColumnDef::new(SwapEvents::AmountIn).string_len(80).not_null())
                    .col(ColumnDef::new(SwapEvents::AmountOut).string_len(80).not_null())
                    .col(ColumnDef::new(SwapEvents::SqrtPriceX96).string_len(80).null())
                    .col(ColumnDef::new(SwapEvents::Liquidity).string_len(40).null())
                    .col(ColumnDef::new(SwapEvents::Tick).integer().null())
                    .to_owned(),
            )
            .await?;

        // Re-indexing a block must not duplicate its swaps
        manager
            .create_index(
                Index::create()
                    .name("idx_swap_events_tx_log_unique")
                    .table(SwapEvents::Table)
                    .col(SwapEvents::TxHash)
                    .col(SwapEvents::LogIndex)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Pair folds read swaps by token pair in block order
        manager
            .create_index(
                Index::create()
                    .name("idx_swap_events_tokens_block")
                    .table(SwapEvents::Table)
                    .col(SwapEvents::TokenIn)
                    .col(SwapEvents::TokenOut)
                    .col(SwapEvents::BlockNumber)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SwapEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SwapEvents {
    Table,
    Id,
    BlockNumber,
    BlockTimestamp,
    TxHash,
    TransactionIndex,
    LogIndex,
    Protocol,
    Venue,
    TokenIn,
    TokenOut,
    AmountIn,
    AmountOut,
    SqrtPriceX96,
    Liquidity,
    Tick,
}
