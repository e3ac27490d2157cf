use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Pairs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Pairs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Pairs::Token0Id).string_len(42).not_null())
                    .col(ColumnDef::new(Pairs::Token1Id).string_len(42).not_null())
                    .col(
                        ColumnDef::new(Pairs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per ordered token pair
        manager
            .create_index(
                Index::create()
                    .name("idx_pairs_tokens_unique")
                    .table(Pairs::Table)
                    .col(Pairs::Token0Id)
                    .col(Pairs::Token1Id)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Pairs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Pairs {
    Table,
    Id,
    Token0Id,
    Token1Id,
    CreatedAt,
}
