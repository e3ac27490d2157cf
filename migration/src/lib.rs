pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_pairs;
mod m20260301_000002_create_candles;
mod m20260301_000003_create_swap_events;
mod m20260301_000004_create_sync_status;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_pairs::Migration),
            Box::new(m20260301_000002_create_candles::Migration),
            Box::new(m20260301_000003_create_swap_events::Migration),
            Box::new(m20260301_000004_create_sync_status::Migration),
        ]
    }
}
