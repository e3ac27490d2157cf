pub use super::candles::Entity as Candles;
pub use super::pairs::Entity as Pairs;
pub use super::swap_events::Entity as SwapEvents;
pub use super::sync_status::Entity as SyncStatus;
