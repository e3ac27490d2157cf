// src/lib.rs

use std::sync::Arc;

use services::{
    candle_storage::CandleStorage,
    pair_catalog::PairCatalog,
    subscription_dispatcher::{ProducerFactory, SubscriptionDispatcher},
};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn CandleStorage>,
    pub pairs: PairCatalog,
    pub dispatcher: Arc<SubscriptionDispatcher>,
}

impl AppState {
    pub fn new(storage: Arc<dyn CandleStorage>, producers: Arc<dyn ProducerFactory>) -> Self {
        Self {
            pairs: PairCatalog::new(storage.clone()),
            dispatcher: Arc::new(SubscriptionDispatcher::new(producers)),
            storage,
        }
    }
}

pub mod entities {
    pub mod prelude;
    pub mod candles;
    pub mod pairs;
    pub mod swap_events;
    pub mod sync_status;
}

pub mod services {
    pub mod block_indexer;
    pub mod candle_aggregator;
    pub mod candle_producer;
    pub mod candle_storage;
    pub mod chain;
    pub mod event_decoder;
    pub mod pair_catalog;
    pub mod retry;
    pub mod subscription_dispatcher;
    pub mod word_codec;
}

pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
