use std::sync::Arc;

use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use candleswap_backend::{
    AppState,
    config::AppConfig,
    handlers,
    jobs::block_indexer_sync::start_block_indexer_job,
    services::{
        block_indexer::{BlockFetcher, BlockRangeIndexer},
        candle_producer::CandleProducer,
        candle_storage::{CandleStorage, SeaOrmCandleStorage},
        chain::{ChainClient, RetryingChainClient, RpcChainClient},
        event_decoder::EventDecoder,
    },
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,candleswap_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None).await?;

    let storage: Arc<dyn CandleStorage> = Arc::new(SeaOrmCandleStorage::new(db));

    let rpc: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(&config.rpc_url)?);
    let chain: Arc<dyn ChainClient> = Arc::new(RetryingChainClient::new(rpc, config.retry.clone()));
    let decoder = Arc::new(EventDecoder::new(config.protocols.clone()));
    let fetcher = BlockFetcher::new(chain, decoder, config.indexer.workers);

    let producers = CandleProducer::new(
        fetcher.clone(),
        storage.clone(),
        config.history_floor,
        config.indexer.chunk_size,
    )
    .with_backfill_from(config.backfill.as_ref().map(|range| range.from_block));
    let state = AppState::new(storage.clone(), Arc::new(producers));

    // Background indexing
    let shutdown = CancellationToken::new();
    let indexer = Arc::new(BlockRangeIndexer::new(
        fetcher,
        storage,
        config.indexer.clone(),
    ));
    let indexer_job = start_block_indexer_job(indexer, config.backfill.clone(), shutdown.clone());

    let app = handlers::router(state.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    state.dispatcher.shutdown().await;
    if let Err(e) = indexer_job.await {
        tracing::error!("Indexer job panicked: {}", e);
    }

    Ok(())
}
