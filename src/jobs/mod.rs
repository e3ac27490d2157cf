pub mod block_indexer_sync;
