//! Environment configuration.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, address};
use thiserror::Error;

use crate::services::event_decoder::ProtocolAddresses;
use crate::services::retry::RetryConfig;

/// Environment variable names
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_ETH_RPC_URL: &str = "ETH_RPC_URL";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_POLL_INTERVAL: &str = "INDEXER_POLL_INTERVAL_SECS";
pub const ENV_CHUNK_SIZE: &str = "INDEXER_CHUNK_SIZE";
pub const ENV_WORKERS: &str = "INDEXER_WORKERS";
pub const ENV_MAX_BLOCKS_PER_TICK: &str = "INDEXER_MAX_BLOCKS_PER_TICK";
pub const ENV_START_BLOCK: &str = "INDEXER_START_BLOCK";
pub const ENV_BACKFILL_FROM: &str = "BACKFILL_FROM_BLOCK";
pub const ENV_BACKFILL_TO: &str = "BACKFILL_TO_BLOCK";
pub const ENV_RPC_MAX_ATTEMPTS: &str = "RPC_MAX_ATTEMPTS";
pub const ENV_RPC_BACKOFF_MS: &str = "RPC_BACKOFF_MS";
pub const ENV_RPC_MAX_BACKOFF_MS: &str = "RPC_MAX_BACKOFF_MS";
pub const ENV_RPC_TIMEOUT: &str = "RPC_TIMEOUT_SECS";
pub const ENV_V2_ROUTER: &str = "UNISWAP_V2_ROUTER";
pub const ENV_V3_ROUTER: &str = "UNISWAP_V3_ROUTER";
pub const ENV_V1_EXCHANGES: &str = "UNISWAP_V1_EXCHANGES";
pub const ENV_WETH: &str = "WETH_ADDRESS";
pub const ENV_HISTORY_FLOOR: &str = "HISTORY_FLOOR_TIMESTAMP";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;
pub const DEFAULT_CHUNK_SIZE: u64 = 100;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_MAX_BLOCKS_PER_TICK: u64 = 50;
pub const DEFAULT_RPC_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RPC_BACKOFF_MS: u64 = 250;
pub const DEFAULT_RPC_MAX_BACKOFF_MS: u64 = 10_000;
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 15;
/// 2018-11-02 00:00:00 UTC
pub const DEFAULT_HISTORY_FLOOR_TIMESTAMP: u64 = 1_541_116_800;

pub const MAINNET_V2_ROUTER: Address = address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D");
pub const MAINNET_V3_ROUTER: Address = address!("E592427A0AEce92De3Edc1F74E3b2eE6b4f75c1e");
pub const MAINNET_WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    pub poll_interval: Duration,
    pub chunk_size: u64,
    pub workers: usize,
    pub max_blocks_per_tick: u64,
    /// First block for continuous indexing when no checkpoint exists.
    pub start_block: Option<u64>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            max_blocks_per_tick: DEFAULT_MAX_BLOCKS_PER_TICK,
            start_block: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillRange {
    pub from_block: u64,
    pub to_block: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub rpc_url: String,
    pub bind_addr: String,
    pub indexer: IndexerConfig,
    pub retry: RetryConfig,
    pub protocols: ProtocolAddresses,
    pub history_floor: u64,
    pub backfill: Option<BackfillRange>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let indexer = IndexerConfig {
            poll_interval: Duration::from_secs(parse_or(&lookup, ENV_POLL_INTERVAL, DEFAULT_POLL_INTERVAL_SECS)?),
            chunk_size: parse_or(&lookup, ENV_CHUNK_SIZE, DEFAULT_CHUNK_SIZE)?.max(1),
            workers: parse_or(&lookup, ENV_WORKERS, DEFAULT_WORKERS)?.max(1),
            max_blocks_per_tick: parse_or(&lookup, ENV_MAX_BLOCKS_PER_TICK, DEFAULT_MAX_BLOCKS_PER_TICK)?.max(1),
            start_block: parse_optional(&lookup, ENV_START_BLOCK)?,
        };

        let retry = RetryConfig {
            max_attempts: parse_or(&lookup, ENV_RPC_MAX_ATTEMPTS, DEFAULT_RPC_MAX_ATTEMPTS)?.max(1),
            initial_delay: Duration::from_millis(parse_or(&lookup, ENV_RPC_BACKOFF_MS, DEFAULT_RPC_BACKOFF_MS)?),
            max_delay: Duration::from_millis(parse_or(&lookup, ENV_RPC_MAX_BACKOFF_MS, DEFAULT_RPC_MAX_BACKOFF_MS)?),
            backoff_factor: 2.0,
            timeout: Duration::from_secs(parse_or(&lookup, ENV_RPC_TIMEOUT, DEFAULT_RPC_TIMEOUT_SECS)?),
        };

        let protocols = ProtocolAddresses {
            v2_router: parse_or(&lookup, ENV_V2_ROUTER, MAINNET_V2_ROUTER)?,
            v3_router: parse_or(&lookup, ENV_V3_ROUTER, MAINNET_V3_ROUTER)?,
            weth: parse_or(&lookup, ENV_WETH, MAINNET_WETH)?,
            v1_exchanges: match lookup(ENV_V1_EXCHANGES) {
                Some(raw) => parse_v1_exchanges(&raw)?,
                None => HashMap::new(),
            },
        };

        let backfill = match (
            parse_optional::<u64>(&lookup, ENV_BACKFILL_FROM)?,
            parse_optional::<u64>(&lookup, ENV_BACKFILL_TO)?,
        ) {
            (Some(from_block), Some(to_block)) if from_block <= to_block => Some(BackfillRange {
                from_block,
                to_block,
            }),
            (Some(from_block), Some(to_block)) => {
                return Err(ConfigError::Invalid {
                    name: ENV_BACKFILL_TO,
                    value: format!("{to_block} is before {from_block}"),
                });
            }
            _ => None,
        };

        Ok(Self {
            database_url: required(ENV_DATABASE_URL)?,
            rpc_url: required(ENV_ETH_RPC_URL)?,
            bind_addr: lookup(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            indexer,
            retry,
            protocols,
            history_floor: parse_or(&lookup, ENV_HISTORY_FLOOR, DEFAULT_HISTORY_FLOOR_TIMESTAMP)?,
            backfill,
        })
    }
}

fn parse_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    Ok(parse_optional(lookup, name)?.unwrap_or(default))
}

/// Parses `exchange:token,exchange:token`.
pub fn parse_v1_exchanges(raw: &str) -> Result<HashMap<Address, Address>, ConfigError> {
    let invalid = |entry: &str| ConfigError::Invalid {
        name: ENV_V1_EXCHANGES,
        value: entry.to_string(),
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (exchange, token) = entry.split_once(':').ok_or_else(|| invalid(entry))?;
            let exchange = Address::from_str(exchange.trim()).map_err(|_| invalid(entry))?;
            let token = Address::from_str(token.trim()).map_err(|_| invalid(entry))?;
            Ok((exchange, token))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (ENV_DATABASE_URL, "postgres://localhost/candles"),
            (ENV_ETH_RPC_URL, "http://localhost:8545"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.indexer, IndexerConfig::default());
        assert_eq!(config.retry.max_attempts, DEFAULT_RPC_MAX_ATTEMPTS);
        assert_eq!(config.protocols.v2_router, MAINNET_V2_ROUTER);
        assert!(config.protocols.v1_exchanges.is_empty());
        assert_eq!(config.history_floor, DEFAULT_HISTORY_FLOOR_TIMESTAMP);
        assert!(config.backfill.is_none());
    }

    #[test]
    fn test_missing_required() {
        let err = AppConfig::from_lookup(lookup_from(&[(ENV_ETH_RPC_URL, "http://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_DATABASE_URL)));
    }

    #[test]
    fn test_invalid_number() {
        let err = AppConfig::from_lookup(lookup_from(&[
            (ENV_DATABASE_URL, "postgres://x"),
            (ENV_ETH_RPC_URL, "http://x"),
            (ENV_WORKERS, "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: ENV_WORKERS, .. }));
    }

    #[test]
    fn test_backfill_range() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (ENV_DATABASE_URL, "postgres://x"),
            (ENV_ETH_RPC_URL, "http://x"),
            (ENV_BACKFILL_FROM, "100"),
            (ENV_BACKFILL_TO, "250"),
        ]))
        .unwrap();
        assert_eq!(
            config.backfill,
            Some(BackfillRange {
                from_block: 100,
                to_block: 250
            })
        );
    }

    #[test]
    fn test_v1_exchange_list() {
        let parsed = parse_v1_exchanges(
            "0x2a1530C4C41db0B0b2bB646CB5Eb1A67b7158667:0x6B175474E89094C44Da98b954EedeAC495271d0F, \
             0x09cabEC1eAd1c0Ba254B09efb3EE13841712bE14:0x89d24A6b4CcB1B6fAA2625fE562bDD9a23260359",
        )
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parse_v1_exchanges("0xnothex:0x1").is_err());
        assert!(parse_v1_exchanges("").unwrap().is_empty());
    }
}
