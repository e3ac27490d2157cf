use alloy::primitives::{Address, B256, Bytes, I256, U256};
use serde::{Deserialize, Serialize};

/// One event log emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub log_index: u64,
}

impl LogEntry {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// A transaction together with the logs of its receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
    pub logs: Vec<LogEntry>,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    V1,
    V2,
    V3,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::V1 => "v1",
            Protocol::V2 => "v2",
            Protocol::V3 => "v3",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded swap in protocol-native form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapRecord {
    /// Token-to-token swap through two V1 exchanges, reconstructed from the
    /// paired Transfer logs.
    V1Transfer {
        exchange: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out: U256,
    },
    /// Tokens sold to an exchange for ETH.
    V1EthPurchase {
        exchange: Address,
        buyer: Address,
        token: Address,
        weth: Address,
        tokens_sold: U256,
        eth_bought: U256,
    },
    /// ETH sold to an exchange for tokens.
    V1TokenPurchase {
        exchange: Address,
        buyer: Address,
        token: Address,
        weth: Address,
        eth_sold: U256,
        tokens_bought: U256,
    },
    V2Swap {
        pair: Address,
        token0: Address,
        token1: Address,
        amount0_in: U256,
        amount1_in: U256,
        amount0_out: U256,
        amount1_out: U256,
    },
    /// Signed deltas from the pool's point of view: positive flowed in.
    V3Swap {
        pool: Address,
        token0: Address,
        token1: Address,
        amount0: I256,
        amount1: I256,
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
    },
}

/// Trader-perspective view of a swap: what was given and what was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapFlow {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
}

impl SwapFlow {
    /// How much of `token` moved through the swap, in either direction.
    pub fn amount_of(&self, token: Address) -> Option<U256> {
        if token == self.token_in {
            Some(self.amount_in)
        } else if token == self.token_out {
            Some(self.amount_out)
        } else {
            None
        }
    }

    /// True when the token set is exactly `{a, b}`, in either order.
    pub fn involves_pair(&self, a: Address, b: Address) -> bool {
        (self.token_in == a && self.token_out == b) || (self.token_in == b && self.token_out == a)
    }
}

impl SwapRecord {
    pub fn protocol(&self) -> Protocol {
        match self {
            SwapRecord::V1Transfer { .. }
            | SwapRecord::V1EthPurchase { .. }
            | SwapRecord::V1TokenPurchase { .. } => Protocol::V1,
            SwapRecord::V2Swap { .. } => Protocol::V2,
            SwapRecord::V3Swap { .. } => Protocol::V3,
        }
    }

    /// Contract that emitted the swap (exchange, pair or pool).
    pub fn venue(&self) -> Address {
        match self {
            SwapRecord::V1Transfer { exchange, .. }
            | SwapRecord::V1EthPurchase { exchange, .. }
            | SwapRecord::V1TokenPurchase { exchange, .. } => *exchange,
            SwapRecord::V2Swap { pair, .. } => *pair,
            SwapRecord::V3Swap { pool, .. } => *pool,
        }
    }

    pub fn flow(&self) -> SwapFlow {
        match *self {
            SwapRecord::V1Transfer {
                token_in,
                token_out,
                amount_in,
                amount_out,
                ..
            } => SwapFlow {
                token_in,
                token_out,
                amount_in,
                amount_out,
            },
            SwapRecord::V1EthPurchase {
                token,
                weth,
                tokens_sold,
                eth_bought,
                ..
            } => SwapFlow {
                token_in: token,
                token_out: weth,
                amount_in: tokens_sold,
                amount_out: eth_bought,
            },
            SwapRecord::V1TokenPurchase {
                token,
                weth,
                eth_sold,
                tokens_bought,
                ..
            } => SwapFlow {
                token_in: weth,
                token_out: token,
                amount_in: eth_sold,
                amount_out: tokens_bought,
            },
            SwapRecord::V2Swap {
                token0,
                token1,
                amount0_in,
                amount1_in,
                amount0_out,
                amount1_out,
                ..
            } => {
                if !amount0_in.is_zero() {
                    SwapFlow {
                        token_in: token0,
                        token_out: token1,
                        amount_in: amount0_in,
                        amount_out: amount1_out,
                    }
                } else {
                    SwapFlow {
                        token_in: token1,
                        token_out: token0,
                        amount_in: amount1_in,
                        amount_out: amount0_out,
                    }
                }
            }
            SwapRecord::V3Swap {
                token0,
                token1,
                amount0,
                amount1,
                ..
            } => {
                if amount0.is_positive() {
                    SwapFlow {
                        token_in: token0,
                        token_out: token1,
                        amount_in: amount0.unsigned_abs(),
                        amount_out: amount1.unsigned_abs(),
                    }
                } else {
                    SwapFlow {
                        token_in: token1,
                        token_out: token0,
                        amount_in: amount1.unsigned_abs(),
                        amount_out: amount0.unsigned_abs(),
                    }
                }
            }
        }
    }

    pub fn involves_pair(&self, a: Address, b: Address) -> bool {
        self.flow().involves_pair(a, b)
    }
}

/// A swap with the log position it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSwap {
    pub log_index: u64,
    pub record: SwapRecord,
}

/// A decoded swap tied to its transaction, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSwap {
    pub tx_hash: B256,
    pub transaction_index: u64,
    pub log_index: u64,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub record: SwapRecord,
}

/// All swaps found in one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedBlock {
    pub number: u64,
    pub timestamp: u64,
    pub swaps: Vec<StoredSwap>,
}
