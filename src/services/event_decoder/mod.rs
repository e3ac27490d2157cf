//! Swap decoding for transactions sent to the monitored Uniswap routers.
//!
//! Dispatches on the transaction destination, then on the call selector and
//! event topics. A malformed log only drops that log; the rest of the
//! transaction is still decoded.

pub mod v1;
pub mod v2;
pub mod v3;

use std::collections::HashMap;

use alloy::primitives::{Address, B256, keccak256};
use lazy_static::lazy_static;
use tracing::{debug, trace};

use crate::models::swap::{DecodedSwap, Protocol, TransactionRecord};

// ---------------------------------------------------------------------------
// Selectors and topics
// ---------------------------------------------------------------------------

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

lazy_static! {
    pub static ref TRANSFER_TOPIC: B256 = keccak256("Transfer(address,address,uint256)");
    pub static ref ETH_PURCHASE_TOPIC: B256 = keccak256("EthPurchase(address,uint256,uint256)");
    pub static ref TOKEN_PURCHASE_TOPIC: B256 =
        keccak256("TokenPurchase(address,uint256,uint256)");
    pub static ref V2_SWAP_TOPIC: B256 =
        keccak256("Swap(address,uint256,uint256,uint256,uint256,address)");
    pub static ref V3_SWAP_TOPIC: B256 =
        keccak256("Swap(address,address,int256,int256,uint160,uint128,int24)");

    pub static ref SEL_TOKEN_TO_TOKEN_SWAP_OUTPUT: [u8; 4] =
        selector("tokenToTokenSwapOutput(uint256,uint256,uint256,uint256,address)");
    pub static ref SEL_ETH_TO_TOKEN_SWAP_OUTPUT: [u8; 4] =
        selector("ethToTokenSwapOutput(uint256,uint256)");
    pub static ref SEL_SWAP_EXACT_TOKENS_FOR_TOKENS: [u8; 4] =
        selector("swapExactTokensForTokens(uint256,uint256,address[],address,uint256)");
    pub static ref SEL_SWAP_TOKENS_FOR_EXACT_TOKENS: [u8; 4] =
        selector("swapTokensForExactTokens(uint256,uint256,address[],address,uint256)");
    pub static ref SEL_EXACT_INPUT_SINGLE: [u8; 4] =
        selector("exactInputSingle((address,address,uint24,address,uint256,uint256,uint256,uint160))");
}

/// Splits call data into its selector and argument bytes.
pub(crate) fn split_selector(input: &[u8]) -> Option<([u8; 4], &[u8])> {
    if input.len() < 4 {
        return None;
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&input[..4]);
    Some((sel, &input[4..]))
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Router and exchange addresses the decoder attributes swaps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolAddresses {
    pub v2_router: Address,
    pub v3_router: Address,
    pub weth: Address,
    /// V1 exchange contract -> the token it trades against ETH.
    pub v1_exchanges: HashMap<Address, Address>,
}

#[derive(Debug, Clone)]
pub struct EventDecoder {
    protocols: ProtocolAddresses,
}

impl EventDecoder {
    pub fn new(protocols: ProtocolAddresses) -> Self {
        Self { protocols }
    }

    pub fn protocols(&self) -> &ProtocolAddresses {
        &self.protocols
    }

    /// Which protocol a transaction destination belongs to, if any.
    pub fn protocol_for(&self, to: Address) -> Option<Protocol> {
        if to == self.protocols.v2_router {
            Some(Protocol::V2)
        } else if to == self.protocols.v3_router {
            Some(Protocol::V3)
        } else if self.protocols.v1_exchanges.contains_key(&to) {
            Some(Protocol::V1)
        } else {
            None
        }
    }

    /// Quick reject used before fetching receipts.
    pub fn is_monitored(&self, to: Option<Address>) -> bool {
        to.and_then(|addr| self.protocol_for(addr)).is_some()
    }

    /// Decodes every swap in the transaction, in log order.
    pub fn decode_transaction(&self, tx: &TransactionRecord) -> Vec<DecodedSwap> {
        let Some(to) = tx.to else {
            return Vec::new();
        };

        let swaps = match self.protocol_for(to) {
            Some(Protocol::V1) => v1::decode(tx, to, &self.protocols),
            Some(Protocol::V2) => v2::decode(tx),
            Some(Protocol::V3) => v3::decode(tx),
            None => Vec::new(),
        };

        if !swaps.is_empty() {
            trace!(tx = %tx.hash, router = %to, count = swaps.len(), "decoded swaps");
        }
        swaps
    }

    /// Swaps in `tx` whose token set is exactly `{token_in, token_out}`.
    pub fn relevant_swaps(
        &self,
        tx: &TransactionRecord,
        token_in: Address,
        token_out: Address,
    ) -> Vec<DecodedSwap> {
        self.decode_transaction(tx)
            .into_iter()
            .filter(|swap| swap.record.involves_pair(token_in, token_out))
            .collect()
    }
}

/// Logs a log that could not be decoded and carries on.
pub(crate) fn skip_log(tx: &TransactionRecord, log_index: u64, err: &dyn std::fmt::Display) {
    debug!(tx = %tx.hash, log_index, error = %err, "skipping undecodable log");
}

#[cfg(test)]
pub(crate) mod test_support {
    use alloy::primitives::{Address, B256, Bytes, I256, U256, address};

    use super::*;
    use crate::models::swap::LogEntry;
    use crate::services::word_codec::{AbiValue, encode, encode_call};

    pub const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
    pub const V2_ROUTER: Address = address!("7a250d5630b4cf539739df2c5dacb4c659f2488d");
    pub const V3_ROUTER: Address = address!("e592427a0aece92de3edc1f74e3b2ee6b4f75c1e");
    pub const TOKEN_A: Address = address!("1000000000000000000000000000000000000001");
    pub const TOKEN_B: Address = address!("2000000000000000000000000000000000000002");
    pub const TOKEN_C: Address = address!("3000000000000000000000000000000000000003");
    pub const EXCHANGE_A: Address = address!("a000000000000000000000000000000000000000");
    pub const EXCHANGE_B: Address = address!("b000000000000000000000000000000000000000");
    pub const TRADER: Address = address!("dddddddddddddddddddddddddddddddddddddddd");

    pub fn decoder() -> EventDecoder {
        let mut v1_exchanges = HashMap::new();
        v1_exchanges.insert(EXCHANGE_A, TOKEN_A);
        v1_exchanges.insert(EXCHANGE_B, TOKEN_B);
        EventDecoder::new(ProtocolAddresses {
            v2_router: V2_ROUTER,
            v3_router: V3_ROUTER,
            weth: WETH,
            v1_exchanges,
        })
    }

    pub fn topic(addr: Address) -> B256 {
        addr.into_word()
    }

    pub fn uint_topic(value: u64) -> B256 {
        B256::from(U256::from(value))
    }

    pub fn data(values: &[AbiValue]) -> Bytes {
        let mut out = String::new();
        for v in values {
            out.push_str(&encode(v));
        }
        Bytes::from(hex::decode(out).unwrap())
    }

    pub fn uint(value: u64) -> AbiValue {
        AbiValue::UnsignedInt(U256::from(value))
    }

    pub fn int(value: i64) -> AbiValue {
        AbiValue::SignedInt(I256::try_from(value).unwrap())
    }

    pub fn log(address: Address, topics: Vec<B256>, data: Bytes, log_index: u64) -> LogEntry {
        LogEntry {
            address,
            topics,
            data,
            log_index,
        }
    }

    pub fn transfer_log(token: Address, from: Address, to: Address, amount: u64, idx: u64) -> LogEntry {
        log(
            token,
            vec![*TRANSFER_TOPIC, topic(from), topic(to)],
            data(&[uint(amount)]),
            idx,
        )
    }

    pub fn v2_swap_log(pair: Address, amounts: [u64; 4], idx: u64) -> LogEntry {
        log(
            pair,
            vec![*V2_SWAP_TOPIC, topic(V2_ROUTER), topic(TRADER)],
            data(&[uint(amounts[0]), uint(amounts[1]), uint(amounts[2]), uint(amounts[3])]),
            idx,
        )
    }

    pub fn v3_swap_log(pool: Address, amount0: i64, amount1: i64, idx: u64) -> LogEntry {
        log(
            pool,
            vec![*V3_SWAP_TOPIC, topic(V3_ROUTER), topic(TRADER)],
            data(&[int(amount0), int(amount1), uint(1 << 40), uint(1_000_000), int(-5)]),
            idx,
        )
    }

    pub fn v2_call(path: &[Address]) -> Bytes {
        Bytes::from(encode_call(
            *SEL_SWAP_EXACT_TOKENS_FOR_TOKENS,
            &[
                uint(1000),
                uint(1),
                AbiValue::DynamicArray(path.iter().map(|a| AbiValue::Address(*a)).collect()),
                AbiValue::Address(TRADER),
                uint(9_999_999_999),
            ],
        ))
    }

    pub fn v3_call(token_in: Address, token_out: Address) -> Bytes {
        Bytes::from(encode_call(
            *SEL_EXACT_INPUT_SINGLE,
            &[
                AbiValue::Address(token_in),
                AbiValue::Address(token_out),
                uint(3000),
                AbiValue::Address(TRADER),
                uint(9_999_999_999),
                uint(1000),
                uint(1),
                uint(0),
            ],
        ))
    }

    pub fn tx(to: Address, input: Bytes, logs: Vec<LogEntry>) -> TransactionRecord {
        TransactionRecord {
            hash: B256::repeat_byte(0x42),
            from: TRADER,
            to: Some(to),
            input,
            logs,
            block_number: 100,
            block_timestamp: 1_600_000_000,
            transaction_index: 0,
        }
    }
}
