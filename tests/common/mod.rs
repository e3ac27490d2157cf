#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::{Address, B256, Bytes, I256, U256, address};
use async_trait::async_trait;
use parking_lot::Mutex;

use candleswap_backend::models::swap::LogEntry;
use candleswap_backend::services::chain::{ChainBlock, ChainClient, ChainError, ChainTransaction};
use candleswap_backend::services::event_decoder::{
    EventDecoder, ProtocolAddresses, SEL_EXACT_INPUT_SINGLE, SEL_SWAP_EXACT_TOKENS_FOR_TOKENS,
    TRANSFER_TOPIC, V2_SWAP_TOPIC, V3_SWAP_TOPIC,
};
use candleswap_backend::services::word_codec::{AbiValue, encode_arguments, encode_call};

pub const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
pub const V2_ROUTER: Address = address!("7a250d5630b4cf539739df2c5dacb4c659f2488d");
pub const V3_ROUTER: Address = address!("e592427a0aece92de3edc1f74e3b2ee6b4f75c1e");
pub const TOKEN_A: Address = address!("1000000000000000000000000000000000000001");
pub const TOKEN_B: Address = address!("2000000000000000000000000000000000000002");
pub const POOL: Address = address!("5000000000000000000000000000000000000005");
pub const PAIR: Address = address!("6000000000000000000000000000000000000006");
pub const TRADER: Address = address!("dddddddddddddddddddddddddddddddddddddddd");

/// Unix time of block 0 in every scripted chain.
pub const GENESIS_TIME: u64 = 1_600_000_000;
pub const BLOCK_TIME: u64 = 12;

pub fn protocols() -> ProtocolAddresses {
    ProtocolAddresses {
        v2_router: V2_ROUTER,
        v3_router: V3_ROUTER,
        weth: WETH,
        v1_exchanges: HashMap::new(),
    }
}

pub fn decoder() -> Arc<EventDecoder> {
    Arc::new(EventDecoder::new(protocols()))
}

pub fn lower(addr: Address) -> String {
    format!("{addr:#x}")
}

// ---------------------------------------------------------------------------
// Call data and log fixtures
// ---------------------------------------------------------------------------

fn data(values: &[AbiValue]) -> Bytes {
    // a list of static values encodes to the values back to back
    Bytes::from(hex::decode(encode_arguments(values)).expect("encoder emits hex"))
}

fn uint(value: u64) -> AbiValue {
    AbiValue::UnsignedInt(U256::from(value))
}

fn int(value: i64) -> AbiValue {
    AbiValue::SignedInt(I256::try_from(value).expect("fits"))
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

pub fn v3_swap_log(amount0: i64, amount1: i64, log_index: u64) -> LogEntry {
    LogEntry {
        address: POOL,
        topics: vec![*V3_SWAP_TOPIC, V3_ROUTER.into_word(), TRADER.into_word()],
        data: data(&[int(amount0), int(amount1), uint(1 << 40), uint(1_000_000), int(-5)]),
        log_index,
    }
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

pub fn v2_swap_log(amounts: [u64; 4], log_index: u64) -> LogEntry {
    LogEntry {
        address: PAIR,
        topics: vec![*V2_SWAP_TOPIC, V2_ROUTER.into_word(), TRADER.into_word()],
        data: data(&[uint(amounts[0]), uint(amounts[1]), uint(amounts[2]), uint(amounts[3])]),
        log_index,
    }
}

pub fn transfer_log(token: Address, from: Address, to: Address, amount: u64, log_index: u64) -> LogEntry {
    LogEntry {
        address: token,
        topics: vec![*TRANSFER_TOPIC, from.into_word(), to.into_word()],
        data: data(&[uint(amount)]),
        log_index,
    }
}

// ---------------------------------------------------------------------------
// Scripted chain
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    blocks: BTreeMap<u64, ChainBlock>,
    receipts: HashMap<B256, Vec<LogEntry>>,
    /// Remaining transient failures per block.
    flaky: HashMap<u64, u32>,
    broken: HashSet<u64>,
    held: HashSet<u64>,
}

/// In-memory chain with one block every [`BLOCK_TIME`] seconds.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
    receipt_calls: AtomicUsize,
    block_calls: AtomicUsize,
}

impl MockChain {
    /// Blocks `0..=head` with no transactions.
    pub fn with_blocks(head: u64) -> Arc<Self> {
        let chain = Self::default();
        {
            let mut state = chain.state.lock();
            for number in 0..=head {
                state.blocks.insert(
                    number,
                    ChainBlock {
                        number,
                        timestamp: GENESIS_TIME + number * BLOCK_TIME,
                        transactions: Vec::new(),
                    },
                );
            }
        }
        Arc::new(chain)
    }

    /// Appends empty blocks up to `head`.
    pub fn extend_to(&self, head: u64) {
        let mut state = self.state.lock();
        let next = state.blocks.keys().next_back().map_or(0, |n| n + 1);
        for number in next..=head {
            state.blocks.insert(
                number,
                ChainBlock {
                    number,
                    timestamp: GENESIS_TIME + number * BLOCK_TIME,
                    transactions: Vec::new(),
                },
            );
        }
    }

    /// Adds a transaction to `block` and returns its hash.
    pub fn add_transaction(&self, block: u64, to: Address, input: Bytes, logs: Vec<LogEntry>) -> B256 {
        let mut state = self.state.lock();
        let Some(entry) = state.blocks.get_mut(&block) else {
            panic!("block {block} is not scripted");
        };
        let index = entry.transactions.len() as u64;
        let mut raw = [0u8; 32];
        raw[..8].copy_from_slice(&block.to_be_bytes());
        raw[8..16].copy_from_slice(&index.to_be_bytes());
        let hash = B256::from(raw);

        entry.transactions.push(ChainTransaction {
            hash,
            from: TRADER,
            to: Some(to),
            input,
            transaction_index: index,
        });
        state.receipts.insert(hash, logs);
        hash
    }

    /// Adds a V3 swap of `token_in` for `token_out` to `block`.
    pub fn add_v3_swap(&self, block: u64, token_in: Address, token_out: Address, amount0: i64, amount1: i64) -> B256 {
        self.add_transaction(block, V3_ROUTER, v3_call(token_in, token_out), vec![v3_swap_log(amount0, amount1, 0)])
    }

    /// `block` fails with a transient error for the next `times` body fetches.
    pub fn fail_block(&self, block: u64, times: u32) {
        self.state.lock().flaky.insert(block, times);
    }

    /// `block` fails every time.
    pub fn break_block(&self, block: u64) {
        self.state.lock().broken.insert(block);
    }

    /// Body fetches of `block` wait until [`MockChain::release_block`].
    pub fn hold_block(&self, block: u64) {
        self.state.lock().held.insert(block);
    }

    pub fn release_block(&self, block: u64) {
        self.state.lock().held.remove(&block);
    }

    fn is_held(&self, block: u64) -> bool {
        self.state.lock().held.contains(&block)
    }

    pub fn repair_block(&self, block: u64) {
        self.state.lock().broken.remove(&block);
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.state
            .lock()
            .blocks
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| ChainError::Transient("empty chain".into()))
    }

    async fn block(&self, number: u64) -> Result<ChainBlock, ChainError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        while self.is_held(number) {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        let mut state = self.state.lock();
        if state.broken.contains(&number) {
            return Err(ChainError::Transient(format!("block {number} unavailable")));
        }
        if let Some(remaining) = state.flaky.get_mut(&number) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ChainError::Transient(format!("block {number} timed out")));
            }
        }
        state
            .blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| ChainError::Transient(format!("block {number} not available")))
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, ChainError> {
        self.state
            .lock()
            .blocks
            .get(&number)
            .map(|b| b.timestamp)
            .ok_or_else(|| ChainError::Transient(format!("block {number} not available")))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Vec<LogEntry>, ChainError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .receipts
            .get(&hash)
            .cloned()
            .ok_or_else(|| ChainError::Transient(format!("receipt for {hash} not available")))
    }
}
