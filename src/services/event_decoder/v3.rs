//! V3 `exactInputSingle` swaps.

use alloy::primitives::{Address, I256, U256};

use super::{SEL_EXACT_INPUT_SINGLE, V3_SWAP_TOPIC};
use crate::models::swap::{DecodedSwap, LogEntry, SwapRecord, TransactionRecord};
use crate::services::word_codec::{DecodeError, Words};

const SWAP_DATA_WORDS: usize = 5;
const MAX_TICK: i32 = (1 << 23) - 1;
const MIN_TICK: i32 = -(1 << 23);
const MAX_FEE: u32 = (1 << 24) - 1;

/// Parameters of an `exactInputSingle` router call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactInputSingle {
    pub token_in: Address,
    pub token_out: Address,
    /// Pool fee in hundredths of a basis point (uint24).
    pub fee: u32,
    pub recipient: Address,
    pub deadline: U256,
    pub amount_in: U256,
    pub amount_out_minimum: U256,
    /// Zero when the caller set no limit (uint160).
    pub sqrt_price_limit_x96: U256,
}

pub fn decode_call(input: &[u8]) -> Result<ExactInputSingle, DecodeError> {
    let (selector, args) = super::split_selector(input)
        .ok_or_else(|| DecodeError::Malformed("call data shorter than a selector".into()))?;

    if selector != *SEL_EXACT_INPUT_SINGLE {
        return Err(DecodeError::UnknownSelector(hex::encode(selector)));
    }

    // the params tuple is fully static, so it is laid out inline
    let words = Words::from_bytes(args)?;
    let fee = u32::try_from(words.uint(2)?)
        .ok()
        .filter(|fee| *fee <= MAX_FEE)
        .ok_or(DecodeError::Overflow("uint24"))?;
    let sqrt_price_limit_x96 = words.uint(7)?;
    if sqrt_price_limit_x96.bit_len() > 160 {
        return Err(DecodeError::Overflow("uint160"));
    }

    Ok(ExactInputSingle {
        token_in: words.address(0)?,
        token_out: words.address(1)?,
        fee,
        recipient: words.address(3)?,
        deadline: words.uint(4)?,
        amount_in: words.uint(5)?,
        amount_out_minimum: words.uint(6)?,
        sqrt_price_limit_x96,
    })
}

pub fn decode_swap_log(log: &LogEntry, call: &ExactInputSingle) -> Result<SwapRecord, DecodeError> {
    if log.topics.len() != 3 {
        return Err(DecodeError::TopicCount {
            event: "Swap(v3)",
            expected: 3,
            actual: log.topics.len(),
        });
    }

    let words = Words::from_bytes(&log.data)?;
    if words.len() != SWAP_DATA_WORDS {
        return Err(DecodeError::Malformed(format!(
            "Swap(v3) carries {} data words",
            words.len()
        )));
    }

    let liquidity = u128::try_from(words.uint(3)?).map_err(|_| DecodeError::Overflow("uint128"))?;
    let tick = tick_from(words.int(4)?)?;

    let (a, b) = (call.token_in, call.token_out);
    let (token0, token1) = if a < b { (a, b) } else { (b, a) };

    Ok(SwapRecord::V3Swap {
        pool: log.address,
        token0,
        token1,
        amount0: words.int(0)?,
        amount1: words.int(1)?,
        sqrt_price_x96: words.uint(2)?,
        liquidity,
        tick,
    })
}

fn tick_from(value: I256) -> Result<i32, DecodeError> {
    let tick = i32::try_from(value).map_err(|_| DecodeError::Overflow("int24"))?;
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(DecodeError::Overflow("int24"));
    }
    Ok(tick)
}

pub fn decode(tx: &TransactionRecord) -> Vec<DecodedSwap> {
    let call = match decode_call(&tx.input) {
        Ok(call) => call,
        Err(e) => {
            tracing::debug!(tx = %tx.hash, error = %e, "unsupported v3 router call");
            return Vec::new();
        }
    };

    tx.logs
        .iter()
        .filter(|log| log.topic0() == Some(&*V3_SWAP_TOPIC))
        .filter_map(|log| match decode_swap_log(log, &call) {
            Ok(record) => Some(DecodedSwap {
                log_index: log.log_index,
                record,
            }),
            Err(e) => {
                super::skip_log(tx, log.log_index, &e);
                None
            }
        })
        .collect()
}
