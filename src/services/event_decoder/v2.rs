//! V2 router swaps.
//!
//! The router call carries the token path; each `Swap` log is one hop along
//! it, in log order. Pair token order is the sorted order of the two
//! addresses, which is how the pair contract itself assigns token0/token1.

use alloy::primitives::{Address, U256};

use super::{SEL_SWAP_EXACT_TOKENS_FOR_TOKENS, SEL_SWAP_TOKENS_FOR_EXACT_TOKENS, V2_SWAP_TOPIC};
use crate::models::swap::{DecodedSwap, LogEntry, SwapRecord, TransactionRecord};
use crate::services::word_codec::{DecodeError, Words};

const SWAP_DATA_WORDS: usize = 4;

/// A supported router call. Both functions share the
/// `(uint, uint, address[], address, uint)` layout; only the meaning of the
/// two amounts differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterCall {
    /// `swapExactTokensForTokens`
    ExactTokensForTokens {
        amount_in: U256,
        amount_out_min: U256,
        path: Vec<Address>,
        recipient: Address,
        deadline: U256,
    },
    /// `swapTokensForExactTokens`
    TokensForExactTokens {
        amount_out: U256,
        amount_in_max: U256,
        path: Vec<Address>,
        recipient: Address,
        deadline: U256,
    },
}

impl RouterCall {
    pub fn path(&self) -> &[Address] {
        match self {
            RouterCall::ExactTokensForTokens { path, .. } | RouterCall::TokensForExactTokens { path, .. } => path,
        }
    }
}

pub fn decode_call(input: &[u8]) -> Result<RouterCall, DecodeError> {
    let (selector, args) = super::split_selector(input)
        .ok_or_else(|| DecodeError::Malformed("call data shorter than a selector".into()))?;

    let exact_input = if selector == *SEL_SWAP_EXACT_TOKENS_FOR_TOKENS {
        true
    } else if selector == *SEL_SWAP_TOKENS_FOR_EXACT_TOKENS {
        false
    } else {
        return Err(DecodeError::UnknownSelector(hex::encode(selector)));
    };

    let words = Words::from_bytes(args)?;
    let path = words.address_array(2)?;
    if path.len() < 2 {
        return Err(DecodeError::Malformed(format!(
            "swap path has {} tokens",
            path.len()
        )));
    }
    let (first, second) = (words.uint(0)?, words.uint(1)?);
    let recipient = words.address(3)?;
    let deadline = words.uint(4)?;

    Ok(if exact_input {
        RouterCall::ExactTokensForTokens {
            amount_in: first,
            amount_out_min: second,
            path,
            recipient,
            deadline,
        }
    } else {
        RouterCall::TokensForExactTokens {
            amount_out: first,
            amount_in_max: second,
            path,
            recipient,
            deadline,
        }
    })
}

/// Decodes one `Swap` log as hop `hop` of `path`.
pub fn decode_swap_log(log: &LogEntry, path: &[Address], hop: usize) -> Result<SwapRecord, DecodeError> {
    if log.topics.len() != 3 {
        return Err(DecodeError::TopicCount {
            event: "Swap(v2)",
            expected: 3,
            actual: log.topics.len(),
        });
    }

    let (a, b) = match (path.get(hop), path.get(hop + 1)) {
        (Some(a), Some(b)) => (*a, *b),
        _ => {
            return Err(DecodeError::Malformed(format!(
                "swap log {} has no hop {hop} in a path of {}",
                log.log_index,
                path.len()
            )));
        }
    };
    let (token0, token1) = if a < b { (a, b) } else { (b, a) };

    let words = Words::from_bytes(&log.data)?;
    if words.len() != SWAP_DATA_WORDS {
        return Err(DecodeError::Malformed(format!(
            "Swap(v2) carries {} data words",
            words.len()
        )));
    }

    Ok(SwapRecord::V2Swap {
        pair: log.address,
        token0,
        token1,
        amount0_in: words.uint(0)?,
        amount1_in: words.uint(1)?,
        amount0_out: words.uint(2)?,
        amount1_out: words.uint(3)?,
    })
}

pub fn decode(tx: &TransactionRecord) -> Vec<DecodedSwap> {
    let call = match decode_call(&tx.input) {
        Ok(call) => call,
        Err(e) => {
            tracing::debug!(tx = %tx.hash, error = %e, "unsupported v2 router call");
            return Vec::new();
        }
    };

    let mut swaps = Vec::new();
    let mut hop = 0;
    for log in &tx.logs {
        if log.topic0() != Some(&*V2_SWAP_TOPIC) {
            continue;
        }
        match decode_swap_log(log, call.path(), hop) {
            Ok(record) => swaps.push(DecodedSwap {
                log_index: log.log_index,
                record,
            }),
            Err(e) => super::skip_log(tx, log.log_index, &e),
        }
        // a malformed Swap log still consumed its hop
        hop += 1;
    }
    swaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_decoder::test_support::*;
    use crate::services::word_codec::{AbiValue, encode_call};
    use alloy::primitives::Bytes;

    #[test]
    fn test_decode_exact_input_call() {
        let input = v2_call(&[TOKEN_A, WETH, TOKEN_B]);
        assert_eq!(
            decode_call(&input).unwrap(),
            RouterCall::ExactTokensForTokens {
                amount_in: U256::from(1000u64),
                amount_out_min: U256::from(1u64),
                path: vec![TOKEN_A, WETH, TOKEN_B],
                recipient: TRADER,
                deadline: U256::from(9_999_999_999u64),
            }
        );
    }

    #[test]
    fn test_decode_exact_output_call() {
        let input = encode_call(
            *SEL_SWAP_TOKENS_FOR_EXACT_TOKENS,
            &[
                uint(250),
                uint(4000),
                AbiValue::DynamicArray(vec![AbiValue::Address(TOKEN_B), AbiValue::Address(TOKEN_A)]),
                AbiValue::Address(TRADER),
                uint(1_700_000_000),
            ],
        );
        let call = decode_call(&input).unwrap();
        assert_eq!(
            call,
            RouterCall::TokensForExactTokens {
                amount_out: U256::from(250u64),
                amount_in_max: U256::from(4000u64),
                path: vec![TOKEN_B, TOKEN_A],
                recipient: TRADER,
                deadline: U256::from(1_700_000_000u64),
            }
        );
        assert_eq!(call.path(), &[TOKEN_B, TOKEN_A]);
    }

    #[test]
    fn test_unknown_selector_and_short_path_are_rejected() {
        let input = Bytes::from(vec![0xde, 0xad, 0xbe, 0xef, 0x00]);
        assert!(matches!(decode_call(&input), Err(DecodeError::UnknownSelector(_))));
        assert!(matches!(decode_call(&v2_call(&[TOKEN_A])), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_multi_hop_swaps_follow_path_order() {
        let decoder = decoder();
        let record = tx(
            V2_ROUTER,
            v2_call(&[TOKEN_B, WETH, TOKEN_A]),
            vec![
                transfer_log(TOKEN_B, TRADER, TOKEN_C, 500, 0),
                v2_swap_log(TOKEN_C, [500, 0, 0, 40], 1),
                v2_swap_log(EXCHANGE_A, [0, 40, 900, 0], 2),
            ],
        );

        let swaps = decoder.decode_transaction(&record);
        assert_eq!(swaps.len(), 2);
        assert_eq!(swaps[0].log_index, 1);

        match &swaps[0].record {
            SwapRecord::V2Swap { token0, token1, .. } => {
                assert_eq!(*token0, TOKEN_B);
                assert_eq!(*token1, WETH);
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert_eq!(swaps[0].record.flow().token_in, TOKEN_B);

        let flow = swaps[1].record.flow();
        assert_eq!(flow.token_in, WETH);
        assert_eq!(flow.token_out, TOKEN_A);
        assert_eq!(flow.amount_in, U256::from(40u64));
        assert_eq!(flow.amount_out, U256::from(900u64));
    }

    #[test]
    fn test_malformed_log_is_skipped_but_consumes_hop() {
        let decoder = decoder();
        let mut broken = v2_swap_log(TOKEN_C, [0, 500, 40, 0], 1);
        broken.data = Bytes::from(vec![0u8; 10]);
        let record = tx(
            V2_ROUTER,
            v2_call(&[TOKEN_B, WETH, TOKEN_A]),
            vec![broken, v2_swap_log(EXCHANGE_A, [0, 40, 900, 0], 2)],
        );

        let swaps = decoder.decode_transaction(&record);
        assert_eq!(swaps.len(), 1);
        assert!(swaps[0].record.involves_pair(WETH, TOKEN_A));
    }
}
