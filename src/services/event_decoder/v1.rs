//! V1 exchange swaps.
//!
//! Each V1 exchange trades a single token against ETH. Token-to-token output
//! swaps are reconstructed by pairing the Transfer into the called exchange
//! with the next Transfer of a different token. Everything else is read from
//! the exchanges' `EthPurchase` and `TokenPurchase` events.

use alloy::primitives::{Address, U256};

use super::{
    ETH_PURCHASE_TOPIC, ProtocolAddresses, SEL_ETH_TO_TOKEN_SWAP_OUTPUT, SEL_TOKEN_TO_TOKEN_SWAP_OUTPUT,
    TOKEN_PURCHASE_TOPIC, TRANSFER_TOPIC,
};
use crate::models::swap::{DecodedSwap, LogEntry, SwapRecord, TransactionRecord};
use crate::services::word_codec::{DecodeError, Words};

/// Exchange calls recognized by selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeCall {
    /// `tokenToTokenSwapOutput`: buy exactly `tokens_bought` of `token_addr`
    /// with this exchange's token.
    TokenToTokenSwapOutput {
        tokens_bought: U256,
        max_tokens_sold: U256,
        max_eth_sold: U256,
        deadline: U256,
        token_addr: Address,
    },
    /// `ethToTokenSwapOutput`: the ETH bound is the call value.
    EthToTokenSwapOutput { tokens_bought: U256, deadline: U256 },
}

pub fn decode_call(input: &[u8]) -> Result<ExchangeCall, DecodeError> {
    let (selector, args) = super::split_selector(input)
        .ok_or_else(|| DecodeError::Malformed("call data shorter than a selector".into()))?;
    if selector == *SEL_TOKEN_TO_TOKEN_SWAP_OUTPUT {
        let words = Words::from_bytes(args)?;
        Ok(ExchangeCall::TokenToTokenSwapOutput {
            tokens_bought: words.uint(0)?,
            max_tokens_sold: words.uint(1)?,
            max_eth_sold: words.uint(2)?,
            deadline: words.uint(3)?,
            token_addr: words.address(4)?,
        })
    } else if selector == *SEL_ETH_TO_TOKEN_SWAP_OUTPUT {
        let words = Words::from_bytes(args)?;
        Ok(ExchangeCall::EthToTokenSwapOutput {
            tokens_bought: words.uint(0)?,
            deadline: words.uint(1)?,
        })
    } else {
        Err(DecodeError::UnknownSelector(hex::encode(selector)))
    }
}

/// A decoded ERC-20 `Transfer` log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransfer {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub log_index: u64,
}

pub fn decode_transfer(log: &LogEntry) -> Result<TokenTransfer, DecodeError> {
    if log.topics.len() != 3 {
        return Err(DecodeError::TopicCount {
            event: "Transfer",
            expected: 3,
            actual: log.topics.len(),
        });
    }
    let topics = Words::from_topics(&log.topics);
    let data = Words::from_bytes(&log.data)?;

    Ok(TokenTransfer {
        token: log.address,
        from: topics.address(1)?,
        to: topics.address(2)?,
        value: data.uint(0)?,
        log_index: log.log_index,
    })
}

/// Decodes an `EthPurchase` (token sold for ETH) or `TokenPurchase` (ETH sold
/// for token) log. All three parameters are indexed.
pub fn decode_purchase(log: &LogEntry, protocols: &ProtocolAddresses) -> Result<SwapRecord, DecodeError> {
    if log.topics.len() != 4 {
        return Err(DecodeError::TopicCount {
            event: "Purchase(v1)",
            expected: 4,
            actual: log.topics.len(),
        });
    }
    let token = *protocols.v1_exchanges.get(&log.address).ok_or_else(|| {
        DecodeError::Malformed(format!("{} is not a known V1 exchange", log.address))
    })?;
    let topics = Words::from_topics(&log.topics);

    if log.topic0() == Some(&*ETH_PURCHASE_TOPIC) {
        Ok(SwapRecord::V1EthPurchase {
            exchange: log.address,
            buyer: topics.address(1)?,
            token,
            weth: protocols.weth,
            tokens_sold: topics.uint(2)?,
            eth_bought: topics.uint(3)?,
        })
    } else {
        Ok(SwapRecord::V1TokenPurchase {
            exchange: log.address,
            buyer: topics.address(1)?,
            token,
            weth: protocols.weth,
            eth_sold: topics.uint(2)?,
            tokens_bought: topics.uint(3)?,
        })
    }
}

/// Pairs each inbound transfer to `exchange` with the next transfer of a
/// different token contract.
pub fn pair_transfers(exchange: Address, transfers: &[TokenTransfer]) -> Vec<DecodedSwap> {
    let mut swaps = Vec::new();
    let mut i = 0;
    while i < transfers.len() {
        let inbound = &transfers[i];
        if inbound.to != exchange {
            i += 1;
            continue;
        }

        let outbound = transfers[i + 1..]
            .iter()
            .position(|t| t.token != inbound.token)
            .map(|offset| i + 1 + offset);

        match outbound {
            Some(j) => {
                let out = &transfers[j];
                swaps.push(DecodedSwap {
                    log_index: inbound.log_index,
                    record: SwapRecord::V1Transfer {
                        exchange,
                        token_in: inbound.token,
                        token_out: out.token,
                        amount_in: inbound.value,
                        amount_out: out.value,
                    },
                });
                i = j + 1;
            }
            None => break,
        }
    }
    swaps
}

pub fn decode(tx: &TransactionRecord, exchange: Address, protocols: &ProtocolAddresses) -> Vec<DecodedSwap> {
    if let Ok(ExchangeCall::TokenToTokenSwapOutput {
        tokens_bought,
        token_addr,
        ..
    }) = decode_call(&tx.input)
    {
        tracing::trace!(tx = %tx.hash, %token_addr, %tokens_bought, "v1 token-to-token output swap");
        let transfers: Vec<TokenTransfer> = tx
            .logs
            .iter()
            .filter(|log| log.topic0() == Some(&*TRANSFER_TOPIC))
            .filter_map(|log| match decode_transfer(log) {
                Ok(transfer) => Some(transfer),
                Err(e) => {
                    super::skip_log(tx, log.log_index, &e);
                    None
                }
            })
            .collect();
        return pair_transfers(exchange, &transfers);
    }

    tx.logs
        .iter()
        .filter(|log| {
            let topic = log.topic0();
            topic == Some(&*ETH_PURCHASE_TOPIC) || topic == Some(&*TOKEN_PURCHASE_TOPIC)
        })
        .filter_map(|log| match decode_purchase(log, protocols) {
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
