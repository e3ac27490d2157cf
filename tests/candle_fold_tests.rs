mod common;

use alloy::primitives::{Address, B256, Bytes, U256};
use chrono::{TimeZone, Utc};

use candleswap_backend::models::candle::Candle;
use candleswap_backend::models::swap::{LogEntry, TransactionRecord};
use candleswap_backend::services::candle_aggregator::{
    FoldState, PRICE_SCALE, build_candle, format_price, partly_build_candle,
};

use crate::common::*;

fn record(block: u64, index: u64, to: Address, input: Bytes, logs: Vec<LogEntry>) -> TransactionRecord {
    TransactionRecord {
        hash: B256::with_last_byte((block * 10 + index) as u8),
        from: TRADER,
        to: Some(to),
        input,
        logs,
        block_number: block,
        block_timestamp: GENESIS_TIME + block * BLOCK_TIME,
        transaction_index: index,
    }
}

fn v3_swap(block: u64, amount0: i64, amount1: i64) -> TransactionRecord {
    record(block, 0, V3_ROUTER, v3_call(TOKEN_B, TOKEN_A), vec![v3_swap_log(amount0, amount1, 0)])
}

fn seed() -> Candle {
    Candle::seed(1, 60, Utc.timestamp_opt(GENESIS_TIME as i64, 0).unwrap())
}

/// `num / den` in 18-decimal fixed point.
fn ratio(num: u64, den: u64) -> U256 {
    U256::from(num) * PRICE_SCALE / U256::from(den)
}

fn scenario() -> Vec<TransactionRecord> {
    vec![v3_swap(1, -100, 50), v3_swap(2, -80, 45), v3_swap(3, -120, 55)]
}

#[test]
fn test_three_swap_window() {
    let state = build_candle(&scenario(), TOKEN_A, TOKEN_B, &decoder(), seed());

    assert!(state.was_required_transactions_in_period_of_time);
    assert_eq!(state.candle.volume, U256::from(150u64));
    assert_eq!(state.candle.open, ratio(50, 100));
    assert_eq!(state.candle.close, ratio(55, 120));
    assert_eq!(state.candle.high, ratio(45, 80));
    assert_eq!(state.candle.low, ratio(55, 120));
    assert_eq!(format_price(state.candle.high), "0.5625");
}

#[test]
fn test_paged_fold_matches_single_fold() {
    let all = scenario();
    let whole = build_candle(&all, TOKEN_A, TOKEN_B, &decoder(), seed());

    let decoder = decoder();
    let first = partly_build_candle(&all[..1], TOKEN_A, TOKEN_B, &decoder, FoldState::new(seed()));
    let paged = partly_build_candle(&all[1..], TOKEN_A, TOKEN_B, &decoder, first);

    assert_eq!(paged.candle, whole.candle);
    assert_eq!(paged.first_iter_flag, whole.first_iter_flag);
    assert!(paged.was_required_transactions_in_period_of_time);
}

#[test]
fn test_empty_page_clears_required_flag() {
    let decoder = decoder();
    let first = partly_build_candle(&scenario(), TOKEN_A, TOKEN_B, &decoder, FoldState::new(seed()));
    let after_empty = partly_build_candle(&[], TOKEN_A, TOKEN_B, &decoder, first.clone());

    assert_eq!(after_empty.candle, first.candle);
    assert!(!after_empty.was_required_transactions_in_period_of_time);
    assert!(after_empty.has_swaps());
}

#[test]
fn test_other_pairs_are_ignored() {
    let unrelated = record(
        4,
        0,
        V2_ROUTER,
        v2_call(&[TOKEN_A, WETH]),
        vec![v2_swap_log([500, 0, 0, 40], 0)],
    );
    let state = build_candle(&[unrelated], TOKEN_A, TOKEN_B, &decoder(), seed());

    assert_eq!(state.candle, seed());
    assert!(!state.was_required_transactions_in_period_of_time);
    assert!(!state.has_swaps());
}

#[test]
fn test_malformed_log_does_not_abort_fold() {
    let mut broken = v3_swap_log(-100, 50, 0);
    broken.topics.pop();
    let tx = record(
        5,
        0,
        V3_ROUTER,
        v3_call(TOKEN_B, TOKEN_A),
        vec![broken, v3_swap_log(-80, 45, 1)],
    );

    let state = build_candle(&[tx], TOKEN_A, TOKEN_B, &decoder(), seed());
    assert_eq!(state.candle.open, ratio(45, 80));
    assert_eq!(state.candle.volume, U256::from(45u64));
}

#[test]
fn test_v2_swap_prices_requested_direction() {
    // 500 TOKEN_A in, 40 TOKEN_B out
    let tx = record(
        6,
        0,
        V2_ROUTER,
        v2_call(&[TOKEN_A, TOKEN_B]),
        vec![v2_swap_log([500, 0, 0, 40], 0)],
    );
    let decoder = decoder();

    let forward = build_candle(std::slice::from_ref(&tx), TOKEN_A, TOKEN_B, &decoder, seed());
    assert_eq!(forward.candle.close, ratio(40, 500));
    assert_eq!(forward.candle.volume, U256::from(40u64));

    let inverse = build_candle(&[tx], TOKEN_B, TOKEN_A, &decoder, seed());
    assert_eq!(inverse.candle.close, ratio(500, 40));
    assert_eq!(inverse.candle.volume, U256::from(500u64));
}

#[test]
fn test_tiny_ratio_keeps_precision() {
    let tx = v3_swap(7, -1_000_000_000, 1);
    let state = build_candle(&[tx], TOKEN_A, TOKEN_B, &decoder(), seed());
    assert_eq!(state.candle.close, U256::from(1_000_000_000u64));
    assert_eq!(format_price(state.candle.close), "0.000000001");
}
