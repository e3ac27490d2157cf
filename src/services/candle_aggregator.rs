//! Folds decoded swaps for one pair into an OHLCV candle.
//!
//! The fold is restartable: feeding pages one at a time while carrying the
//! returned [`FoldState`] forward gives the same candle as one call over the
//! concatenated pages. Transactions must arrive in ascending
//! (block, transaction index) order; open and close depend on it.

use alloy::primitives::{Address, U256};

use crate::models::candle::Candle;
use crate::models::swap::{SwapFlow, SwapRecord, TransactionRecord};
use crate::services::event_decoder::EventDecoder;

pub const PRICE_DECIMALS: usize = 18;

/// 10^18, the fixed-point scale for prices.
pub const PRICE_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Candle plus the two flags that let a fold resume on the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldState {
    pub candle: Candle,
    /// ANDed with "this page had at least one contributing swap".
    pub was_required_transactions_in_period_of_time: bool,
    /// Cleared once the first contributing swap has set `open`.
    pub first_iter_flag: bool,
}

impl FoldState {
    pub fn new(seed: Candle) -> Self {
        Self {
            candle: seed,
            was_required_transactions_in_period_of_time: true,
            first_iter_flag: true,
        }
    }

    /// True once any page of the fold contributed a swap.
    pub fn has_swaps(&self) -> bool {
        !self.first_iter_flag
    }
}

/// Price and volume contribution of one swap for a requested direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    pub price: U256,
    pub volume: U256,
}

/// `numerator / denominator` scaled by 10^18. Falls back to dividing first
/// when the scaled numerator would overflow 256 bits.
pub fn fixed_point_ratio(numerator: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    match numerator.checked_mul(PRICE_SCALE) {
        Some(scaled) => Some(scaled / denominator),
        None => (numerator / denominator).checked_mul(PRICE_SCALE),
    }
}

/// Quotes a swap as `amount(token_out) / amount(token_in)`. Returns `None`
/// when the swap is for a different pair or either side moved nothing.
pub fn quote_swap(record: &SwapRecord, token_in: Address, token_out: Address) -> Option<SwapQuote> {
    quote_flow(&record.flow(), token_in, token_out)
}

pub fn quote_flow(flow: &SwapFlow, token_in: Address, token_out: Address) -> Option<SwapQuote> {
    if !flow.involves_pair(token_in, token_out) {
        return None;
    }
    let amount_in = flow.amount_of(token_in)?;
    let amount_out = flow.amount_of(token_out)?;
    if amount_in.is_zero() || amount_out.is_zero() {
        return None;
    }

    Some(SwapQuote {
        price: fixed_point_ratio(amount_out, amount_in)?,
        volume: amount_out,
    })
}

fn apply_quote(candle: &mut Candle, quote: SwapQuote, first: bool) {
    if first {
        candle.open = quote.price;
    }
    candle.close = quote.price;
    candle.high = candle.high.max(quote.price);
    candle.low = candle.low.min(quote.price);
    candle.volume = candle.volume.saturating_add(quote.volume);
}

/// Folds one page of swap flows, already in chain order, into `state`.
pub fn fold_flows(
    flows: impl IntoIterator<Item = SwapFlow>,
    token_in: Address,
    token_out: Address,
    state: FoldState,
) -> FoldState {
    let FoldState {
        mut candle,
        was_required_transactions_in_period_of_time,
        mut first_iter_flag,
    } = state;
    let mut observed = false;

    for flow in flows {
        let Some(quote) = quote_flow(&flow, token_in, token_out) else {
            continue;
        };
        apply_quote(&mut candle, quote, first_iter_flag);
        first_iter_flag = false;
        observed = true;
    }

    FoldState {
        candle,
        was_required_transactions_in_period_of_time: was_required_transactions_in_period_of_time
            && observed,
        first_iter_flag,
    }
}

/// Folds one page of transactions into `state`.
pub fn partly_build_candle(
    transactions: &[TransactionRecord],
    token_in: Address,
    token_out: Address,
    decoder: &EventDecoder,
    state: FoldState,
) -> FoldState {
    let flows = transactions
        .iter()
        .flat_map(|tx| decoder.relevant_swaps(tx, token_in, token_out))
        .map(|swap| swap.record.flow());
    fold_flows(flows, token_in, token_out, state)
}

/// One-shot fold over a complete window.
pub fn build_candle(
    transactions: &[TransactionRecord],
    token_in: Address,
    token_out: Address,
    decoder: &EventDecoder,
    seed: Candle,
) -> FoldState {
    partly_build_candle(transactions, token_in, token_out, decoder, FoldState::new(seed))
}

/// Renders a fixed-point price with trailing fractional zeros removed.
pub fn format_price(value: U256) -> String {
    let integer = value / PRICE_SCALE;
    let fraction = value % PRICE_SCALE;
    if fraction.is_zero() {
        return integer.to_string();
    }

    let digits = format!("{:0>width$}", fraction.to_string(), width = PRICE_DECIMALS);
    format!("{}.{}", integer, digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_decoder::test_support::*;
    use chrono::{TimeZone, Utc};

    fn seed() -> Candle {
        Candle::seed(1, 60, Utc.timestamp_opt(1_600_000_000, 0).unwrap())
    }

    #[test]
    fn test_small_ratio_is_not_truncated() {
        let price = fixed_point_ratio(U256::from(1u64), U256::from(3u64)).unwrap();
        assert_eq!(price, U256::from(333_333_333_333_333_333u64));
        assert_eq!(fixed_point_ratio(U256::from(1u64), U256::ZERO), None);
    }

    #[test]
    fn test_huge_ratio_does_not_overflow() {
        let price = fixed_point_ratio(U256::MAX, U256::from(U256::MAX / PRICE_SCALE)).unwrap();
        assert!(price >= PRICE_SCALE);
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(PRICE_SCALE * U256::from(2u64)), "2");
        assert_eq!(format_price(PRICE_SCALE / U256::from(2u64)), "0.5");
        assert_eq!(format_price(U256::from(1u64)), "0.000000000000000001");
    }

    #[test]
    fn test_empty_page_keeps_seed_and_clears_flag() {
        let state = build_candle(&[], TOKEN_A, TOKEN_B, &decoder(), seed());
        assert_eq!(state.candle, seed());
        assert!(!state.was_required_transactions_in_period_of_time);
        assert!(state.first_iter_flag);
    }

    #[test]
    fn test_zero_amount_swap_does_not_contribute() {
        let record = tx(
            V3_ROUTER,
            v3_call(TOKEN_B, TOKEN_A),
            vec![v3_swap_log(TOKEN_C, 0, 50, 0)],
        );
        let state = build_candle(&[record], TOKEN_A, TOKEN_B, &decoder(), seed());
        assert_eq!(state.candle, seed());
        assert!(!state.was_required_transactions_in_period_of_time);
    }

    #[test]
    fn test_single_swap_sets_all_prices() {
        let record = tx(
            V3_ROUTER,
            v3_call(TOKEN_B, TOKEN_A),
            vec![v3_swap_log(TOKEN_C, -100, 50, 0)],
        );
        // requested direction: TOKEN_A in, TOKEN_B out
        let state = build_candle(&[record], TOKEN_A, TOKEN_B, &decoder(), seed());
        let half = PRICE_SCALE / U256::from(2u64);

        assert!(state.was_required_transactions_in_period_of_time);
        assert!(!state.first_iter_flag);
        assert_eq!(state.candle.open, half);
        assert_eq!(state.candle.close, half);
        assert_eq!(state.candle.high, half);
        assert_eq!(state.candle.low, half);
        assert_eq!(state.candle.volume, U256::from(50u64));
    }

    #[test]
    fn test_fold_flows_skips_other_pairs() {
        let flow = |token_in, token_out, amount_in: u64, amount_out: u64| SwapFlow {
            token_in,
            token_out,
            amount_in: U256::from(amount_in),
            amount_out: U256::from(amount_out),
        };
        let flows = vec![
            flow(TOKEN_B, TOKEN_A, 100, 50),
            flow(TOKEN_A, TOKEN_C, 10, 10),
            flow(TOKEN_A, TOKEN_B, 40, 160),
        ];

        let state = fold_flows(flows, TOKEN_A, TOKEN_B, FoldState::new(seed()));
        assert!(state.has_swaps());
        assert_eq!(state.candle.open, PRICE_SCALE * U256::from(2u64));
        assert_eq!(state.candle.close, PRICE_SCALE * U256::from(4u64));
        assert_eq!(state.candle.low, PRICE_SCALE * U256::from(2u64));
        assert_eq!(state.candle.volume, U256::from(260u64));

        let empty = fold_flows(Vec::new(), TOKEN_A, TOKEN_B, state.clone());
        assert_eq!(empty.candle, state.candle);
        assert!(!empty.was_required_transactions_in_period_of_time);
    }
}
