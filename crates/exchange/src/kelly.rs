//! Capital-allocation fraction derived from merge history (SPEC_FULL.md §4.7).
//!
//! This is a distinct formula from the win-probability/price Kelly sizer in `pairmaker-core`
//! (which takes an externally supplied win probability); this one is driven entirely by the
//! historical record of merges. Grounded on the exhaustive boundary-value test style of
//! `pairmaker-core::kelly` while implementing the spec's own formula.

use crate::types::MergeResult;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MIN_ATTEMPTS: usize = 3;
const DEFAULT_FRACTION: Decimal = dec!(0.5);
const MIN_FRACTION: Decimal = dec!(0.1);
const MAX_FRACTION: Decimal = dec!(0.8);

#[must_use]
pub fn kelly_fraction(merges: &[MergeResult]) -> Decimal {
    let attempted: Vec<&MergeResult> = merges.iter().filter(|m| m.success).collect();
    if attempted.len() < MIN_ATTEMPTS {
        return DEFAULT_FRACTION;
    }

    let wins: Vec<&&MergeResult> = attempted
        .iter()
        .filter(|m| m.spread_profit > Decimal::ZERO)
        .collect();
    if wins.is_empty() {
        return DEFAULT_FRACTION;
    }

    let p = Decimal::from(wins.len() as u64) / Decimal::from(attempted.len() as u64);
    let avg_win: Decimal =
        wins.iter().map(|m| m.spread_profit).sum::<Decimal>() / Decimal::from(wins.len() as u64);

    let loss_count = attempted.len() - wins.len();
    if loss_count == 0 {
        return DEFAULT_FRACTION;
    }
    let avg_loss: Decimal = attempted
        .iter()
        .filter(|m| m.spread_profit <= Decimal::ZERO)
        .map(|m| m.spread_profit.abs())
        .sum::<Decimal>()
        / Decimal::from(loss_count as u64);

    if avg_loss <= Decimal::ZERO {
        return DEFAULT_FRACTION;
    }

    let b = avg_win / avg_loss;
    let kelly = (p * b - (Decimal::ONE - p)) / b;
    let half_kelly = kelly / Decimal::TWO;
    half_kelly.clamp(MIN_FRACTION, MAX_FRACTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn result(success: bool, spread_profit: Decimal) -> MergeResult {
        MergeResult {
            condition_id: "0xabc".to_string(),
            pair_id: Uuid::new_v4(),
            tx_hash: Some("0xdead".to_string()),
            gas_used: Some(100_000),
            gas_cost_in_collateral: dec!(0.05),
            collateral_received: dec!(13),
            spread_profit,
            success,
            error_message: None,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn fewer_than_three_attempts_returns_default() {
        let merges = vec![result(true, dec!(0.5)), result(true, dec!(0.3))];
        assert_eq!(kelly_fraction(&merges), DEFAULT_FRACTION);
    }

    #[test]
    fn failed_merges_do_not_count_as_attempts() {
        let merges = vec![
            result(false, dec!(0.0)),
            result(false, dec!(0.0)),
            result(true, dec!(0.5)),
            result(true, dec!(0.3)),
        ];
        assert_eq!(kelly_fraction(&merges), DEFAULT_FRACTION);
    }

    #[test]
    fn clamps_to_max_fraction_on_strong_record() {
        let merges = vec![
            result(true, dec!(0.5)),
            result(true, dec!(0.5)),
            result(true, dec!(0.5)),
            result(true, dec!(0.5)),
        ];
        // no losses at all -> avg_loss undefined -> default
        assert_eq!(kelly_fraction(&merges), DEFAULT_FRACTION);
    }

    #[test]
    fn mixed_record_produces_bounded_fraction() {
        let merges = vec![
            result(true, dec!(0.5)),
            result(true, dec!(0.4)),
            result(true, dec!(-0.1)),
            result(true, dec!(-0.2)),
        ];
        let f = kelly_fraction(&merges);
        assert!(f >= MIN_FRACTION && f <= MAX_FRACTION);
    }

    #[test]
    fn all_losses_returns_default() {
        let merges = vec![
            result(true, dec!(-0.1)),
            result(true, dec!(-0.2)),
            result(true, dec!(-0.3)),
        ];
        assert_eq!(kelly_fraction(&merges), DEFAULT_FRACTION);
    }
}
