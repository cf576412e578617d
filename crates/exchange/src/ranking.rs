//! Velocity score used to order surviving Opportunities before Placement (SPEC_FULL.md §4.6).

use crate::types::Opportunity;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

#[must_use]
pub fn velocity_score(opp: &Opportunity, queue_conservative_multiplier: Decimal) -> Decimal {
    let profit_per_pair = (-opp.fill_cost_per_pair).max(Decimal::ZERO);

    let yes_queue = opp
        .yes_book
        .best_bid()
        .map_or(Decimal::ZERO, |(_, size)| size * queue_conservative_multiplier);
    let no_queue = opp
        .no_book
        .best_bid()
        .map_or(Decimal::ZERO, |(_, size)| size * queue_conservative_multiplier);
    let total_queue = yes_queue + no_queue;

    let velocity_factor = if total_queue.is_zero() {
        Decimal::ONE
    } else {
        Decimal::from(100) / (Decimal::from(100) + total_queue)
    };

    let volume_factor = log10_volume_factor(opp.market.volume_24h);
    let reward_bonus = Decimal::ONE + Decimal::from(10) * opp.your_daily_reward;

    profit_per_pair * velocity_factor * volume_factor * reward_bonus
}

fn log10_volume_factor(volume_24h: Decimal) -> Decimal {
    let ratio = (volume_24h / Decimal::from(1000) + Decimal::ONE)
        .to_f64()
        .unwrap_or(1.0);
    if ratio <= 0.0 {
        return Decimal::ONE;
    }
    let factor = 1.0 + libm::log10(ratio);
    Decimal::try_from(factor).unwrap_or(Decimal::ONE)
}

/// Sorts Opportunities by descending velocity score, the ordering Placement walks in.
pub fn rank(opportunities: &mut [Opportunity], queue_conservative_multiplier: Decimal) {
    opportunities.sort_by(|a, b| {
        velocity_score(b, queue_conservative_multiplier)
            .cmp(&velocity_score(a, queue_conservative_multiplier))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{analyze, AnalyzerConfig};
    use crate::types::{Market, OrderBook, RewardConfig, Side, Token};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn opp(volume_24h: Decimal, yes_bid_size: Decimal) -> Opportunity {
        let market = Market {
            condition_id: "0xabc".to_string(),
            question: "q".to_string(),
            yes_token: Token {
                token_id: "yes-1".to_string(),
                side: Side::Yes,
            },
            no_token: Token {
                token_id: "no-1".to_string(),
                side: Side::No,
            },
            resolution_deadline: None,
            maker_fee_rate: dec!(0),
            reward_config: RewardConfig {
                daily_rate: dec!(25),
                min_size: dec!(5),
                max_spread: dec!(0.04),
            },
            active: true,
            neg_risk: false,
            volume_24h,
        };
        let yes = OrderBook::from_levels(
            "yes-1",
            [(dec!(0.48), yes_bid_size)],
            [(dec!(0.50), dec!(200))],
            Utc::now(),
        );
        let no = OrderBook::from_levels("no-1", [(dec!(0.48), dec!(200))], [(dec!(0.50), dec!(200))], Utc::now());
        let cfg = AnalyzerConfig {
            default_fee: dec!(0),
            order_size: dec!(10),
            gold_min_reward: dec!(0),
        };
        analyze(&market, &yes, &no, &cfg, Utc::now()).unwrap()
    }

    #[test]
    fn no_queue_gives_velocity_factor_one() {
        let o = opp(dec!(0), dec!(0));
        let score = velocity_score(&o, dec!(1.5));
        // profit_per_pair should be positive here (bids sum to 0.96 < 1)
        assert!(score >= Decimal::ZERO);
    }

    #[test]
    fn higher_volume_ranks_above_lower_volume_otherwise_equal() {
        let low = opp(dec!(1000), dec!(50));
        let high = opp(dec!(1_000_000), dec!(50));
        assert!(velocity_score(&high, dec!(1.5)) > velocity_score(&low, dec!(1.5)));
    }
}
