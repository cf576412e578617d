//! Drops Opportunities not satisfying the configured predicate set (SPEC_FULL.md §4.3).
//!
//! Grounded on the `ValidationResult`/`ValidationReason` enum pattern in
//! `arbitrage::phase1_config`, generalized to a single filter pass over a `Vec<Opportunity>`.

use crate::types::Opportunity;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub struct FilterConfig {
    pub min_your_daily_reward: Decimal,
    pub max_spread_total: Decimal,
    pub max_competition: Decimal,
    pub require_qualifies: bool,
    pub min_hours_to_resolution: f64,
    pub only_fills_profit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BelowMinDailyReward,
    SpreadTooWide,
    TooMuchCompetition,
    DoesNotQualify,
    TooCloseToResolution,
    NotProfitableFill,
}

#[must_use]
pub fn filter(
    opportunities: Vec<Opportunity>,
    config: &FilterConfig,
    now: DateTime<Utc>,
) -> Vec<Opportunity> {
    opportunities
        .into_iter()
        .filter(|opp| evaluate(opp, config, now).is_none())
        .collect()
}

/// Returns `None` if the opportunity survives the filter, `Some(reason)` for the first gate
/// it fails.
#[must_use]
pub fn evaluate(opp: &Opportunity, config: &FilterConfig, now: DateTime<Utc>) -> Option<SkipReason> {
    if opp.your_daily_reward < config.min_your_daily_reward {
        return Some(SkipReason::BelowMinDailyReward);
    }
    if opp.spread_total > config.max_spread_total {
        return Some(SkipReason::SpreadTooWide);
    }
    if opp.competition > config.max_competition {
        return Some(SkipReason::TooMuchCompetition);
    }
    if config.require_qualifies && !opp.qualifies_for_reward {
        return Some(SkipReason::DoesNotQualify);
    }
    if let Some(hours) = opp.market.hours_to_resolution(now) {
        if hours < config.min_hours_to_resolution {
            return Some(SkipReason::TooCloseToResolution);
        }
    }
    if config.only_fills_profit && opp.fill_cost_in_collateral > Decimal::ZERO {
        return Some(SkipReason::NotProfitableFill);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{analyze, AnalyzerConfig};
    use crate::types::{Market, OrderBook, RewardConfig, Side, Token};
    use rust_decimal_macros::dec;

    fn sample_opportunity() -> Opportunity {
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
            maker_fee_rate: dec!(0.005),
            reward_config: RewardConfig {
                daily_rate: dec!(25),
                min_size: dec!(5),
                max_spread: dec!(0.04),
            },
            active: true,
            neg_risk: false,
            volume_24h: dec!(50000),
        };
        let yes = OrderBook::from_levels("yes-1", [(dec!(0.70), dec!(200))], [(dec!(0.72), dec!(200))], Utc::now());
        let no = OrderBook::from_levels("no-1", [(dec!(0.27), dec!(200))], [(dec!(0.29), dec!(200))], Utc::now());
        let cfg = AnalyzerConfig {
            default_fee: dec!(0.02),
            order_size: dec!(10),
            gold_min_reward: dec!(0),
        };
        analyze(&market, &yes, &no, &cfg, Utc::now()).unwrap()
    }

    #[test]
    fn survives_permissive_filter() {
        let opp = sample_opportunity();
        let cfg = FilterConfig {
            min_your_daily_reward: dec!(0),
            max_spread_total: dec!(0.10),
            max_competition: dec!(1_000_000),
            require_qualifies: true,
            min_hours_to_resolution: 0.0,
            only_fills_profit: false,
        };
        assert!(evaluate(&opp, &cfg, Utc::now()).is_none());
    }

    #[test]
    fn rejects_below_min_reward() {
        let opp = sample_opportunity();
        let cfg = FilterConfig {
            min_your_daily_reward: dec!(1000),
            max_spread_total: dec!(0.10),
            max_competition: dec!(1_000_000),
            require_qualifies: true,
            min_hours_to_resolution: 0.0,
            only_fills_profit: false,
        };
        assert_eq!(
            evaluate(&opp, &cfg, Utc::now()),
            Some(SkipReason::BelowMinDailyReward)
        );
    }
}
