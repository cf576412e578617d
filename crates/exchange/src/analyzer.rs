//! Reward-farming scoring: pure function `(market, yes_book, no_book) -> Opportunity`.
//!
//! Grounded on the gate/validation style of `arbitrage::phase1_config` (named thresholds,
//! `ValidationResult`-shaped outcomes) generalized to the formulas in SPEC_FULL.md §4.2.

use crate::types::{ArbitrageAnalysis, Market, Opportunity, OpportunityCategory, OrderBook};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

const ARBITRAGE_DEPTHS: [Decimal; 4] = [dec!(50), dec!(100), dec!(200), dec!(500)];
const GOLD_GAP_THRESHOLD: Decimal = dec!(-0.02);
const SILVER_GAP_THRESHOLD: Decimal = dec!(-0.05);
/// Fills/day assumed when scoring the arbitrage contribution to `combined_score`; the spec
/// names the factor `expected_fills_per_day` without pinning a value, so a single expected
/// fill is the conservative default.
const EXPECTED_FILLS_PER_DAY: Decimal = dec!(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("empty order book for {side} side of market {condition_id}")]
    EmptyBook {
        condition_id: String,
        side: &'static str,
    },
}

pub struct AnalyzerConfig {
    pub default_fee: Decimal,
    pub order_size: Decimal,
    pub gold_min_reward: Decimal,
}

pub fn analyze(
    market: &Market,
    yes_book: &OrderBook,
    no_book: &OrderBook,
    config: &AnalyzerConfig,
    now: DateTime<Utc>,
) -> Result<Opportunity, AnalyzerError> {
    let (best_bid_yes, _) = yes_book.best_bid().ok_or_else(|| AnalyzerError::EmptyBook {
        condition_id: market.condition_id.clone(),
        side: "YES",
    })?;
    let (best_bid_no, _) = no_book.best_bid().ok_or_else(|| AnalyzerError::EmptyBook {
        condition_id: market.condition_id.clone(),
        side: "NO",
    })?;
    let (best_ask_yes, _) = yes_book.best_ask().ok_or_else(|| AnalyzerError::EmptyBook {
        condition_id: market.condition_id.clone(),
        side: "YES",
    })?;
    let (best_ask_no, _) = no_book.best_ask().ok_or_else(|| AnalyzerError::EmptyBook {
        condition_id: market.condition_id.clone(),
        side: "NO",
    })?;

    let effective_fee = if market.maker_fee_rate > Decimal::ZERO {
        market.maker_fee_rate
    } else {
        config.default_fee
    };

    let spread_total = best_ask_yes + best_ask_no - Decimal::ONE;
    let max_spread = market.reward_config.max_spread;
    let qualifies_for_reward =
        spread_total >= Decimal::ZERO && spread_total <= max_spread && max_spread > Decimal::ZERO;

    let arbitrage_analysis = arbitrage_analysis(yes_book, no_book, best_ask_yes, best_ask_no, effective_fee);

    let competition = yes_book.bid_depth_within_price_window(max_spread)
        + no_book.bid_depth_within_price_window(max_spread);
    let your_share = if competition.is_zero() {
        Decimal::ONE
    } else {
        config.order_size / (config.order_size + competition)
    };

    let spread_score = if max_spread > Decimal::ZERO && spread_total < max_spread {
        ((max_spread - spread_total) / max_spread).powi(2)
    } else {
        Decimal::ZERO
    };

    let your_daily_reward = market.reward_config.daily_rate * your_share * spread_score;

    let fill_cost_per_pair = (best_bid_yes + best_bid_no) * (Decimal::ONE + effective_fee) - Decimal::ONE;
    let avg_bid = (best_bid_yes + best_bid_no) / Decimal::TWO;
    let shares_per_order = if avg_bid.is_zero() {
        Decimal::ZERO
    } else {
        config.order_size / avg_bid
    };
    let fill_cost_in_collateral = fill_cost_per_pair * shares_per_order;

    let break_even_fills = if fill_cost_per_pair <= Decimal::ZERO {
        Decimal::MAX
    } else {
        your_daily_reward / fill_cost_per_pair
    };

    let pnl_scenarios = [0u32, 1, 3]
        .into_iter()
        .map(|fills| {
            (
                fills,
                your_daily_reward - Decimal::from(fills) * fill_cost_in_collateral,
            )
        })
        .collect();

    let pnl_at_1_fill = your_daily_reward - fill_cost_in_collateral;
    let combined_score = pnl_at_1_fill
        + if arbitrage_analysis.is_true_arbitrage {
            arbitrage_analysis.gap_best_ask * config.order_size * EXPECTED_FILLS_PER_DAY
        } else {
            Decimal::ZERO
        };

    let category = if your_daily_reward < config.gold_min_reward {
        OpportunityCategory::Avoid
    } else if arbitrage_analysis.gap_best_ask > GOLD_GAP_THRESHOLD {
        OpportunityCategory::Gold
    } else if arbitrage_analysis.gap_best_ask > SILVER_GAP_THRESHOLD {
        OpportunityCategory::Silver
    } else {
        OpportunityCategory::Bronze
    };

    Ok(Opportunity {
        market: market.clone(),
        yes_book: yes_book.clone(),
        no_book: no_book.clone(),
        scanned_at: now,
        spread_total,
        qualifies_for_reward,
        arbitrage_analysis,
        competition,
        your_share,
        spread_score,
        your_daily_reward,
        fill_cost_per_pair,
        fill_cost_in_collateral,
        break_even_fills,
        pnl_scenarios,
        combined_score,
        category,
    })
}

fn arbitrage_analysis(
    yes_book: &OrderBook,
    no_book: &OrderBook,
    best_ask_yes: Decimal,
    best_ask_no: Decimal,
    fee: Decimal,
) -> ArbitrageAnalysis {
    let gap_best_ask = gap(best_ask_yes, best_ask_no, fee);

    let gap_at_depth = ARBITRAGE_DEPTHS
        .into_iter()
        .filter_map(|depth| {
            let avg_yes = yes_book.avg_ask_price_for_depth(depth)?;
            let avg_no = no_book.avg_ask_price_for_depth(depth)?;
            Some((depth, gap(avg_yes, avg_no, fee)))
        })
        .collect();

    ArbitrageAnalysis {
        gap_best_ask,
        gap_at_depth,
        is_true_arbitrage: gap_best_ask > Decimal::ZERO,
    }
}

fn gap(avg_yes_ask: Decimal, avg_no_ask: Decimal, fee: Decimal) -> Decimal {
    let combined = avg_yes_ask + avg_no_ask;
    Decimal::ONE - combined - fee * combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RewardConfig, Side, Token};

    fn market(max_spread: Decimal, daily_rate: Decimal, maker_fee_rate: Decimal) -> Market {
        Market {
            condition_id: "0xabc".to_string(),
            question: "Will BTC close above 100k?".to_string(),
            yes_token: Token {
                token_id: "yes-1".to_string(),
                side: Side::Yes,
            },
            no_token: Token {
                token_id: "no-1".to_string(),
                side: Side::No,
            },
            resolution_deadline: None,
            maker_fee_rate,
            reward_config: RewardConfig {
                daily_rate,
                min_size: dec!(5),
                max_spread,
            },
            active: true,
            neg_risk: false,
            volume_24h: dec!(50000),
        }
    }

    fn book(token_id: &str, bid: Decimal, ask: Decimal, size: Decimal) -> OrderBook {
        OrderBook::from_levels(token_id, [(bid, size)], [(ask, size)], Utc::now())
    }

    #[test]
    fn s1_single_market_no_fills() {
        let m = market(dec!(0.04), dec!(25), dec!(0.005));
        let yes = book("yes-1", dec!(0.70), dec!(0.72), dec!(200));
        let no = book("no-1", dec!(0.27), dec!(0.29), dec!(200));
        let cfg = AnalyzerConfig {
            default_fee: dec!(0.02),
            order_size: dec!(10),
            gold_min_reward: dec!(0),
        };
        let opp = analyze(&m, &yes, &no, &cfg, Utc::now()).unwrap();
        assert_eq!(opp.spread_total, dec!(0.01));
        assert!(opp.qualifies_for_reward);
        assert!(opp.your_daily_reward > Decimal::ZERO);
    }

    #[test]
    fn empty_book_is_dropped() {
        let m = market(dec!(0.04), dec!(25), dec!(0.005));
        let yes = OrderBook::new("yes-1");
        let no = book("no-1", dec!(0.27), dec!(0.29), dec!(200));
        let cfg = AnalyzerConfig {
            default_fee: dec!(0.02),
            order_size: dec!(10),
            gold_min_reward: dec!(0),
        };
        let err = analyze(&m, &yes, &no, &cfg, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            AnalyzerError::EmptyBook {
                condition_id: "0xabc".to_string(),
                side: "YES",
            }
        );
    }

    #[test]
    fn spread_equal_to_max_zeroes_score_but_qualifies() {
        let m = market(dec!(0.04), dec!(25), dec!(0.0));
        // best_ask_yes + best_ask_no - 1 == max_spread == 0.04
        let yes = book("yes-1", dec!(0.50), dec!(0.52), dec!(200));
        let no = book("no-1", dec!(0.48), dec!(0.52), dec!(200));
        let cfg = AnalyzerConfig {
            default_fee: dec!(0.02),
            order_size: dec!(10),
            gold_min_reward: dec!(0),
        };
        let opp = analyze(&m, &yes, &no, &cfg, Utc::now()).unwrap();
        assert_eq!(opp.spread_total, dec!(0.04));
        assert!(opp.qualifies_for_reward);
        assert_eq!(opp.spread_score, Decimal::ZERO);
        assert_eq!(opp.your_daily_reward, Decimal::ZERO);
    }

    #[test]
    fn zero_competition_gives_full_share() {
        let m = market(dec!(0.04), dec!(25), dec!(0.005));
        // Bids sit far below the midpoint, outside the max_spread (0.04) window, so the
        // competition accessor sees no opposing depth even though the book isn't empty.
        let yes = OrderBook::from_levels("yes-1", [(dec!(0.10), dec!(200))], [(dec!(0.72), dec!(200))], Utc::now());
        let no = OrderBook::from_levels("no-1", [(dec!(0.05), dec!(200))], [(dec!(0.29), dec!(200))], Utc::now());
        let cfg = AnalyzerConfig {
            default_fee: dec!(0.02),
            order_size: dec!(10),
            gold_min_reward: dec!(0),
        };
        let opp = analyze(&m, &yes, &no, &cfg, Utc::now()).unwrap();
        assert_eq!(opp.competition, Decimal::ZERO);
        assert_eq!(opp.your_share, Decimal::ONE);
    }
}
