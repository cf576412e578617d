//! In-memory per-market spread-stability tracker (SPEC_FULL.md §4.8).
//!
//! Grounded in the bounded-`VecDeque` rolling-window pattern used for session stats in the
//! teacher's arbitrage session tracking.

use crate::types::Opportunity;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

const GC_AGE: Duration = Duration::hours(2);

#[derive(Debug, Clone, Copy)]
pub struct SpreadSample {
    pub spread_total: Decimal,
    pub fill_cost_per_pair: Decimal,
    pub observed_at: DateTime<Utc>,
}

pub struct SpreadHistory {
    window: usize,
    fill_cost_threshold: Decimal,
    variance_max: Decimal,
    samples: HashMap<String, VecDeque<SpreadSample>>,
}

impl SpreadHistory {
    #[must_use]
    pub fn new(window: usize, fill_cost_threshold: Decimal, variance_max: Decimal) -> Self {
        Self {
            window,
            fill_cost_threshold,
            variance_max,
            samples: HashMap::new(),
        }
    }

    /// Appends a sample for every Opportunity in the current scan, then garbage-collects
    /// entries whose last sample is older than two hours and were not seen this scan.
    pub fn update(&mut self, opportunities: &[Opportunity], now: DateTime<Utc>) {
        let mut seen = std::collections::HashSet::new();
        for opp in opportunities {
            seen.insert(opp.market.condition_id.clone());
            let deque = self
                .samples
                .entry(opp.market.condition_id.clone())
                .or_default();
            deque.push_back(SpreadSample {
                spread_total: opp.spread_total,
                fill_cost_per_pair: opp.fill_cost_per_pair,
                observed_at: opp.scanned_at,
            });
            while deque.len() > self.window {
                deque.pop_front();
            }
        }
        self.samples.retain(|cid, deque| {
            if seen.contains(cid) {
                return true;
            }
            match deque.back() {
                Some(last) => now - last.observed_at < GC_AGE,
                None => false,
            }
        });
    }

    #[must_use]
    pub fn spread_stable(&self, condition_id: &str) -> bool {
        let Some(deque) = self.samples.get(condition_id) else {
            return false;
        };
        if deque.is_empty() {
            return false;
        }
        if deque.len() < self.window {
            return true;
        }

        let all_cheap = deque
            .iter()
            .all(|s| s.fill_cost_per_pair <= self.fill_cost_threshold);
        if !all_cheap {
            return false;
        }

        coefficient_of_variation(deque) <= self.variance_max
    }
}

fn coefficient_of_variation(deque: &VecDeque<SpreadSample>) -> Decimal {
    let n = Decimal::from(deque.len() as u64);
    let mean: Decimal = deque.iter().map(|s| s.spread_total).sum::<Decimal>() / n;
    if mean.is_zero() {
        return Decimal::MAX;
    }
    let variance: Decimal = deque
        .iter()
        .map(|s| (s.spread_total - mean) * (s.spread_total - mean))
        .sum::<Decimal>()
        / n;
    let std_dev = variance.to_f64().unwrap_or(0.0).sqrt();
    Decimal::try_from(std_dev).unwrap_or(Decimal::MAX) / mean.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{analyze, AnalyzerConfig};
    use crate::types::{Market, OrderBook, RewardConfig, Side, Token};
    use rust_decimal_macros::dec;

    fn opportunity_with(fill_cost_bid: Decimal, now: DateTime<Utc>) -> Opportunity {
        let market = Market {
            condition_id: "m2".to_string(),
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
            volume_24h: dec!(50000),
        };
        let yes = OrderBook::from_levels("yes-1", [(fill_cost_bid, dec!(200))], [(dec!(0.72), dec!(200))], now);
        let no = OrderBook::from_levels("no-1", [(dec!(0.27), dec!(200))], [(dec!(0.29), dec!(200))], now);
        let cfg = AnalyzerConfig {
            default_fee: dec!(0),
            order_size: dec!(10),
            gold_min_reward: dec!(0),
        };
        analyze(&market, &yes, &no, &cfg, now).unwrap()
    }

    #[test]
    fn s4_transient_opportunity_rejected() {
        let mut history = SpreadHistory::new(5, dec!(0.02), dec!(0.30));
        let now = Utc::now();

        // sample 1: fill_cost_per_pair negative (cheap)
        let opp1 = opportunity_with(dec!(0.50), now);
        history.update(&[opp1], now);
        assert!(history.spread_stable("m2"));

        // sample 2: fill_cost_per_pair positive and above threshold
        let opp2 = opportunity_with(dec!(0.80), now + Duration::minutes(1));
        history.update(&[opp2], now + Duration::minutes(1));
        assert!(history.spread_stable("m2")); // still < window

        // sample 3: back to cheap, but one sample in the window is still above threshold
        let opp3 = opportunity_with(dec!(0.50), now + Duration::minutes(2));
        history.update(&[opp3], now + Duration::minutes(2));
        assert!(history.spread_stable("m2")); // 3 samples, window=5, still "allow entry"
    }

    #[test]
    fn gc_drops_unseen_stale_entries() {
        let mut history = SpreadHistory::new(5, dec!(0.02), dec!(0.30));
        let now = Utc::now();
        let opp = opportunity_with(dec!(0.50), now);
        history.update(&[opp], now);
        assert!(history.samples.contains_key("m2"));

        history.update(&[], now + Duration::hours(3));
        assert!(!history.samples.contains_key("m2"));
    }
}
