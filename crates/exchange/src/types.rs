//! Domain model for the reward-farming / merge-arbitrage engine: markets, order books,
//! opportunities, and the persisted order/fill/merge/breaker entities.
//!
//! Grounded on the order-book and arbitrage-position shapes in `arbitrage::types` and the
//! market/token shapes in `models`, generalized to the schema in SPEC_FULL.md §3.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub token_id: String,
    pub side: Side,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    pub daily_rate: Decimal,
    pub min_size: Decimal,
    pub max_spread: Decimal,
}

/// A binary market with its two complementary outcome tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub question: String,
    pub yes_token: Token,
    pub no_token: Token,
    pub resolution_deadline: Option<DateTime<Utc>>,
    pub maker_fee_rate: Decimal,
    pub reward_config: RewardConfig,
    pub active: bool,
    pub neg_risk: bool,
    pub volume_24h: Decimal,
}

impl Market {
    #[must_use]
    pub fn hours_to_resolution(&self, now: DateTime<Utc>) -> Option<f64> {
        self.resolution_deadline
            .map(|deadline| (deadline - now).num_seconds() as f64 / 3600.0)
    }

    #[must_use]
    pub fn is_near_end(&self, now: DateTime<Utc>, near_end_hours: f64) -> bool {
        matches!(self.hours_to_resolution(now), Some(h) if h > 0.0 && h < near_end_hours)
    }

    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, stale_hours: f64) -> bool {
        !self.active
            || matches!(self.hours_to_resolution(now), Some(h) if h <= 0.0)
            || self.hours_to_resolution(now).is_none() && stale_hours <= 0.0
    }
}

/// A single `(price, size)` resting level. Price is in `(0, 1)`; size is in shares.
pub type Level = (Decimal, Decimal);

/// An immutable snapshot of one token's resting bids and asks.
///
/// Bids are keyed by `Reverse<Decimal>` so `BTreeMap` iteration order is price-descending;
/// asks are keyed directly so iteration is price-ascending. Matches the representation used
/// throughout the order-book handling code this crate is descended from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub token_id: String,
    pub bids: BTreeMap<Reverse<Decimal>, Decimal>,
    pub asks: BTreeMap<Decimal, Decimal>,
    pub snapshot_at: Option<DateTime<Utc>>,
}

impl OrderBook {
    #[must_use]
    pub fn new(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            snapshot_at: None,
        }
    }

    pub fn from_levels(
        token_id: impl Into<String>,
        bid_levels: impl IntoIterator<Item = Level>,
        ask_levels: impl IntoIterator<Item = Level>,
        snapshot_at: DateTime<Utc>,
    ) -> Self {
        let mut book = Self::new(token_id);
        for (price, size) in bid_levels {
            if size > Decimal::ZERO {
                book.bids.insert(Reverse(price), size);
            }
        }
        for (price, size) in ask_levels {
            if size > Decimal::ZERO {
                book.asks.insert(price, size);
            }
        }
        book.snapshot_at = Some(snapshot_at);
        book
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Level> {
        self.bids.iter().next().map(|(Reverse(p), s)| (*p, *s))
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Level> {
        self.asks.iter().next().map(|(p, s)| (*p, *s))
    }

    #[must_use]
    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Total ask depth, in shares, whose price lies within `window` collateral of the best ask
    /// (a volume-weighted walk stopping once `window` worth of collateral has been summed).
    #[must_use]
    pub fn ask_depth_within(&self, window: Decimal) -> Decimal {
        let mut spent = Decimal::ZERO;
        let mut shares = Decimal::ZERO;
        for (price, size) in &self.asks {
            if spent >= window {
                break;
            }
            let level_cost = price * size;
            let remaining = window - spent;
            if level_cost <= remaining {
                shares += size;
                spent += level_cost;
            } else {
                shares += remaining / price;
                spent = window;
            }
        }
        shares
    }

    /// Total bid depth, in collateral, within `window` collateral of the best bid.
    #[must_use]
    pub fn bid_depth_within_usdc(&self, window: Decimal) -> Decimal {
        let mut spent = Decimal::ZERO;
        for (Reverse(price), size) in &self.bids {
            if spent >= window {
                break;
            }
            spent += price * size;
        }
        spent.min(window.max(spent))
    }

    /// Aggregate collateral value of bids priced within `window` of the midpoint — the
    /// "opposing bid depth inside the spread window" the analyzer treats as competition.
    #[must_use]
    pub fn bid_depth_within_price_window(&self, window: Decimal) -> Decimal {
        let Some(mid) = self.midpoint() else {
            return Decimal::ZERO;
        };
        self.bids
            .iter()
            .filter(|(Reverse(price), _)| mid - **price <= window)
            .map(|(Reverse(price), size)| price * size)
            .sum()
    }

    #[must_use]
    pub fn total_ask_depth(&self) -> Decimal {
        self.asks.values().sum()
    }

    #[must_use]
    pub fn total_bid_depth(&self) -> Decimal {
        self.bids.values().sum()
    }

    /// Volume-weighted average ask price for filling `depth` collateral worth of shares,
    /// walking the ask side from best to worst. Returns `None` if the book can't fill it.
    #[must_use]
    pub fn avg_ask_price_for_depth(&self, depth: Decimal) -> Option<Decimal> {
        let mut spent = Decimal::ZERO;
        let mut shares = Decimal::ZERO;
        for (price, size) in &self.asks {
            if spent >= depth {
                break;
            }
            let level_cost = price * size;
            let remaining = depth - spent;
            if level_cost <= remaining {
                shares += size;
                spent += level_cost;
            } else {
                let partial_shares = remaining / price;
                shares += partial_shares;
                spent = depth;
            }
        }
        if shares.is_zero() {
            None
        } else {
            Some(spent / shares)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpportunityCategory {
    Avoid,
    Bronze,
    Silver,
    Gold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageAnalysis {
    pub gap_best_ask: Decimal,
    pub gap_at_depth: Vec<(Decimal, Decimal)>, // (depth, gap)
    pub is_true_arbitrage: bool,
}

/// An immutable per-cycle scoring record produced by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub market: Market,
    pub yes_book: OrderBook,
    pub no_book: OrderBook,
    pub scanned_at: DateTime<Utc>,
    pub spread_total: Decimal,
    pub qualifies_for_reward: bool,
    pub arbitrage_analysis: ArbitrageAnalysis,
    pub competition: Decimal,
    pub your_share: Decimal,
    pub spread_score: Decimal,
    pub your_daily_reward: Decimal,
    pub fill_cost_per_pair: Decimal,
    pub fill_cost_in_collateral: Decimal,
    pub break_even_fills: Decimal,
    pub pnl_scenarios: Vec<(u32, Decimal)>,
    pub combined_score: Decimal,
    pub category: OpportunityCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveOrderStatus {
    Open,
    Partial,
    Filled,
    Cancelled,
    Expired,
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveOrder {
    pub id: Uuid,
    pub exchange_order_id: Option<String>,
    pub condition_id: String,
    pub token_id: String,
    pub side: Side,
    pub bid_price: Decimal,
    pub size: Decimal,
    pub filled_size: Decimal,
    pub pair_id: Uuid,
    pub placed_at: DateTime<Utc>,
    pub status: LiveOrderStatus,
    pub filled_at: Option<DateTime<Utc>>,
    pub filled_price: Option<Decimal>,
    pub question: String,
    pub queue_ahead: Decimal,
    pub daily_reward: Decimal,
    pub end_date: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub neg_risk: bool,
    pub competition_at_placement: Decimal,
}

impl LiveOrder {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.filled_size >= self.size * Decimal::new(999, 3)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFill {
    pub order_id: Uuid,
    pub exchange_trade_id: Option<String>,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub condition_id: String,
    pub pair_id: Uuid,
    pub tx_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub gas_cost_in_collateral: Decimal,
    pub collateral_received: Decimal,
    pub spread_profit: Decimal,
    pub success: bool,
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub consecutive_losses: u32,
    pub max_losses: u32,
    pub cooldown_until: DateTime<Utc>,
    pub cooldown_duration_seconds: i64,
    pub total_pnl: Decimal,
    pub max_drawdown: Decimal,
    pub triggered: bool,
    pub triggered_reason: Option<String>,
}

impl CircuitBreakerState {
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        !self.triggered && now >= self.cooldown_until
    }
}
