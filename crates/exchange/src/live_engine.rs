//! The live control loop (SPEC_FULL.md §4.4): eight phases run once per cycle, in the fixed
//! order Guard → Discovery → Reconciliation → Maintenance → Merge → Capital allocation →
//! Placement → Reporting. Reconciliation-before-Maintenance-before-Merge-before-Placement is
//! the safety-critical invariant — it keeps Maintenance from cancelling the live counterpart of
//! an order that just filled.
//!
//! Grounded in the teacher's `core::engine::TradingSystem::run` loop shape, generalized from a
//! single strategy-evaluation step to the eight named phases; persistence is reached through
//! `LiveEngineStore` rather than a concrete repository so this module stays testable without a
//! database.

use crate::circuit_breaker::CircuitBreaker;
use crate::filter::{self, FilterConfig};
use crate::kelly::kelly_fraction;
use crate::merge_executor::MergeExecutor;
use crate::placement::{self, GateOutcome, PlacementConfig, StopReason};
use crate::ranking::rank;
use crate::reconciler::{self, ExchangeOrderSnapshot};
use crate::scanner::{self, ScannerConfig};
use crate::spread_history::SpreadHistory;
use crate::types::{LiveFill, LiveOrder, LiveOrderStatus, Market, MergeResult, Opportunity, OrderBook};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pairmaker_core::error::ServiceError;
use pairmaker_core::traits::{ChainClient, ExchangeRestClient};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

/// Durable state the engine reads and writes each cycle. A thin seam so tests can run the
/// loop against an in-memory fake instead of `pairmaker-data`'s sqlx repositories.
#[async_trait]
pub trait LiveEngineStore: Send + Sync {
    async fn load_open_orders(&self) -> Result<Vec<LiveOrder>, ServiceError>;
    async fn save_orders(&self, orders: &[LiveOrder]) -> Result<(), ServiceError>;
    async fn save_fills(&self, fills: &[LiveFill]) -> Result<(), ServiceError>;
    async fn load_merge_history(&self) -> Result<Vec<MergeResult>, ServiceError>;
    async fn save_merge_result(&self, result: &MergeResult) -> Result<(), ServiceError>;
    async fn save_daily_summary(&self, summary: &DailySummary) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct DailySummary {
    pub date: DateTime<Utc>,
    pub active_pairs: usize,
    pub open_orders: usize,
    pub total_merge_profit: Decimal,
    pub effective_capital: Decimal,
    pub breaker_triggered: bool,
}

pub struct EngineConfig {
    pub initial_capital: Decimal,
    pub max_exposure: Decimal,
    pub min_merge_profit: Decimal,
    pub merge_delay_minutes: i64,
    pub stale_hours: f64,
    pub competition_multiplier: Decimal,
    pub neg_risk_ctf_contract: String,
    pub wallet_address: String,
    pub placement: PlacementConfig,
    pub queue_conservative_multiplier: Decimal,
    pub filter: FilterConfig,
}

pub struct CycleReport {
    pub new_orders: Vec<LiveOrder>,
    pub merges: Vec<MergeResult>,
    pub cancelled: Vec<Uuid>,
    pub warnings: Vec<String>,
    pub summary: DailySummary,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_cycle(
    exchange: &dyn ExchangeRestClient,
    chain: &dyn ChainClient,
    merge_executor: &MergeExecutor<'_>,
    store: &dyn LiveEngineStore,
    breaker: &CircuitBreaker,
    spread_history: &mut SpreadHistory,
    scanner_config: &ScannerConfig,
    config: &EngineConfig,
    markets: Vec<Market>,
    fetch_books: impl Fn(&[String]) -> futures_util::future::BoxFuture<'static, Result<Vec<OrderBook>, ServiceError>>
        + Send
        + Sync
        + 'static,
    fetch_exchange_orders: impl Fn() -> futures_util::future::BoxFuture<'static, Result<Vec<ExchangeOrderSnapshot>, ServiceError>>,
) -> Result<CycleReport, ServiceError> {
    let now = Utc::now();
    let mut warnings = Vec::new();

    // Phase 1: Guard.
    if !breaker.is_open(now) {
        let snapshot = breaker.snapshot();
        let reason = snapshot
            .triggered_reason
            .unwrap_or_else(|| "cooling down".to_string());
        warnings.push(format!("circuit breaker closed: {reason}"));
        let orders = store.load_open_orders().await?;
        let summary = build_summary(now, &orders, Decimal::ZERO, Decimal::ZERO, true);
        store.save_daily_summary(&summary).await?;
        return Ok(CycleReport {
            new_orders: Vec::new(),
            merges: Vec::new(),
            cancelled: Vec::new(),
            warnings,
            summary,
        });
    }

    // Phase 2: Discovery.
    let opportunities = scanner::run_once(exchange, markets, fetch_books, scanner_config)
        .await
        .map_err(|e| ServiceError::UnexpectedResponse {
            endpoint: "scanner".to_string(),
            detail: e.to_string(),
        })?;
    let mut opportunities = filter::filter(opportunities, &config.filter, now);
    scanner::sort_by_category_then_score(&mut opportunities);
    spread_history.update(&opportunities, now);
    let by_condition: HashMap<String, &Opportunity> = opportunities
        .iter()
        .map(|o| (o.market.condition_id.clone(), o))
        .collect();

    // Phase 3: Reconciliation.
    let mut orders = store.load_open_orders().await?;
    let exchange_orders = fetch_exchange_orders().await?;
    let actions = reconciler::reconcile_open_orders(&orders, &exchange_orders, now);
    let synthetic_fills = apply_reconcile_actions(&mut orders, &actions, now);
    if !synthetic_fills.is_empty() {
        store.save_fills(&synthetic_fills).await?;
    }

    // Phase 4: Maintenance.
    let mut cancelled = Vec::new();
    run_maintenance(
        &mut orders,
        &by_condition,
        chain,
        &config.neg_risk_ctf_contract,
        &config.wallet_address,
        config.stale_hours,
        config.competition_multiplier,
        now,
        &mut cancelled,
        &mut warnings,
    )
    .await?;

    // Phase 5: Merge.
    let mut merges = Vec::new();
    run_merges(
        &mut orders,
        merge_executor,
        breaker,
        store,
        config.merge_delay_minutes,
        config.min_merge_profit,
        now,
        &mut merges,
    )
    .await?;

    // Phase 6: Capital allocation.
    let merge_history = store.load_merge_history().await?;
    let kelly = kelly_fraction(&merge_history);
    let total_merge_profit: Decimal = merge_history.iter().map(|m| m.spread_profit).sum();
    let bankroll = config.initial_capital + total_merge_profit;
    let mut effective_capital = (bankroll * kelly).min(config.max_exposure);
    if effective_capital <= Decimal::ZERO {
        effective_capital = config.initial_capital * Decimal::new(5, 1);
    }
    tracing::info!(
        %kelly,
        %bankroll,
        %effective_capital,
        "capital allocation split"
    );

    // Phase 7: Placement.
    let balance = fetch_collateral_balance(exchange).await?;
    let mut ranked = opportunities;
    rank(&mut ranked, config.queue_conservative_multiplier);
    let deployed: Decimal = orders
        .iter()
        .filter(|o| matches!(o.status, LiveOrderStatus::Open | LiveOrderStatus::Partial))
        .map(|o| o.bid_price * o.size)
        .sum();
    let active_conditions: std::collections::HashSet<&str> = orders
        .iter()
        .filter(|o| matches!(o.status, LiveOrderStatus::Open | LiveOrderStatus::Partial))
        .map(|o| o.condition_id.as_str())
        .collect();
    let active_market_count = active_conditions.len();
    let mut new_orders = Vec::new();
    let mut deployed_running = deployed;

    for opp in &ranked {
        let outcome = placement::evaluate_gates(
            opp,
            &config.placement,
            active_market_count + new_orders.len() / 2,
            active_conditions.contains(opp.market.condition_id.as_str()),
            breaker.is_open(now),
            spread_history,
            effective_capital,
            deployed_running,
            balance,
        );
        match outcome {
            GateOutcome::StopCycle(StopReason::MaxMarketsReached | StopReason::CapitalExhausted) => break,
            GateOutcome::StopCycle(StopReason::BreakerClosed) => break,
            GateOutcome::Skip(_) => continue,
            GateOutcome::Pass => {}
        }

        if opp.market.neg_risk {
            warnings.push(format!(
                "skipping {}: negative-risk markets unsupported",
                opp.market.condition_id
            ));
            continue;
        }

        let Some((yes_bid, no_bid)) = placement::optimize_bids(
            opp.yes_book.best_bid().map_or(Decimal::ZERO, |(p, _)| p),
            opp.no_book.best_bid().map_or(Decimal::ZERO, |(p, _)| p),
            opp.market.maker_fee_rate,
            config.placement.order_size,
            opp.yes_book.best_bid().map_or(Decimal::ZERO, |(_, s)| s),
            opp.no_book.best_bid().map_or(Decimal::ZERO, |(_, s)| s),
            config.placement.bid_tick,
            config.placement.max_bid_tick_up,
        ) else {
            continue;
        };

        let size = config.placement.order_size;
        match placement::submit_pair(
            exchange,
            &opp.market.condition_id,
            &opp.market.yes_token.token_id,
            &opp.market.no_token.token_id,
            yes_bid,
            no_bid,
            size,
            opp.yes_book.best_bid().map_or(Decimal::ZERO, |(_, s)| s),
            opp.no_book.best_bid().map_or(Decimal::ZERO, |(_, s)| s),
            opp.competition,
            &opp.market.question,
            config.queue_conservative_multiplier,
        )
        .await
        {
            Ok((yes_order, no_order)) => {
                deployed_running += (yes_bid + no_bid) * size;
                new_orders.push(yes_order);
                new_orders.push(no_order);
            }
            Err(e) => warnings.push(format!(
                "placement failed for {}: {e}",
                opp.market.condition_id
            )),
        }
    }

    orders.extend(new_orders.clone());
    store.save_orders(&orders).await?;

    // Phase 8: Reporting.
    for order in &orders {
        if matches!(order.status, LiveOrderStatus::Partial) {
            warnings.push(format!("order {} is only partially filled", order.id));
        }
        if let Some(opp) = by_condition.get(&order.condition_id) {
            if opp.market.is_near_end(now, 24.0) {
                warnings.push(format!("market {} nearing resolution", order.condition_id));
            }
        }
    }
    let summary = build_summary(now, &orders, total_merge_profit, effective_capital, false);
    store.save_daily_summary(&summary).await?;

    Ok(CycleReport {
        new_orders,
        merges,
        cancelled,
        warnings,
        summary,
    })
}

/// Reads the exchange-held collateral balance for the trading wallet (SPEC_FULL.md §4.4 Phase
/// 2), used to clamp placement sizing against real spendable capital rather than the Kelly
/// allocation alone.
async fn fetch_collateral_balance(exchange: &dyn ExchangeRestClient) -> Result<Decimal, ServiceError> {
    let body = exchange.get_json("/balance").await?;
    body.get("collateral")
        .cloned()
        .and_then(|v| serde_json::from_value::<Decimal>(v).ok())
        .ok_or_else(|| ServiceError::UnexpectedResponse {
            endpoint: "balance".to_string(),
            detail: "missing or invalid collateral field".to_string(),
        })
}

#[must_use]
fn apply_reconcile_actions(
    orders: &mut [LiveOrder],
    actions: &[reconciler::ReconcileAction],
    now: DateTime<Utc>,
) -> Vec<LiveFill> {
    let mut fills = Vec::new();
    for action in actions {
        match action {
            reconciler::ReconcileAction::MarkCancelled { order_id } => {
                if let Some(o) = orders.iter_mut().find(|o| o.id == *order_id) {
                    o.status = LiveOrderStatus::Cancelled;
                }
            }
            reconciler::ReconcileAction::MarkFilledWithSyntheticFill { order_id, fill } => {
                if let Some(o) = orders.iter_mut().find(|o| o.id == *order_id) {
                    o.filled_size += fill.size;
                    o.status = LiveOrderStatus::Filled;
                    o.filled_at = Some(now);
                    o.filled_price = Some(fill.price);
                }
                fills.push(fill.clone());
            }
            reconciler::ReconcileAction::UpdateFilledSize { order_id, filled_size } => {
                if let Some(o) = orders.iter_mut().find(|o| o.id == *order_id) {
                    o.filled_size = *filled_size;
                    if o.filled_size > Decimal::ZERO {
                        o.status = LiveOrderStatus::Partial;
                    }
                }
            }
            reconciler::ReconcileAction::MarkFilled { order_id } => {
                if let Some(o) = orders.iter_mut().find(|o| o.id == *order_id) {
                    o.status = LiveOrderStatus::Filled;
                    o.filled_at = Some(now);
                }
            }
        }
    }
    fills
}

#[allow(clippy::too_many_arguments)]
async fn run_maintenance(
    orders: &mut [LiveOrder],
    by_condition: &HashMap<String, &Opportunity>,
    chain: &dyn ChainClient,
    ctf_contract: &str,
    wallet: &str,
    stale_hours: f64,
    competition_multiplier: Decimal,
    now: DateTime<Utc>,
    cancelled: &mut Vec<Uuid>,
    warnings: &mut Vec<String>,
) -> Result<(), ServiceError> {
    let mut pair_ids: Vec<Uuid> = orders
        .iter()
        .filter(|o| matches!(o.status, LiveOrderStatus::Open | LiveOrderStatus::Partial))
        .map(|o| o.pair_id)
        .collect();
    pair_ids.sort();
    pair_ids.dedup();

    for pair_id in pair_ids {
        let legs: Vec<usize> = orders
            .iter()
            .enumerate()
            .filter(|(_, o)| o.pair_id == pair_id)
            .map(|(i, _)| i)
            .collect();
        if legs.is_empty() {
            continue;
        }
        let condition_id = orders[legs[0]].condition_id.clone();
        let market_stale = by_condition
            .get(&condition_id)
            .map(|o| o.market.is_stale(now, stale_hours) || o.market.is_near_end(now, stale_hours))
            .unwrap_or(true);

        let mut has_holdings = false;
        for &idx in &legs {
            if orders[idx].filled_size > Decimal::ZERO {
                has_holdings = true;
                break;
            }
        }
        if !has_holdings {
            for &idx in &legs {
                let balance = chain
                    .erc1155_balance_of(ctf_contract, wallet, &orders[idx].token_id)
                    .await?;
                if balance > Decimal::ZERO {
                    has_holdings = true;
                    warnings.push(format!(
                        "pair {pair_id}: on-chain holdings found for a locally-unfilled order; not cancelling counterpart"
                    ));
                    break;
                }
            }
        }

        if market_stale && !has_holdings {
            for &idx in &legs {
                orders[idx].status = LiveOrderStatus::Cancelled;
                cancelled.push(orders[idx].id);
            }
            continue;
        }

        if has_holdings {
            continue;
        }

        let oldest_age_hours = legs
            .iter()
            .map(|&i| (now - orders[i].placed_at).num_seconds() as f64 / 3600.0)
            .fold(0.0, f64::max);
        let rotation_reason = if oldest_age_hours >= stale_hours {
            Some("age exceeded stale_hours")
        } else if by_condition
            .get(&condition_id)
            .is_some_and(|o| o.fill_cost_per_pair > Decimal::ZERO)
        {
            Some("fill cost turned positive")
        } else if by_condition.get(&condition_id).is_some_and(|o| {
            let placed = orders[legs[0]].competition_at_placement;
            placed > Decimal::ZERO && o.competition >= placed * competition_multiplier
        }) {
            Some("competition grew past rotation threshold")
        } else {
            None
        };

        if let Some(reason) = rotation_reason {
            for &idx in &legs {
                orders[idx].status = LiveOrderStatus::Cancelled;
                cancelled.push(orders[idx].id);
            }
            warnings.push(format!("pair {pair_id} rotated: {reason}"));
        }
    }
    Ok(())
}

async fn run_merges(
    orders: &mut [LiveOrder],
    merge_executor: &MergeExecutor<'_>,
    breaker: &CircuitBreaker,
    store: &dyn LiveEngineStore,
    merge_delay_minutes: i64,
    min_merge_profit: Decimal,
    now: DateTime<Utc>,
    merges: &mut Vec<MergeResult>,
) -> Result<(), ServiceError> {
    let mut pair_ids: Vec<Uuid> = orders.iter().map(|o| o.pair_id).collect();
    pair_ids.sort();
    pair_ids.dedup();

    for pair_id in pair_ids {
        let legs: Vec<usize> = orders
            .iter()
            .enumerate()
            .filter(|(_, o)| o.pair_id == pair_id && o.status == LiveOrderStatus::Filled)
            .map(|(i, _)| i)
            .collect();
        if legs.len() != 2 {
            continue;
        }
        let last_fill_time = legs
            .iter()
            .filter_map(|&i| orders[i].filled_at)
            .max();
        let Some(last_fill_time) = last_fill_time else { continue };
        if now - last_fill_time < Duration::minutes(merge_delay_minutes) {
            continue;
        }

        let (yes_idx, no_idx) = match (orders[legs[0]].side, orders[legs[1]].side) {
            (crate::types::Side::Yes, crate::types::Side::No) => (legs[0], legs[1]),
            (crate::types::Side::No, crate::types::Side::Yes) => (legs[1], legs[0]),
            _ => continue,
        };

        let yes_shares = orders[yes_idx].filled_size / orders[yes_idx].bid_price.max(Decimal::new(1, 2));
        let no_shares = orders[no_idx].filled_size / orders[no_idx].bid_price.max(Decimal::new(1, 2));
        let mergeable = yes_shares.min(no_shares).floor();
        if mergeable <= Decimal::ZERO {
            continue;
        }

        let cost = mergeable * orders[yes_idx].bid_price + mergeable * orders[no_idx].bid_price;
        let spread = mergeable - cost;
        let gas_cost = merge_executor.estimate_gas_cost_in_collateral().await;
        let net_profit = spread - gas_cost;

        if net_profit < min_merge_profit {
            if net_profit < Decimal::ZERO {
                breaker.record_loss(net_profit, now);
            }
            continue;
        }

        let mut result = merge_executor
            .merge(
                &orders[yes_idx].condition_id,
                mergeable,
                orders[yes_idx].neg_risk,
                pair_id,
            )
            .await;

        if result.success {
            result.spread_profit = net_profit;
            result.collateral_received = mergeable;
            orders[yes_idx].status = LiveOrderStatus::Merged;
            orders[no_idx].status = LiveOrderStatus::Merged;
            orders[yes_idx].merged_at = Some(now);
            orders[no_idx].merged_at = Some(now);
            breaker.record_win(net_profit);
        } else {
            breaker.record_loss(net_profit.min(Decimal::ZERO), now);
        }
        store.save_merge_result(&result).await?;
        merges.push(result);
    }
    Ok(())
}

fn build_summary(
    now: DateTime<Utc>,
    orders: &[LiveOrder],
    total_merge_profit: Decimal,
    effective_capital: Decimal,
    breaker_triggered: bool,
) -> DailySummary {
    let open_orders = orders
        .iter()
        .filter(|o| matches!(o.status, LiveOrderStatus::Open | LiveOrderStatus::Partial))
        .count();
    let active_pairs: std::collections::HashSet<Uuid> = orders
        .iter()
        .filter(|o| matches!(o.status, LiveOrderStatus::Open | LiveOrderStatus::Partial))
        .map(|o| o.pair_id)
        .collect();
    DailySummary {
        date: now,
        active_pairs: active_pairs.len(),
        open_orders,
        total_merge_profit,
        effective_capital,
        breaker_triggered,
    }
}
